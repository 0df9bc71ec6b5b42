use crate::descriptor::layout::{BindingLayout, DescriptorWrite};
use crate::error::ErrorKind;
use crate::memory::block::{BlockCreateInfo, CopyRegion};
use crate::memory::image::ImageCreateInfo;
use crate::memory::memory_type::DeviceInfo;
use crate::pipeline::graphics_pipeline::{GraphicsPipelineCreateInfo, IndexType};
use crate::pipeline::stage::{Barrier, BindPoint};
use std::error::Error;
use std::ops::Range;

/// Internal interface for device API calls, may change at any time!
///
/// A platform is the device context: one logical device with one queue. It is shared between
/// [`System`](crate::system::System)s through an `Arc`, every object it hands out is owned by exactly one of them.
///
/// # Safety
/// All `unsafe fn`s require that the objects passed in were created by this platform and not yet destroyed. Objects
/// referenced by a submitted command buffer must not be destroyed or written by the host before the fence returned
/// by [`Self::submit`] has signaled. Command buffers must be recorded between [`Self::begin_command_buffer`] and
/// [`Self::end_command_buffer`].
pub unsafe trait GpuPlatform: Sized + 'static {
	type Block: 'static;
	type Image: 'static;
	type DescriptorLayout: 'static;
	type DescriptorPool: 'static;
	type PipelineLayout: 'static;
	type Pipeline: 'static;
	type Shader: 'static;
	type CommandBuffer: 'static;
	type Fence: 'static;
	type Error: 'static + Error + Send + Sync;

	fn device_info(&self) -> &DeviceInfo;

	/// Classifies a platform error. Errors that leave the device unusable must report [`ErrorKind::DeviceFatal`].
	fn error_kind(error: &Self::Error) -> ErrorKind;

	unsafe fn alloc_block(&self, create_info: &BlockCreateInfo) -> Result<Self::Block, Self::Error>;

	/// Host access to a block, `None` if the block's memory is not host visible. Host visible blocks are always
	/// host coherent.
	unsafe fn mapped_block_to_slab(block: &mut Self::Block) -> Option<&mut (impl presser::Slab + '_)>;

	unsafe fn free_block(&self, block: Self::Block);

	unsafe fn alloc_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::Error>;

	unsafe fn free_image(&self, image: Self::Image);

	unsafe fn create_descriptor_layout(&self, bindings: &[BindingLayout]) -> Result<Self::DescriptorLayout, Self::Error>;

	unsafe fn destroy_descriptor_layout(&self, layout: Self::DescriptorLayout);

	/// Creates a pool holding `instances` descriptor sets of `layout`.
	unsafe fn create_descriptor_pool(
		&self,
		layout: &Self::DescriptorLayout,
		bindings: &[BindingLayout],
		instances: u32,
	) -> Result<Self::DescriptorPool, Self::Error>;

	/// Update descriptor set `instance` of `pool`. The instance must not be in use by any pending execution.
	unsafe fn write_descriptors(&self, pool: &mut Self::DescriptorPool, instance: u32, writes: &[DescriptorWrite<Self>]);

	unsafe fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool);

	unsafe fn create_pipeline_layout(
		&self,
		set_layouts: &[&Self::DescriptorLayout],
	) -> Result<Self::PipelineLayout, Self::Error>;

	unsafe fn destroy_pipeline_layout(&self, layout: Self::PipelineLayout);

	unsafe fn create_compute_pipeline(
		&self,
		layout: &Self::PipelineLayout,
		name: &str,
		shader: &Self::Shader,
	) -> Result<Self::Pipeline, Self::Error>;

	unsafe fn create_graphics_pipeline(
		&self,
		layout: &Self::PipelineLayout,
		create_info: &GraphicsPipelineCreateInfo<Self>,
	) -> Result<Self::Pipeline, Self::Error>;

	unsafe fn destroy_pipeline(&self, pipeline: Self::Pipeline);

	unsafe fn alloc_command_buffer(&self) -> Result<Self::CommandBuffer, Self::Error>;

	/// Resets and begins recording a command buffer that is not in use by any pending execution.
	unsafe fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::Error>;

	unsafe fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::Error>;

	unsafe fn free_command_buffer(&self, cmd: Self::CommandBuffer);

	unsafe fn cmd_barrier(&self, cmd: &mut Self::CommandBuffer, barrier: Barrier);

	unsafe fn cmd_copy_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Block,
		dst: &Self::Block,
		regions: &[CopyRegion],
	);

	/// Transitions a freshly allocated image into the layout every other command expects.
	unsafe fn cmd_init_image(&self, cmd: &mut Self::CommandBuffer, image: &Self::Image);

	/// Copies a tightly packed image starting at `src_offset` into the whole image.
	unsafe fn cmd_copy_block_to_image(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Block,
		src_offset: u64,
		dst: &Self::Image,
	);

	/// Copies the whole image tightly packed into `dst` starting at `dst_offset`.
	unsafe fn cmd_copy_image_to_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Image,
		dst: &Self::Block,
		dst_offset: u64,
	);

	unsafe fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, bind_point: BindPoint, pipeline: &Self::Pipeline);

	unsafe fn cmd_bind_descriptor_set(
		&self,
		cmd: &mut Self::CommandBuffer,
		bind_point: BindPoint,
		layout: &Self::PipelineLayout,
		set_index: u32,
		pool: &Self::DescriptorPool,
		instance: u32,
	);

	unsafe fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, group_counts: [u32; 3]);

	/// Begins rendering into the whole `target`, which must be a color attachment.
	unsafe fn cmd_begin_rendering(&self, cmd: &mut Self::CommandBuffer, target: &Self::Image, clear: Option<[f32; 4]>);

	unsafe fn cmd_end_rendering(&self, cmd: &mut Self::CommandBuffer);

	unsafe fn cmd_bind_vertex_block(&self, cmd: &mut Self::CommandBuffer, binding: u32, block: &Self::Block, offset: u64);

	unsafe fn cmd_bind_index_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		block: &Self::Block,
		offset: u64,
		index_type: IndexType,
	);

	unsafe fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertices: Range<u32>, instances: Range<u32>);

	unsafe fn cmd_draw_indexed(
		&self,
		cmd: &mut Self::CommandBuffer,
		indices: Range<u32>,
		vertex_offset: i32,
		instances: Range<u32>,
	);

	/// Submits an ended command buffer to the queue. Executions on the queue complete in submission order.
	unsafe fn submit(&self, cmd: &Self::CommandBuffer) -> Result<Self::Fence, Self::Error>;

	unsafe fn fence_completed(&self, fence: &Self::Fence) -> Result<bool, Self::Error>;

	unsafe fn wait_fence(&self, fence: &Self::Fence) -> Result<(), Self::Error>;

	unsafe fn destroy_fence(&self, fence: Self::Fence);

	unsafe fn wait_idle(&self) -> Result<(), Self::Error>;
}
