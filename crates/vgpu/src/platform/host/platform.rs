use crate::descriptor::descriptor_counts::DescriptorCounts;
use crate::descriptor::layout::{BindingLayout, DescriptorResource, DescriptorWrite};
use crate::error::ErrorKind;
use crate::memory::block::{BlockCreateInfo, CopyRegion};
use crate::memory::image::ImageCreateInfo;
use crate::memory::memory_type::{
	DeviceInfo, DeviceLimits, MemoryHeap, MemoryProperties, MemoryPropertyFlags, MemoryType,
};
use crate::pipeline::graphics_pipeline::{GraphicsPipelineCreateInfo, IndexType};
use crate::pipeline::stage::{Barrier, BindPoint};
use crate::platform::host::command::{execute, HostCommand, HostCommandBuffer, HostPipeline, HostStats, PipelineKind};
use crate::platform::host::memory::{HostBlock, HostImage, HostImageData, HostMemory};
use crate::platform::host::shader::{HostResource, HostSet, HostShader};
use crate::platform::GpuPlatform;
use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_HEAP_SIZE: u64 = 256 << 20;

#[derive(Clone, Debug)]
pub struct HostPlatformCreateInfo {
	pub name: String,
	/// Size of heap 0, backing `DEVICE_LOCAL` memory and images
	pub device_local_heap: u64,
	/// Size of heap 1, backing host visible memory
	pub host_heap: u64,
	pub limits: DeviceLimits,
}

impl Default for HostPlatformCreateInfo {
	fn default() -> Self {
		Self {
			name: "host".to_string(),
			device_local_heap: DEFAULT_HEAP_SIZE,
			host_heap: DEFAULT_HEAP_SIZE,
			limits: DeviceLimits::default(),
		}
	}
}

#[derive(Error)]
pub enum HostError {
	#[error("The device was lost")]
	DeviceLost,
	#[error("Out of device memory: requested {requested} bytes from heap {heap}, {available} bytes available")]
	OutOfDeviceMemory { heap: u32, requested: u64, available: u64 },
	#[error("No memory type supports {0:?}")]
	UnsupportedMemoryType(MemoryPropertyFlags),
	#[error("Expected a {expected} shader but got a {actual} shader")]
	ShaderKind { expected: &'static str, actual: &'static str },
	#[error("Invalid usage: {0}")]
	InvalidUsage(String),
}

impl core::fmt::Debug for HostError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

pub struct HostDescriptorLayout {
	bindings: Vec<BindingLayout>,
}

pub struct HostDescriptorPool {
	bindings: Vec<BindingLayout>,
	instances: Vec<Arc<Mutex<HostSet>>>,
}

pub struct HostPipelineLayout {
	sets: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct HostFence(u64);

struct Queue {
	pending: VecDeque<(u64, Arc<[HostCommand]>)>,
	next_fence: u64,
	/// Every fence up to and excluding this one has signaled
	signaled_below: u64,
	lost: bool,
	stats: HostStats,
	heap_usage: [u64; 2],
}

/// A device emulated on the host. Submissions execute lazily and in order once a fence is waited on, which makes
/// pending executions observable and deterministic.
pub struct HostPlatform {
	info: DeviceInfo,
	queue: Mutex<Queue>,
}
assert_impl_all!(HostPlatform: Send, Sync);

impl HostPlatform {
	pub fn new(create_info: HostPlatformCreateInfo) -> Arc<Self> {
		let memory = MemoryProperties {
			types: vec![
				MemoryType {
					flags: MemoryPropertyFlags::DEVICE_LOCAL,
					heap_index: 0,
				},
				MemoryType {
					flags: MemoryPropertyFlags::STAGING,
					heap_index: 1,
				},
				MemoryType {
					flags: MemoryPropertyFlags::STAGING | MemoryPropertyFlags::HOST_CACHED,
					heap_index: 1,
				},
			],
			heaps: vec![
				MemoryHeap {
					size: create_info.device_local_heap,
					device_local: true,
				},
				MemoryHeap {
					size: create_info.host_heap,
					device_local: false,
				},
			],
		};
		Arc::new(Self {
			info: DeviceInfo {
				name: create_info.name,
				memory,
				limits: create_info.limits,
			},
			queue: Mutex::new(Queue {
				pending: VecDeque::new(),
				next_fence: 0,
				signaled_below: 0,
				lost: false,
				stats: HostStats::default(),
				heap_usage: [0; 2],
			}),
		})
	}

	pub fn stats(&self) -> HostStats {
		self.queue.lock().stats
	}

	pub fn heap_usage(&self, heap: u32) -> u64 {
		self.queue.lock().heap_usage.get(heap as usize).copied().unwrap_or(0)
	}

	/// Simulates a device loss: pending executions are dropped and every further submission or wait fails.
	pub fn lose_device(&self) {
		let mut queue = self.queue.lock();
		queue.lost = true;
		queue.pending.clear();
	}

	fn reserve(&self, heap: u32, size: u64) -> Result<(), HostError> {
		let mut queue = self.queue.lock();
		if queue.lost {
			return Err(HostError::DeviceLost);
		}
		let capacity = self.info.memory.heaps[heap as usize].size;
		let used = &mut queue.heap_usage[heap as usize];
		let available = capacity.saturating_sub(*used);
		if size > available {
			return Err(HostError::OutOfDeviceMemory {
				heap,
				requested: size,
				available,
			});
		}
		*used += size;
		Ok(())
	}

	fn release(&self, heap: u32, size: u64) {
		let mut queue = self.queue.lock();
		let used = &mut queue.heap_usage[heap as usize];
		*used = used.saturating_sub(size);
	}

	/// Executes pending submissions in order until `fence` has signaled.
	fn run_until(&self, fence: u64) -> Result<(), HostError> {
		let mut queue = self.queue.lock();
		while queue.signaled_below <= fence {
			if queue.lost {
				return Err(HostError::DeviceLost);
			}
			let Some((id, commands)) = queue.pending.pop_front() else {
				break;
			};
			queue.signaled_below = id + 1;
			let result = execute(&commands, &mut queue.stats);
			if let Err(e) = result {
				log::error!("host execution of fence {id} failed: {e}");
				return Err(e);
			}
		}
		Ok(())
	}
}

unsafe impl GpuPlatform for HostPlatform {
	type Block = HostBlock;
	type Image = HostImage;
	type DescriptorLayout = HostDescriptorLayout;
	type DescriptorPool = HostDescriptorPool;
	type PipelineLayout = HostPipelineLayout;
	type Pipeline = HostPipeline;
	type Shader = HostShader;
	type CommandBuffer = HostCommandBuffer;
	type Fence = HostFence;
	type Error = HostError;

	fn device_info(&self) -> &DeviceInfo {
		&self.info
	}

	fn error_kind(error: &Self::Error) -> ErrorKind {
		match error {
			HostError::DeviceLost => ErrorKind::DeviceFatal,
			HostError::OutOfDeviceMemory { .. } | HostError::UnsupportedMemoryType(_) => ErrorKind::ResourceExhaustion,
			HostError::ShaderKind { .. } => ErrorKind::Configuration,
			HostError::InvalidUsage(_) => ErrorKind::ValidationViolation,
		}
	}

	unsafe fn alloc_block(&self, create_info: &BlockCreateInfo) -> Result<Self::Block, Self::Error> {
		let type_index = self
			.info
			.memory
			.find_type(create_info.memory_type)
			.ok_or(HostError::UnsupportedMemoryType(create_info.memory_type))?;
		let ty = self.info.memory.types[type_index as usize];
		self.reserve(ty.heap_index, create_info.size)?;
		Ok(HostBlock {
			memory: Arc::new(HostMemory::new(create_info.size as usize)),
			usage: create_info.usage,
			heap: ty.heap_index,
			mappable: ty.flags.is_mappable(),
		})
	}

	unsafe fn mapped_block_to_slab(block: &mut Self::Block) -> Option<&mut (impl presser::Slab + '_)> {
		if block.mappable {
			Some(block)
		} else {
			None
		}
	}

	unsafe fn free_block(&self, block: Self::Block) {
		self.release(block.heap, block.memory.len() as u64);
	}

	unsafe fn alloc_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::Error> {
		let size = create_info.byte_size();
		self.reserve(0, size)?;
		Ok(HostImage(Arc::new(HostImageData {
			memory: HostMemory::new(size as usize),
			format: create_info.format,
			extent: create_info.extent,
			usage: create_info.usage,
		})))
	}

	unsafe fn free_image(&self, image: Self::Image) {
		self.release(0, image.0.memory.len() as u64);
	}

	unsafe fn create_descriptor_layout(&self, bindings: &[BindingLayout]) -> Result<Self::DescriptorLayout, Self::Error> {
		let mut counts = DescriptorCounts::ZERO;
		for binding in bindings {
			counts.add(binding.kind, binding.count);
		}
		if !counts.is_within_limit(self.info.limits.descriptors_per_set) {
			return Err(HostError::InvalidUsage(format!(
				"descriptor layout {counts:?} exceeds the per set limits"
			)));
		}
		Ok(HostDescriptorLayout {
			bindings: bindings.to_vec(),
		})
	}

	unsafe fn destroy_descriptor_layout(&self, _layout: Self::DescriptorLayout) {}

	unsafe fn create_descriptor_pool(
		&self,
		layout: &Self::DescriptorLayout,
		bindings: &[BindingLayout],
		instances: u32,
	) -> Result<Self::DescriptorPool, Self::Error> {
		if layout.bindings != bindings {
			return Err(HostError::InvalidUsage(
				"descriptor pool bindings differ from its layout".to_string(),
			));
		}
		Ok(HostDescriptorPool {
			bindings: bindings.to_vec(),
			instances: (0..instances).map(|_| Arc::new(Mutex::new(HostSet::new()))).collect(),
		})
	}

	unsafe fn write_descriptors(&self, pool: &mut Self::DescriptorPool, instance: u32, writes: &[DescriptorWrite<Self>]) {
		let Some(set) = pool.instances.get(instance as usize) else {
			log::error!("descriptor write into instance {instance} of a pool with {}", pool.instances.len());
			return;
		};
		let mut set = set.lock();
		for write in writes {
			let declared = pool
				.bindings
				.iter()
				.find(|b| b.binding == write.binding && b.kind == write.kind && write.array_element < b.count);
			if declared.is_none() {
				log::error!(
					"descriptor write to undeclared binding {} element {} of kind {:?}",
					write.binding,
					write.array_element,
					write.kind
				);
				continue;
			}
			let resource = match write.resource {
				DescriptorResource::Buffer { block, offset, range } => HostResource::Buffer {
					memory: block.memory.clone(),
					offset,
					range,
				},
				DescriptorResource::Image { image } => HostResource::Image(image.clone()),
			};
			set.insert((write.binding, write.array_element), resource);
		}
	}

	unsafe fn destroy_descriptor_pool(&self, _pool: Self::DescriptorPool) {}

	unsafe fn create_pipeline_layout(
		&self,
		set_layouts: &[&Self::DescriptorLayout],
	) -> Result<Self::PipelineLayout, Self::Error> {
		Ok(HostPipelineLayout {
			sets: set_layouts.len() as u32,
		})
	}

	unsafe fn destroy_pipeline_layout(&self, _layout: Self::PipelineLayout) {}

	unsafe fn create_compute_pipeline(
		&self,
		_layout: &Self::PipelineLayout,
		name: &str,
		shader: &Self::Shader,
	) -> Result<Self::Pipeline, Self::Error> {
		match shader {
			HostShader::Compute { local_size, main } => Ok(HostPipeline {
				name: name.into(),
				kind: Arc::new(PipelineKind::Compute {
					local_size: *local_size,
					main: main.clone(),
				}),
			}),
			other => Err(HostError::ShaderKind {
				expected: "compute",
				actual: other.kind(),
			}),
		}
	}

	unsafe fn create_graphics_pipeline(
		&self,
		_layout: &Self::PipelineLayout,
		create_info: &GraphicsPipelineCreateInfo<Self>,
	) -> Result<Self::Pipeline, Self::Error> {
		let HostShader::Vertex(vertex) = create_info.vertex else {
			return Err(HostError::ShaderKind {
				expected: "vertex",
				actual: create_info.vertex.kind(),
			});
		};
		let HostShader::Fragment(fragment) = create_info.fragment else {
			return Err(HostError::ShaderKind {
				expected: "fragment",
				actual: create_info.fragment.kind(),
			});
		};
		Ok(HostPipeline {
			name: create_info.name.into(),
			kind: Arc::new(PipelineKind::Graphics {
				vertex: vertex.clone(),
				fragment: fragment.clone(),
				topology: create_info.topology,
				vertex_input: create_info.vertex_input.clone(),
				color_format: create_info.color_format,
			}),
		})
	}

	unsafe fn destroy_pipeline(&self, _pipeline: Self::Pipeline) {}

	unsafe fn alloc_command_buffer(&self) -> Result<Self::CommandBuffer, Self::Error> {
		Ok(HostCommandBuffer::default())
	}

	unsafe fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::Error> {
		cmd.commands.clear();
		cmd.executable = None;
		cmd.recording = true;
		Ok(())
	}

	unsafe fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::Error> {
		if !cmd.recording {
			return Err(HostError::InvalidUsage("ending a command buffer that is not recording".to_string()));
		}
		cmd.recording = false;
		cmd.executable = Some(std::mem::take(&mut cmd.commands).into());
		Ok(())
	}

	unsafe fn free_command_buffer(&self, _cmd: Self::CommandBuffer) {}

	unsafe fn cmd_barrier(&self, cmd: &mut Self::CommandBuffer, barrier: Barrier) {
		cmd.push(HostCommand::Barrier(barrier));
	}

	unsafe fn cmd_copy_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Block,
		dst: &Self::Block,
		regions: &[CopyRegion],
	) {
		cmd.push(HostCommand::CopyBlock {
			src: src.memory.clone(),
			dst: dst.memory.clone(),
			regions: regions.into(),
		});
	}

	unsafe fn cmd_init_image(&self, cmd: &mut Self::CommandBuffer, image: &Self::Image) {
		cmd.push(HostCommand::InitImage(image.clone()));
	}

	unsafe fn cmd_copy_block_to_image(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Block,
		src_offset: u64,
		dst: &Self::Image,
	) {
		cmd.push(HostCommand::CopyBlockToImage {
			src: src.memory.clone(),
			src_offset,
			dst: dst.clone(),
		});
	}

	unsafe fn cmd_copy_image_to_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Image,
		dst: &Self::Block,
		dst_offset: u64,
	) {
		cmd.push(HostCommand::CopyImageToBlock {
			src: src.clone(),
			dst: dst.memory.clone(),
			dst_offset,
		});
	}

	unsafe fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, bind_point: BindPoint, pipeline: &Self::Pipeline) {
		cmd.push(HostCommand::BindPipeline(bind_point, pipeline.clone()));
	}

	unsafe fn cmd_bind_descriptor_set(
		&self,
		cmd: &mut Self::CommandBuffer,
		bind_point: BindPoint,
		layout: &Self::PipelineLayout,
		set_index: u32,
		pool: &Self::DescriptorPool,
		instance: u32,
	) {
		let command = match pool.instances.get(instance as usize) {
			Some(set) if set_index < layout.sets => HostCommand::BindDescriptorSet {
				bind_point,
				set_index,
				set: set.clone(),
			},
			_ => HostCommand::Invalid(format!(
				"binding instance {instance} of {} at set {set_index} of a layout with {} sets",
				pool.instances.len(),
				layout.sets
			)),
		};
		cmd.push(command);
	}

	unsafe fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, group_counts: [u32; 3]) {
		cmd.push(HostCommand::Dispatch(group_counts));
	}

	unsafe fn cmd_begin_rendering(&self, cmd: &mut Self::CommandBuffer, target: &Self::Image, clear: Option<[f32; 4]>) {
		cmd.push(HostCommand::BeginRendering {
			target: target.clone(),
			clear,
		});
	}

	unsafe fn cmd_end_rendering(&self, cmd: &mut Self::CommandBuffer) {
		cmd.push(HostCommand::EndRendering);
	}

	unsafe fn cmd_bind_vertex_block(&self, cmd: &mut Self::CommandBuffer, binding: u32, block: &Self::Block, offset: u64) {
		cmd.push(HostCommand::BindVertex {
			binding,
			memory: block.memory.clone(),
			offset,
		});
	}

	unsafe fn cmd_bind_index_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		block: &Self::Block,
		offset: u64,
		index_type: IndexType,
	) {
		cmd.push(HostCommand::BindIndex {
			memory: block.memory.clone(),
			offset,
			index_type,
		});
	}

	unsafe fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertices: Range<u32>, instances: Range<u32>) {
		cmd.push(HostCommand::Draw { vertices, instances });
	}

	unsafe fn cmd_draw_indexed(
		&self,
		cmd: &mut Self::CommandBuffer,
		indices: Range<u32>,
		vertex_offset: i32,
		instances: Range<u32>,
	) {
		cmd.push(HostCommand::DrawIndexed {
			indices,
			vertex_offset,
			instances,
		});
	}

	unsafe fn submit(&self, cmd: &Self::CommandBuffer) -> Result<Self::Fence, Self::Error> {
		let commands = cmd
			.executable
			.clone()
			.ok_or_else(|| HostError::InvalidUsage("submitting a command buffer that was not ended".to_string()))?;
		let mut queue = self.queue.lock();
		if queue.lost {
			return Err(HostError::DeviceLost);
		}
		let id = queue.next_fence;
		queue.next_fence += 1;
		queue.pending.push_back((id, commands));
		Ok(HostFence(id))
	}

	unsafe fn fence_completed(&self, fence: &Self::Fence) -> Result<bool, Self::Error> {
		let queue = self.queue.lock();
		if queue.lost {
			return Err(HostError::DeviceLost);
		}
		Ok(fence.0 < queue.signaled_below)
	}

	unsafe fn wait_fence(&self, fence: &Self::Fence) -> Result<(), Self::Error> {
		self.run_until(fence.0)
	}

	unsafe fn destroy_fence(&self, _fence: Self::Fence) {}

	unsafe fn wait_idle(&self) -> Result<(), Self::Error> {
		let last = {
			let queue = self.queue.lock();
			if queue.lost {
				return Err(HostError::DeviceLost);
			}
			match queue.next_fence.checked_sub(1) {
				Some(last) => last,
				None => return Ok(()),
			}
		};
		self.run_until(last)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::block::BlockUsage;

	fn block(platform: &HostPlatform, size: u64, memory_type: MemoryPropertyFlags) -> anyhow::Result<HostBlock> {
		Ok(unsafe {
			platform.alloc_block(&BlockCreateInfo {
				name: "test",
				size,
				usage: BlockUsage::TRANSFER,
				memory_type,
			})?
		})
	}

	#[test]
	fn test_heap_accounting() -> anyhow::Result<()> {
		let platform = HostPlatform::new(HostPlatformCreateInfo {
			device_local_heap: 1024,
			..HostPlatformCreateInfo::default()
		});
		let a = block(&platform, 768, MemoryPropertyFlags::DEVICE_LOCAL)?;
		assert!(matches!(
			block(&platform, 512, MemoryPropertyFlags::DEVICE_LOCAL),
			Err(e) if matches!(e.downcast_ref::<HostError>(), Some(HostError::OutOfDeviceMemory { available: 256, .. }))
		));
		unsafe { platform.free_block(a) };
		assert_eq!(platform.heap_usage(0), 0);
		let mut staging = block(&platform, 64, MemoryPropertyFlags::STAGING)?;
		assert!(unsafe { HostPlatform::mapped_block_to_slab(&mut staging) }.is_some());
		unsafe { platform.free_block(staging) };
		Ok(())
	}

	#[test]
	fn test_fences_signal_in_order_on_wait() -> anyhow::Result<()> {
		let platform = HostPlatform::new(HostPlatformCreateInfo::default());
		let src = block(&platform, 16, MemoryPropertyFlags::STAGING)?;
		let dst = block(&platform, 16, MemoryPropertyFlags::STAGING)?;
		src.memory.write(0, &[7; 16]);
		unsafe {
			let mut cmd = platform.alloc_command_buffer()?;
			platform.begin_command_buffer(&mut cmd)?;
			platform.cmd_copy_block(&mut cmd, &src, &dst, &[CopyRegion::same_offset(0..16)]);
			platform.end_command_buffer(&mut cmd)?;
			let first = platform.submit(&cmd)?;
			let second = platform.submit(&cmd)?;

			assert!(!platform.fence_completed(&first)?);
			platform.wait_fence(&first)?;
			assert!(platform.fence_completed(&first)?);
			assert!(!platform.fence_completed(&second)?);
			platform.wait_idle()?;
			assert!(platform.fence_completed(&second)?);
		}
		let mut out = [0u8; 16];
		dst.memory.read(0, &mut out);
		assert_eq!(out, [7; 16]);
		assert_eq!(platform.stats().copies, 2);
		Ok(())
	}

	#[test]
	fn test_lost_device() -> anyhow::Result<()> {
		let platform = HostPlatform::new(HostPlatformCreateInfo::default());
		platform.lose_device();
		let err = unsafe { platform.wait_idle() }.unwrap_err();
		assert_eq!(HostPlatform::error_kind(&err), ErrorKind::DeviceFatal);
		Ok(())
	}
}
