use crate::descriptor::layout::{BindingLayout, DescriptorKind, DescriptorResource, DescriptorWrite};
use crate::error::ErrorKind;
use crate::memory::block::{BlockCreateInfo, CopyRegion};
use crate::memory::image::{ImageCreateInfo, ImageUsage};
use crate::memory::memory_type::DeviceInfo;
use crate::pipeline::graphics_pipeline::{GraphicsPipelineCreateInfo, IndexType};
use crate::pipeline::stage::{AccessScope, Barrier, BindPoint};
use crate::platform::ash::{
	Ash, AshBlock, AshCommandBuffer, AshDescriptorPool, AshError, AshImage, SpirvShader,
};
use crate::platform::GpuPlatform;
use ash::vk::{
	AttachmentLoadOp, AttachmentStoreOp, BufferCopy, BufferImageCopy, ClearColorValue,
	ClearValue, ColorComponentFlags, CommandBufferBeginInfo, CommandBufferSubmitInfo, CommandBufferUsageFlags,
	CommandPoolResetFlags, ComputePipelineCreateInfo, CullModeFlags, DependencyInfo, DescriptorBufferInfo,
	DescriptorImageInfo, DescriptorPoolCreateInfo, DescriptorPoolSize, DescriptorSetAllocateInfo,
	DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType, DynamicState, Extent2D, Extent3D, Fence,
	FenceCreateInfo, Filter, FrontFace, GraphicsPipelineCreateInfo as VkGraphicsPipelineCreateInfo, ImageAspectFlags,
	ImageLayout, ImageMemoryBarrier2, ImageSubresourceLayers, ImageSubresourceRange, ImageTiling, ImageType,
	ImageViewCreateInfo, ImageViewType, MemoryBarrier2, Offset2D, PipelineColorBlendAttachmentState,
	PipelineColorBlendStateCreateInfo, PipelineDynamicStateCreateInfo, PipelineInputAssemblyStateCreateInfo,
	PipelineLayout, PipelineLayoutCreateInfo, PipelineMultisampleStateCreateInfo,
	PipelineRasterizationStateCreateInfo, PipelineRenderingCreateInfo, PipelineShaderStageCreateInfo,
	PipelineStageFlags2, PipelineVertexInputStateCreateInfo, PipelineViewportStateCreateInfo, PolygonMode, Rect2D,
	RenderingAttachmentInfo, RenderingInfo, SampleCountFlags, SamplerAddressMode, SamplerCreateInfo,
	SamplerMipmapMode, ShaderModule, ShaderModuleCreateInfo, ShaderStageFlags, SharingMode, SubmitInfo2,
	VertexInputAttributeDescription, VertexInputBindingDescription, VertexInputRate, Viewport,
};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::{AllocationError, MemoryLocation};
use std::ops::Range;

const COLOR_SUBRESOURCE_RANGE: ImageSubresourceRange = ImageSubresourceRange {
	aspect_mask: ImageAspectFlags::COLOR,
	base_mip_level: 0,
	level_count: 1,
	base_array_layer: 0,
	layer_count: 1,
};

const COLOR_SUBRESOURCE_LAYERS: ImageSubresourceLayers = ImageSubresourceLayers {
	aspect_mask: ImageAspectFlags::COLOR,
	mip_level: 0,
	base_array_layer: 0,
	layer_count: 1,
};

fn extent_3d(extent: [u32; 2]) -> Extent3D {
	Extent3D {
		width: extent[0],
		height: extent[1],
		depth: 1,
	}
}

impl Ash {
	unsafe fn allocate(
		&self,
		name: &str,
		requirements: ash::vk::MemoryRequirements,
		location: MemoryLocation,
		scheme: AllocationScheme,
	) -> Result<Allocation, AshError> {
		Ok(self.memory_allocator()?.allocate(&AllocationCreateDesc {
			requirements,
			name,
			location,
			allocation_scheme: scheme,
			linear: true,
		})?)
	}

	unsafe fn free_allocation(&self, allocation: Option<Allocation>) {
		if let Some(allocation) = allocation {
			match self.memory_allocator() {
				Ok(mut allocator) => {
					if let Err(e) = allocator.free(allocation) {
						log::error!("freeing allocation failed: {e}");
					}
				}
				Err(e) => log::error!("freeing allocation failed: {e}"),
			}
		}
	}

	unsafe fn create_shader_module(&self, shader: &SpirvShader) -> Result<ShaderModule, AshError> {
		Ok(self
			.device
			.create_shader_module(&ShaderModuleCreateInfo::default().code(&shader.code), None)?)
	}
}

unsafe impl GpuPlatform for Ash {
	type Block = AshBlock;
	type Image = AshImage;
	type DescriptorLayout = ash::vk::DescriptorSetLayout;
	type DescriptorPool = AshDescriptorPool;
	type PipelineLayout = PipelineLayout;
	type Pipeline = ash::vk::Pipeline;
	type Shader = SpirvShader;
	type CommandBuffer = AshCommandBuffer;
	type Fence = Fence;
	type Error = AshError;

	fn device_info(&self) -> &DeviceInfo {
		&self.info
	}

	fn error_kind(error: &Self::Error) -> ErrorKind {
		match error {
			AshError::Vk(ash::vk::Result::ERROR_DEVICE_LOST) => ErrorKind::DeviceFatal,
			AshError::Vk(
				ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
				| ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY
				| ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY
				| ash::vk::Result::ERROR_FRAGMENTED_POOL
				| ash::vk::Result::ERROR_TOO_MANY_OBJECTS,
			)
			| AshError::Allocation(AllocationError::OutOfMemory | AllocationError::NoCompatibleMemoryTypeFound) => {
				ErrorKind::ResourceExhaustion
			}
			AshError::Vk(
				ash::vk::Result::ERROR_INITIALIZATION_FAILED
				| ash::vk::Result::ERROR_FEATURE_NOT_PRESENT
				| ash::vk::Result::ERROR_FORMAT_NOT_SUPPORTED
				| ash::vk::Result::ERROR_INVALID_SHADER_NV,
			)
			| AshError::Unsupported(_) => ErrorKind::Configuration,
			AshError::Vk(_) | AshError::Allocation(_) => ErrorKind::ValidationViolation,
		}
	}

	unsafe fn alloc_block(&self, create_info: &BlockCreateInfo) -> Result<Self::Block, Self::Error> {
		let buffer = self.device.create_buffer(
			&ash::vk::BufferCreateInfo::default()
				.usage(create_info.usage.to_ash_buffer_usage_flags())
				.size(create_info.size)
				.sharing_mode(SharingMode::EXCLUSIVE),
			None,
		)?;
		let allocation = (|| -> Result<Allocation, AshError> {
			self.set_debug_object_name(buffer, create_info.name)?;
			let requirements = self.device.get_buffer_memory_requirements(buffer);
			let allocation = self.allocate(
				create_info.name,
				requirements,
				create_info.memory_type.to_gpu_allocator_memory_location(),
				AllocationScheme::DedicatedBuffer(buffer),
			)?;
			if let Err(e) = self
				.device
				.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
			{
				self.free_allocation(Some(allocation));
				return Err(AshError::from(e));
			}
			Ok(allocation)
		})();
		match allocation {
			Ok(allocation) => Ok(AshBlock {
				buffer,
				allocation: Some(allocation),
				size: create_info.size,
			}),
			Err(e) => {
				self.device.destroy_buffer(buffer, None);
				Err(e)
			}
		}
	}

	unsafe fn mapped_block_to_slab(block: &mut Self::Block) -> Option<&mut (impl presser::Slab + '_)> {
		block.allocation.as_mut().filter(|a| a.mapped_ptr().is_some())
	}

	unsafe fn free_block(&self, mut block: Self::Block) {
		self.free_allocation(block.allocation.take());
		self.device.destroy_buffer(block.buffer, None);
	}

	unsafe fn alloc_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::Error> {
		let format = create_info.format.to_ash_format();
		let image = self.device.create_image(
			&ash::vk::ImageCreateInfo::default()
				.image_type(ImageType::TYPE_2D)
				.format(format)
				.extent(extent_3d(create_info.extent))
				.mip_levels(1)
				.array_layers(1)
				.samples(SampleCountFlags::TYPE_1)
				.tiling(ImageTiling::OPTIMAL)
				.usage(create_info.usage.to_ash_image_usage_flags())
				.sharing_mode(SharingMode::EXCLUSIVE)
				.initial_layout(ImageLayout::UNDEFINED),
			None,
		)?;
		let mut out = AshImage {
			image,
			view: ash::vk::ImageView::null(),
			sampler: None,
			allocation: None,
			format,
			extent: create_info.extent,
		};
		let result = (|| -> Result<(), AshError> {
			self.set_debug_object_name(image, create_info.name)?;
			let requirements = self.device.get_image_memory_requirements(image);
			let allocation = self.allocate(
				create_info.name,
				requirements,
				MemoryLocation::GpuOnly,
				AllocationScheme::DedicatedImage(image),
			)?;
			let bound = self
				.device
				.bind_image_memory(image, allocation.memory(), allocation.offset());
			out.allocation = Some(allocation);
			bound?;
			out.view = self.device.create_image_view(
				&ImageViewCreateInfo::default()
					.image(image)
					.view_type(ImageViewType::TYPE_2D)
					.format(format)
					.subresource_range(COLOR_SUBRESOURCE_RANGE),
				None,
			)?;
			if create_info.usage.contains(ImageUsage::SAMPLED) {
				out.sampler = Some(self.device.create_sampler(
					&SamplerCreateInfo::default()
						.mag_filter(Filter::LINEAR)
						.min_filter(Filter::LINEAR)
						.mipmap_mode(SamplerMipmapMode::NEAREST)
						.address_mode_u(SamplerAddressMode::CLAMP_TO_EDGE)
						.address_mode_v(SamplerAddressMode::CLAMP_TO_EDGE)
						.address_mode_w(SamplerAddressMode::CLAMP_TO_EDGE),
					None,
				)?);
			}
			Ok(())
		})();
		match result {
			Ok(()) => Ok(out),
			Err(e) => {
				self.free_image(out);
				Err(e)
			}
		}
	}

	unsafe fn free_image(&self, mut image: Self::Image) {
		if let Some(sampler) = image.sampler.take() {
			self.device.destroy_sampler(sampler, None);
		}
		if image.view != ash::vk::ImageView::null() {
			self.device.destroy_image_view(image.view, None);
		}
		self.free_allocation(image.allocation.take());
		self.device.destroy_image(image.image, None);
	}

	unsafe fn create_descriptor_layout(&self, bindings: &[BindingLayout]) -> Result<Self::DescriptorLayout, Self::Error> {
		let bindings = bindings
			.iter()
			.map(|b| {
				DescriptorSetLayoutBinding::default()
					.binding(b.binding)
					.descriptor_type(b.kind.to_ash_descriptor_type())
					.descriptor_count(b.count)
					.stage_flags(b.stages.to_ash_shader_stage_flags())
			})
			.collect::<Vec<_>>();
		Ok(self
			.device
			.create_descriptor_set_layout(&DescriptorSetLayoutCreateInfo::default().bindings(&bindings), None)?)
	}

	unsafe fn destroy_descriptor_layout(&self, layout: Self::DescriptorLayout) {
		self.device.destroy_descriptor_set_layout(layout, None);
	}

	unsafe fn create_descriptor_pool(
		&self,
		layout: &Self::DescriptorLayout,
		bindings: &[BindingLayout],
		instances: u32,
	) -> Result<Self::DescriptorPool, Self::Error> {
		let mut pool_sizes = Vec::<DescriptorPoolSize>::new();
		for binding in bindings {
			let ty = binding.kind.to_ash_descriptor_type();
			match pool_sizes.iter_mut().find(|s| s.ty == ty) {
				Some(size) => size.descriptor_count += binding.count * instances,
				None => pool_sizes.push(
					DescriptorPoolSize::default()
						.ty(ty)
						.descriptor_count(binding.count * instances),
				),
			}
		}
		// a pool must have at least one size, even for sets without bindings
		if pool_sizes.is_empty() {
			pool_sizes.push(
				DescriptorPoolSize::default()
					.ty(DescriptorType::UNIFORM_BUFFER)
					.descriptor_count(1),
			);
		}
		let pool = self.device.create_descriptor_pool(
			&DescriptorPoolCreateInfo::default()
				.max_sets(instances)
				.pool_sizes(&pool_sizes),
			None,
		)?;
		let layouts = vec![*layout; instances as usize];
		match self
			.device
			.allocate_descriptor_sets(&DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(&layouts))
		{
			Ok(sets) => Ok(AshDescriptorPool { pool, sets }),
			Err(e) => {
				self.device.destroy_descriptor_pool(pool, None);
				Err(e.into())
			}
		}
	}

	unsafe fn write_descriptors(&self, pool: &mut Self::DescriptorPool, instance: u32, writes: &[DescriptorWrite<Self>]) {
		enum Info {
			Buffer([DescriptorBufferInfo; 1]),
			Image([DescriptorImageInfo; 1]),
		}

		let set = pool.sets[instance as usize];
		let infos = writes
			.iter()
			.map(|w| match w.resource {
				DescriptorResource::Buffer { block, offset, range } => Info::Buffer([DescriptorBufferInfo::default()
					.buffer(block.buffer)
					.offset(offset)
					.range(range)]),
				DescriptorResource::Image { image } => Info::Image([DescriptorImageInfo::default()
					.image_view(image.view)
					.image_layout(ImageLayout::GENERAL)
					.sampler(match w.kind {
						DescriptorKind::SampledImage => image.sampler.unwrap_or_default(),
						_ => ash::vk::Sampler::null(),
					})]),
			})
			.collect::<Vec<_>>();
		let vk_writes = writes
			.iter()
			.zip(infos.iter())
			.map(|(w, info)| {
				let write = ash::vk::WriteDescriptorSet::default()
					.dst_set(set)
					.dst_binding(w.binding)
					.dst_array_element(w.array_element)
					.descriptor_type(w.kind.to_ash_descriptor_type());
				match info {
					Info::Buffer(info) => write.buffer_info(info),
					Info::Image(info) => write.image_info(info),
				}
			})
			.collect::<Vec<_>>();
		self.device.update_descriptor_sets(&vk_writes, &[]);
	}

	unsafe fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool) {
		self.device.destroy_descriptor_pool(pool.pool, None);
	}

	unsafe fn create_pipeline_layout(
		&self,
		set_layouts: &[&Self::DescriptorLayout],
	) -> Result<Self::PipelineLayout, Self::Error> {
		let set_layouts = set_layouts.iter().map(|l| **l).collect::<Vec<_>>();
		Ok(self
			.device
			.create_pipeline_layout(&PipelineLayoutCreateInfo::default().set_layouts(&set_layouts), None)?)
	}

	unsafe fn destroy_pipeline_layout(&self, layout: Self::PipelineLayout) {
		self.device.destroy_pipeline_layout(layout, None);
	}

	unsafe fn create_compute_pipeline(
		&self,
		layout: &Self::PipelineLayout,
		name: &str,
		shader: &Self::Shader,
	) -> Result<Self::Pipeline, Self::Error> {
		let module = self.create_shader_module(shader)?;
		let result = self.device.create_compute_pipelines(
			self.cache.unwrap_or_default(),
			&[ComputePipelineCreateInfo::default().layout(*layout).stage(
				PipelineShaderStageCreateInfo::default()
					.stage(ShaderStageFlags::COMPUTE)
					.module(module)
					.name(&shader.entry_point),
			)],
			None,
		);
		self.device.destroy_shader_module(module, None);
		let pipeline = result.map_err(|(_, e)| e)?[0];
		self.set_debug_object_name(pipeline, name)?;
		Ok(pipeline)
	}

	unsafe fn create_graphics_pipeline(
		&self,
		layout: &Self::PipelineLayout,
		create_info: &GraphicsPipelineCreateInfo<Self>,
	) -> Result<Self::Pipeline, Self::Error> {
		let mut bindings = Vec::with_capacity(create_info.vertex_input.bindings.len());
		let mut attributes = Vec::with_capacity(create_info.vertex_input.bindings.len());
		for binding in &create_info.vertex_input.bindings {
			let format = binding.format.to_ash_vertex_format().ok_or_else(|| {
				AshError::Unsupported(format!("vertex attribute of type {}", binding.format).into())
			})?;
			bindings.push(
				VertexInputBindingDescription::default()
					.binding(binding.binding)
					.stride(binding.stride)
					.input_rate(VertexInputRate::VERTEX),
			);
			attributes.push(
				VertexInputAttributeDescription::default()
					.location(binding.binding)
					.binding(binding.binding)
					.format(format)
					.offset(0),
			);
		}

		let vertex = self.create_shader_module(create_info.vertex)?;
		let fragment = match self.create_shader_module(create_info.fragment) {
			Ok(e) => e,
			Err(e) => {
				self.device.destroy_shader_module(vertex, None);
				return Err(e);
			}
		};
		let stages = [
			PipelineShaderStageCreateInfo::default()
				.stage(ShaderStageFlags::VERTEX)
				.module(vertex)
				.name(&create_info.vertex.entry_point),
			PipelineShaderStageCreateInfo::default()
				.stage(ShaderStageFlags::FRAGMENT)
				.module(fragment)
				.name(&create_info.fragment.entry_point),
		];
		let color_formats = [create_info.color_format.to_ash_format()];
		let blend_attachments = [PipelineColorBlendAttachmentState::default()
			.blend_enable(false)
			.color_write_mask(ColorComponentFlags::RGBA)];
		let result = self.device.create_graphics_pipelines(
			self.cache.unwrap_or_default(),
			&[VkGraphicsPipelineCreateInfo::default()
				.stages(&stages)
				.vertex_input_state(
					&PipelineVertexInputStateCreateInfo::default()
						.vertex_binding_descriptions(&bindings)
						.vertex_attribute_descriptions(&attributes),
				)
				.input_assembly_state(
					&PipelineInputAssemblyStateCreateInfo::default()
						.topology(create_info.topology.to_ash_primitive_topology()),
				)
				.viewport_state(
					&PipelineViewportStateCreateInfo::default()
						.viewport_count(1)
						.scissor_count(1),
				)
				.rasterization_state(
					&PipelineRasterizationStateCreateInfo::default()
						.polygon_mode(PolygonMode::FILL)
						.cull_mode(CullModeFlags::NONE)
						.front_face(FrontFace::COUNTER_CLOCKWISE)
						.line_width(1.0),
				)
				.multisample_state(
					&PipelineMultisampleStateCreateInfo::default().rasterization_samples(SampleCountFlags::TYPE_1),
				)
				.color_blend_state(&PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments))
				.dynamic_state(
					&PipelineDynamicStateCreateInfo::default()
						.dynamic_states(&[DynamicState::VIEWPORT, DynamicState::SCISSOR]),
				)
				.layout(*layout)
				.push_next(&mut PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats))],
			None,
		);
		self.device.destroy_shader_module(vertex, None);
		self.device.destroy_shader_module(fragment, None);
		let pipeline = result.map_err(|(_, e)| e)?[0];
		self.set_debug_object_name(pipeline, create_info.name)?;
		Ok(pipeline)
	}

	unsafe fn destroy_pipeline(&self, pipeline: Self::Pipeline) {
		self.device.destroy_pipeline(pipeline, None);
	}

	unsafe fn alloc_command_buffer(&self) -> Result<Self::CommandBuffer, Self::Error> {
		match self.free_commands.pop() {
			Some(cmd) => Ok(cmd),
			None => Ok(AshCommandBuffer::new(&self.device, self.queue_family_index)?),
		}
	}

	unsafe fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::Error> {
		self.device
			.reset_command_pool(cmd.pool, CommandPoolResetFlags::empty())?;
		cmd.render_extent = None;
		self.device.begin_command_buffer(
			cmd.cmd,
			&CommandBufferBeginInfo::default().flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT),
		)?;
		Ok(())
	}

	unsafe fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::Error> {
		Ok(self.device.end_command_buffer(cmd.cmd)?)
	}

	unsafe fn free_command_buffer(&self, cmd: Self::CommandBuffer) {
		self.free_commands.push(cmd);
	}

	unsafe fn cmd_barrier(&self, cmd: &mut Self::CommandBuffer, barrier: Barrier) {
		let (src_stage, src_access) = barrier.src.to_ash_stage_access();
		let (dst_stage, dst_access) = barrier.dst.to_ash_stage_access();
		self.device.cmd_pipeline_barrier2(
			cmd.cmd,
			&DependencyInfo::default().memory_barriers(&[MemoryBarrier2::default()
				.src_stage_mask(src_stage)
				.src_access_mask(src_access)
				.dst_stage_mask(dst_stage)
				.dst_access_mask(dst_access)]),
		);
	}

	unsafe fn cmd_copy_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Block,
		dst: &Self::Block,
		regions: &[CopyRegion],
	) {
		let regions = regions
			.iter()
			.map(|r| BufferCopy {
				src_offset: r.src_offset,
				dst_offset: r.dst_offset,
				size: r.size,
			})
			.collect::<Vec<_>>();
		if !regions.is_empty() {
			self.device.cmd_copy_buffer(cmd.cmd, src.buffer, dst.buffer, &regions);
		}
	}

	unsafe fn cmd_init_image(&self, cmd: &mut Self::CommandBuffer, image: &Self::Image) {
		let (dst_stage, dst_access) = AccessScope::Shader.to_ash_stage_access();
		let (transfer_stage, transfer_access) = AccessScope::Transfer.to_ash_stage_access();
		self.device.cmd_pipeline_barrier2(
			cmd.cmd,
			&DependencyInfo::default().image_memory_barriers(&[ImageMemoryBarrier2::default()
				.image(image.image)
				.subresource_range(COLOR_SUBRESOURCE_RANGE)
				.old_layout(ImageLayout::UNDEFINED)
				.new_layout(ImageLayout::GENERAL)
				.src_stage_mask(PipelineStageFlags2::NONE)
				.dst_stage_mask(dst_stage | transfer_stage)
				.dst_access_mask(dst_access | transfer_access)]),
		);
	}

	unsafe fn cmd_copy_block_to_image(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Block,
		src_offset: u64,
		dst: &Self::Image,
	) {
		self.device.cmd_copy_buffer_to_image(
			cmd.cmd,
			src.buffer,
			dst.image,
			ImageLayout::GENERAL,
			&[BufferImageCopy::default()
				.buffer_offset(src_offset)
				.image_subresource(COLOR_SUBRESOURCE_LAYERS)
				.image_extent(extent_3d(dst.extent))],
		);
	}

	unsafe fn cmd_copy_image_to_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Image,
		dst: &Self::Block,
		dst_offset: u64,
	) {
		self.device.cmd_copy_image_to_buffer(
			cmd.cmd,
			src.image,
			ImageLayout::GENERAL,
			dst.buffer,
			&[BufferImageCopy::default()
				.buffer_offset(dst_offset)
				.image_subresource(COLOR_SUBRESOURCE_LAYERS)
				.image_extent(extent_3d(src.extent))],
		);
	}

	unsafe fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, bind_point: BindPoint, pipeline: &Self::Pipeline) {
		self.device
			.cmd_bind_pipeline(cmd.cmd, bind_point.to_ash_pipeline_bind_point(), *pipeline);
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
		self.device.cmd_bind_descriptor_sets(
			cmd.cmd,
			bind_point.to_ash_pipeline_bind_point(),
			*layout,
			set_index,
			&[pool.sets[instance as usize]],
			&[],
		);
	}

	unsafe fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, group_counts: [u32; 3]) {
		self.device
			.cmd_dispatch(cmd.cmd, group_counts[0], group_counts[1], group_counts[2]);
	}

	unsafe fn cmd_begin_rendering(&self, cmd: &mut Self::CommandBuffer, target: &Self::Image, clear: Option<[f32; 4]>) {
		let extent = Extent2D {
			width: target.extent[0],
			height: target.extent[1],
		};
		let area = Rect2D {
			offset: Offset2D::default(),
			extent,
		};
		let attachments = [RenderingAttachmentInfo::default()
			.image_view(target.view)
			.image_layout(ImageLayout::GENERAL)
			.load_op(match clear {
				Some(_) => AttachmentLoadOp::CLEAR,
				None => AttachmentLoadOp::LOAD,
			})
			.store_op(AttachmentStoreOp::STORE)
			.clear_value(ClearValue {
				color: ClearColorValue {
					float32: clear.unwrap_or_default(),
				},
			})];
		self.device.cmd_begin_rendering(
			cmd.cmd,
			&RenderingInfo::default()
				.render_area(area)
				.layer_count(1)
				.color_attachments(&attachments),
		);
		self.device.cmd_set_viewport(
			cmd.cmd,
			0,
			&[Viewport {
				x: 0.,
				y: 0.,
				width: extent.width as f32,
				height: extent.height as f32,
				min_depth: 0.,
				max_depth: 1.,
			}],
		);
		self.device.cmd_set_scissor(cmd.cmd, 0, &[area]);
		cmd.render_extent = Some(target.extent);
	}

	unsafe fn cmd_end_rendering(&self, cmd: &mut Self::CommandBuffer) {
		self.device.cmd_end_rendering(cmd.cmd);
		cmd.render_extent = None;
	}

	unsafe fn cmd_bind_vertex_block(&self, cmd: &mut Self::CommandBuffer, binding: u32, block: &Self::Block, offset: u64) {
		self.device
			.cmd_bind_vertex_buffers(cmd.cmd, binding, &[block.buffer], &[offset]);
	}

	unsafe fn cmd_bind_index_block(
		&self,
		cmd: &mut Self::CommandBuffer,
		block: &Self::Block,
		offset: u64,
		index_type: IndexType,
	) {
		self.device
			.cmd_bind_index_buffer(cmd.cmd, block.buffer, offset, index_type.to_ash_index_type());
	}

	unsafe fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertices: Range<u32>, instances: Range<u32>) {
		self.device.cmd_draw(
			cmd.cmd,
			vertices.len() as u32,
			instances.len() as u32,
			vertices.start,
			instances.start,
		);
	}

	unsafe fn cmd_draw_indexed(
		&self,
		cmd: &mut Self::CommandBuffer,
		indices: Range<u32>,
		vertex_offset: i32,
		instances: Range<u32>,
	) {
		self.device.cmd_draw_indexed(
			cmd.cmd,
			indices.len() as u32,
			instances.len() as u32,
			indices.start,
			vertex_offset,
			instances.start,
		);
	}

	unsafe fn submit(&self, cmd: &Self::CommandBuffer) -> Result<Self::Fence, Self::Error> {
		let fence = self.device.create_fence(&FenceCreateInfo::default(), None)?;
		let queue = self.queue.lock();
		let result = self.device.queue_submit2(
			*queue,
			&[SubmitInfo2::default().command_buffer_infos(&[CommandBufferSubmitInfo::default().command_buffer(cmd.cmd)])],
			fence,
		);
		drop(queue);
		match result {
			Ok(()) => Ok(fence),
			Err(e) => {
				self.device.destroy_fence(fence, None);
				Err(e.into())
			}
		}
	}

	unsafe fn fence_completed(&self, fence: &Self::Fence) -> Result<bool, Self::Error> {
		Ok(self.device.get_fence_status(*fence)?)
	}

	unsafe fn wait_fence(&self, fence: &Self::Fence) -> Result<(), Self::Error> {
		Ok(self.device.wait_for_fences(&[*fence], true, !0)?)
	}

	unsafe fn destroy_fence(&self, fence: Self::Fence) {
		self.device.destroy_fence(fence, None);
	}

	unsafe fn wait_idle(&self) -> Result<(), Self::Error> {
		let _queue = self.queue.lock();
		Ok(self.device.device_wait_idle()?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ash::vk::BufferUsageFlags;

	#[test]
	fn test_error_kinds() {
		assert_eq!(
			Ash::error_kind(&AshError::Vk(ash::vk::Result::ERROR_DEVICE_LOST)),
			ErrorKind::DeviceFatal
		);
		assert_eq!(
			Ash::error_kind(&AshError::Vk(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)),
			ErrorKind::ResourceExhaustion
		);
		assert_eq!(
			Ash::error_kind(&AshError::Allocation(AllocationError::OutOfMemory)),
			ErrorKind::ResourceExhaustion
		);
		assert_eq!(
			Ash::error_kind(&AshError::Unsupported("test".into())),
			ErrorKind::Configuration
		);
		assert_eq!(
			Ash::error_kind(&AshError::Vk(ash::vk::Result::ERROR_UNKNOWN)),
			ErrorKind::ValidationViolation
		);
	}

	#[test]
	fn test_block_usage_never_empty() {
		assert_ne!(
			crate::memory::block::BlockUsage::empty().to_ash_buffer_usage_flags(),
			BufferUsageFlags::empty()
		);
	}
}
