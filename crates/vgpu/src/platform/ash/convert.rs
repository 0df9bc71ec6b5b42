use crate::descriptor::layout::DescriptorKind;
use crate::memory::block::BlockUsage;
use crate::memory::image::ImageUsage;
use crate::memory::memory_type::MemoryPropertyFlags;
use crate::pipeline::graphics_pipeline::{IndexType, Topology};
use crate::pipeline::stage::{AccessScope, BindPoint};
use crate::vars::role::ShaderStages;
use crate::vars::types::{ElementType, ImageFormat};
use ash::vk::{
	AccessFlags2, BufferUsageFlags, DescriptorType, Format, ImageUsageFlags, PipelineBindPoint, PipelineStageFlags2,
	PrimitiveTopology, ShaderStageFlags,
};
use gpu_allocator::MemoryLocation;

impl BlockUsage {
	pub fn to_ash_buffer_usage_flags(&self) -> BufferUsageFlags {
		let out = BufferUsageFlags::from_raw(self.bits());
		// empty flags are invalid in vulkan, reachable with a block that is only host mapped
		if out.is_empty() {
			BufferUsageFlags::TRANSFER_SRC
		} else {
			out
		}
	}
}

impl ImageUsage {
	pub fn to_ash_image_usage_flags(&self) -> ImageUsageFlags {
		ImageUsageFlags::from_raw(self.bits())
	}
}

impl ShaderStages {
	pub fn to_ash_shader_stage_flags(&self) -> ShaderStageFlags {
		ShaderStageFlags::from_raw(self.bits())
	}
}

impl MemoryPropertyFlags {
	pub fn from_ash(flags: ash::vk::MemoryPropertyFlags) -> Self {
		Self::from_bits_truncate(flags.as_raw())
	}

	/// Host cached memory is for readback, other host visible memory for uploads.
	pub fn to_gpu_allocator_memory_location(&self) -> MemoryLocation {
		if self.contains(MemoryPropertyFlags::HOST_CACHED) {
			MemoryLocation::GpuToCpu
		} else if self.is_mappable() {
			MemoryLocation::CpuToGpu
		} else {
			MemoryLocation::GpuOnly
		}
	}
}

impl ImageFormat {
	pub fn to_ash_format(&self) -> Format {
		match self {
			ImageFormat::Rgba8Unorm => Format::R8G8B8A8_UNORM,
			ImageFormat::Rgba8Srgb => Format::R8G8B8A8_SRGB,
			ImageFormat::Bgra8Unorm => Format::B8G8R8A8_UNORM,
			ImageFormat::R32Float => Format::R32_SFLOAT,
			ImageFormat::Rgba32Float => Format::R32G32B32A32_SFLOAT,
		}
	}
}

impl ElementType {
	/// Format of this type as a vertex attribute.
	pub fn to_ash_vertex_format(&self) -> Option<Format> {
		Some(match self {
			ElementType::Uint16 => Format::R16_UINT,
			ElementType::Int32 => Format::R32_SINT,
			ElementType::Uint32 => Format::R32_UINT,
			ElementType::Float32 => Format::R32_SFLOAT,
			ElementType::Int32Vector2 => Format::R32G32_SINT,
			ElementType::Int32Vector4 => Format::R32G32B32A32_SINT,
			ElementType::Uint32Vector2 => Format::R32G32_UINT,
			ElementType::Uint32Vector4 => Format::R32G32B32A32_UINT,
			ElementType::Float32Vector2 => Format::R32G32_SFLOAT,
			ElementType::Float32Vector3 => Format::R32G32B32_SFLOAT,
			ElementType::Float32Vector4 => Format::R32G32B32A32_SFLOAT,
			ElementType::Float32Matrix4 | ElementType::Texel(_) => return None,
		})
	}
}

impl DescriptorKind {
	pub fn to_ash_descriptor_type(&self) -> DescriptorType {
		match self {
			DescriptorKind::UniformBuffer => DescriptorType::UNIFORM_BUFFER,
			DescriptorKind::StorageBuffer => DescriptorType::STORAGE_BUFFER,
			DescriptorKind::SampledImage => DescriptorType::COMBINED_IMAGE_SAMPLER,
			DescriptorKind::StorageImage => DescriptorType::STORAGE_IMAGE,
		}
	}
}

impl Topology {
	pub fn to_ash_primitive_topology(&self) -> PrimitiveTopology {
		match self {
			Topology::PointList => PrimitiveTopology::POINT_LIST,
			Topology::LineList => PrimitiveTopology::LINE_LIST,
			Topology::LineStrip => PrimitiveTopology::LINE_STRIP,
			Topology::TriangleList => PrimitiveTopology::TRIANGLE_LIST,
			Topology::TriangleStrip => PrimitiveTopology::TRIANGLE_STRIP,
		}
	}
}

impl IndexType {
	pub fn to_ash_index_type(&self) -> ash::vk::IndexType {
		match self {
			IndexType::Uint16 => ash::vk::IndexType::UINT16,
			IndexType::Uint32 => ash::vk::IndexType::UINT32,
		}
	}
}

impl BindPoint {
	pub fn to_ash_pipeline_bind_point(&self) -> PipelineBindPoint {
		match self {
			BindPoint::Compute => PipelineBindPoint::COMPUTE,
			BindPoint::Graphics => PipelineBindPoint::GRAPHICS,
		}
	}
}

impl AccessScope {
	pub fn to_ash_stage_access(&self) -> (PipelineStageFlags2, AccessFlags2) {
		match self {
			AccessScope::Host => (
				PipelineStageFlags2::HOST,
				AccessFlags2::HOST_READ | AccessFlags2::HOST_WRITE,
			),
			AccessScope::Transfer => (
				PipelineStageFlags2::ALL_TRANSFER,
				AccessFlags2::TRANSFER_READ | AccessFlags2::TRANSFER_WRITE,
			),
			AccessScope::Shader => (
				PipelineStageFlags2::ALL_COMMANDS,
				AccessFlags2::SHADER_READ
					| AccessFlags2::SHADER_WRITE
					| AccessFlags2::VERTEX_ATTRIBUTE_READ
					| AccessFlags2::INDEX_READ
					| AccessFlags2::UNIFORM_READ
					| AccessFlags2::COLOR_ATTACHMENT_READ
					| AccessFlags2::COLOR_ATTACHMENT_WRITE,
			),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// our flag bits equal ash's so the conversions are free
	#[test]
	fn test_block_usage_to_ash_same_bits() {
		for usage in [
			BlockUsage::TRANSFER_SRC,
			BlockUsage::TRANSFER_DST,
			BlockUsage::UNIFORM_BUFFER,
			BlockUsage::STORAGE_BUFFER,
			BlockUsage::INDEX_BUFFER,
			BlockUsage::VERTEX_BUFFER,
		] {
			assert_eq!(
				Some(usage),
				BlockUsage::from_bits(usage.to_ash_buffer_usage_flags().as_raw())
			)
		}
	}

	#[test]
	fn test_image_usage_to_ash_same_bits() {
		assert_eq!(
			ImageUsage::TRANSFER_SRC.to_ash_image_usage_flags(),
			ImageUsageFlags::TRANSFER_SRC
		);
		assert_eq!(ImageUsage::SAMPLED.to_ash_image_usage_flags(), ImageUsageFlags::SAMPLED);
		assert_eq!(ImageUsage::STORAGE.to_ash_image_usage_flags(), ImageUsageFlags::STORAGE);
		assert_eq!(
			ImageUsage::COLOR_ATTACHMENT.to_ash_image_usage_flags(),
			ImageUsageFlags::COLOR_ATTACHMENT
		);
	}

	#[test]
	fn test_shader_stages_and_memory_flags_same_bits() {
		assert_eq!(ShaderStages::VERTEX.to_ash_shader_stage_flags(), ShaderStageFlags::VERTEX);
		assert_eq!(ShaderStages::FRAGMENT.to_ash_shader_stage_flags(), ShaderStageFlags::FRAGMENT);
		assert_eq!(ShaderStages::COMPUTE.to_ash_shader_stage_flags(), ShaderStageFlags::COMPUTE);
		assert_eq!(
			MemoryPropertyFlags::from_ash(
				ash::vk::MemoryPropertyFlags::HOST_VISIBLE | ash::vk::MemoryPropertyFlags::HOST_COHERENT
			),
			MemoryPropertyFlags::STAGING
		);
	}

	#[test]
	fn test_empty_block_usage_is_valid() {
		assert_eq!(
			BlockUsage::empty().to_ash_buffer_usage_flags(),
			BufferUsageFlags::TRANSFER_SRC
		);
	}
}
