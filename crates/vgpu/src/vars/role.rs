use crate::backing::align::align_up;
use crate::descriptor::layout::DescriptorKind;
use crate::memory::mem_buffer::BufferKind;
use crate::memory::memory_type::DeviceLimits;
use crate::vars::types::ElementType;

bitflags::bitflags! {
	/// Shader stages accessing a Var. Bits equal ash's `ShaderStageFlags`.
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
	pub struct ShaderStages: u32 {
		const VERTEX = 0b1;
		const FRAGMENT = 0b1_0000;
		const COMPUTE = 0b10_0000;
	}
}

impl ShaderStages {
	pub const ALL_GRAPHICS: Self = Self::VERTEX.union(Self::FRAGMENT);
}

/// How shaders see a Var. The role decides alignment, which memory buffer backs the Values and how they are bound.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VarRole {
	/// Read-only uniform block
	Uniform,
	/// Read-write storage block
	Storage,
	/// Read-only image sampled through a sampler
	SampledImage,
	/// Read-write image
	StorageImage,
	/// Per-vertex input, bound as a vertex buffer
	Vertex,
	/// Index input, bound as an index buffer
	Index,
}

impl VarRole {
	pub const fn descriptor_kind(&self) -> Option<DescriptorKind> {
		match self {
			VarRole::Uniform => Some(DescriptorKind::UniformBuffer),
			VarRole::Storage => Some(DescriptorKind::StorageBuffer),
			VarRole::SampledImage => Some(DescriptorKind::SampledImage),
			VarRole::StorageImage => Some(DescriptorKind::StorageImage),
			VarRole::Vertex | VarRole::Index => None,
		}
	}

	pub const fn buffer_kind(&self) -> BufferKind {
		match self {
			VarRole::Uniform => BufferKind::Uniform,
			VarRole::Storage => BufferKind::Storage,
			VarRole::SampledImage | VarRole::StorageImage => BufferKind::Texel,
			VarRole::Vertex => BufferKind::Vertex,
			VarRole::Index => BufferKind::Index,
		}
	}

	pub const fn is_image(&self) -> bool {
		matches!(self, VarRole::SampledImage | VarRole::StorageImage)
	}

	/// Shaders may write Values of this role.
	pub const fn is_writable(&self) -> bool {
		matches!(self, VarRole::Storage | VarRole::StorageImage)
	}

	pub fn accepts(&self, ty: ElementType) -> bool {
		match self {
			VarRole::Uniform | VarRole::Storage => !ty.is_texel(),
			VarRole::SampledImage | VarRole::StorageImage => ty.is_texel(),
			VarRole::Vertex => ty.is_vertex_attribute(),
			VarRole::Index => matches!(ty, ElementType::Uint16 | ElementType::Uint32),
		}
	}

	/// Alignment of the start of every Value of this role within its memory buffer.
	pub fn alignment(&self, ty: ElementType, limits: &DeviceLimits) -> u64 {
		match self {
			VarRole::Uniform => limits.min_uniform_buffer_offset_alignment.max(16),
			VarRole::Storage => limits.min_storage_buffer_offset_alignment.max(16),
			VarRole::SampledImage | VarRole::StorageImage => {
				limits.optimal_buffer_copy_offset_alignment.max(ty.size()).max(4)
			}
			VarRole::Vertex | VarRole::Index => ty.size().max(4),
		}
	}

	/// The byte extent reserved for a Value: `count` elements rounded up to the role's alignment.
	pub fn alloc_size(&self, ty: ElementType, count: u64, limits: &DeviceLimits) -> u64 {
		align_up(count * ty.size(), self.alignment(ty, limits))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vars::types::ImageFormat;

	#[test]
	fn test_role_accepts() {
		assert!(VarRole::Storage.accepts(ElementType::Float32Vector4));
		assert!(!VarRole::Storage.accepts(ElementType::Texel(ImageFormat::Rgba8Unorm)));
		assert!(VarRole::SampledImage.accepts(ElementType::Texel(ImageFormat::Rgba8Unorm)));
		assert!(!VarRole::StorageImage.accepts(ElementType::Float32));
		assert!(VarRole::Index.accepts(ElementType::Uint16));
		assert!(!VarRole::Index.accepts(ElementType::Int32));
		assert!(!VarRole::Vertex.accepts(ElementType::Float32Matrix4));
	}

	#[test]
	fn test_alloc_size_rounds_to_alignment() {
		let limits = DeviceLimits::default();
		assert_eq!(VarRole::Storage.alloc_size(ElementType::Float32Vector4, 64, &limits), 1024);
		assert_eq!(VarRole::Uniform.alloc_size(ElementType::Float32, 3, &limits), 256);
		assert_eq!(VarRole::Vertex.alloc_size(ElementType::Float32Vector3, 3, &limits), 36);
		assert_eq!(VarRole::Index.alloc_size(ElementType::Uint16, 3, &limits), 8);
	}
}
