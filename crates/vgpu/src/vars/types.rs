use std::fmt::{Display, Formatter};

/// Texel format of an image Var.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ImageFormat {
	Rgba8Unorm,
	Rgba8Srgb,
	Bgra8Unorm,
	R32Float,
	Rgba32Float,
}

impl ImageFormat {
	pub const fn texel_size(&self) -> u64 {
		match self {
			ImageFormat::Rgba8Unorm | ImageFormat::Rgba8Srgb | ImageFormat::Bgra8Unorm | ImageFormat::R32Float => 4,
			ImageFormat::Rgba32Float => 16,
		}
	}
}

/// The element type of a Var. Every variant has a fixed byte width.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ElementType {
	Uint16,
	Int32,
	Uint32,
	Float32,
	Int32Vector2,
	Int32Vector4,
	Uint32Vector2,
	Uint32Vector4,
	Float32Vector2,
	Float32Vector3,
	Float32Vector4,
	Float32Matrix4,
	/// One texel of an image
	Texel(ImageFormat),
}

impl ElementType {
	pub const fn size(&self) -> u64 {
		match self {
			ElementType::Uint16 => 2,
			ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
			ElementType::Int32Vector2 | ElementType::Uint32Vector2 | ElementType::Float32Vector2 => 8,
			ElementType::Float32Vector3 => 12,
			ElementType::Int32Vector4 | ElementType::Uint32Vector4 | ElementType::Float32Vector4 => 16,
			ElementType::Float32Matrix4 => 64,
			ElementType::Texel(format) => format.texel_size(),
		}
	}

	pub const fn is_texel(&self) -> bool {
		matches!(self, ElementType::Texel(_))
	}

	/// Whether fixed-function vertex fetch can read this type as a single attribute.
	pub const fn is_vertex_attribute(&self) -> bool {
		!matches!(self, ElementType::Texel(_) | ElementType::Float32Matrix4)
	}
}

impl Display for ElementType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ElementType::Texel(format) => write!(f, "Texel({format:?})"),
			other => std::fmt::Debug::fmt(other, f),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sizes() {
		assert_eq!(ElementType::Float32Vector4.size(), 16);
		assert_eq!(ElementType::Float32Vector3.size(), 12);
		assert_eq!(ElementType::Float32Matrix4.size(), 64);
		assert_eq!(ElementType::Uint16.size(), 2);
		assert_eq!(ElementType::Texel(ImageFormat::Rgba8Srgb).size(), 4);
		assert_eq!(ElementType::Texel(ImageFormat::Rgba32Float).size(), 16);
	}
}
