use crate::platform::GpuPlatform;
use crate::vars::types::{ElementType, ImageFormat};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Topology {
	PointList,
	LineList,
	LineStrip,
	#[default]
	TriangleList,
	TriangleStrip,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IndexType {
	Uint16,
	Uint32,
}

impl IndexType {
	pub fn from_element_type(ty: ElementType) -> Option<Self> {
		match ty {
			ElementType::Uint16 => Some(IndexType::Uint16),
			ElementType::Uint32 => Some(IndexType::Uint32),
			_ => None,
		}
	}
}

/// One vertex buffer binding with a single attribute at `location == binding`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VertexBinding {
	pub binding: u32,
	pub format: ElementType,
	pub stride: u32,
}

/// The vertex input state shared by every graphics pipeline of a System, derived from its vertex Vars.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct VertexInputLayout {
	pub bindings: Vec<VertexBinding>,
}

/// Shaders and fixed function state of a graphics pipeline.
pub struct GraphicsPipelineDesc<P: GpuPlatform> {
	pub vertex: P::Shader,
	pub fragment: P::Shader,
	pub topology: Topology,
}

pub struct GraphicsPipelineCreateInfo<'a, P: GpuPlatform> {
	pub name: &'a str,
	pub vertex: &'a P::Shader,
	pub fragment: &'a P::Shader,
	pub topology: Topology,
	pub vertex_input: &'a VertexInputLayout,
	pub color_format: ImageFormat,
}
