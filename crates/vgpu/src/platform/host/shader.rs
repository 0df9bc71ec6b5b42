use crate::platform::host::memory::{HostImage, HostMemory};
use bytemuck::Pod;
use glam::{UVec2, UVec3, Vec2, Vec4};
use std::collections::HashMap;
use std::mem::size_of;
use std::sync::Arc;

/// A resource written into one element of a descriptor binding.
#[derive(Clone)]
pub(crate) enum HostResource {
	Buffer {
		memory: Arc<HostMemory>,
		offset: u64,
		range: u64,
	},
	Image(HostImage),
}

/// Contents of one descriptor set instance, keyed by `(binding, array_element)`.
pub(crate) type HostSet = HashMap<(u32, u32), HostResource>;

/// The descriptor sets bound when a dispatch or draw executes. Shaders address resources by
/// `(set, binding, array_element)`.
///
/// Accesses outside a resource behave like robust buffer access: reads return zero, writes are dropped.
#[derive(Default)]
pub struct HostBindings {
	sets: Vec<HostSet>,
}

impl HostBindings {
	pub(crate) fn new(sets: Vec<HostSet>) -> Self {
		Self { sets }
	}

	fn resource(&self, set: u32, binding: u32, array_element: u32) -> Option<&HostResource> {
		self.sets.get(set as usize)?.get(&(binding, array_element))
	}

	fn buffer(&self, set: u32, binding: u32, array_element: u32) -> Option<(&HostMemory, u64, u64)> {
		match self.resource(set, binding, array_element)? {
			HostResource::Buffer { memory, offset, range } => Some((memory, *offset, *range)),
			HostResource::Image(_) => None,
		}
	}

	fn image(&self, set: u32, binding: u32, array_element: u32) -> Option<&HostImage> {
		match self.resource(set, binding, array_element)? {
			HostResource::Image(image) => Some(image),
			HostResource::Buffer { .. } => None,
		}
	}

	/// Element `index` of the buffer bound at `binding`.
	pub fn read<T: Pod>(&self, set: u32, binding: u32, index: usize) -> T {
		self.read_at(set, binding, 0, index)
	}

	/// Element `index` of the buffer bound at `array_element` of a binding array.
	pub fn read_at<T: Pod>(&self, set: u32, binding: u32, array_element: u32, index: usize) -> T {
		let mut value = T::zeroed();
		if let Some((memory, offset, range)) = self.buffer(set, binding, array_element) {
			let at = (index * size_of::<T>()) as u64;
			if at + size_of::<T>() as u64 <= range && !memory.read(offset + at, bytemuck::bytes_of_mut(&mut value)) {
				value = T::zeroed();
			}
		}
		value
	}

	pub fn write<T: Pod>(&self, set: u32, binding: u32, index: usize, value: T) {
		self.write_at(set, binding, 0, index, value)
	}

	pub fn write_at<T: Pod>(&self, set: u32, binding: u32, array_element: u32, index: usize, value: T) {
		if let Some((memory, offset, range)) = self.buffer(set, binding, array_element) {
			let at = (index * size_of::<T>()) as u64;
			if at + size_of::<T>() as u64 <= range {
				memory.write(offset + at, bytemuck::bytes_of(&value));
			}
		}
	}

	/// Number of whole `T` in the buffer bound at `array_element` of `binding`, zero if nothing is bound.
	pub fn len<T: Pod>(&self, set: u32, binding: u32, array_element: u32) -> usize {
		self.buffer(set, binding, array_element)
			.map_or(0, |(_, _, range)| range as usize / size_of::<T>().max(1))
	}

	pub fn image_extent(&self, set: u32, binding: u32, array_element: u32) -> Option<UVec2> {
		self.image(set, binding, array_element)
			.map(|image| UVec2::from_array(image.extent()))
	}

	pub fn read_texel(&self, set: u32, binding: u32, array_element: u32, coord: UVec2) -> Vec4 {
		self.image(set, binding, array_element)
			.map_or(Vec4::ZERO, |image| image.0.read_texel(coord))
	}

	pub fn write_texel(&self, set: u32, binding: u32, array_element: u32, coord: UVec2, value: Vec4) {
		if let Some(image) = self.image(set, binding, array_element) {
			image.0.write_texel(coord, value);
		}
	}
}

pub struct ComputeInvocation<'a> {
	pub global_id: UVec3,
	pub local_id: UVec3,
	pub workgroup_id: UVec3,
	pub bindings: &'a HostBindings,
}

pub struct VertexInvocation<'a> {
	pub vertex_index: u32,
	/// One attribute per vertex input binding, widened to four components
	pub attributes: &'a [Vec4],
	pub bindings: &'a HostBindings,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VertexOutput {
	/// Clip space position
	pub position: Vec4,
	/// Interpolated across the primitive and handed to the fragment shader
	pub varying: Vec4,
}

pub struct FragmentInvocation<'a> {
	/// Pixel center in framebuffer coordinates
	pub frag_coord: Vec2,
	pub varying: Vec4,
	pub bindings: &'a HostBindings,
}

pub type ComputeFn = dyn Fn(&ComputeInvocation<'_>) + Send + Sync;
pub type VertexFn = dyn Fn(&VertexInvocation<'_>) -> VertexOutput + Send + Sync;
pub type FragmentFn = dyn Fn(&FragmentInvocation<'_>) -> Vec4 + Send + Sync;

/// A shader of the host platform: a closure invoked once per invocation.
#[derive(Clone)]
pub enum HostShader {
	Compute { local_size: [u32; 3], main: Arc<ComputeFn> },
	Vertex(Arc<VertexFn>),
	Fragment(Arc<FragmentFn>),
}

impl HostShader {
	pub fn compute(local_size: [u32; 3], main: impl Fn(&ComputeInvocation<'_>) + Send + Sync + 'static) -> Self {
		Self::Compute {
			local_size: local_size.map(|s| s.max(1)),
			main: Arc::new(main),
		}
	}

	pub fn vertex(main: impl Fn(&VertexInvocation<'_>) -> VertexOutput + Send + Sync + 'static) -> Self {
		Self::Vertex(Arc::new(main))
	}

	pub fn fragment(main: impl Fn(&FragmentInvocation<'_>) -> Vec4 + Send + Sync + 'static) -> Self {
		Self::Fragment(Arc::new(main))
	}

	pub fn kind(&self) -> &'static str {
		match self {
			HostShader::Compute { .. } => "compute",
			HostShader::Vertex(_) => "vertex",
			HostShader::Fragment(_) => "fragment",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bindings_robust_access() {
		let memory = Arc::new(HostMemory::new(64));
		let mut set = HostSet::new();
		set.insert(
			(1, 0),
			HostResource::Buffer {
				memory: memory.clone(),
				offset: 16,
				range: 32,
			},
		);
		let bindings = HostBindings::new(vec![set]);

		assert_eq!(bindings.len::<f32>(0, 1, 0), 8);
		bindings.write(0, 1, 7, 3.5f32);
		bindings.write(0, 1, 8, 9.0f32);
		assert_eq!(bindings.read::<f32>(0, 1, 7), 3.5);
		assert_eq!(bindings.read::<f32>(0, 1, 8), 0.);
		assert_eq!(bindings.read::<f32>(0, 2, 0), 0.);
		assert_eq!(bindings.read::<u32>(3, 1, 0), 0);

		let mut tail = [0u8; 4];
		assert!(memory.read(48, &mut tail));
		assert_eq!(tail, [0; 4]);
	}
}
