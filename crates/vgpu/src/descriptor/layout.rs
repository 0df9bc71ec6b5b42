use crate::platform::GpuPlatform;
use crate::vars::role::ShaderStages;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DescriptorKind {
	UniformBuffer,
	StorageBuffer,
	/// An image and its sampler
	SampledImage,
	StorageImage,
}

impl DescriptorKind {
	pub const fn is_image(&self) -> bool {
		matches!(self, DescriptorKind::SampledImage | DescriptorKind::StorageImage)
	}
}

/// One binding of a descriptor set layout. `count > 1` declares a binding array.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BindingLayout {
	pub binding: u32,
	pub kind: DescriptorKind,
	pub count: u32,
	pub stages: ShaderStages,
}

pub enum DescriptorResource<'a, P: GpuPlatform> {
	Buffer { block: &'a P::Block, offset: u64, range: u64 },
	Image { image: &'a P::Image },
}

impl<P: GpuPlatform> Clone for DescriptorResource<'_, P> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<P: GpuPlatform> Copy for DescriptorResource<'_, P> {}

/// Writes `resource` into one element of a binding of one descriptor set instance.
pub struct DescriptorWrite<'a, P: GpuPlatform> {
	pub binding: u32,
	pub array_element: u32,
	pub kind: DescriptorKind,
	pub resource: DescriptorResource<'a, P>,
}
