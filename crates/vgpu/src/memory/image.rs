use crate::vars::types::ImageFormat;
use std::fmt::{Display, Formatter};

bitflags::bitflags! {
	/// Image usage specify how an image may be used. Bits equal ash's `ImageUsageFlags`.
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
	pub struct ImageUsage: u32 {
		const TRANSFER_SRC = 0b1;
		const TRANSFER_DST = 0b10;
		const SAMPLED = 0b100;
		const STORAGE = 0b1000;
		const COLOR_ATTACHMENT = 0b1_0000;
	}
}

/// Index of a device image owned by a [`Memory`](crate::memory::Memory).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ImageHandle(pub(crate) u32);

impl ImageHandle {
	pub fn index(&self) -> usize {
		self.0 as usize
	}
}

impl Display for ImageHandle {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Image#{}", self.0)
	}
}

/// A two dimensional, single mip, single layer image.
#[derive(Copy, Clone, Debug)]
pub struct ImageCreateInfo<'a> {
	/// Name of the image, for debug purposes only
	pub name: &'a str,
	pub format: ImageFormat,
	pub extent: [u32; 2],
	pub usage: ImageUsage,
}

impl ImageCreateInfo<'_> {
	/// Bytes of a tightly packed copy of the whole image.
	pub fn byte_size(&self) -> u64 {
		self.extent[0] as u64 * self.extent[1] as u64 * self.format.texel_size()
	}
}
