use crate::memory::block::BlockUsage;
use crate::memory::image::ImageUsage;
use crate::vars::types::ImageFormat;
use glam::{UVec2, Vec4};
use std::cell::UnsafeCell;
use std::sync::Arc;

/// Zero initialized, 16 byte aligned memory shared by a block or image and every command referencing it.
pub struct HostMemory {
	words: Box<[UnsafeCell<u128>]>,
	len: usize,
}

// Safety: like device memory, accesses are synchronized externally through fences and barriers
unsafe impl Sync for HostMemory {}
unsafe impl Send for HostMemory {}

impl HostMemory {
	pub fn new(len: usize) -> Self {
		let words = (0..len.div_ceil(16)).map(|_| UnsafeCell::new(0)).collect();
		Self { words, len }
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn as_ptr(&self) -> *mut u8 {
		UnsafeCell::raw_get(self.words.as_ptr()).cast()
	}

	fn in_bounds(&self, offset: u64, len: usize) -> bool {
		offset
			.checked_add(len as u64)
			.is_some_and(|end| end <= self.len as u64)
	}

	/// Copies `out.len()` bytes starting at `offset` into `out`. Returns false and leaves `out` untouched if the range
	/// is out of bounds.
	pub fn read(&self, offset: u64, out: &mut [u8]) -> bool {
		if !self.in_bounds(offset, out.len()) {
			return false;
		}
		unsafe { std::ptr::copy(self.as_ptr().add(offset as usize), out.as_mut_ptr(), out.len()) };
		true
	}

	/// Copies `data` to `offset`. Returns false and writes nothing if the range is out of bounds.
	pub fn write(&self, offset: u64, data: &[u8]) -> bool {
		if !self.in_bounds(offset, data.len()) {
			return false;
		}
		unsafe { std::ptr::copy(data.as_ptr(), self.as_ptr().add(offset as usize), data.len()) };
		true
	}

	pub fn fill(&self, value: u8) {
		unsafe { std::ptr::write_bytes(self.as_ptr(), value, self.len) };
	}

	/// Copies `len` bytes between two memories, which may be the same.
	pub fn copy(src: &HostMemory, src_offset: u64, dst: &HostMemory, dst_offset: u64, len: u64) -> bool {
		if !src.in_bounds(src_offset, len as usize) || !dst.in_bounds(dst_offset, len as usize) {
			return false;
		}
		unsafe {
			std::ptr::copy(
				src.as_ptr().add(src_offset as usize),
				dst.as_ptr().add(dst_offset as usize),
				len as usize,
			)
		};
		true
	}
}

pub struct HostBlock {
	pub(crate) memory: Arc<HostMemory>,
	pub(crate) usage: BlockUsage,
	pub(crate) heap: u32,
	pub(crate) mappable: bool,
}

impl HostBlock {
	pub fn memory(&self) -> &Arc<HostMemory> {
		&self.memory
	}

	pub fn usage(&self) -> BlockUsage {
		self.usage
	}
}

unsafe impl presser::Slab for HostBlock {
	fn base_ptr(&self) -> *const u8 {
		self.memory.as_ptr()
	}

	fn base_ptr_mut(&mut self) -> *mut u8 {
		self.memory.as_ptr()
	}

	fn size(&self) -> usize {
		self.memory.len()
	}
}

pub struct HostImageData {
	pub(crate) memory: HostMemory,
	pub(crate) format: ImageFormat,
	pub(crate) extent: [u32; 2],
	pub(crate) usage: ImageUsage,
}

impl HostImageData {
	fn texel_offset(&self, coord: UVec2) -> Option<u64> {
		if coord.x >= self.extent[0] || coord.y >= self.extent[1] {
			return None;
		}
		let texel = coord.y as u64 * self.extent[0] as u64 + coord.x as u64;
		Some(texel * self.format.texel_size())
	}

	/// Texel at `coord` as normalized floats, zero outside the image.
	pub fn read_texel(&self, coord: UVec2) -> Vec4 {
		let mut bytes = [0u8; 16];
		let size = self.format.texel_size() as usize;
		match self.texel_offset(coord) {
			Some(offset) if self.memory.read(offset, &mut bytes[..size]) => decode_texel(self.format, &bytes[..size]),
			_ => Vec4::ZERO,
		}
	}

	/// Writes a texel, writes outside the image are dropped.
	pub fn write_texel(&self, coord: UVec2, value: Vec4) {
		if let Some(offset) = self.texel_offset(coord) {
			let (bytes, len) = encode_texel(self.format, value);
			self.memory.write(offset, &bytes[..len]);
		}
	}

	pub fn clear(&self, value: Vec4) {
		let (bytes, len) = encode_texel(self.format, value);
		for texel in 0..self.extent[0] as u64 * self.extent[1] as u64 {
			self.memory.write(texel * len as u64, &bytes[..len]);
		}
	}
}

/// A 2D image, cheap to clone into recorded commands and descriptors.
#[derive(Clone)]
pub struct HostImage(pub(crate) Arc<HostImageData>);

impl HostImage {
	pub fn format(&self) -> ImageFormat {
		self.0.format
	}

	pub fn extent(&self) -> [u32; 2] {
		self.0.extent
	}
}

fn unorm8(value: f32) -> u8 {
	(value.clamp(0., 1.) * 255. + 0.5) as u8
}

/// Encodes a texel into the first `len` bytes of the returned array. Srgb formats store the value without conversion.
pub fn encode_texel(format: ImageFormat, value: Vec4) -> ([u8; 16], usize) {
	let mut out = [0u8; 16];
	let len = format.texel_size() as usize;
	match format {
		ImageFormat::Rgba8Unorm | ImageFormat::Rgba8Srgb => {
			for (o, v) in out.iter_mut().zip(value.to_array()) {
				*o = unorm8(v);
			}
		}
		ImageFormat::Bgra8Unorm => {
			for (o, v) in out.iter_mut().zip([value.z, value.y, value.x, value.w]) {
				*o = unorm8(v);
			}
		}
		ImageFormat::R32Float => out[..4].copy_from_slice(&value.x.to_le_bytes()),
		ImageFormat::Rgba32Float => out.copy_from_slice(bytemuck::bytes_of(&value.to_array())),
	}
	(out, len)
}

pub fn decode_texel(format: ImageFormat, bytes: &[u8]) -> Vec4 {
	let unorm = |i: usize| bytes[i] as f32 / 255.;
	match format {
		ImageFormat::Rgba8Unorm | ImageFormat::Rgba8Srgb => Vec4::new(unorm(0), unorm(1), unorm(2), unorm(3)),
		ImageFormat::Bgra8Unorm => Vec4::new(unorm(2), unorm(1), unorm(0), unorm(3)),
		ImageFormat::R32Float => Vec4::new(bytemuck::pod_read_unaligned::<f32>(&bytes[..4]), 0., 0., 1.),
		ImageFormat::Rgba32Float => Vec4::from_array(bytemuck::pod_read_unaligned::<[f32; 4]>(&bytes[..16])),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bounds() {
		let memory = HostMemory::new(20);
		assert!(memory.write(16, &[1, 2, 3, 4]));
		assert!(!memory.write(17, &[1, 2, 3, 4]));
		let mut out = [0u8; 4];
		assert!(memory.read(16, &mut out));
		assert_eq!(out, [1, 2, 3, 4]);
		assert!(!memory.read(u64::MAX, &mut out));
	}

	#[test]
	fn test_texel_encoding() {
		let (bytes, len) = encode_texel(ImageFormat::Bgra8Unorm, Vec4::new(1., 0.5, 0., 1.));
		assert_eq!(&bytes[..len], &[0, 128, 255, 255]);
		let decoded = decode_texel(ImageFormat::Bgra8Unorm, &bytes[..len]);
		approx::assert_relative_eq!(decoded.x, 1.);
		approx::assert_relative_eq!(decoded.y, 128. / 255.);

		let (bytes, len) = encode_texel(ImageFormat::R32Float, Vec4::new(2.5, 9., 9., 9.));
		assert_eq!(len, 4);
		assert_eq!(decode_texel(ImageFormat::R32Float, &bytes[..len]), Vec4::new(2.5, 0., 0., 1.));
	}

	#[test]
	fn test_image_texels() {
		let image = HostImageData {
			memory: HostMemory::new(4 * 4 * 4),
			format: ImageFormat::Rgba8Unorm,
			extent: [4, 4],
			usage: ImageUsage::STORAGE,
		};
		image.clear(Vec4::new(0., 0., 1., 1.));
		image.write_texel(UVec2::new(3, 1), Vec4::ONE);
		image.write_texel(UVec2::new(4, 1), Vec4::ONE);
		assert_eq!(image.read_texel(UVec2::new(3, 1)), Vec4::ONE);
		assert_eq!(image.read_texel(UVec2::new(0, 0)), Vec4::new(0., 0., 1., 1.));
		assert_eq!(image.read_texel(UVec2::new(9, 9)), Vec4::ZERO);
	}
}
