use crate::backing::range_set::DirtyRanges;
use crate::memory::image::ImageHandle;
use bytemuck::{Pod, PodCastError};
use glam::Vec4;
use std::fmt::{Display, Formatter};
use std::mem::size_of;
use std::ops::Range;

/// Identifies one Value: Set index, Var index within the Set and Value index within the Var.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ValueId {
	pub set: u32,
	pub var: u32,
	pub index: u32,
}

impl Display for ValueId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}[{}]", self.set, self.var, self.index)
	}
}

/// One buffered instance of a Var.
///
/// The host view of a Value lives in the staging block of its role's memory buffer at [`Self::offset`]. Writes
/// through a [`ValueViewMut`] are tracked as dirty byte ranges and uploaded on the next sync.
#[derive(Debug)]
pub struct Value {
	pub(crate) id: ValueId,
	pub(crate) size: u64,
	pub(crate) alloc_size: u64,
	pub(crate) offset: Option<u64>,
	pub(crate) image: Option<ImageHandle>,
	pub(crate) dirty: DirtyRanges,
}

impl Value {
	pub(crate) fn new(id: ValueId, size: u64) -> Self {
		Self {
			id,
			size,
			alloc_size: size,
			offset: None,
			image: None,
			dirty: DirtyRanges::new(),
		}
	}

	#[inline]
	pub fn id(&self) -> ValueId {
		self.id
	}

	/// Number of bytes the Value's elements occupy.
	#[inline]
	pub fn size(&self) -> u64 {
		self.size
	}

	/// Number of bytes reserved for the Value, [`Self::size`] rounded up to the alignment of the Var's role.
	#[inline]
	pub fn alloc_size(&self) -> u64 {
		self.alloc_size
	}

	/// Byte offset within the memory buffer of its role, `None` before the System was configured.
	#[inline]
	pub fn offset(&self) -> Option<u64> {
		self.offset
	}

	#[inline]
	pub fn image(&self) -> Option<ImageHandle> {
		self.image
	}

	#[inline]
	pub fn is_dirty(&self) -> bool {
		!self.dirty.is_empty()
	}

	pub fn dirty_ranges(&self) -> &DirtyRanges {
		&self.dirty
	}

	/// Records that `range` of the host view was modified. No data moves until the next sync.
	pub fn mark_dirty(&mut self, range: Range<u64>) {
		let end = range.end.min(self.size);
		self.dirty.insert(range.start.min(end)..end);
	}

	/// Marks the entire Value as modified.
	pub fn set_mod(&mut self) {
		self.dirty.insert(0..self.size);
	}

	pub(crate) fn byte_range(&self) -> Option<Range<usize>> {
		let offset = self.offset?;
		Some(offset as usize..(offset + self.size) as usize)
	}
}

/// Read access to the host view of a Value.
pub struct ValueView<'a> {
	value: &'a Value,
	bytes: &'a [u8],
}

impl<'a> ValueView<'a> {
	pub(crate) fn new(value: &'a Value, bytes: &'a [u8]) -> Self {
		Self { value, bytes }
	}

	pub fn value(&self) -> &Value {
		self.value
	}

	pub fn bytes(&self) -> &'a [u8] {
		self.bytes
	}

	/// Borrows the contents as `T`s, fails if the host view is not aligned for `T`.
	pub fn try_as_slice<T: Pod>(&self) -> Result<&'a [T], PodCastError> {
		bytemuck::try_cast_slice(self.bytes)
	}

	/// Copies the contents out as `T`s, regardless of alignment. Trailing bytes not forming a whole `T` are ignored.
	pub fn to_vec<T: Pod>(&self) -> Vec<T> {
		let whole = self.bytes.len() / size_of::<T>() * size_of::<T>();
		bytemuck::pod_collect_to_vec(&self.bytes[..whole])
	}

	pub fn floats32(&self) -> Vec<f32> {
		self.to_vec()
	}

	pub fn vec4s(&self) -> Vec<Vec4> {
		self.to_vec::<[f32; 4]>().into_iter().map(Vec4::from_array).collect()
	}
}

/// Write access to the host view of a Value. Every write marks the written bytes dirty.
pub struct ValueViewMut<'a> {
	value: &'a mut Value,
	bytes: &'a mut [u8],
}

impl<'a> ValueViewMut<'a> {
	pub(crate) fn new(value: &'a mut Value, bytes: &'a mut [u8]) -> Self {
		Self { value, bytes }
	}

	pub fn value(&self) -> &Value {
		self.value
	}

	pub fn bytes(&self) -> &[u8] {
		self.bytes
	}

	/// Mutable access to all bytes, conservatively marks the entire Value dirty.
	pub fn bytes_mut(&mut self) -> &mut [u8] {
		self.value.set_mod();
		self.bytes
	}

	/// Mutably borrows the contents as `T`s and marks the entire Value dirty. Fails if the host view is not aligned
	/// for `T`.
	pub fn try_as_mut_slice<T: Pod>(&mut self) -> Result<&mut [T], PodCastError> {
		let slice = bytemuck::try_cast_slice_mut(self.bytes)?;
		self.value.set_mod();
		Ok(slice)
	}

	/// Writes `data` starting at element `first` of `T` and marks exactly those bytes dirty. Returns the number of
	/// elements written, which is less than `data.len()` if the Value is too small.
	pub fn write<T: Pod>(&mut self, first: usize, data: &[T]) -> usize {
		let start = first.saturating_mul(size_of::<T>()).min(self.bytes.len());
		let fits = (self.bytes.len() - start) / size_of::<T>();
		let data = &data[..data.len().min(fits)];
		let src: &[u8] = bytemuck::cast_slice(data);
		let end = start + src.len();
		self.bytes[start..end].copy_from_slice(src);
		self.value.mark_dirty(start as u64..end as u64);
		data.len()
	}

	pub fn write_vec4s(&mut self, first: usize, data: &[Vec4]) -> usize {
		let arrays = data.iter().map(|v| v.to_array()).collect::<Vec<_>>();
		self.write(first, &arrays)
	}

	pub fn fill<T: Pod>(&mut self, pattern: T) {
		let count = self.bytes.len() / size_of::<T>();
		let data = vec![pattern; count];
		self.write(0, &data);
	}

	pub fn as_view(&self) -> ValueView<'_> {
		ValueView::new(self.value, self.bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn value(size: u64) -> Value {
		let mut value = Value::new(ValueId { set: 0, var: 0, index: 0 }, size);
		value.offset = Some(0);
		value
	}

	#[test]
	fn test_write_marks_exact_range() {
		let mut value = value(64);
		let mut bytes = vec![0u8; 64];
		let mut view = ValueViewMut::new(&mut value, &mut bytes);
		assert_eq!(view.write(2, &[1.0f32, 2.0]), 2);
		assert_eq!(value.dirty_ranges().iter().cloned().collect::<Vec<_>>(), vec![8..16]);
		assert_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[8..12]), 1.0);
	}

	#[test]
	fn test_write_truncates_at_end() {
		let mut value = value(16);
		let mut bytes = vec![0u8; 16];
		let mut view = ValueViewMut::new(&mut value, &mut bytes);
		assert_eq!(view.write(3, &[1u32, 2, 3]), 1);
		assert_eq!(view.write(9, &[1u32]), 0);
		assert_eq!(value.dirty_ranges().len_bytes(), 4);
	}

	#[test]
	fn test_vec4_views() {
		let mut value = value(32);
		let mut bytes = vec![0u8; 32];
		let mut view = ValueViewMut::new(&mut value, &mut bytes);
		view.write_vec4s(0, &[Vec4::new(1., 2., 3., 4.), Vec4::splat(5.)]);
		assert_eq!(
			view.as_view().vec4s(),
			vec![Vec4::new(1., 2., 3., 4.), Vec4::splat(5.)]
		);
		assert!(value.is_dirty());
	}

	#[test]
	fn test_mark_dirty_is_clipped_to_size() {
		let mut value = value(16);
		value.mark_dirty(8..100);
		value.mark_dirty(40..50);
		assert_eq!(value.dirty_ranges().iter().cloned().collect::<Vec<_>>(), vec![8..16]);
	}
}
