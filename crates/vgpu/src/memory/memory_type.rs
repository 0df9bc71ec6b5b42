use crate::descriptor::descriptor_counts::DescriptorCounts;

bitflags::bitflags! {
	/// Properties of a memory type. Bits equal ash's `MemoryPropertyFlags`.
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
	pub struct MemoryPropertyFlags: u32 {
		/// Fast to access from the device
		const DEVICE_LOCAL = 0b1;
		/// Can be mapped into host memory
		const HOST_VISIBLE = 0b10;
		/// Host writes are visible to the device without an explicit flush
		const HOST_COHERENT = 0b100;
		/// Host reads are cached
		const HOST_CACHED = 0b1000;
	}
}

impl MemoryPropertyFlags {
	/// The memory type used for staging blocks.
	pub const STAGING: Self = Self::HOST_VISIBLE.union(Self::HOST_COHERENT);

	#[inline]
	pub fn is_mappable(&self) -> bool {
		self.contains(MemoryPropertyFlags::HOST_VISIBLE)
	}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryType {
	pub flags: MemoryPropertyFlags,
	pub heap_index: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryHeap {
	pub size: u64,
	pub device_local: bool,
}

/// The memory type and heap table of a device.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryProperties {
	pub types: Vec<MemoryType>,
	pub heaps: Vec<MemoryHeap>,
}

impl MemoryProperties {
	/// Index of the first memory type that has at least all the requested `flags`.
	pub fn find_type(&self, flags: MemoryPropertyFlags) -> Option<u32> {
		self.types
			.iter()
			.position(|t| t.flags.contains(flags) && (t.heap_index as usize) < self.heaps.len())
			.map(|i| i as u32)
	}

	pub fn heap_of_type(&self, type_index: u32) -> Option<&MemoryHeap> {
		let ty = self.types.get(type_index as usize)?;
		self.heaps.get(ty.heap_index as usize)
	}

	pub fn largest_heap(&self) -> u64 {
		self.heaps.iter().map(|h| h.size).max().unwrap_or(0)
	}
}

/// Device limits relevant for resource layout and command validation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceLimits {
	pub max_compute_work_group_count: [u32; 3],
	pub min_uniform_buffer_offset_alignment: u64,
	pub min_storage_buffer_offset_alignment: u64,
	pub optimal_buffer_copy_offset_alignment: u64,
	pub max_bound_descriptor_sets: u32,
	pub max_image_dimension_2d: u32,
	/// Maximum number of descriptors of each kind in one descriptor set.
	pub descriptors_per_set: DescriptorCounts,
}

impl Default for DeviceLimits {
	/// The minimum guaranteed by a Vulkan 1.3 device.
	fn default() -> Self {
		Self {
			max_compute_work_group_count: [65535; 3],
			min_uniform_buffer_offset_alignment: 256,
			min_storage_buffer_offset_alignment: 256,
			optimal_buffer_copy_offset_alignment: 256,
			max_bound_descriptor_sets: 4,
			max_image_dimension_2d: 4096,
			descriptors_per_set: DescriptorCounts::REQUIRED_MINIMUM,
		}
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
	pub name: String,
	pub memory: MemoryProperties,
	pub limits: DeviceLimits,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn properties() -> MemoryProperties {
		MemoryProperties {
			types: vec![
				MemoryType {
					flags: MemoryPropertyFlags::DEVICE_LOCAL,
					heap_index: 0,
				},
				MemoryType {
					flags: MemoryPropertyFlags::STAGING,
					heap_index: 1,
				},
				MemoryType {
					flags: MemoryPropertyFlags::STAGING | MemoryPropertyFlags::HOST_CACHED,
					heap_index: 1,
				},
			],
			heaps: vec![
				MemoryHeap {
					size: 1 << 30,
					device_local: true,
				},
				MemoryHeap {
					size: 1 << 28,
					device_local: false,
				},
			],
		}
	}

	#[test]
	fn test_find_type_first_superset() {
		let props = properties();
		assert_eq!(props.find_type(MemoryPropertyFlags::DEVICE_LOCAL), Some(0));
		assert_eq!(props.find_type(MemoryPropertyFlags::HOST_VISIBLE), Some(1));
		assert_eq!(props.find_type(MemoryPropertyFlags::HOST_CACHED), Some(2));
		assert_eq!(
			props.find_type(MemoryPropertyFlags::DEVICE_LOCAL | MemoryPropertyFlags::HOST_VISIBLE),
			None
		);
	}

	#[test]
	fn test_heaps() {
		let props = properties();
		assert_eq!(props.largest_heap(), 1 << 30);
		assert_eq!(props.heap_of_type(2).map(|h| h.size), Some(1 << 28));
		assert_eq!(props.heap_of_type(7), None);
	}
}
