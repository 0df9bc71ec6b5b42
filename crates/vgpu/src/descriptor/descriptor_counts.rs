use crate::descriptor::layout::DescriptorKind;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DescriptorCounts {
	pub uniform_buffers: u32,
	pub storage_buffers: u32,
	pub sampled_images: u32,
	pub storage_images: u32,
}

impl DescriptorCounts {
	pub const ZERO: Self = DescriptorCounts {
		uniform_buffers: 0,
		storage_buffers: 0,
		sampled_images: 0,
		storage_images: 0,
	};

	/// Per-set limits every Vulkan 1.3 device supports.
	pub const REQUIRED_MINIMUM: Self = DescriptorCounts {
		uniform_buffers: 72,
		storage_buffers: 24,
		sampled_images: 96,
		storage_images: 24,
	};

	pub fn get(&self, kind: DescriptorKind) -> u32 {
		match kind {
			DescriptorKind::UniformBuffer => self.uniform_buffers,
			DescriptorKind::StorageBuffer => self.storage_buffers,
			DescriptorKind::SampledImage => self.sampled_images,
			DescriptorKind::StorageImage => self.storage_images,
		}
	}

	pub fn add(&mut self, kind: DescriptorKind, count: u32) {
		let slot = match kind {
			DescriptorKind::UniformBuffer => &mut self.uniform_buffers,
			DescriptorKind::StorageBuffer => &mut self.storage_buffers,
			DescriptorKind::SampledImage => &mut self.sampled_images,
			DescriptorKind::StorageImage => &mut self.storage_images,
		};
		*slot = slot.saturating_add(count);
	}

	pub fn is_within_limit(&self, limit: Self) -> bool {
		// just to make sure this is updated as well
		let DescriptorCounts {
			uniform_buffers,
			storage_buffers,
			sampled_images,
			storage_images,
		} = *self;
		uniform_buffers <= limit.uniform_buffers
			&& storage_buffers <= limit.storage_buffers
			&& sampled_images <= limit.sampled_images
			&& storage_images <= limit.storage_images
	}

	pub fn min(self, other: Self) -> Self {
		Self {
			uniform_buffers: self.uniform_buffers.min(other.uniform_buffers),
			storage_buffers: self.storage_buffers.min(other.storage_buffers),
			sampled_images: self.sampled_images.min(other.sampled_images),
			storage_images: self.storage_images.min(other.storage_images),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_add_and_limit() {
		let mut counts = DescriptorCounts::ZERO;
		counts.add(DescriptorKind::StorageBuffer, 20);
		counts.add(DescriptorKind::SampledImage, 16);
		assert!(counts.is_within_limit(DescriptorCounts::REQUIRED_MINIMUM));
		counts.add(DescriptorKind::StorageBuffer, 5);
		assert_eq!(counts.get(DescriptorKind::StorageBuffer), 25);
		assert!(!counts.is_within_limit(DescriptorCounts::REQUIRED_MINIMUM));
	}

	#[test]
	fn test_min() {
		let a = DescriptorCounts {
			sampled_images: 16,
			..DescriptorCounts::REQUIRED_MINIMUM
		};
		assert_eq!(a.min(DescriptorCounts::REQUIRED_MINIMUM), a);
	}
}
