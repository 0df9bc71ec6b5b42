use rangemap::RangeSet;
use std::ops::Range;

/// Byte ranges of a host view that were modified since the last upload. Touching or overlapping ranges coalesce.
#[derive(Clone, Debug, Default)]
pub struct DirtyRanges {
	range_set: RangeSet<u64>,
}

impl DirtyRanges {
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks `range` as modified. Empty ranges are ignored.
	pub fn insert(&mut self, range: Range<u64>) {
		if range.start < range.end {
			self.range_set.insert(range);
		}
	}

	pub fn is_empty(&self) -> bool {
		self.range_set.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Range<u64>> + '_ {
		self.range_set.iter()
	}

	/// Total number of dirty bytes.
	pub fn len_bytes(&self) -> u64 {
		self.range_set.iter().map(|r| r.end - r.start).sum()
	}

	pub fn clear(&mut self) {
		self.range_set.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_coalesce_adjacent_and_overlapping() {
		let mut dirty = DirtyRanges::new();
		dirty.insert(0..16);
		dirty.insert(16..32);
		dirty.insert(8..20);
		dirty.insert(64..80);
		assert_eq!(dirty.iter().cloned().collect::<Vec<_>>(), vec![0..32, 64..80]);
		assert_eq!(dirty.len_bytes(), 48);
	}

	#[test]
	fn test_empty_range_is_ignored() {
		let mut dirty = DirtyRanges::new();
		dirty.insert(5..5);
		assert!(dirty.is_empty());
	}
}
