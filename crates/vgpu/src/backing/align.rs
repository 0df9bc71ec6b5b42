/// Rounds `value` up to the next multiple of `align`. An `align` of 0 or 1 leaves `value` unchanged.
#[inline]
pub const fn align_up(value: u64, align: u64) -> u64 {
	if align <= 1 {
		value
	} else {
		value.div_ceil(align) * align
	}
}

/// [`align_up`] returning `None` if the rounded value does not fit into a `u64`.
#[inline]
pub const fn checked_align_up(value: u64, align: u64) -> Option<u64> {
	if align <= 1 {
		Some(value)
	} else {
		value.div_ceil(align).checked_mul(align)
	}
}

#[inline]
pub const fn ceil_div(value: u32, divisor: u32) -> u32 {
	value.div_ceil(divisor)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_align_up() {
		assert_eq!(align_up(0, 256), 0);
		assert_eq!(align_up(1, 256), 256);
		assert_eq!(align_up(256, 256), 256);
		assert_eq!(align_up(257, 256), 512);
		assert_eq!(align_up(13, 0), 13);
		assert_eq!(align_up(13, 1), 13);
	}

	#[test]
	fn test_checked_align_up_overflow() {
		assert_eq!(checked_align_up(257, 256), Some(512));
		assert_eq!(checked_align_up(u64::MAX, 1), Some(u64::MAX));
		assert_eq!(checked_align_up(u64::MAX - 100, 256), None);
		assert_eq!(checked_align_up(u64::MAX - 255, 256), Some(u64::MAX - 255));
	}

	#[test]
	fn test_ceil_div() {
		assert_eq!(ceil_div(20, 64), 1);
		assert_eq!(ceil_div(64, 64), 1);
		assert_eq!(ceil_div(65, 64), 2);
	}
}
