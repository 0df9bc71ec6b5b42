use crate::backing::align::ceil_div;
use crate::platform::GpuPlatform;

pub struct ComputePipelineDesc<P: GpuPlatform> {
	pub shader: P::Shader,
}

/// Number of workgroups of `group_size` needed to cover `threads` invocations in every dimension.
pub fn workgroups_for(threads: [u32; 3], group_size: [u32; 3]) -> [u32; 3] {
	[0, 1, 2].map(|i| ceil_div(threads[i], group_size[i].max(1)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_workgroups_round_up() {
		assert_eq!(workgroups_for([20, 1, 1], [64, 1, 1]), [1, 1, 1]);
		assert_eq!(workgroups_for([129, 7, 1], [64, 4, 1]), [3, 2, 1]);
		assert_eq!(workgroups_for([0, 1, 1], [64, 1, 1]), [0, 1, 1]);
	}
}
