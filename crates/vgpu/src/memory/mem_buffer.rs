use crate::memory::block::{BlockHandle, BlockUsage};

/// The memory buffers of a System. Every Var role maps to exactly one of them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum BufferKind {
	Uniform,
	Storage,
	Vertex,
	Index,
	/// Staging for image Values, the device side are images
	Texel,
}

impl BufferKind {
	pub const COUNT: usize = 5;
	pub const ALL: [BufferKind; Self::COUNT] = [
		BufferKind::Uniform,
		BufferKind::Storage,
		BufferKind::Vertex,
		BufferKind::Index,
		BufferKind::Texel,
	];

	#[inline]
	pub const fn index(&self) -> usize {
		*self as usize
	}

	pub const fn name(&self) -> &'static str {
		match self {
			BufferKind::Uniform => "uniform",
			BufferKind::Storage => "storage",
			BufferKind::Vertex => "vertex",
			BufferKind::Index => "index",
			BufferKind::Texel => "texel",
		}
	}

	/// Whether Values of this kind have a device local block next to their staging block.
	#[inline]
	pub const fn has_device_block(&self) -> bool {
		!matches!(self, BufferKind::Texel)
	}

	pub fn device_usage(&self) -> BlockUsage {
		BlockUsage::TRANSFER
			| match self {
				BufferKind::Uniform => BlockUsage::UNIFORM_BUFFER,
				BufferKind::Storage => BlockUsage::STORAGE_BUFFER,
				BufferKind::Vertex => BlockUsage::VERTEX_BUFFER,
				BufferKind::Index => BlockUsage::INDEX_BUFFER,
				BufferKind::Texel => BlockUsage::empty(),
			}
	}
}

/// The blocks backing one [`BufferKind`]: a host visible staging block holding the host views of all Values, and a
/// device local block the shaders access. Both use the same offsets.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemBuffer {
	pub size: u64,
	pub host: Option<BlockHandle>,
	pub device: Option<BlockHandle>,
}
