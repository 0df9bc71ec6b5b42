use crate::memory::memory_type::MemoryPropertyFlags;
use crate::platform::GpuPlatform;
use std::fmt::{Display, Formatter};
use std::ptr::NonNull;

bitflags::bitflags! {
	/// Block usage specify how a memory block may be used. Bits equal ash's `BufferUsageFlags`.
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
	pub struct BlockUsage: u32 {
		/// Can be used as a source of transfer operations
		const TRANSFER_SRC = 0b1;
		/// Can be used as a destination of transfer operations
		const TRANSFER_DST = 0b10;
		/// Can be used as uniform buffer
		const UNIFORM_BUFFER = 0b1_0000;
		/// Can be used as storage buffer
		const STORAGE_BUFFER = 0b10_0000;
		/// Can be used as source of fixed-function index fetch (index buffer)
		const INDEX_BUFFER = 0b100_0000;
		/// Can be used as source of fixed-function vertex fetch (VBO)
		const VERTEX_BUFFER = 0b1000_0000;
	}
}

impl BlockUsage {
	pub const TRANSFER: Self = Self::TRANSFER_SRC.union(Self::TRANSFER_DST);
}

/// Index of a block owned by a [`Memory`](crate::memory::Memory).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BlockHandle(pub(crate) u32);

impl BlockHandle {
	pub fn index(&self) -> usize {
		self.0 as usize
	}
}

impl Display for BlockHandle {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Block#{}", self.0)
	}
}

#[derive(Copy, Clone, Debug)]
pub struct BlockCreateInfo<'a> {
	/// Name of the block, for debug purposes only
	pub name: &'a str,
	pub size: u64,
	pub usage: BlockUsage,
	pub memory_type: MemoryPropertyFlags,
}

/// One region of a block to block copy.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CopyRegion {
	pub src_offset: u64,
	pub dst_offset: u64,
	pub size: u64,
}

impl CopyRegion {
	/// Copies `range` to the same offsets in the destination.
	pub fn same_offset(range: std::ops::Range<u64>) -> Self {
		Self {
			src_offset: range.start,
			dst_offset: range.start,
			size: range.end - range.start,
		}
	}
}

/// A live allocation together with the bookkeeping needed to validate accesses and account heap usage.
pub struct MemoryBlock<P: GpuPlatform> {
	pub(crate) block: P::Block,
	pub name: String,
	pub size: u64,
	pub memory_type: MemoryPropertyFlags,
	pub type_index: u32,
	pub heap_index: u32,
	/// Start of the persistent host mapping, `None` if not host visible
	pub(crate) mapped: Option<NonNull<u8>>,
}

// Safety: `mapped` points into the allocation of `block` and moves with it
unsafe impl<P: GpuPlatform> Send for MemoryBlock<P> where P::Block: Send {}
unsafe impl<P: GpuPlatform> Sync for MemoryBlock<P> where P::Block: Sync {}

impl<P: GpuPlatform> MemoryBlock<P> {
	pub fn platform_block(&self) -> &P::Block {
		&self.block
	}

	pub fn is_mappable(&self) -> bool {
		self.mapped.is_some()
	}
}
