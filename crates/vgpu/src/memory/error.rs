use crate::error::{ErrorClass, ErrorKind};
use crate::memory::block::BlockHandle;
use crate::memory::image::ImageHandle;
use crate::memory::memory_type::MemoryPropertyFlags;
use crate::platform::GpuPlatform;
use crate::vars::{ValueId, VarsError};
use thiserror::Error;

#[derive(Error)]
pub enum MemoryError<P: GpuPlatform> {
	#[error("Allocating {requested} bytes for {name:?} exceeds the {available} bytes left in its memory heap")]
	OutOfMemory { name: String, requested: u64, available: u64 },
	#[error("No memory type supports {0:?}")]
	UnsupportedMemoryType(MemoryPropertyFlags),
	#[error("{0} is not host visible and can not be mapped")]
	NotMappable(BlockHandle),
	#[error("{0} does not exist")]
	InvalidBlock(BlockHandle),
	#[error("{0} does not exist")]
	InvalidImage(ImageHandle),
	#[error("Range of {len} bytes at offset {offset} is out of bounds of {size} bytes")]
	RangeOutOfBounds { offset: u64, len: u64, size: u64 },
	#[error("Value {0} has no memory yet, configure the System first")]
	NotAllocated(ValueId),
	#[error("Value {0} may still be written by a pending execution, wait for it first")]
	PendingExecution(ValueId),
	#[error("Vars Error: {0}")]
	Vars(#[from] VarsError),
	#[error("Platform Error: {0}")]
	Platform(#[source] P::Error),
}

impl<P: GpuPlatform> core::fmt::Debug for MemoryError<P> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

impl<P: GpuPlatform> ErrorClass for MemoryError<P> {
	fn kind(&self) -> ErrorKind {
		match self {
			MemoryError::OutOfMemory { .. } | MemoryError::UnsupportedMemoryType(_) => ErrorKind::ResourceExhaustion,
			MemoryError::NotMappable(_)
			| MemoryError::InvalidBlock(_)
			| MemoryError::InvalidImage(_)
			| MemoryError::RangeOutOfBounds { .. }
			| MemoryError::PendingExecution(_) => ErrorKind::ValidationViolation,
			MemoryError::NotAllocated(_) => ErrorKind::Configuration,
			MemoryError::Vars(e) => e.kind(),
			MemoryError::Platform(e) => P::error_kind(e),
		}
	}
}
