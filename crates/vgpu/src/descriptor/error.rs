use crate::descriptor::layout::DescriptorKind;
use crate::error::{ErrorClass, ErrorKind};
use crate::memory::MemoryError;
use crate::platform::GpuPlatform;
use crate::vars::VarsError;
use thiserror::Error;

#[derive(Error)]
pub enum DescriptorError<P: GpuPlatform> {
	#[error("{count} Sets declared but the device can only bind {max} descriptor sets at once")]
	TooManySets { count: u32, max: u32 },
	#[error("Set {set} needs {count} {kind:?} descriptors but the device allows {max} per set")]
	TooManyBindings {
		set: u32,
		kind: DescriptorKind,
		count: u32,
		max: u32,
	},
	#[error("Descriptor index {index} is out of range, there are {n_descs} descriptor set instances")]
	DescIndexOutOfRange { index: u32, n_descs: u32 },
	#[error("Descriptor set instance {index} is still in use by a pending execution")]
	InstanceInFlight { index: u32 },
	#[error("Set {set} is not a static Set")]
	NotStatic { set: u32 },
	#[error("Memory Error: {0}")]
	Memory(#[from] MemoryError<P>),
	#[error("Vars Error: {0}")]
	Vars(#[from] VarsError),
	#[error("Platform Error: {0}")]
	Platform(#[source] P::Error),
}

impl<P: GpuPlatform> core::fmt::Debug for DescriptorError<P> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

impl<P: GpuPlatform> ErrorClass for DescriptorError<P> {
	fn kind(&self) -> ErrorKind {
		match self {
			DescriptorError::TooManySets { .. } | DescriptorError::TooManyBindings { .. } => ErrorKind::ResourceExhaustion,
			DescriptorError::DescIndexOutOfRange { .. } | DescriptorError::InstanceInFlight { .. } => {
				ErrorKind::ValidationViolation
			}
			DescriptorError::NotStatic { .. } => ErrorKind::Configuration,
			DescriptorError::Memory(e) => e.kind(),
			DescriptorError::Vars(e) => e.kind(),
			DescriptorError::Platform(e) => P::error_kind(e),
		}
	}
}
