use std::fmt::{Display, Formatter};

/// The broad category of every error this crate reports. Callers usually only need to distinguish these four.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
	/// Bad declarations or calls in the wrong phase: duplicate names, invalid roles, zero value counts, use before
	/// configuration.
	Configuration,
	/// The device cannot satisfy a request for memory or descriptors.
	ResourceExhaustion,
	/// A request that would be undefined behaviour on the device, rejected before anything was recorded or submitted.
	ValidationViolation,
	/// The device failed. The affected [`System`](crate::system::System) can not be used any further.
	DeviceFatal,
}

impl ErrorKind {
	pub fn is_fatal(&self) -> bool {
		matches!(self, ErrorKind::DeviceFatal)
	}
}

impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			ErrorKind::Configuration => "configuration error",
			ErrorKind::ResourceExhaustion => "resource exhaustion",
			ErrorKind::ValidationViolation => "validation violation",
			ErrorKind::DeviceFatal => "fatal device error",
		};
		f.write_str(name)
	}
}

pub trait ErrorClass {
	fn kind(&self) -> ErrorKind;
}
