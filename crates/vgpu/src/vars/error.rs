use crate::error::{ErrorClass, ErrorKind};
use crate::vars::role::VarRole;
use crate::vars::types::ElementType;
use thiserror::Error;

#[derive(Error)]
pub enum VarsError {
	#[error("Set {set} already has a Var named {name:?}")]
	DuplicateName { set: u32, name: String },
	#[error("Var {name:?} can not have role {role:?} with element type {ty}")]
	InvalidRole { name: String, role: VarRole, ty: ElementType },
	#[error("Var {name:?} must have at least one element")]
	ZeroCount { name: String },
	#[error("Var {name:?} with {count} elements exceeds the maximum Value size of {max} bytes")]
	TooLarge { name: String, count: u64, max: u64 },
	#[error("Image Var {name:?} has invalid extent {extent:?}, must be within 1..={max}")]
	InvalidExtent { name: String, extent: [u32; 2], max: u32 },
	#[error("Set {set} must be configured with at least one Value per Var")]
	ZeroValues { set: u32 },
	#[error("Set {set} can not be changed after the System was configured")]
	AlreadyConfigured { set: u32 },
	#[error("There is no Set {0}")]
	UnknownSet(u32),
	#[error("Set {set} has no Var named {name:?}")]
	UnknownVar { set: u32, name: String },
	#[error("Value index {index} out of range for Var {name:?} of Set {set} with {len} Values")]
	IndexOutOfRange { set: u32, name: String, index: u32, len: u32 },
	#[error("Var {name:?} has role {role:?}, expected {expected}")]
	WrongRole {
		name: String,
		role: VarRole,
		expected: &'static str,
	},
	#[error("Set {set} is a static Set, dynamic Value binding is not possible")]
	NotDynamic { set: u32 },
}

impl core::fmt::Debug for VarsError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

impl ErrorClass for VarsError {
	fn kind(&self) -> ErrorKind {
		match self {
			VarsError::WrongRole { .. } => ErrorKind::ValidationViolation,
			VarsError::TooLarge { .. } => ErrorKind::ResourceExhaustion,
			_ => ErrorKind::Configuration,
		}
	}
}
