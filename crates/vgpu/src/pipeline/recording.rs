use crate::error::{ErrorClass, ErrorKind};
use crate::pipeline::pipelines::PipelineId;
use crate::pipeline::stage::BindPoint;
use crate::platform::GpuPlatform;
use crate::vars::ValueId;
use smallvec::SmallVec;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use thiserror::Error;

/// A command buffer being recorded, borrowed from a [`System`](crate::system::System).
///
/// Recording happens through the System's `compute_*` and draw methods. A `CmdBuff` that is dropped without being
/// submitted frees its command buffer.
pub struct CmdBuff<P: GpuPlatform> {
	pub(crate) cmd: Option<P::CommandBuffer>,
	pub(crate) bind_point: BindPoint,
	pub(crate) generation: u64,
	pub(crate) ended: bool,
	pub(crate) rendering: bool,
	/// Descriptor set instances bound by this command buffer
	pub(crate) bound_descs: SmallVec<[u32; 4]>,
	/// Vertex and index Values fetched by draws
	pub(crate) fetched: Vec<ValueId>,
	pub(crate) dispatches: u32,
	platform: Arc<P>,
	open: Arc<AtomicU32>,
}

impl<P: GpuPlatform> CmdBuff<P> {
	pub(crate) fn new(
		platform: Arc<P>,
		cmd: P::CommandBuffer,
		bind_point: BindPoint,
		generation: u64,
		open: Arc<AtomicU32>,
	) -> Self {
		open.fetch_add(1, Relaxed);
		Self {
			cmd: Some(cmd),
			bind_point,
			generation,
			ended: false,
			rendering: false,
			bound_descs: SmallVec::new(),
			fetched: Vec::new(),
			dispatches: 0,
			platform,
			open,
		}
	}

	#[inline]
	pub fn bind_point(&self) -> BindPoint {
		self.bind_point
	}

	#[inline]
	pub fn is_ended(&self) -> bool {
		self.ended
	}

	/// The System configuration this command buffer was recorded against.
	#[inline]
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Number of dispatches and draws recorded.
	#[inline]
	pub fn commands(&self) -> u32 {
		self.dispatches
	}

	pub fn bound_descs(&self) -> &[u32] {
		&self.bound_descs
	}

	pub(crate) fn take(&mut self) -> Option<P::CommandBuffer> {
		self.cmd.take()
	}
}

impl<P: GpuPlatform> Drop for CmdBuff<P> {
	fn drop(&mut self) {
		if let Some(cmd) = self.cmd.take() {
			unsafe { self.platform.free_command_buffer(cmd) };
		}
		self.open.fetch_sub(1, Relaxed);
	}
}

/// Checks group counts against the device's `max_compute_work_group_count`.
pub fn validate_dispatch<P: GpuPlatform>(groups: [u32; 3], max: [u32; 3]) -> Result<(), RecordingError<P>> {
	if groups.iter().zip(max.iter()).any(|(g, m)| g > m) {
		Err(RecordingError::DispatchTooLarge { requested: groups, max })
	} else {
		Ok(())
	}
}

#[derive(Error)]
pub enum RecordingError<P: GpuPlatform> {
	#[error("Dispatch of {requested:?} workgroups exceeds the device maximum of {max:?}")]
	DispatchTooLarge { requested: [u32; 3], max: [u32; 3] },
	#[error("Command buffer was recorded against configuration {recorded} but the System is at configuration {current}")]
	StaleCommandBuffer { recorded: u64, current: u64 },
	#[error("Value {value} of Var {name:?} is bound but has host writes that were not synced to the device")]
	UnsyncedValue { name: String, value: ValueId },
	#[error("{0} was never declared on this System")]
	UnknownPipeline(PipelineId),
	#[error("Pipeline {name:?} is a {actual:?} pipeline but a {expected:?} pipeline is required")]
	WrongPipelineKind {
		name: String,
		expected: BindPoint,
		actual: BindPoint,
	},
	#[error("System was created without a render target")]
	NotGraphics,
	#[error("Platform Error: {0}")]
	Platform(#[source] P::Error),
}

impl<P: GpuPlatform> core::fmt::Debug for RecordingError<P> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

impl<P: GpuPlatform> ErrorClass for RecordingError<P> {
	fn kind(&self) -> ErrorKind {
		match self {
			RecordingError::DispatchTooLarge { .. }
			| RecordingError::StaleCommandBuffer { .. }
			| RecordingError::UnsyncedValue { .. } => ErrorKind::ValidationViolation,
			RecordingError::UnknownPipeline(_) | RecordingError::WrongPipelineKind { .. } | RecordingError::NotGraphics => {
				ErrorKind::Configuration
			}
			RecordingError::Platform(e) => P::error_kind(e),
		}
	}
}
