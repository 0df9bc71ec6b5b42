use crate::error::{ErrorClass, ErrorKind};
use crate::platform::GpuPlatform;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use thiserror::Error;

/// An execution submitted to the device queue, identified by its fence.
pub struct Execution<P: GpuPlatform> {
	platform: Arc<P>,
	/// `None` once the fence has been destroyed
	fence: Mutex<Option<P::Fence>>,
	completed: AtomicBool,
}

impl<P: GpuPlatform> Execution<P> {
	/// # Safety
	/// `fence` must have been returned by [`GpuPlatform::submit`] of `platform`
	pub unsafe fn new(platform: Arc<P>, fence: P::Fence) -> Self {
		Self {
			platform,
			fence: Mutex::new(Some(fence)),
			completed: AtomicBool::new(false),
		}
	}

	pub fn completed(&self) -> Result<bool, P::Error> {
		// fast path
		if self.completed.load(Relaxed) {
			return Ok(true);
		}
		let mut guard = self.fence.lock();
		let done = match guard.as_ref() {
			Some(fence) => unsafe { self.platform.fence_completed(fence)? },
			None => true,
		};
		if done {
			self.completed.store(true, Relaxed);
			if let Some(fence) = guard.take() {
				unsafe { self.platform.destroy_fence(fence) };
			}
		}
		Ok(done)
	}

	pub fn wait(&self) -> Result<(), P::Error> {
		if self.completed.load(Relaxed) {
			return Ok(());
		}
		let mut guard = self.fence.lock();
		if let Some(fence) = guard.take() {
			let result = unsafe { self.platform.wait_fence(&fence) };
			match result {
				Ok(()) => {
					self.completed.store(true, Relaxed);
					unsafe { self.platform.destroy_fence(fence) };
				}
				Err(e) => {
					*guard = Some(fence);
					return Err(e);
				}
			}
		}
		Ok(())
	}
}

impl<P: GpuPlatform> Drop for Execution<P> {
	fn drop(&mut self) {
		if let Some(fence) = self.fence.get_mut().take() {
			unsafe {
				// a fence must not be destroyed while its submission is pending
				if let Err(e) = self.platform.wait_fence(&fence) {
					log::error!("waiting on a dropped execution failed: {e}");
				}
				self.platform.destroy_fence(fence);
			}
		}
	}
}

/// A handle to a submitted execution that may still be running on the device. Cheap to clone.
pub struct PendingExecution<P: GpuPlatform>(Option<Arc<Execution<P>>>);

impl<P: GpuPlatform> PendingExecution<P> {
	pub fn new(execution: Arc<Execution<P>>) -> Self {
		Self(Some(execution))
	}

	/// A handle that has already completed.
	pub fn new_completed() -> Self {
		Self(None)
	}

	pub fn completed(&self) -> Result<bool, ExecutionError<P>> {
		match &self.0 {
			None => Ok(true),
			Some(execution) => execution.completed().map_err(ExecutionError::Platform),
		}
	}

	/// Blocks until the execution completed.
	pub fn wait(&self) -> Result<(), ExecutionError<P>> {
		match &self.0 {
			None => Ok(()),
			Some(execution) => execution.wait().map_err(ExecutionError::Platform),
		}
	}
}

impl<P: GpuPlatform> Clone for PendingExecution<P> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<P: GpuPlatform> Debug for PendingExecution<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let state = match &self.0 {
			Some(execution) if !execution.completed.load(Relaxed) => "pending",
			_ => "completed",
		};
		f.debug_tuple("PendingExecution").field(&state).finish()
	}
}

#[derive(Error)]
pub enum ExecutionError<P: GpuPlatform> {
	#[error("Platform Error: {0}")]
	Platform(#[source] P::Error),
}

impl<P: GpuPlatform> core::fmt::Debug for ExecutionError<P> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

impl<P: GpuPlatform> ErrorClass for ExecutionError<P> {
	fn kind(&self) -> ErrorKind {
		match self {
			ExecutionError::Platform(e) => P::error_kind(e),
		}
	}
}
