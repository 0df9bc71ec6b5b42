use crate::pipeline::execution::{ExecutionError, PendingExecution};
use crate::platform::GpuPlatform;
use std::sync::Arc;

/// Recycles the command buffers of a System. Submitted buffers return to the free list once their execution was
/// observed to have completed.
pub struct CommandPool<P: GpuPlatform> {
	platform: Arc<P>,
	free: Vec<P::CommandBuffer>,
	in_flight: Vec<(P::CommandBuffer, PendingExecution<P>)>,
	allocated: u32,
}

impl<P: GpuPlatform> CommandPool<P> {
	pub fn new(platform: Arc<P>) -> Self {
		Self {
			platform,
			free: Vec::new(),
			in_flight: Vec::new(),
			allocated: 0,
		}
	}

	/// Number of command buffers allocated so far.
	pub fn allocated(&self) -> u32 {
		self.allocated
	}

	pub fn in_flight(&self) -> usize {
		self.in_flight.len()
	}

	/// Moves command buffers of completed executions to the free list.
	pub fn reclaim(&mut self) -> Result<(), P::Error> {
		let mut i = 0;
		while i < self.in_flight.len() {
			let completed = self.in_flight[i].1.completed().map_err(|e| match e {
				ExecutionError::Platform(e) => e,
			})?;
			if completed {
				let (cmd, _) = self.in_flight.swap_remove(i);
				self.free.push(cmd);
			} else {
				i += 1;
			}
		}
		Ok(())
	}

	/// A command buffer not in use by any execution, allocating a new one if all are in flight.
	pub fn acquire(&mut self) -> Result<P::CommandBuffer, P::Error> {
		self.reclaim()?;
		match self.free.pop() {
			Some(cmd) => Ok(cmd),
			None => {
				let cmd = unsafe { self.platform.alloc_command_buffer()? };
				self.allocated += 1;
				Ok(cmd)
			}
		}
	}

	/// Returns a command buffer that was never submitted.
	pub fn release(&mut self, cmd: P::CommandBuffer) {
		self.free.push(cmd);
	}

	pub fn submitted(&mut self, cmd: P::CommandBuffer, execution: PendingExecution<P>) {
		self.in_flight.push((cmd, execution));
	}

	/// Frees every command buffer.
	///
	/// # Safety
	/// No execution of this pool may be pending.
	pub unsafe fn destroy(&mut self) {
		for cmd in self.free.drain(..).chain(self.in_flight.drain(..).map(|(cmd, _)| cmd)) {
			self.platform.free_command_buffer(cmd);
		}
	}
}

impl<P: GpuPlatform> Drop for CommandPool<P> {
	fn drop(&mut self) {
		unsafe { self.destroy() }
	}
}
