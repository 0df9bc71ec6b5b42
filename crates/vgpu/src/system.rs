use crate::config::SystemOptions;
use crate::descriptor::{BoundEntry, DescriptorError, DescriptorTables};
use crate::error::{ErrorClass, ErrorKind};
use crate::memory::{ImageCreateInfo, ImageHandle, ImageUsage, Memory, MemoryError, SyncStats};
use crate::pipeline::{
	validate_dispatch, workgroups_for, BindPoint, CmdBuff, CommandPool, ComputePipelineDesc, Execution,
	ExecutionError, GraphicsPipelineDesc, IndexType, PendingExecution, PipelineDesc, PipelineId, Pipelines,
	RecordingError,
};
use crate::platform::GpuPlatform;
use crate::vars::{ImageFormat, ValueId, ValueView, ValueViewMut, VarRole, Vars, VarsError};
use glam::Vec4;
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use thiserror::Error;

/// Format and size of the color image a graphics System renders into.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RenderTargetDesc {
	pub format: ImageFormat,
	pub extent: [u32; 2],
}

struct RenderTarget {
	desc: RenderTargetDesc,
	image: ImageHandle,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SystemState {
	/// Vars and pipelines may be declared, nothing can be recorded
	Unconfigured,
	Configured,
	/// A command buffer is being recorded
	Recording,
	/// Submissions of this System are still executing
	Submitted,
	/// The device failed, every further call fails with [`SystemError::DeviceLost`]
	Lost,
}

impl Display for SystemState {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		std::fmt::Debug::fmt(self, f)
	}
}

#[derive(Error)]
pub enum SystemError<P: GpuPlatform> {
	#[error("System is not configured, call `config` first")]
	NotConfigured,
	#[error("The device was lost, this System can not be used any more")]
	DeviceLost,
	#[error("`{operation}` is not allowed while the System is {state}")]
	InvalidState { operation: &'static str, state: SystemState },
	#[error("Vars Error: {0}")]
	Vars(#[from] VarsError),
	#[error("Memory Error: {0}")]
	Memory(#[from] MemoryError<P>),
	#[error("Descriptor Error: {0}")]
	Descriptor(#[from] DescriptorError<P>),
	#[error("Recording Error: {0}")]
	Recording(#[from] RecordingError<P>),
	#[error("Execution Error: {0}")]
	Execution(#[from] ExecutionError<P>),
	#[error("Platform Error: {0}")]
	Platform(#[source] P::Error),
}

impl<P: GpuPlatform> core::fmt::Debug for SystemError<P> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

impl<P: GpuPlatform> ErrorClass for SystemError<P> {
	fn kind(&self) -> ErrorKind {
		match self {
			SystemError::NotConfigured => ErrorKind::Configuration,
			SystemError::DeviceLost => ErrorKind::DeviceFatal,
			SystemError::InvalidState { .. } => ErrorKind::ValidationViolation,
			SystemError::Vars(e) => e.kind(),
			SystemError::Memory(e) => e.kind(),
			SystemError::Descriptor(e) => e.kind(),
			SystemError::Recording(e) => e.kind(),
			SystemError::Execution(e) => e.kind(),
			SystemError::Platform(e) => P::error_kind(e),
		}
	}
}

/// A set of Vars, their memory and descriptor tables, and the pipelines using them, on one shared device.
///
/// Declare Vars through [`Self::vars_mut`] and pipelines through [`Self::new_compute_pipeline`] or
/// [`Self::new_graphics_pipeline`], then [`Self::config`]. Afterward write Values, [`Self::sync_to_device`], record
/// and submit command buffers and read results back with [`Self::sync_from_device`].
pub struct System<P: GpuPlatform> {
	platform: Arc<P>,
	name: String,
	options: SystemOptions,
	target: Option<RenderTarget>,
	vars: Vars,
	pipelines: Pipelines<P>,
	descriptors: Option<DescriptorTables<P>>,
	command_pool: CommandPool<P>,
	memory: Memory<P>,
	submissions: Vec<PendingExecution<P>>,
	open_recordings: Arc<AtomicU32>,
	generation: u64,
	configured: bool,
	lost: bool,
}

impl<P: GpuPlatform> System<P> {
	/// Creates a compute only System.
	pub fn new_compute(device: &Arc<P>, name: &str, options: SystemOptions) -> Self {
		Self::new_inner(device, name, options)
	}

	/// Creates a System that can also draw into a render target of `target`'s format and extent.
	pub fn new_graphics(
		device: &Arc<P>,
		name: &str,
		target: RenderTargetDesc,
		options: SystemOptions,
	) -> Result<Self, SystemError<P>> {
		let mut system = Self::new_inner(device, name, options);
		let image = system.memory.allocate_image(
			&ImageCreateInfo {
				name: &format!("{name} render target"),
				format: target.format,
				extent: target.extent,
				usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_SRC,
			},
			None,
		)?;
		system.target = Some(RenderTarget { desc: target, image });
		Ok(system)
	}

	fn new_inner(device: &Arc<P>, name: &str, options: SystemOptions) -> Self {
		if options.debug {
			log::info!("creating System {name:?} on {:?}", device.device_info().name);
		}
		Self {
			platform: device.clone(),
			name: name.to_string(),
			target: None,
			vars: Vars::new(),
			pipelines: Pipelines::new(device.clone()),
			descriptors: None,
			command_pool: CommandPool::new(device.clone()),
			memory: Memory::new(device.clone(), name, options.debug),
			submissions: Vec::new(),
			open_recordings: Arc::new(AtomicU32::new(0)),
			generation: 0,
			configured: false,
			lost: false,
			options,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn platform(&self) -> &Arc<P> {
		&self.platform
	}

	pub fn options(&self) -> &SystemOptions {
		&self.options
	}

	pub fn render_target(&self) -> Option<RenderTargetDesc> {
		self.target.as_ref().map(|t| t.desc)
	}

	pub fn state(&self) -> SystemState {
		if self.lost {
			SystemState::Lost
		} else if !self.configured {
			SystemState::Unconfigured
		} else if self.open_recordings.load(Relaxed) > 0 {
			SystemState::Recording
		} else if self.submissions.iter().any(|s| matches!(s.completed(), Ok(false))) {
			SystemState::Submitted
		} else {
			SystemState::Configured
		}
	}

	/// Incremented on every [`Self::config`] and [`Self::begin_reconfigure`], command buffers recorded before are
	/// stale.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn vars(&self) -> &Vars {
		&self.vars
	}

	/// Declaration access to the Vars. Adding Sets or Vars fails with [`VarsError::AlreadyConfigured`] while the
	/// System is configured.
	pub fn vars_mut(&mut self) -> &mut Vars {
		&mut self.vars
	}

	pub fn memory(&self) -> &Memory<P> {
		&self.memory
	}

	pub fn memory_mut(&mut self) -> &mut Memory<P> {
		&mut self.memory
	}

	/// Number of descriptor set instances of every Set.
	pub fn n_descs(&self) -> Result<u32, SystemError<P>> {
		Ok(self.descriptors()?.n_descs())
	}

	fn descriptors(&self) -> Result<&DescriptorTables<P>, SystemError<P>> {
		match (&self.descriptors, self.configured) {
			(Some(descriptors), true) => Ok(descriptors),
			_ => Err(SystemError::NotConfigured),
		}
	}

	fn check_alive(&self) -> Result<(), SystemError<P>> {
		if self.lost {
			Err(SystemError::DeviceLost)
		} else {
			Ok(())
		}
	}

	/// Runs `f` unless the System is lost, and marks it lost if `f` fails fatally.
	fn run<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, SystemError<P>>) -> Result<T, SystemError<P>> {
		self.check_alive()?;
		let result = f(self);
		if let Err(e) = &result {
			if e.kind().is_fatal() {
				log::error!("System {:?} lost its device: {e}", self.name);
				self.lost = true;
			}
		}
		result
	}

	fn check_not_recording(&self, operation: &'static str) -> Result<(), SystemError<P>> {
		if self.open_recordings.load(Relaxed) > 0 {
			Err(SystemError::InvalidState {
				operation,
				state: SystemState::Recording,
			})
		} else {
			Ok(())
		}
	}

	/// Declares a compute pipeline, compiled on the next [`Self::config`] or immediately if already configured.
	pub fn new_compute_pipeline(&mut self, name: &str, shader: P::Shader) -> Result<PipelineId, SystemError<P>> {
		self.run(|this| {
			let id = this
				.pipelines
				.declare(name, PipelineDesc::Compute(ComputePipelineDesc { shader }));
			this.compile_if_configured(id)?;
			Ok(id)
		})
	}

	/// Declares a graphics pipeline. Fails with [`RecordingError::NotGraphics`] on a compute only System.
	pub fn new_graphics_pipeline(
		&mut self,
		name: &str,
		desc: GraphicsPipelineDesc<P>,
	) -> Result<PipelineId, SystemError<P>> {
		self.run(|this| {
			if this.target.is_none() {
				return Err(RecordingError::<P>::NotGraphics.into());
			}
			let id = this.pipelines.declare(name, PipelineDesc::Graphics(desc));
			this.compile_if_configured(id)?;
			Ok(id)
		})
	}

	fn compile_if_configured(&mut self, id: PipelineId) -> Result<(), SystemError<P>> {
		if !self.configured {
			return Ok(());
		}
		let color_format = self.target.as_ref().map(|t| t.desc.format);
		let vertex_input = self.vars.vertex_layout();
		if let Some(layout) = self.descriptors.as_ref().and_then(|d| d.pipeline_layout()) {
			unsafe { self.pipelines.compile(id, layout, &vertex_input, color_format) }.map_err(SystemError::Platform)?;
		}
		Ok(())
	}

	/// Lays out memory for all Values, builds the descriptor tables and compiles all pipelines. Invoking it again
	/// rebuilds everything with identical bindings and invalidates previously recorded command buffers.
	pub fn config(&mut self) -> Result<(), SystemError<P>> {
		self.run(|this| {
			this.check_not_recording("config")?;
			this.wait_submissions()?;
			this.configured = false;
			this.vars.set_locked(false);
			this.generation += 1;
			unsafe {
				this.pipelines.destroy_all();
				if let Some(mut descriptors) = this.descriptors.take() {
					descriptors.destroy();
				}
				this.memory.config(&mut this.vars)?;
				this.memory.flush()?;
				let descriptors = DescriptorTables::new(
					this.platform.clone(),
					&this.vars,
					&this.memory,
					this.options.max_textures_per_set,
					this.options.debug,
				)?;
				if let Some(layout) = descriptors.pipeline_layout() {
					this.pipelines
						.compile_all(layout, &this.vars.vertex_layout(), this.target.as_ref().map(|t| t.desc.format))
						.map_err(SystemError::Platform)?;
				}
				this.descriptors = Some(descriptors);
			}
			this.vars.set_locked(true);
			this.configured = true;
			if this.options.debug {
				log::info!(
					"System {:?} configured: {} sets, {} pipelines, {} value bytes",
					this.name,
					this.vars.sets().len(),
					this.pipelines.len(),
					this.vars.total_value_bytes()
				);
			}
			Ok(())
		})
	}

	/// Reopens the Vars for declarations and [`VarSet::config_values`](crate::vars::VarSet::config_values). The
	/// System stays unconfigured until the next [`Self::config`], memory contents of surviving Values are kept.
	pub fn begin_reconfigure(&mut self) -> Result<(), SystemError<P>> {
		self.run(|this| {
			this.check_not_recording("begin_reconfigure")?;
			this.wait_submissions()?;
			this.vars.set_locked(false);
			this.configured = false;
			this.generation += 1;
			Ok(())
		})
	}

	/// The host view of Value `index` of Var `name` in `set`.
	pub fn value(&self, set: u32, name: &str, index: u32) -> Result<ValueView<'_>, SystemError<P>> {
		let id = self.vars.value_id(set, name, index)?;
		self.value_by_id(id)
	}

	pub fn value_by_id(&self, id: ValueId) -> Result<ValueView<'_>, SystemError<P>> {
		self.check_alive()?;
		let (var, value) = self.vars.var_value(id)?;
		let bytes = self.memory.value_bytes(var, value)?;
		Ok(ValueView::new(value, bytes))
	}

	/// Mutable host view, writes are tracked as dirty and uploaded by the next [`Self::sync_to_device`].
	pub fn value_mut(&mut self, set: u32, name: &str, index: u32) -> Result<ValueViewMut<'_>, SystemError<P>> {
		let id = self.vars.value_id(set, name, index)?;
		self.value_mut_by_id(id)
	}

	pub fn value_mut_by_id(&mut self, id: ValueId) -> Result<ValueViewMut<'_>, SystemError<P>> {
		self.check_alive()?;
		let bytes = {
			let (var, value) = self.vars.var_value(id)?;
			self.memory.value_bytes_mut(var, value)?
		};
		let value = self.vars.value_mut(id)?;
		Ok(ValueViewMut::new(value, bytes))
	}

	/// Records that `range` of a Value's host view was modified through other means than its views.
	pub fn mark_dirty(&mut self, id: ValueId, range: Range<u64>) -> Result<(), SystemError<P>> {
		self.check_alive()?;
		self.vars.value_mut(id)?.mark_dirty(range);
		Ok(())
	}

	/// Uploads all dirty Values, blocking until the transfer completed.
	pub fn sync_to_device(&mut self) -> Result<SyncStats, SystemError<P>> {
		self.run(|this| {
			if !this.configured {
				return Err(SystemError::NotConfigured);
			}
			Ok(this.memory.sync_to_device(&mut this.vars)?)
		})
	}

	/// Copies the device contents of Value `index` of Var `name` back into its host view, blocking until done.
	///
	/// Fails with [`MemoryError::PendingExecution`] while a submission that may write the Value is still executing.
	pub fn sync_from_device(&mut self, set: u32, name: &str, index: u32) -> Result<(), SystemError<P>> {
		self.run(|this| {
			if !this.configured {
				return Err(SystemError::NotConfigured);
			}
			let id = this.vars.value_id(set, name, index)?;
			Ok(this.memory.sync_value_from_device(&mut this.vars, id)?)
		})
	}

	/// Points instance `desc_index` of every dynamic Set at Value `desc_index` of each Var, modulo its Value count.
	pub fn bind_dyn_values_all_index(&mut self, desc_index: u32) -> Result<(), SystemError<P>> {
		self.run(|this| {
			this.descriptors()?;
			let descriptors = this.descriptors.as_mut().ok_or(SystemError::NotConfigured)?;
			Ok(descriptors.bind_dyn_values_all_index(desc_index, &this.vars, &this.memory)?)
		})
	}

	/// Points Var `var` of dynamic Set `set` at Value `value_index` in instance `desc_index`.
	pub fn bind_dyn_value(&mut self, desc_index: u32, set: u32, var: &str, value_index: u32) -> Result<(), SystemError<P>> {
		self.run(|this| {
			this.descriptors()?;
			let descriptors = this.descriptors.as_mut().ok_or(SystemError::NotConfigured)?;
			Ok(descriptors.bind_dyn_value(desc_index, set, var, value_index, &this.vars, &this.memory)?)
		})
	}

	/// `(desc_index, array_element)` through which shaders reach Value `value_index` of Var `var` of static Set `set`.
	pub fn static_value_location(&self, set: u32, var: &str, value_index: u32) -> Result<(u32, u32), SystemError<P>> {
		self.check_alive()?;
		Ok(self.descriptors()?.static_value_location(set, var, value_index, &self.vars)?)
	}

	pub fn binding_table(&self, set: u32, desc_index: u32) -> Result<&[BoundEntry], SystemError<P>> {
		self.check_alive()?;
		Ok(self.descriptors()?.binding_table(set, desc_index)?)
	}

	fn begin_cmd_buff(&mut self, bind_point: BindPoint, operation: &'static str) -> Result<CmdBuff<P>, SystemError<P>> {
		self.run(|this| {
			this.descriptors()?;
			this.check_not_recording(operation)?;
			let mut cmd = this.command_pool.acquire().map_err(SystemError::Platform)?;
			if let Err(e) = unsafe { this.platform.begin_command_buffer(&mut cmd) } {
				this.command_pool.release(cmd);
				return Err(SystemError::Platform(e));
			}
			Ok(CmdBuff::new(
				this.platform.clone(),
				cmd,
				bind_point,
				this.generation,
				this.open_recordings.clone(),
			))
		})
	}

	/// Starts recording a compute command buffer. Only one command buffer may be recorded at a time.
	pub fn compute_cmd_buff(&mut self) -> Result<CmdBuff<P>, SystemError<P>> {
		self.begin_cmd_buff(BindPoint::Compute, "compute_cmd_buff")
	}

	/// Starts recording a graphics command buffer.
	pub fn render_cmd_buff(&mut self) -> Result<CmdBuff<P>, SystemError<P>> {
		if self.target.is_none() {
			return Err(RecordingError::<P>::NotGraphics.into());
		}
		self.begin_cmd_buff(BindPoint::Graphics, "render_cmd_buff")
	}

	/// The raw command buffer of `cmd` if it can still be recorded into.
	fn recording<'c>(
		&self,
		cmd: &'c mut CmdBuff<P>,
		operation: &'static str,
	) -> Result<&'c mut P::CommandBuffer, SystemError<P>> {
		if cmd.generation != self.generation {
			return Err(RecordingError::<P>::StaleCommandBuffer {
				recorded: cmd.generation,
				current: self.generation,
			}
			.into());
		}
		if cmd.ended {
			return Err(SystemError::InvalidState {
				operation,
				state: SystemState::Recording,
			});
		}
		cmd.cmd.as_mut().ok_or(SystemError::InvalidState {
			operation,
			state: SystemState::Submitted,
		})
	}

	fn pipeline(&self, id: PipelineId, expected: BindPoint) -> Result<&P::Pipeline, SystemError<P>> {
		let actual = self
			.pipelines
			.bind_point(id)
			.ok_or(RecordingError::<P>::UnknownPipeline(id))?;
		if actual != expected {
			return Err(RecordingError::<P>::WrongPipelineKind {
				name: self.pipelines.name(id).unwrap_or_default().to_string(),
				expected,
				actual,
			}
			.into());
		}
		self.pipelines.compiled(id).ok_or(SystemError::NotConfigured)
	}

	fn check_bind_point(cmd: &CmdBuff<P>, expected: BindPoint, operation: &'static str) -> Result<(), SystemError<P>> {
		if cmd.bind_point == expected {
			Ok(())
		} else {
			Err(SystemError::InvalidState {
				operation,
				state: SystemState::Recording,
			})
		}
	}

	/// Records binding instance `desc_index` of every Set for the command buffer's bind point.
	pub fn reset_bind_vars(&mut self, cmd: &mut CmdBuff<P>, desc_index: u32) -> Result<(), SystemError<P>> {
		self.run(|this| {
			let bind_point = cmd.bind_point;
			let descriptors = this.descriptors()?;
			descriptors.check_desc_index(desc_index)?;
			let raw = this.recording(cmd, "reset_bind_vars")?;
			unsafe { descriptors.cmd_bind(raw, bind_point, desc_index)? };
			if !cmd.bound_descs.contains(&desc_index) {
				cmd.bound_descs.push(desc_index);
			}
			Ok(())
		})
	}

	pub fn compute_reset_bind_vars(&mut self, cmd: &mut CmdBuff<P>, desc_index: u32) -> Result<(), SystemError<P>> {
		Self::check_bind_point(cmd, BindPoint::Compute, "compute_reset_bind_vars")?;
		self.reset_bind_vars(cmd, desc_index)
	}

	/// Records a dispatch of `groups` workgroups. Group counts above the device limit fail with
	/// [`RecordingError::DispatchTooLarge`] and record nothing.
	pub fn compute_dispatch(
		&mut self,
		cmd: &mut CmdBuff<P>,
		pipeline: PipelineId,
		groups: [u32; 3],
	) -> Result<(), SystemError<P>> {
		self.run(|this| {
			validate_dispatch::<P>(groups, this.platform.device_info().limits.max_compute_work_group_count)?;
			Self::check_bind_point(cmd, BindPoint::Compute, "compute_dispatch")?;
			let compiled = this.pipeline(pipeline, BindPoint::Compute)?;
			let raw = this.recording(cmd, "compute_dispatch")?;
			unsafe {
				this.platform.cmd_bind_pipeline(raw, BindPoint::Compute, compiled);
				this.platform.cmd_dispatch(raw, groups);
			}
			cmd.dispatches += 1;
			Ok(())
		})
	}

	/// Dispatches enough workgroups of `group_size` to cover `threads` invocations.
	pub fn compute_dispatch_threads(
		&mut self,
		cmd: &mut CmdBuff<P>,
		pipeline: PipelineId,
		threads: [u32; 3],
		group_size: [u32; 3],
	) -> Result<(), SystemError<P>> {
		self.compute_dispatch(cmd, pipeline, workgroups_for(threads, group_size))
	}

	/// Begins rendering into the render target, clearing it to `clear` if given.
	pub fn begin_render_pass(&mut self, cmd: &mut CmdBuff<P>, clear: Option<Vec4>) -> Result<(), SystemError<P>> {
		self.run(|this| {
			Self::check_bind_point(cmd, BindPoint::Graphics, "begin_render_pass")?;
			let target = this.target.as_ref().ok_or(RecordingError::<P>::NotGraphics)?;
			if cmd.rendering {
				return Err(SystemError::InvalidState {
					operation: "begin_render_pass",
					state: SystemState::Recording,
				});
			}
			let image = this.memory.image(target.image)?;
			let raw = this.recording(cmd, "begin_render_pass")?;
			unsafe {
				this.platform
					.cmd_begin_rendering(raw, image.platform_image(), clear.map(|c| c.to_array()))
			};
			cmd.rendering = true;
			Ok(())
		})
	}

	fn check_rendering(cmd: &CmdBuff<P>, operation: &'static str) -> Result<(), SystemError<P>> {
		if cmd.rendering {
			Ok(())
		} else {
			Err(SystemError::InvalidState {
				operation,
				state: SystemState::Recording,
			})
		}
	}

	/// Binds the graphics pipeline and the vertex Values, one per vertex Var in declaration order.
	fn bind_draw_inputs(
		&self,
		cmd: &mut CmdBuff<P>,
		pipeline: PipelineId,
		vertex_values: &[ValueId],
		operation: &'static str,
	) -> Result<(), SystemError<P>> {
		Self::check_rendering(cmd, operation)?;
		let compiled = self.pipeline(pipeline, BindPoint::Graphics)?;
		let mut bindings = Vec::with_capacity(vertex_values.len());
		for id in vertex_values {
			let (var, value) = self.vars.var_value(*id)?;
			let binding = match (var.role(), self.vars.vertex_binding(var.id())) {
				(VarRole::Vertex, Some(binding)) => binding,
				_ => {
					return Err(VarsError::WrongRole {
						name: var.name().to_string(),
						role: var.role(),
						expected: "Vertex",
					}
					.into())
				}
			};
			let (block, offset) = self.memory.device_location(var, value)?;
			bindings.push((binding, block, offset));
		}
		let raw = self.recording(cmd, operation)?;
		unsafe {
			self.platform.cmd_bind_pipeline(raw, BindPoint::Graphics, compiled);
			for (binding, block, offset) in bindings {
				self.platform.cmd_bind_vertex_block(raw, binding, block, offset);
			}
		}
		cmd.fetched.extend_from_slice(vertex_values);
		Ok(())
	}

	/// Draws `vertices` from the vertex Values.
	pub fn draw(
		&mut self,
		cmd: &mut CmdBuff<P>,
		pipeline: PipelineId,
		vertex_values: &[ValueId],
		vertices: Range<u32>,
	) -> Result<(), SystemError<P>> {
		self.run(|this| {
			this.bind_draw_inputs(cmd, pipeline, vertex_values, "draw")?;
			let raw = this.recording(cmd, "draw")?;
			unsafe { this.platform.cmd_draw(raw, vertices, 0..1) };
			cmd.dispatches += 1;
			Ok(())
		})
	}

	/// Draws `indices` of the index Value `index_value`, fetching vertices from the vertex Values.
	pub fn draw_indexed(
		&mut self,
		cmd: &mut CmdBuff<P>,
		pipeline: PipelineId,
		vertex_values: &[ValueId],
		index_value: ValueId,
		indices: Range<u32>,
	) -> Result<(), SystemError<P>> {
		self.run(|this| {
			let (var, value) = this.vars.var_value(index_value)?;
			let index_type = match (var.role(), IndexType::from_element_type(var.element_type())) {
				(VarRole::Index, Some(index_type)) => index_type,
				_ => {
					return Err(VarsError::WrongRole {
						name: var.name().to_string(),
						role: var.role(),
						expected: "Index",
					}
					.into())
				}
			};
			let (block, offset) = this.memory.device_location(var, value)?;
			this.bind_draw_inputs(cmd, pipeline, vertex_values, "draw_indexed")?;
			let raw = this.recording(cmd, "draw_indexed")?;
			unsafe {
				this.platform.cmd_bind_index_block(raw, block, offset, index_type);
				this.platform.cmd_draw_indexed(raw, indices, 0, 0..1);
			}
			cmd.fetched.push(index_value);
			cmd.dispatches += 1;
			Ok(())
		})
	}

	pub fn end_render_pass(&mut self, cmd: &mut CmdBuff<P>) -> Result<(), SystemError<P>> {
		self.run(|this| {
			Self::check_rendering(cmd, "end_render_pass")?;
			let raw = this.recording(cmd, "end_render_pass")?;
			unsafe { this.platform.cmd_end_rendering(raw) };
			cmd.rendering = false;
			Ok(())
		})
	}

	/// Ends recording of a compute or graphics command buffer.
	pub fn compute_cmd_end(&mut self, cmd: &mut CmdBuff<P>) -> Result<(), SystemError<P>> {
		self.run(|this| {
			if cmd.rendering {
				return Err(SystemError::InvalidState {
					operation: "compute_cmd_end",
					state: SystemState::Recording,
				});
			}
			let raw = this.recording(cmd, "compute_cmd_end")?;
			unsafe { this.platform.end_command_buffer(raw) }.map_err(SystemError::Platform)?;
			cmd.ended = true;
			Ok(())
		})
	}

	/// Every Value read by `cmd` must have been synced, otherwise the device would see stale data.
	fn check_synced(&self, cmd: &CmdBuff<P>) -> Result<(), SystemError<P>> {
		let descriptors = self.descriptors()?;
		let bound = cmd.bound_descs.iter().flat_map(|d| descriptors.bound_values(*d));
		for id in bound.chain(cmd.fetched.iter().copied()) {
			let (var, value) = self.vars.var_value(id)?;
			if value.is_dirty() {
				return Err(RecordingError::<P>::UnsyncedValue {
					name: var.name().to_string(),
					value: id,
				}
				.into());
			}
		}
		Ok(())
	}

	/// Submits an ended command buffer without waiting. The returned handle completes once the device finished it.
	pub fn compute_submit(&mut self, cmd: CmdBuff<P>) -> Result<PendingExecution<P>, SystemError<P>> {
		let mut cmd = cmd;
		self.run(move |this| {
			this.descriptors()?;
			if cmd.generation != this.generation {
				return Err(RecordingError::<P>::StaleCommandBuffer {
					recorded: cmd.generation,
					current: this.generation,
				}
				.into());
			}
			if !cmd.ended {
				return Err(SystemError::InvalidState {
					operation: "compute_submit",
					state: SystemState::Recording,
				});
			}
			this.check_synced(&cmd)?;

			let raw = cmd.take().ok_or(SystemError::InvalidState {
				operation: "compute_submit",
				state: SystemState::Submitted,
			})?;
			let fence = match unsafe { this.platform.submit(&raw) } {
				Ok(fence) => fence,
				Err(e) => {
					this.command_pool.release(raw);
					return Err(SystemError::Platform(e));
				}
			};
			let pending = PendingExecution::new(Arc::new(unsafe { Execution::new(this.platform.clone(), fence) }));

			let writers = {
				let descriptors = this.descriptors()?;
				cmd.bound_descs
					.iter()
					.flat_map(|d| descriptors.bound_values(*d))
					.filter(|id| this.vars.var(id.var_id()).is_ok_and(|v| v.role().is_writable()))
					.collect::<Vec<_>>()
			};
			for id in writers {
				this.memory.record_writer(id, pending.clone());
			}
			if let Some(descriptors) = this.descriptors.as_mut() {
				for desc in &cmd.bound_descs {
					descriptors.mark_in_flight(*desc, pending.clone());
				}
			}
			this.command_pool.submitted(raw, pending.clone());
			this.submissions.retain(|s| !matches!(s.completed(), Ok(true)));
			this.submissions.push(pending.clone());
			if this.options.debug {
				log::info!(
					"System {:?} submitted {} commands with descriptor instances {:?}",
					this.name,
					cmd.dispatches,
					cmd.bound_descs
				);
			}
			Ok(pending)
		})
	}

	/// Submits an ended command buffer and blocks until the device finished it.
	pub fn compute_submit_wait(&mut self, cmd: CmdBuff<P>) -> Result<(), SystemError<P>> {
		let pending = self.compute_submit(cmd)?;
		self.run(|_| Ok(pending.wait()?))
	}

	/// Reads back the whole render target tightly packed, after all previous submissions.
	pub fn read_render_target(&mut self) -> Result<Vec<u8>, SystemError<P>> {
		self.run(|this| {
			let image = this.target.as_ref().ok_or(RecordingError::<P>::NotGraphics)?.image;
			Ok(this.memory.read_image(image)?)
		})
	}

	fn wait_submissions(&mut self) -> Result<(), SystemError<P>> {
		for submission in self.submissions.drain(..) {
			submission.wait()?;
		}
		self.command_pool.reclaim().map_err(SystemError::Platform)
	}

	/// Blocks until every submission of this System completed.
	pub fn wait_idle(&mut self) -> Result<(), SystemError<P>> {
		self.run(|this| this.wait_submissions())
	}

	/// Waits for the device and releases everything in order: pipelines, pipeline layout, descriptor pools and
	/// layouts, command buffers and finally memory blocks and images.
	pub fn destroy(self) {
		drop(self)
	}
}

impl<P: GpuPlatform> Drop for System<P> {
	fn drop(&mut self) {
		for submission in self.submissions.drain(..) {
			if let Err(e) = submission.wait() {
				log::warn!("System {:?}: waiting for a submission during teardown failed: {e}", self.name);
			}
		}
		unsafe {
			self.pipelines.destroy_all();
			if let Some(mut descriptors) = self.descriptors.take() {
				descriptors.destroy();
			}
			self.command_pool.destroy();
			self.memory.destroy();
		}
		if self.options.debug {
			log::info!("System {:?} destroyed", self.name);
		}
	}
}
