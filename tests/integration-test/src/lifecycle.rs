#![cfg(test)]

use crate::{host, init_logger};
use std::sync::Arc;
use vgpu::config::SystemOptions;
use vgpu::error::{ErrorClass, ErrorKind};
use vgpu::memory::{MemoryError, MemoryPropertyFlags, SyncStats};
use vgpu::pipeline::{CmdBuff, PipelineId, RecordingError};
use vgpu::platform::host::{HostPlatform, HostPlatformCreateInfo, HostShader};
use vgpu::system::{System, SystemError, SystemState};
use vgpu::vars::{ElementType, ShaderStages, VarRole, VarsError};

/// A System with one dynamic Set holding a storage Var `data` of 16 floats and a pipeline writing `x + 1` into it.
fn increment_system(platform: &Arc<HostPlatform>) -> anyhow::Result<(System<HostPlatform>, u32, PipelineId)> {
	let mut system = System::new_compute(platform, "increment", SystemOptions::default().debug(true));
	let set = system.vars_mut().add_set()?;
	system
		.vars_mut()
		.set_mut(set)?
		.add("data", ElementType::Float32, 16, VarRole::Storage, ShaderStages::COMPUTE)?;
	let pipeline = system.new_compute_pipeline(
		"increment",
		HostShader::compute([16, 1, 1], |inv| {
			let i = inv.global_id.x as usize;
			let x: f32 = inv.bindings.read(0, 0, i);
			inv.bindings.write(0, 0, i, x + 1.);
		}),
	)?;
	Ok((system, set, pipeline))
}

fn record_increment(system: &mut System<HostPlatform>, pipeline: PipelineId) -> anyhow::Result<CmdBuff<HostPlatform>> {
	let mut cmd = system.compute_cmd_buff()?;
	system.compute_reset_bind_vars(&mut cmd, 0)?;
	system.compute_dispatch(&mut cmd, pipeline, [1, 1, 1])?;
	system.compute_cmd_end(&mut cmd)?;
	Ok(cmd)
}

#[test]
fn test_not_configured() -> anyhow::Result<()> {
	let platform = host();
	let (mut system, _, _) = increment_system(&platform)?;
	assert_eq!(system.state(), SystemState::Unconfigured);
	assert!(matches!(system.compute_cmd_buff(), Err(SystemError::NotConfigured)));
	assert!(matches!(system.sync_to_device(), Err(SystemError::NotConfigured)));
	assert_eq!(SystemError::<HostPlatform>::NotConfigured.kind(), ErrorKind::Configuration);
	Ok(())
}

#[test]
fn test_out_of_memory() -> anyhow::Result<()> {
	init_logger();
	let platform = HostPlatform::new(HostPlatformCreateInfo {
		device_local_heap: 64 << 10,
		..HostPlatformCreateInfo::default()
	});
	let mut system = System::new_compute(&platform, "oom", SystemOptions::default());
	let set = system.vars_mut().add_set()?;
	system
		.vars_mut()
		.set_mut(set)?
		.add("huge", ElementType::Float32Vector4, 1 << 16, VarRole::Storage, ShaderStages::COMPUTE)?;

	let err = system.config().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
	assert_eq!(system.state(), SystemState::Unconfigured);
	assert!(!system.vars().is_locked());
	Ok(())
}

#[test]
fn test_out_of_memory_keeps_prior_allocations() -> anyhow::Result<()> {
	init_logger();
	let platform = HostPlatform::new(HostPlatformCreateInfo {
		device_local_heap: 64 << 10,
		..HostPlatformCreateInfo::default()
	});
	let mut system = System::new_compute(&platform, "oom", SystemOptions::default());
	let memory = system.memory_mut();
	let device = memory.allocate(16 << 10, MemoryPropertyFlags::DEVICE_LOCAL)?;
	let staging = memory.allocate(4096, MemoryPropertyFlags::STAGING)?;
	memory.map_range(staging, 0, 4)?.copy_from_slice(&[1, 2, 3, 4]);

	for size in [1 << 20, u64::MAX / 2, u64::MAX - 100, u64::MAX] {
		let err = memory.allocate(size, MemoryPropertyFlags::DEVICE_LOCAL).unwrap_err();
		assert!(matches!(err, MemoryError::OutOfMemory { .. }), "{size}: {err}");
		assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
	}

	assert_eq!(memory.heap_usage(0), 16 << 10);
	assert_eq!(memory.block(device)?.size, 16 << 10);
	assert_eq!(memory.mapped(staging, 0, 4)?, &[1, 2, 3, 4]);
	// the remaining space is still usable
	memory.allocate(48 << 10, MemoryPropertyFlags::DEVICE_LOCAL)?;
	Ok(())
}

#[test]
fn test_config_is_repeatable() -> anyhow::Result<()> {
	let platform = host();
	let (mut system, set, pipeline) = increment_system(&platform)?;
	system.config()?;
	assert_eq!(system.generation(), 1);
	let bindings = system.binding_table(set, 0)?.to_vec();
	system.value_mut(set, "data", 0)?.write(0, &[1f32, 2., 3.]);
	system.sync_to_device()?;

	system.config()?;
	assert_eq!(system.generation(), 2);
	assert_eq!(system.state(), SystemState::Configured);
	assert_eq!(system.binding_table(set, 0)?, &bindings[..]);
	// an unchanged layout keeps host views and device contents, nothing needs uploading
	assert_eq!(system.value(set, "data", 0)?.floats32()[..3], [1., 2., 3.]);
	assert!(!system.vars().value_by_index(set, "data", 0)?.is_dirty());
	assert_eq!(system.sync_to_device()?, SyncStats::default());

	let cmd = record_increment(&mut system, pipeline)?;
	system.compute_submit_wait(cmd)?;
	system.sync_from_device(set, "data", 0)?;
	assert_eq!(system.value(set, "data", 0)?.floats32()[..4], [2., 3., 4., 1.]);
	Ok(())
}

#[test]
fn test_zero_values_and_reconfigure() -> anyhow::Result<()> {
	let platform = host();
	let (mut system, set, _) = increment_system(&platform)?;
	let err = system.vars_mut().set_mut(set)?.config_values(0).unwrap_err();
	assert!(matches!(err, VarsError::ZeroValues { .. }));
	assert_eq!(err.kind(), ErrorKind::Configuration);

	system.config()?;
	let err = system
		.vars_mut()
		.set_mut(set)?
		.add("late", ElementType::Float32, 1, VarRole::Storage, ShaderStages::COMPUTE)
		.unwrap_err();
	assert!(matches!(err, VarsError::AlreadyConfigured { .. }));

	system.begin_reconfigure()?;
	assert_eq!(system.state(), SystemState::Unconfigured);
	system.vars_mut().set_mut(set)?.config_values(3)?;
	system.config()?;
	assert_eq!(system.n_descs()?, 3);
	assert_eq!(system.generation(), 3);
	Ok(())
}

#[test]
fn test_pending_readback() -> anyhow::Result<()> {
	let platform = host();
	let (mut system, set, pipeline) = increment_system(&platform)?;
	system.config()?;
	system.sync_to_device()?;

	let cmd = record_increment(&mut system, pipeline)?;
	let pending = system.compute_submit(cmd)?;
	assert_eq!(system.state(), SystemState::Submitted);
	assert!(!pending.completed()?);

	let err = system.sync_from_device(set, "data", 0).unwrap_err();
	assert!(matches!(err, SystemError::Memory(MemoryError::PendingExecution(_))));
	assert_eq!(err.kind(), ErrorKind::ValidationViolation);
	// the descriptor instance is in use as well
	assert!(system.bind_dyn_value(0, set, "data", 0).is_err());

	pending.wait()?;
	assert_eq!(system.state(), SystemState::Configured);
	system.sync_from_device(set, "data", 0)?;
	assert_eq!(system.value(set, "data", 0)?.floats32(), vec![1.; 16]);
	Ok(())
}

#[test]
fn test_unsynced_value_is_rejected() -> anyhow::Result<()> {
	let platform = host();
	let (mut system, set, pipeline) = increment_system(&platform)?;
	system.config()?;
	system.sync_to_device()?;
	system.value_mut(set, "data", 0)?.write(0, &[5f32]);

	let cmd = record_increment(&mut system, pipeline)?;
	let err = system.compute_submit(cmd).unwrap_err();
	assert!(matches!(
		err,
		SystemError::Recording(RecordingError::UnsyncedValue { .. })
	));
	assert_eq!(platform.stats().submissions, 1);
	Ok(())
}

#[test]
fn test_config_while_recording() -> anyhow::Result<()> {
	let platform = host();
	let (mut system, _, _) = increment_system(&platform)?;
	system.config()?;
	let cmd = system.compute_cmd_buff()?;
	assert_eq!(system.state(), SystemState::Recording);
	assert!(matches!(
		system.config(),
		Err(SystemError::InvalidState {
			state: SystemState::Recording,
			..
		})
	));
	assert!(system.compute_cmd_buff().is_err());
	drop(cmd);
	assert_eq!(system.state(), SystemState::Configured);
	system.config()?;
	Ok(())
}

#[test]
fn test_device_lost() -> anyhow::Result<()> {
	let platform = host();
	let (mut system, set, _) = increment_system(&platform)?;
	system.config()?;
	platform.lose_device();

	let err = system.sync_to_device().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::DeviceFatal);
	assert_eq!(system.state(), SystemState::Lost);
	assert!(matches!(system.value(set, "data", 0), Err(SystemError::DeviceLost)));
	assert!(matches!(system.compute_cmd_buff(), Err(SystemError::DeviceLost)));
	system.destroy();
	Ok(())
}
