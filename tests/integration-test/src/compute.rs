#![cfg(test)]

use crate::host;
use vgpu::config::SystemOptions;
use vgpu::error::{ErrorClass, ErrorKind};
use vgpu::pipeline::RecordingError;
use vgpu::platform::host::HostShader;
use vgpu::platform::GpuPlatform;
use vgpu::system::{System, SystemError, SystemState};
use vgpu::vars::{ElementType, ShaderStages, VarRole};

const N: u64 = 100;

fn add_shader() -> HostShader {
	HostShader::compute([64, 1, 1], |inv| {
		let i = inv.global_id.x as usize;
		if i < inv.bindings.len::<f32>(0, 2, 0) {
			let a: f32 = inv.bindings.read(0, 0, i);
			let b: f32 = inv.bindings.read(0, 1, i);
			inv.bindings.write(0, 2, i, a + b);
		}
	})
}

#[test]
fn test_add_round_trip() -> anyhow::Result<()> {
	let platform = host();
	let mut system = System::new_compute(&platform, "add", SystemOptions::default());
	let set = system.vars_mut().add_set()?;
	for name in ["a", "b", "c"] {
		system
			.vars_mut()
			.set_mut(set)?
			.add(name, ElementType::Float32, N, VarRole::Storage, ShaderStages::COMPUTE)?;
	}
	let pipeline = system.new_compute_pipeline("add", add_shader())?;
	system.config()?;

	let a = (0..N).map(|i| i as f32).collect::<Vec<_>>();
	let b = (0..N).map(|i| 1000. - 2. * i as f32).collect::<Vec<_>>();
	system.value_mut(set, "a", 0)?.write(0, &a);
	system.value_mut(set, "b", 0)?.write(0, &b);
	system.sync_to_device()?;

	let mut cmd = system.compute_cmd_buff()?;
	system.compute_reset_bind_vars(&mut cmd, 0)?;
	system.compute_dispatch_threads(&mut cmd, pipeline, [N as u32, 1, 1], [64, 1, 1])?;
	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;

	system.sync_from_device(set, "c", 0)?;
	let c = system.value(set, "c", 0)?.floats32();
	for i in 0..N as usize {
		approx::assert_relative_eq!(c[i], a[i] + b[i]);
	}
	let stats = platform.stats();
	assert_eq!(stats.dispatches, 1);
	assert_eq!(stats.workgroups, 2);
	Ok(())
}

/// Two Values of a uniform, each descriptor set instance reading its own one.
#[test]
fn test_double_buffered_uniform() -> anyhow::Result<()> {
	let platform = host();
	let mut system = System::new_compute(&platform, "double buffered", SystemOptions::default());
	let set = system.vars_mut().add_set()?;
	{
		let set = system.vars_mut().set_mut(set)?;
		set.add("scale", ElementType::Float32, 1, VarRole::Uniform, ShaderStages::COMPUTE)?;
		set.add("out", ElementType::Float32, 4, VarRole::Storage, ShaderStages::COMPUTE)?;
		set.config_values(2)?;
	}
	let pipeline = system.new_compute_pipeline(
		"scale",
		HostShader::compute([4, 1, 1], |inv| {
			let i = inv.global_id.x as usize;
			let scale: f32 = inv.bindings.read(0, 0, 0);
			inv.bindings.write(0, 1, i, scale * (i + 1) as f32);
		}),
	)?;
	system.config()?;
	assert_eq!(system.n_descs()?, 2);

	system.value_mut(set, "scale", 0)?.write(0, &[2f32]);
	system.value_mut(set, "scale", 1)?.write(0, &[3f32]);
	system.sync_to_device()?;

	let mut cmd = system.compute_cmd_buff()?;
	for desc in 0..2 {
		system.compute_reset_bind_vars(&mut cmd, desc)?;
		system.compute_dispatch(&mut cmd, pipeline, [1, 1, 1])?;
	}
	system.compute_cmd_end(&mut cmd)?;
	assert_eq!(cmd.bound_descs(), &[0, 1]);
	system.compute_submit_wait(cmd)?;

	system.sync_from_device(set, "out", 0)?;
	system.sync_from_device(set, "out", 1)?;
	assert_eq!(system.value(set, "out", 0)?.floats32(), vec![2., 4., 6., 8.]);
	assert_eq!(system.value(set, "out", 1)?.floats32(), vec![3., 6., 9., 12.]);

	// instance 0 reads the second scale from now on
	system.bind_dyn_value(0, set, "scale", 1)?;
	let scale_1 = system.vars().value_id(set, "scale", 1)?;
	assert!(system.binding_table(set, 0)?.iter().any(|e| e.value == scale_1));
	let mut cmd = system.compute_cmd_buff()?;
	system.compute_reset_bind_vars(&mut cmd, 0)?;
	system.compute_dispatch(&mut cmd, pipeline, [1, 1, 1])?;
	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;
	system.sync_from_device(set, "out", 0)?;
	assert_eq!(system.value(set, "out", 0)?.floats32(), vec![3., 6., 9., 12.]);
	Ok(())
}

/// Copies 20 vec4 of "In" to "Out", the Vars padded to the thread group size of 64.
#[test]
fn test_pass_through_is_bit_exact() -> anyhow::Result<()> {
	let platform = host();
	let mut system = System::new_compute(&platform, "pass through", SystemOptions::default());
	let set = system.vars_mut().add_set()?;
	{
		let set = system.vars_mut().set_mut(set)?;
		set.add("In", ElementType::Float32Vector4, 64, VarRole::Storage, ShaderStages::COMPUTE)?;
		set.add("Out", ElementType::Float32Vector4, 64, VarRole::Storage, ShaderStages::COMPUTE)?;
	}
	let pipeline = system.new_compute_pipeline(
		"copy",
		HostShader::compute([64, 1, 1], |inv| {
			let i = inv.global_id.x as usize;
			let x: [f32; 4] = inv.bindings.read(0, 0, i);
			inv.bindings.write(0, 1, i, x);
		}),
	)?;
	system.config()?;
	assert_eq!(system.value(set, "In", 0)?.bytes().len(), 64 * 16);

	let input = (0..20)
		.map(|i| {
			let i = i as f32;
			[i * 0.1 - 3.3, -i / 7., f32::MIN_POSITIVE * i, 1e30 - i]
		})
		.collect::<Vec<_>>();
	system.value_mut(set, "In", 0)?.write(0, &input);
	system.sync_to_device()?;

	let mut cmd = system.compute_cmd_buff()?;
	system.compute_reset_bind_vars(&mut cmd, 0)?;
	system.compute_dispatch(&mut cmd, pipeline, [1, 1, 1])?;
	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;

	system.sync_from_device(set, "Out", 0)?;
	let expected = system.value(set, "In", 0)?.bytes().to_vec();
	assert_eq!(system.value(set, "Out", 0)?.bytes(), &expected[..]);
	assert_eq!(system.value(set, "Out", 0)?.to_vec::<[f32; 4]>()[..20], input[..]);
	Ok(())
}

/// Two submissions in flight without waiting in between, each on its own descriptor set instance and Values.
#[test]
fn test_double_buffered_submissions_in_flight() -> anyhow::Result<()> {
	let platform = host();
	let mut system = System::new_compute(&platform, "in flight", SystemOptions::default());
	let set = system.vars_mut().add_set()?;
	{
		let set = system.vars_mut().set_mut(set)?;
		set.add("scale", ElementType::Float32, 1, VarRole::Uniform, ShaderStages::COMPUTE)?;
		set.add("out", ElementType::Float32, 4, VarRole::Storage, ShaderStages::COMPUTE)?;
		set.config_values(2)?;
	}
	let pipeline = system.new_compute_pipeline(
		"scale",
		HostShader::compute([4, 1, 1], |inv| {
			let i = inv.global_id.x as usize;
			let scale: f32 = inv.bindings.read(0, 0, 0);
			inv.bindings.write(0, 1, i, scale * (i + 1) as f32);
		}),
	)?;
	system.config()?;
	system.value_mut(set, "scale", 0)?.write(0, &[2f32]);
	system.value_mut(set, "scale", 1)?.write(0, &[3f32]);
	system.sync_to_device()?;

	let mut pending = Vec::new();
	for desc in 0..2 {
		let mut cmd = system.compute_cmd_buff()?;
		system.compute_reset_bind_vars(&mut cmd, desc)?;
		system.compute_dispatch(&mut cmd, pipeline, [1, 1, 1])?;
		system.compute_cmd_end(&mut cmd)?;
		pending.push(system.compute_submit(cmd)?);
	}
	assert_eq!(system.state(), SystemState::Submitted);
	assert!(!pending[0].completed()?);
	assert!(!pending[1].completed()?);

	for execution in &pending {
		execution.wait()?;
	}
	assert_eq!(system.state(), SystemState::Configured);
	system.sync_from_device(set, "out", 0)?;
	system.sync_from_device(set, "out", 1)?;
	assert_eq!(system.value(set, "out", 0)?.floats32(), vec![2., 4., 6., 8.]);
	assert_eq!(system.value(set, "out", 1)?.floats32(), vec![3., 6., 9., 12.]);
	assert_eq!(platform.stats().dispatches, 2);
	Ok(())
}

/// Static Sets expose all Values of a Var through one binding array.
#[test]
fn test_static_set_binding_array() -> anyhow::Result<()> {
	let platform = host();
	let mut system = System::new_compute(&platform, "static", SystemOptions::default());
	let set = system.vars_mut().add_static_set()?;
	{
		let set = system.vars_mut().set_mut(set)?;
		set.add("data", ElementType::Uint32, 4, VarRole::Storage, ShaderStages::COMPUTE)?;
		set.config_values(3)?;
	}
	let pipeline = system.new_compute_pipeline(
		"double",
		HostShader::compute([4, 1, 1], |inv| {
			let i = inv.global_id.x as usize;
			for element in 0..3 {
				let x: u32 = inv.bindings.read_at(0, 0, element, i);
				inv.bindings.write_at(0, 0, element, i, x * 2);
			}
		}),
	)?;
	system.config()?;
	for value in 0..3 {
		assert_eq!(system.static_value_location(set, "data", value)?, (0, value));
		system
			.value_mut(set, "data", value)?
			.write(0, &[value, value + 10, value + 20, value + 30]);
	}
	system.sync_to_device()?;

	let mut cmd = system.compute_cmd_buff()?;
	system.compute_reset_bind_vars(&mut cmd, 0)?;
	system.compute_dispatch(&mut cmd, pipeline, [1, 1, 1])?;
	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;

	for value in 0..3 {
		system.sync_from_device(set, "data", value)?;
		assert_eq!(
			system.value(set, "data", value)?.to_vec::<u32>(),
			vec![value * 2, (value + 10) * 2, (value + 20) * 2, (value + 30) * 2]
		);
	}
	Ok(())
}

#[test]
fn test_dispatch_too_large_records_nothing() -> anyhow::Result<()> {
	let platform = host();
	let mut system = System::new_compute(&platform, "too large", SystemOptions::default());
	let set = system.vars_mut().add_set()?;
	system
		.vars_mut()
		.set_mut(set)?
		.add("c", ElementType::Float32, 1, VarRole::Storage, ShaderStages::COMPUTE)?;
	let pipeline = system.new_compute_pipeline("noop", HostShader::compute([1, 1, 1], |_| {}))?;
	system.config()?;
	system.sync_to_device()?;

	let max = platform.device_info().limits.max_compute_work_group_count;
	let mut cmd = system.compute_cmd_buff()?;
	system.compute_reset_bind_vars(&mut cmd, 0)?;
	let err = system
		.compute_dispatch(&mut cmd, pipeline, [max[0] + 1, 1, 1])
		.unwrap_err();
	assert!(matches!(
		err,
		SystemError::Recording(RecordingError::DispatchTooLarge { .. })
	));
	assert_eq!(err.kind(), ErrorKind::ValidationViolation);
	assert_eq!(cmd.commands(), 0);

	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;
	assert_eq!(platform.stats().dispatches, 0);
	assert_eq!(platform.stats().workgroups, 0);
	Ok(())
}
