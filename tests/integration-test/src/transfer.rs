#![cfg(test)]

use crate::{ash, host};
use glam::Vec4;
use std::sync::Arc;
use vgpu::config::SystemOptions;
use vgpu::memory::SyncStats;
use vgpu::platform::GpuPlatform;
use vgpu::system::System;
use vgpu::vars::{ElementType, ImageFormat, ShaderStages, VarRole};

#[test]
fn test_value_round_trip_host() -> anyhow::Result<()> {
	test_value_round_trip(&host())
}

#[test]
fn test_value_round_trip_ash() -> anyhow::Result<()> {
	match ash() {
		Some(platform) => test_value_round_trip(&platform),
		None => Ok(()),
	}
}

/// Uploads buffer and image Values, clobbers their host views and restores them from the device.
fn test_value_round_trip<P: GpuPlatform>(platform: &Arc<P>) -> anyhow::Result<()> {
	let mut system = System::new_compute(platform, "round trip", SystemOptions::default().debug(true));
	let set = system.vars_mut().add_set()?;
	{
		let set = system.vars_mut().set_mut(set)?;
		set.add("ints", ElementType::Uint32, 256, VarRole::Storage, ShaderStages::COMPUTE)?;
		set.add("params", ElementType::Float32Vector4, 2, VarRole::Uniform, ShaderStages::COMPUTE)?;
		set.add_image(
			"tex",
			ImageFormat::Rgba8Unorm,
			[8, 8],
			VarRole::StorageImage,
			ShaderStages::COMPUTE,
		)?;
		set.config_values(2)?;
	}
	system.config()?;

	let ints = |value: u32| (0..256).map(|i| i * 3 + value).collect::<Vec<u32>>();
	let params = |value: u32| [Vec4::splat(value as f32), Vec4::new(1., 2., 3., 4.)];
	let texels = |value: u32| (0..8 * 8 * 4).map(|i| (i as u32 + value) as u8).collect::<Vec<u8>>();
	for value in 0..2 {
		system.value_mut(set, "ints", value)?.write(0, &ints(value));
		system.value_mut(set, "params", value)?.write_vec4s(0, &params(value));
		system.value_mut(set, "tex", value)?.write(0, &texels(value));
	}
	let stats = system.sync_to_device()?;
	assert_eq!(stats.images, 2);
	assert!(stats.bytes >= 2 * (256 * 4 + 2 * 16));

	for value in 0..2 {
		system.value_mut(set, "ints", value)?.fill(0u32);
		system.value_mut(set, "params", value)?.fill(0f32);
		system.value_mut(set, "tex", value)?.fill(0u8);
	}
	for value in 0..2 {
		for name in ["ints", "params", "tex"] {
			system.sync_from_device(set, name, value)?;
		}
		assert_eq!(system.value(set, "ints", value)?.to_vec::<u32>(), ints(value));
		assert_eq!(system.value(set, "params", value)?.vec4s(), params(value));
		assert_eq!(system.value(set, "tex", value)?.bytes(), &texels(value)[..]);
	}
	// readback discarded the host writes, nothing is left to upload
	assert_eq!(system.sync_to_device()?, SyncStats::default());
	Ok(())
}

#[test]
fn test_partial_upload_host() -> anyhow::Result<()> {
	test_partial_upload(&host())
}

#[test]
fn test_partial_upload_ash() -> anyhow::Result<()> {
	match ash() {
		Some(platform) => test_partial_upload(&platform),
		None => Ok(()),
	}
}

/// Only dirty ranges are uploaded, untouched device contents stay as they were.
fn test_partial_upload<P: GpuPlatform>(platform: &Arc<P>) -> anyhow::Result<()> {
	let mut system = System::new_compute(platform, "partial", SystemOptions::default());
	let set = system.vars_mut().add_set()?;
	system
		.vars_mut()
		.set_mut(set)?
		.add("data", ElementType::Uint32, 1024, VarRole::Storage, ShaderStages::COMPUTE)?;
	system.config()?;
	system.value_mut(set, "data", 0)?.fill(7u32);
	system.sync_to_device()?;

	let id = system.vars().value_id(set, "data", 0)?;
	system.value_mut_by_id(id)?.write(10, &[42u32]);
	system.value_mut_by_id(id)?.write(1000, &[43u32]);
	// re-uploads the unchanged first element
	system.mark_dirty(id, 0..4)?;
	let stats = system.sync_to_device()?;
	assert_eq!(stats.regions, 3);
	assert_eq!(stats.bytes, 12);

	system.sync_from_device(set, "data", 0)?;
	let data = system.value(set, "data", 0)?.to_vec::<u32>();
	assert_eq!(data[10], 42);
	assert_eq!(data[1000], 43);
	assert!(data.iter().enumerate().all(|(i, x)| i == 10 || i == 1000 || *x == 7));
	Ok(())
}
