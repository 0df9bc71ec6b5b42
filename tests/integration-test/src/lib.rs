use std::sync::Arc;
use vgpu::config::GpuOptions;
use vgpu::platform::ash::init::ash_init_single_queue;
use vgpu::platform::ash::Ash;
use vgpu::platform::host::{HostPlatform, HostPlatformCreateInfo};

pub mod compute;
pub mod draw;
pub mod lifecycle;
pub mod transfer;

pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

pub fn host() -> Arc<HostPlatform> {
	init_logger();
	HostPlatform::new(HostPlatformCreateInfo::default())
}

/// A Vulkan device selected like an application would, `None` if this machine has no Vulkan driver.
pub fn ash() -> Option<Arc<Ash>> {
	init_logger();
	match ash_init_single_queue(vgpu::app_config_from_cargo!(), &GpuOptions::from_env(false)) {
		Ok(create_info) => Some(Ash::new(create_info)),
		Err(e) => {
			log::warn!("skipping Vulkan test, no device available: {e}");
			None
		}
	}
}
