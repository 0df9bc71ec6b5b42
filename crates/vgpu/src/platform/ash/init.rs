use crate::config::{select_device, DeviceCandidate, GpuOptions};
use crate::platform::ash::AshCreateInfo;
use anyhow::anyhow;
use ash::ext::debug_utils;
use ash::vk::{
	ApplicationInfo, Bool32, DebugUtilsMessageSeverityFlagsEXT, DebugUtilsMessageTypeFlagsEXT,
	DebugUtilsMessengerCallbackDataEXT, DebugUtilsMessengerCreateInfoEXT, DeviceCreateInfo, DeviceQueueCreateInfo,
	InstanceCreateInfo, MemoryHeapFlags, PhysicalDeviceFeatures, PhysicalDeviceType, PhysicalDeviceVulkan12Features,
	PhysicalDeviceVulkan13Features, PipelineCacheCreateInfo, QueueFlags,
};
use ash::Entry;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::{AllocationSizes, AllocatorDebugSettings};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::ffi::{c_void, CStr, CString};

pub fn required_features() -> PhysicalDeviceFeatures {
	PhysicalDeviceFeatures::default()
		.shader_storage_buffer_array_dynamic_indexing(true)
		.shader_uniform_buffer_array_dynamic_indexing(true)
		.shader_storage_image_array_dynamic_indexing(true)
		.shader_sampled_image_array_dynamic_indexing(true)
}

pub fn required_features_vk12() -> PhysicalDeviceVulkan12Features<'static> {
	PhysicalDeviceVulkan12Features::default().vulkan_memory_model(true)
}

pub fn required_features_vk13() -> PhysicalDeviceVulkan13Features<'static> {
	PhysicalDeviceVulkan13Features::default()
		.synchronization2(true)
		.dynamic_rendering(true)
}

pub const LAYER_VALIDATION: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct AppConfig<'a> {
	pub name: &'a str,
	pub version: u32,
}

impl Default for AppConfig<'_> {
	fn default() -> Self {
		Self {
			name: "Unknown App",
			version: 0,
		}
	}
}

pub const fn compile_time_parse(input: &'static str) -> u32 {
	match konst::primitive::parse_u32(input) {
		Ok(e) => e,
		Err(_) => panic!("cargo package version is not a number"),
	}
}

/// An [`AppConfig`] named and versioned after the invoking crate.
#[macro_export]
macro_rules! app_config_from_cargo {
	() => {
		$crate::platform::ash::init::AppConfig {
			name: env!("CARGO_PKG_NAME"),
			version: $crate::__private::make_api_version(
				0,
				$crate::platform::ash::init::compile_time_parse(env!("CARGO_PKG_VERSION_MAJOR")),
				$crate::platform::ash::init::compile_time_parse(env!("CARGO_PKG_VERSION_MINOR")),
				$crate::platform::ash::init::compile_time_parse(env!("CARGO_PKG_VERSION_PATCH")),
			),
		}
	};
}

/// Creates an [`AshCreateInfo`] with one device and one queue, selected according to `options`.
///
/// Without a device override the discrete device with the largest heap is chosen. A compute device prefers a queue
/// family without graphics support.
///
/// If any of the steps were to fail during initialization, this method currently does not clean up after itself
/// correctly. It will only destroy itself correctly if the entire initialization succeeds.
pub fn ash_init_single_queue(app: AppConfig<'_>, options: &GpuOptions) -> anyhow::Result<AshCreateInfo> {
	unsafe {
		let entry = Entry::load()?;
		let app_name = CString::new(app.name)?;

		let instance = {
			let mut layers = SmallVec::<[_; 1]>::new();
			if options.debug {
				layers.push(LAYER_VALIDATION.as_ptr());
			}
			let extensions = [debug_utils::NAME.as_ptr()];
			entry.create_instance(
				&InstanceCreateInfo::default()
					.application_info(
						&ApplicationInfo::default()
							.application_name(&app_name)
							.application_version(app.version)
							.engine_name(c"vgpu")
							.engine_version(1)
							.api_version(ash::vk::make_api_version(0, 1, 3, 0)),
					)
					.enabled_extension_names(&extensions)
					.enabled_layer_names(&layers),
				None,
			)?
		};

		let debug_instance = debug_utils::Instance::new(&entry, &instance);
		let debug_messenger = {
			let mut severity = DebugUtilsMessageSeverityFlagsEXT::ERROR | DebugUtilsMessageSeverityFlagsEXT::WARNING;
			if options.debug {
				severity |= DebugUtilsMessageSeverityFlagsEXT::INFO;
			}
			debug_instance.create_debug_utils_messenger(
				&DebugUtilsMessengerCreateInfoEXT::default()
					.message_severity(severity)
					.message_type(
						DebugUtilsMessageTypeFlagsEXT::GENERAL
							| DebugUtilsMessageTypeFlagsEXT::VALIDATION
							| DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
					)
					.pfn_user_callback(Some(log_debug_callback)),
				None,
			)?
		};

		let physical_device = {
			let devices = instance.enumerate_physical_devices()?;
			let candidates = devices
				.iter()
				.map(|phy| {
					let properties = instance.get_physical_device_properties(*phy);
					let memory = instance.get_physical_device_memory_properties(*phy);
					DeviceCandidate {
						name: properties
							.device_name_as_c_str()
							.map_or(Cow::Borrowed("unknown"), CStr::to_string_lossy)
							.into_owned(),
						discrete: properties.device_type == PhysicalDeviceType::DISCRETE_GPU,
						largest_heap: memory
							.memory_heaps_as_slice()
							.iter()
							.filter(|h| h.flags.contains(MemoryHeapFlags::DEVICE_LOCAL))
							.map(|h| h.size)
							.max()
							.unwrap_or(0),
					}
				})
				.collect::<Vec<_>>();
			if options.debug {
				log::info!("physical devices: {candidates:?}");
			}
			let index = select_device(&candidates, options.device_select.as_ref()).ok_or_else(|| match &options
				.device_select
			{
				Some(select) => anyhow!("No {select} available"),
				None => anyhow!("No physical devices available"),
			})?;
			log::info!("selected device {:?}", candidates[index].name);
			devices[index]
		};

		let queue_family_index = {
			let families = instance.get_physical_device_queue_family_properties(physical_device);
			let compute_only = families
				.iter()
				.position(|f| f.queue_flags.contains(QueueFlags::COMPUTE) && !f.queue_flags.contains(QueueFlags::GRAPHICS));
			let universal = families
				.iter()
				.position(|f| f.queue_flags.contains(QueueFlags::GRAPHICS | QueueFlags::COMPUTE));
			let family = if options.compute {
				compute_only.or(universal)
			} else {
				universal
			};
			family.ok_or(anyhow!("No suitable queue family on physical device available"))? as u32
		};

		let device = {
			let mut features_vk12 = required_features_vk12();
			let mut features_vk13 = required_features_vk13();
			instance.create_device(
				physical_device,
				&DeviceCreateInfo::default()
					.enabled_features(&required_features())
					.push_next(&mut features_vk12)
					.push_next(&mut features_vk13)
					.queue_create_infos(&[DeviceQueueCreateInfo::default()
						.queue_family_index(queue_family_index)
						.queue_priorities(&[1.])]),
				None,
			)?
		};

		let queue = device.get_device_queue(queue_family_index, 0);
		let memory_allocator = Allocator::new(&AllocatorCreateDesc {
			instance: instance.clone(),
			device: device.clone(),
			physical_device,
			debug_settings: AllocatorDebugSettings::default(),
			buffer_device_address: false,
			allocation_sizes: AllocationSizes::default(),
		})?;
		let cache = device.create_pipeline_cache(&PipelineCacheCreateInfo::default(), None)?;
		let debug_utils = Some(debug_utils::Device::new(&instance, &device));

		Ok(AshCreateInfo {
			entry,
			instance,
			physical_device,
			device,
			queue_family_index,
			queue: Mutex::new(queue),
			memory_allocator: Some(Mutex::new(memory_allocator)),
			cache: Some(cache),
			debug_utils,
			destroy: Some(Box::new(move |create_info| {
				let instance = &create_info.instance;
				let device = &create_info.device;

				create_info.debug_utils = None;
				if let Some(cache) = create_info.cache.take() {
					device.destroy_pipeline_cache(cache, None);
				}
				drop(create_info.memory_allocator.take());
				device.destroy_device(None);
				debug_instance.destroy_debug_utils_messenger(debug_messenger, None);
				instance.destroy_instance(None);
			})),
		})
	}
}

/// All child objects created on device must have been destroyed prior to destroying device
const VUID_VK_DESTROY_DEVICE_DEVICE_05137: i32 = 0x4872eaa0;

const IGNORED_MSG_IDS: &[i32] = &[VUID_VK_DESTROY_DEVICE_DEVICE_05137];

unsafe extern "system" fn log_debug_callback(
	message_severity: DebugUtilsMessageSeverityFlagsEXT,
	message_type: DebugUtilsMessageTypeFlagsEXT,
	callback_data: *const DebugUtilsMessengerCallbackDataEXT<'_>,
	_p_user_data: *mut c_void,
) -> Bool32 {
	let callback_data = *callback_data;
	let message_id_number = callback_data.message_id_number;
	if IGNORED_MSG_IDS.contains(&message_id_number) {
		return false.into();
	}
	let message_id_name = callback_data
		.message_id_name_as_c_str()
		.map_or(Cow::Borrowed(""), CStr::to_string_lossy);
	let message = callback_data
		.message_as_c_str()
		.map_or(Cow::Borrowed("No message"), CStr::to_string_lossy);
	let args = format!("{message_type:?} [{message_id_name} ({message_id_number:#x})]: {message}");

	if message_severity.contains(DebugUtilsMessageSeverityFlagsEXT::ERROR) {
		log::error!("{args}");
	} else if message_severity.contains(DebugUtilsMessageSeverityFlagsEXT::WARNING) {
		log::warn!("{args}");
	} else {
		log::debug!("{args}");
	}
	false.into()
}
