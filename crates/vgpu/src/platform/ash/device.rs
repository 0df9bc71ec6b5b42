use crate::descriptor::descriptor_counts::DescriptorCounts;
use crate::memory::memory_type::{DeviceInfo, DeviceLimits, MemoryHeap, MemoryProperties, MemoryPropertyFlags, MemoryType};
use ash::ext::debug_utils;
use ash::prelude::VkResult;
use ash::vk::{
	CommandBufferAllocateInfo, CommandBufferLevel, CommandPoolCreateFlags, CommandPoolCreateInfo,
	DebugUtilsObjectNameInfoEXT, Handle, MemoryHeapFlags, PipelineCache,
};
use ash::Device;
use crossbeam_queue::SegQueue;
use gpu_allocator::vulkan::{Allocation, Allocator};
use gpu_allocator::AllocationError;
use parking_lot::{Mutex, MutexGuard};
use static_assertions::assert_impl_all;
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

pub struct AshCreateInfo {
	pub entry: ash::Entry,
	pub instance: ash::Instance,
	pub physical_device: ash::vk::PhysicalDevice,
	pub device: ash::Device,
	pub memory_allocator: Option<Mutex<Allocator>>,
	pub queue_family_index: u32,
	pub queue: Mutex<ash::vk::Queue>,
	pub cache: Option<PipelineCache>,
	pub debug_utils: Option<debug_utils::Device>,
	pub destroy: Option<AshDestroyFn>,
}

pub type AshDestroyFn = Box<dyn FnOnce(&mut AshCreateInfo) + Send + Sync>;

impl AshCreateInfo {
	pub fn memory_allocator(&self) -> Result<MutexGuard<'_, Allocator>, AshError> {
		self.memory_allocator
			.as_ref()
			.map(Mutex::lock)
			.ok_or(AshError::Vk(ash::vk::Result::ERROR_INITIALIZATION_FAILED))
	}
}

impl Drop for AshCreateInfo {
	fn drop(&mut self) {
		if let Some(destroy) = self.destroy.take() {
			destroy(self);
		}
	}
}

/// A Vulkan device with a single queue.
pub struct Ash {
	pub create_info: AshCreateInfo,
	pub(crate) info: DeviceInfo,
	/// Command pools of freed command buffers, reset and reused by the next allocation
	pub(crate) free_commands: SegQueue<AshCommandBuffer>,
}
assert_impl_all!(Ash: Send, Sync);

impl Ash {
	pub fn new(create_info: AshCreateInfo) -> Arc<Self> {
		let info = unsafe { Self::query_device_info(&create_info) };
		log::info!("created device {:?} with limits {:?}", info.name, info.limits);
		Arc::new(Ash {
			create_info,
			info,
			free_commands: SegQueue::new(),
		})
	}

	unsafe fn query_device_info(create_info: &AshCreateInfo) -> DeviceInfo {
		let instance = &create_info.instance;
		let properties = instance.get_physical_device_properties(create_info.physical_device);
		let memory = instance.get_physical_device_memory_properties(create_info.physical_device);
		let limits = properties.limits;
		DeviceInfo {
			name: properties
				.device_name_as_c_str()
				.map_or(Cow::Borrowed("unknown"), CStr::to_string_lossy)
				.into_owned(),
			memory: MemoryProperties {
				types: memory
					.memory_types_as_slice()
					.iter()
					.map(|t| MemoryType {
						flags: MemoryPropertyFlags::from_ash(t.property_flags),
						heap_index: t.heap_index,
					})
					.collect(),
				heaps: memory
					.memory_heaps_as_slice()
					.iter()
					.map(|h| MemoryHeap {
						size: h.size,
						device_local: h.flags.contains(MemoryHeapFlags::DEVICE_LOCAL),
					})
					.collect(),
			},
			limits: DeviceLimits {
				max_compute_work_group_count: limits.max_compute_work_group_count,
				min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
				min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
				optimal_buffer_copy_offset_alignment: limits.optimal_buffer_copy_offset_alignment,
				max_bound_descriptor_sets: limits.max_bound_descriptor_sets,
				max_image_dimension_2d: limits.max_image_dimension2_d,
				descriptors_per_set: DescriptorCounts {
					uniform_buffers: limits.max_descriptor_set_uniform_buffers,
					storage_buffers: limits.max_descriptor_set_storage_buffers,
					sampled_images: u32::min(
						limits.max_descriptor_set_sampled_images,
						limits.max_descriptor_set_samplers,
					),
					storage_images: limits.max_descriptor_set_storage_images,
				},
			},
		}
	}

	pub unsafe fn set_debug_object_name(&self, handle: impl Handle, name: &str) -> VkResult<()> {
		if let Some(debug_utils) = self.debug_utils.as_ref() {
			// names with interior nul bytes are not worth failing over
			if let Ok(name) = CString::new(name) {
				debug_utils.set_debug_utils_object_name(
					&DebugUtilsObjectNameInfoEXT::default()
						.object_handle(handle)
						.object_name(&name),
				)?;
			}
		}
		Ok(())
	}
}

impl Deref for Ash {
	type Target = AshCreateInfo;

	fn deref(&self) -> &Self::Target {
		&self.create_info
	}
}

impl Drop for Ash {
	fn drop(&mut self) {
		unsafe {
			if let Err(e) = self.device.device_wait_idle() {
				log::error!("device_wait_idle on drop failed: {e}");
			}
			while let Some(cmd) = self.free_commands.pop() {
				cmd.destroy(&self.create_info.device);
			}
		}
	}
}

#[derive(Error)]
pub enum AshError {
	#[error("VkResult: {0}")]
	Vk(#[from] ash::vk::Result),
	#[error("gpu-allocator Error: {0}")]
	Allocation(#[from] AllocationError),
	#[error("{0} is not supported")]
	Unsupported(Cow<'static, str>),
}

impl core::fmt::Debug for AshError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

pub struct AshBlock {
	pub buffer: ash::vk::Buffer,
	/// Only `None` while freeing
	pub allocation: Option<Allocation>,
	pub size: u64,
}

pub struct AshImage {
	pub image: ash::vk::Image,
	pub view: ash::vk::ImageView,
	pub sampler: Option<ash::vk::Sampler>,
	pub allocation: Option<Allocation>,
	pub format: ash::vk::Format,
	pub extent: [u32; 2],
}

pub struct AshDescriptorPool {
	pub pool: ash::vk::DescriptorPool,
	pub sets: Vec<ash::vk::DescriptorSet>,
}

/// A primary command buffer with its own transient pool, so resetting it never touches other command buffers.
pub struct AshCommandBuffer {
	pub pool: ash::vk::CommandPool,
	pub cmd: ash::vk::CommandBuffer,
	pub(crate) render_extent: Option<[u32; 2]>,
}

impl AshCommandBuffer {
	pub(crate) fn new(device: &Device, queue_family_index: u32) -> VkResult<Self> {
		unsafe {
			let pool = device.create_command_pool(
				&CommandPoolCreateInfo::default()
					.flags(CommandPoolCreateFlags::TRANSIENT)
					.queue_family_index(queue_family_index),
				None,
			)?;
			let cmd = match device.allocate_command_buffers(
				&CommandBufferAllocateInfo::default()
					.command_pool(pool)
					.level(CommandBufferLevel::PRIMARY)
					.command_buffer_count(1),
			) {
				Ok(cmds) => cmds[0],
				Err(e) => {
					device.destroy_command_pool(pool, None);
					return Err(e);
				}
			};
			Ok(Self {
				pool,
				cmd,
				render_extent: None,
			})
		}
	}

	pub(crate) unsafe fn destroy(&self, device: &Device) {
		device.free_command_buffers(self.pool, &[self.cmd]);
		device.destroy_command_pool(self.pool, None);
	}
}

/// A SPIR-V module and the entry point to invoke.
#[derive(Clone, Debug)]
pub struct SpirvShader {
	pub code: Vec<u32>,
	pub entry_point: CString,
}

impl SpirvShader {
	pub fn new(code: Vec<u32>, entry_point: &str) -> Result<Self, AshError> {
		Ok(Self {
			code,
			entry_point: CString::new(entry_point).map_err(|_| AshError::Unsupported("entry point name".into()))?,
		})
	}

	/// Reads SPIR-V from bytes, as emitted by shader compilers.
	pub fn from_bytes(bytes: &[u8], entry_point: &str) -> Result<Self, AshError> {
		let code = ash::util::read_spv(&mut Cursor::new(bytes))
			.map_err(|_| AshError::Vk(ash::vk::Result::ERROR_INVALID_SHADER_NV))?;
		Self::new(code, entry_point)
	}
}
