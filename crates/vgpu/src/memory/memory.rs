use crate::backing::align::checked_align_up;
use crate::descriptor::layout::DescriptorResource;
use crate::memory::block::{BlockCreateInfo, BlockHandle, BlockUsage, CopyRegion, MemoryBlock};
use crate::memory::error::MemoryError;
use crate::memory::image::{ImageCreateInfo, ImageHandle, ImageUsage};
use crate::memory::mem_buffer::{BufferKind, MemBuffer};
use crate::memory::memory_type::MemoryPropertyFlags;
use crate::pipeline::execution::{ExecutionError, PendingExecution};
use crate::pipeline::stage::{AccessScope, Barrier};
use crate::platform::GpuPlatform;
use crate::vars::{ElementType, ImageFormat, Value, ValueId, Var, VarRole, Vars, VarsError};
use presser::Slab;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::ptr::NonNull;
use std::sync::Arc;

/// Blocks are sized in multiples of this.
pub const BLOCK_GRANULARITY: u64 = 256;

/// A device image owned by a [`Memory`].
pub struct DeviceImage<P: GpuPlatform> {
	pub(crate) image: P::Image,
	pub name: String,
	pub format: ImageFormat,
	pub extent: [u32; 2],
	pub usage: ImageUsage,
	/// The image Value this image backs, `None` for images owned by the System itself like the render target
	pub owner: Option<ValueId>,
	heap_index: Option<u32>,
}

impl<P: GpuPlatform> DeviceImage<P> {
	pub fn platform_image(&self) -> &P::Image {
		&self.image
	}

	/// Bytes of a tightly packed copy of the whole image.
	pub fn byte_size(&self) -> u64 {
		self.extent[0] as u64 * self.extent[1] as u64 * self.format.texel_size()
	}
}

/// What a transfer submission moved.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SyncStats {
	/// Number of block to block copy commands, at most one per destination block and queued copy
	pub copy_commands: u32,
	pub regions: u32,
	pub bytes: u64,
	pub images: u32,
}

struct QueuedCopy {
	src: BlockHandle,
	dst: BlockHandle,
	regions: SmallVec<[CopyRegion; 4]>,
}

/// Owns every block and image of a System and moves data between the host views of Values and the device.
///
/// Each [`BufferKind`] is backed by a host visible staging block and a device local block of equal size, Values of
/// that kind occupy the same aligned range in both. Image Values stage through the texel buffer.
pub struct Memory<P: GpuPlatform> {
	platform: Arc<P>,
	name: String,
	debug: bool,
	blocks: Vec<Option<MemoryBlock<P>>>,
	heap_usage: Vec<u64>,
	buffers: [MemBuffer; BufferKind::COUNT],
	images: Vec<Option<DeviceImage<P>>>,
	queued_copies: Vec<QueuedCopy>,
	uninit_images: Vec<ImageHandle>,
	writers: HashMap<ValueId, PendingExecution<P>>,
	transfer_cmd: Option<P::CommandBuffer>,
	readback: Option<BlockHandle>,
}

impl<P: GpuPlatform> Memory<P> {
	pub fn new(platform: Arc<P>, name: &str, debug: bool) -> Self {
		let heaps = platform.device_info().memory.heaps.len();
		Self {
			platform,
			name: name.to_string(),
			debug,
			blocks: Vec::new(),
			heap_usage: vec![0; heaps],
			buffers: [MemBuffer::default(); BufferKind::COUNT],
			images: Vec::new(),
			queued_copies: Vec::new(),
			uninit_images: Vec::new(),
			writers: HashMap::new(),
			transfer_cmd: None,
			readback: None,
		}
	}

	pub fn platform(&self) -> &Arc<P> {
		&self.platform
	}

	/// Bytes this Memory allocated from heap `heap`.
	pub fn heap_usage(&self, heap: u32) -> u64 {
		self.heap_usage.get(heap as usize).copied().unwrap_or(0)
	}

	/// Bytes of heap `heap` not yet allocated by this Memory.
	pub fn heap_available(&self, heap: u32) -> u64 {
		self.platform
			.device_info()
			.memory
			.heaps
			.get(heap as usize)
			.map_or(0, |h| h.size.saturating_sub(self.heap_usage(heap)))
	}

	pub fn buffer(&self, kind: BufferKind) -> &MemBuffer {
		&self.buffers[kind.index()]
	}

	pub fn block(&self, handle: BlockHandle) -> Result<&MemoryBlock<P>, MemoryError<P>> {
		self.blocks
			.get(handle.index())
			.and_then(Option::as_ref)
			.ok_or(MemoryError::InvalidBlock(handle))
	}

	pub fn image(&self, handle: ImageHandle) -> Result<&DeviceImage<P>, MemoryError<P>> {
		self.images
			.get(handle.index())
			.and_then(Option::as_ref)
			.ok_or(MemoryError::InvalidImage(handle))
	}

	fn find_heap(&self, flags: MemoryPropertyFlags) -> Result<(u32, u32), MemoryError<P>> {
		let memory = &self.platform.device_info().memory;
		let type_index = memory
			.find_type(flags)
			.ok_or(MemoryError::UnsupportedMemoryType(flags))?;
		Ok((type_index, memory.types[type_index as usize].heap_index))
	}

	fn largest_heap_available(&self) -> u64 {
		(0..self.heap_usage.len() as u32)
			.map(|heap| self.heap_available(heap))
			.max()
			.unwrap_or(0)
	}

	fn check_available(&self, heap: u32, requested: u64, name: &str) -> Result<(), MemoryError<P>> {
		let available = self.heap_available(heap);
		if requested > available {
			Err(MemoryError::OutOfMemory {
				name: name.to_string(),
				requested,
				available,
			})
		} else {
			Ok(())
		}
	}

	/// Allocates a block of at least `size` bytes from a memory type supporting `memory_type`.
	pub fn allocate(&mut self, size: u64, memory_type: MemoryPropertyFlags) -> Result<BlockHandle, MemoryError<P>> {
		self.allocate_with(&BlockCreateInfo {
			name: "block",
			size,
			usage: BlockUsage::TRANSFER | BlockUsage::STORAGE_BUFFER,
			memory_type,
		})
	}

	/// Allocates a block, failing with [`MemoryError::OutOfMemory`] if its heap has not enough space left. Host
	/// visible blocks start zeroed.
	pub fn allocate_with(&mut self, create_info: &BlockCreateInfo) -> Result<BlockHandle, MemoryError<P>> {
		let (type_index, heap_index) = self.find_heap(create_info.memory_type)?;
		let size = checked_align_up(create_info.size.max(1), BLOCK_GRANULARITY).ok_or_else(|| MemoryError::OutOfMemory {
			name: create_info.name.to_string(),
			requested: create_info.size,
			available: self.heap_available(heap_index),
		})?;
		self.check_available(heap_index, size, create_info.name)?;

		let mut block = unsafe {
			self.platform.alloc_block(&BlockCreateInfo {
				size,
				..*create_info
			})
		}
		.map_err(MemoryError::Platform)?;
		let mapped = unsafe { P::mapped_block_to_slab(&mut block) }.and_then(|slab| {
			let bytes = unsafe { slab.assume_initialized_as_bytes_mut() };
			bytes.fill(0);
			NonNull::new(bytes.as_mut_ptr())
		});
		self.heap_usage[heap_index as usize] += size;
		log::trace!("{}: allocated {} bytes for {:?} in heap {}", self.name, size, create_info.name, heap_index);

		let handle = BlockHandle(self.blocks.len() as u32);
		self.blocks.push(Some(MemoryBlock {
			block,
			name: create_info.name.to_string(),
			size,
			memory_type: create_info.memory_type,
			type_index,
			heap_index,
			mapped,
		}));
		Ok(handle)
	}

	/// Frees a block and drops queued copies involving it.
	///
	/// # Safety
	/// The block must not be in use by any pending execution.
	pub unsafe fn free(&mut self, handle: BlockHandle) -> Result<(), MemoryError<P>> {
		self.block(handle)?;
		self.free_block(handle);
		self.queued_copies.retain(|c| c.src != handle && c.dst != handle);
		Ok(())
	}

	unsafe fn free_block(&mut self, handle: BlockHandle) {
		if let Some(block) = self.blocks.get_mut(handle.index()).and_then(Option::take) {
			self.heap_usage[block.heap_index as usize] -= block.size;
			self.platform.free_block(block.block);
		}
	}

	fn check_range(block: &MemoryBlock<P>, offset: u64, len: u64) -> Result<Range<usize>, MemoryError<P>> {
		match offset.checked_add(len) {
			Some(end) if end <= block.size => Ok(offset as usize..end as usize),
			_ => Err(MemoryError::RangeOutOfBounds {
				offset,
				len,
				size: block.size,
			}),
		}
	}

	/// Host access to `len` bytes of a host visible block starting at `offset`.
	pub fn map_range(&mut self, handle: BlockHandle, offset: u64, len: u64) -> Result<&mut [u8], MemoryError<P>> {
		let block = self.block(handle)?;
		let mapped = block.mapped.ok_or(MemoryError::NotMappable(handle))?;
		let range = Self::check_range(block, offset, len)?;
		// Safety: mapped is valid for block.size bytes and borrowed mutably through self
		Ok(unsafe { std::slice::from_raw_parts_mut(mapped.as_ptr().add(range.start), range.len()) })
	}

	/// Read only variant of [`Self::map_range`].
	pub fn mapped(&self, handle: BlockHandle, offset: u64, len: u64) -> Result<&[u8], MemoryError<P>> {
		let block = self.block(handle)?;
		let mapped = block.mapped.ok_or(MemoryError::NotMappable(handle))?;
		let range = Self::check_range(block, offset, len)?;
		Ok(unsafe { std::slice::from_raw_parts(mapped.as_ptr().add(range.start), range.len()) })
	}

	/// Copies `data` into a host visible block at byte `offset`.
	pub fn write_block<T: Copy>(&mut self, handle: BlockHandle, offset: u64, data: &[T]) -> Result<(), MemoryError<P>> {
		let len = std::mem::size_of_val(data) as u64;
		let block = self
			.blocks
			.get_mut(handle.index())
			.and_then(Option::as_mut)
			.ok_or(MemoryError::InvalidBlock(handle))?;
		Self::check_range(block, offset, len)?;
		let size = block.size;
		let slab = unsafe { P::mapped_block_to_slab(&mut block.block) }.ok_or(MemoryError::NotMappable(handle))?;
		presser::copy_from_slice_to_offset(data, slab, offset as usize)
			.map_err(|_| MemoryError::RangeOutOfBounds { offset, len, size })?;
		Ok(())
	}

	/// Queues a block to block copy. It executes in the next transfer submission, after the dirty Values of that
	/// submission were uploaded.
	pub fn copy(&mut self, src: BlockHandle, dst: BlockHandle, regions: &[CopyRegion]) -> Result<(), MemoryError<P>> {
		let src_block = self.block(src)?;
		let dst_block = self.block(dst)?;
		for region in regions {
			Self::check_range(src_block, region.src_offset, region.size)?;
			Self::check_range(dst_block, region.dst_offset, region.size)?;
		}
		if !regions.is_empty() {
			self.queued_copies.push(QueuedCopy {
				src,
				dst,
				regions: regions.into(),
			});
		}
		Ok(())
	}

	pub fn has_queued_copies(&self) -> bool {
		!self.queued_copies.is_empty()
	}

	/// Allocates a device image. It gets initialized by the next transfer submission.
	pub fn allocate_image(
		&mut self,
		create_info: &ImageCreateInfo,
		owner: Option<ValueId>,
	) -> Result<ImageHandle, MemoryError<P>> {
		let size = create_info.byte_size();
		let heap_index = match self.find_heap(MemoryPropertyFlags::DEVICE_LOCAL) {
			Ok((_, heap)) => {
				self.check_available(heap, size, create_info.name)?;
				Some(heap)
			}
			Err(_) => None,
		};
		let image = unsafe { self.platform.alloc_image(create_info) }.map_err(MemoryError::Platform)?;
		if let Some(heap) = heap_index {
			self.heap_usage[heap as usize] += size;
		}

		let handle = ImageHandle(self.images.len() as u32);
		self.images.push(Some(DeviceImage {
			image,
			name: create_info.name.to_string(),
			format: create_info.format,
			extent: create_info.extent,
			usage: create_info.usage,
			owner,
			heap_index,
		}));
		self.uninit_images.push(handle);
		Ok(handle)
	}

	unsafe fn free_image(&mut self, handle: ImageHandle) {
		if let Some(image) = self.images.get_mut(handle.index()).and_then(Option::take) {
			if let Some(heap) = image.heap_index {
				self.heap_usage[heap as usize] -= image.byte_size();
			}
			self.uninit_images.retain(|h| *h != handle);
			self.platform.free_image(image.image);
		}
	}

	/// Lays out every Value of `vars` in the memory buffers of their role and allocates the image Values' images.
	///
	/// Buffers whose layout changed are reallocated, new blocks are allocated before the old ones are freed so a
	/// failed allocation leaves the previous layout intact. The host views of Values in reallocated buffers are
	/// preserved and marked dirty, as the new device blocks start out uninitialized. Buffers with an unchanged layout
	/// keep their device contents and dirty state. Returns whether anything was reallocated.
	///
	/// # Safety
	/// No execution accessing this Memory may be pending.
	pub(crate) unsafe fn config(&mut self, vars: &mut Vars) -> Result<bool, MemoryError<P>> {
		let limits = self.platform.device_info().limits;

		let mut sizes = [0u64; BufferKind::COUNT];
		let mut layout = Vec::new();
		for var in vars.vars() {
			if let Some(extent) = var.extent() {
				if extent[0] > limits.max_image_dimension_2d || extent[1] > limits.max_image_dimension_2d {
					return Err(VarsError::InvalidExtent {
						name: var.name().to_string(),
						extent,
						max: limits.max_image_dimension_2d,
					}
					.into());
				}
			}
			let kind = var.role().buffer_kind();
			let align = var.role().alignment(var.element_type(), &limits);
			let alloc_size = var.role().alloc_size(var.element_type(), var.count(), &limits);
			for value in var.values() {
				let placed = checked_align_up(sizes[kind.index()], align)
					.and_then(|offset| Some((offset, offset.checked_add(alloc_size)?)));
				let Some((offset, end)) = placed else {
					return Err(MemoryError::OutOfMemory {
						name: var.name().to_string(),
						requested: u64::MAX,
						available: self.largest_heap_available(),
					});
				};
				sizes[kind.index()] = end;
				layout.push((value.id, kind, offset, alloc_size));
			}
		}

		let mut changed = [false; BufferKind::COUNT];
		for kind in BufferKind::ALL {
			changed[kind.index()] = self.buffers[kind.index()].size != sizes[kind.index()];
		}
		for &(id, kind, offset, _) in &layout {
			if vars.value(id)?.offset != Some(offset) {
				changed[kind.index()] = true;
			}
		}

		let mut new_buffers = self.buffers;
		let mut allocated = SmallVec::<[BlockHandle; 2 * BufferKind::COUNT]>::new();
		if let Err(e) = self.alloc_buffers(&sizes, &changed, &mut new_buffers, &mut allocated) {
			for handle in allocated {
				self.free_block(handle);
			}
			return Err(e);
		}

		for &(id, kind, offset, _) in &layout {
			let i = kind.index();
			if !changed[i] {
				continue;
			}
			let value = vars.value(id)?;
			if let (Some(old_offset), Some(old_host), Some(new_host)) = (value.offset, self.buffers[i].host, new_buffers[i].host)
			{
				let src = self.mapped(old_host, old_offset, value.size)?.as_ptr();
				let dst = self.map_range(new_host, offset, value.size)?.as_mut_ptr();
				// distinct blocks never overlap
				std::ptr::copy_nonoverlapping(src, dst, value.size as usize);
			}
		}

		for kind in BufferKind::ALL {
			let i = kind.index();
			if changed[i] {
				let old = std::mem::replace(&mut self.buffers[i], new_buffers[i]);
				for handle in old.host.into_iter().chain(old.device) {
					self.free_block(handle);
				}
			}
		}
		let blocks = &self.blocks;
		let live = |h: BlockHandle| blocks.get(h.index()).is_some_and(Option::is_some);
		self.queued_copies.retain(|c| live(c.src) && live(c.dst));

		for &(id, kind, offset, alloc_size) in &layout {
			let value = vars.value_mut(id)?;
			value.alloc_size = alloc_size;
			if changed[kind.index()] {
				value.offset = Some(offset);
				if kind.has_device_block() {
					value.set_mod();
				}
			}
		}

		let images_changed = self.config_images(vars)?;
		let any_changed = changed.iter().any(|c| *c) || images_changed;
		if any_changed {
			let message = BufferKind::ALL
				.iter()
				.filter(|k| sizes[k.index()] > 0)
				.map(|k| format!("{} {}", k.name(), sizes[k.index()]))
				.collect::<Vec<_>>()
				.join(", ");
			if self.debug {
				log::info!("{}: memory layout [{}], {} images", self.name, message, self.images.iter().flatten().count());
			} else {
				log::debug!("{}: memory layout [{}]", self.name, message);
			}
		}
		Ok(any_changed)
	}

	fn alloc_buffers(
		&mut self,
		sizes: &[u64; BufferKind::COUNT],
		changed: &[bool; BufferKind::COUNT],
		buffers: &mut [MemBuffer; BufferKind::COUNT],
		allocated: &mut SmallVec<[BlockHandle; 2 * BufferKind::COUNT]>,
	) -> Result<(), MemoryError<P>> {
		for kind in BufferKind::ALL {
			let i = kind.index();
			if !changed[i] {
				continue;
			}
			let size = sizes[i];
			if size == 0 {
				buffers[i] = MemBuffer::default();
				continue;
			}

			let host_name = format!("{} {} staging", self.name, kind.name());
			let host = self.allocate_with(&BlockCreateInfo {
				name: &host_name,
				size,
				usage: BlockUsage::TRANSFER,
				memory_type: MemoryPropertyFlags::STAGING,
			})?;
			allocated.push(host);
			let device = if kind.has_device_block() {
				let device_name = format!("{} {}", self.name, kind.name());
				let device = self.allocate_with(&BlockCreateInfo {
					name: &device_name,
					size,
					usage: kind.device_usage(),
					memory_type: MemoryPropertyFlags::DEVICE_LOCAL,
				})?;
				allocated.push(device);
				Some(device)
			} else {
				None
			};
			buffers[i] = MemBuffer {
				size,
				host: Some(host),
				device,
			};
		}
		Ok(())
	}

	unsafe fn config_images(&mut self, vars: &mut Vars) -> Result<bool, MemoryError<P>> {
		let wanted = vars
			.values()
			.filter_map(|(var, value)| match (var.role(), var.element_type(), var.extent()) {
				(role @ (VarRole::SampledImage | VarRole::StorageImage), ElementType::Texel(format), Some(extent)) => {
					let usage = ImageUsage::TRANSFER_SRC
						| ImageUsage::TRANSFER_DST
						| match role {
							VarRole::StorageImage => ImageUsage::STORAGE,
							_ => ImageUsage::SAMPLED,
						};
					Some((value.id, format!("{}[{}]", var.name(), value.id.index), format, extent, usage, value.image))
				}
				_ => None,
			})
			.collect::<Vec<_>>();

		let mut changed = false;
		let mut referenced = HashSet::new();
		for (id, name, format, extent, usage, current) in wanted {
			let reusable = current.and_then(|h| self.image(h).ok().map(|image| (h, image))).filter(|(_, image)| {
				image.owner == Some(id) && image.format == format && image.extent == extent && image.usage == usage
			});
			if let Some((handle, _)) = reusable {
				referenced.insert(handle);
				continue;
			}
			let handle = self.allocate_image(
				&ImageCreateInfo {
					name: &name,
					format,
					extent,
					usage,
				},
				Some(id),
			)?;
			referenced.insert(handle);
			let value = vars.value_mut(id)?;
			value.image = Some(handle);
			value.set_mod();
			changed = true;
		}

		let orphans = self
			.images
			.iter()
			.enumerate()
			.filter_map(|(i, image)| {
				let handle = ImageHandle(i as u32);
				let image = image.as_ref()?;
				(image.owner.is_some() && !referenced.contains(&handle)).then_some(handle)
			})
			.collect::<Vec<_>>();
		for handle in orphans {
			self.free_image(handle);
			changed = true;
		}
		Ok(changed)
	}

	fn value_location(&self, var: &Var, value: &Value) -> Result<(BlockHandle, u64), MemoryError<P>> {
		let offset = value.offset.ok_or(MemoryError::NotAllocated(value.id))?;
		let host = self.buffers[var.role().buffer_kind().index()]
			.host
			.ok_or(MemoryError::NotAllocated(value.id))?;
		Ok((host, offset))
	}

	/// The host view of a Value.
	pub fn value_bytes(&self, var: &Var, value: &Value) -> Result<&[u8], MemoryError<P>> {
		let (host, offset) = self.value_location(var, value)?;
		self.mapped(host, offset, value.size)
	}

	pub fn value_bytes_mut(&mut self, var: &Var, value: &Value) -> Result<&mut [u8], MemoryError<P>> {
		let (host, offset) = self.value_location(var, value)?;
		self.map_range(host, offset, value.size)
	}

	/// The device resource shaders access a Value through.
	pub fn descriptor_resource(&self, var: &Var, value: &Value) -> Result<DescriptorResource<'_, P>, MemoryError<P>> {
		if var.role().is_image() {
			let image = value.image.ok_or(MemoryError::NotAllocated(value.id))?;
			Ok(DescriptorResource::Image {
				image: &self.image(image)?.image,
			})
		} else {
			let offset = value.offset.ok_or(MemoryError::NotAllocated(value.id))?;
			let device = self.buffers[var.role().buffer_kind().index()]
				.device
				.ok_or(MemoryError::NotAllocated(value.id))?;
			Ok(DescriptorResource::Buffer {
				block: &self.block(device)?.block,
				offset,
				range: value.size,
			})
		}
	}

	/// The device block and offset a vertex or index Value is fetched from.
	pub(crate) fn device_location(&self, var: &Var, value: &Value) -> Result<(&P::Block, u64), MemoryError<P>> {
		match self.descriptor_resource(var, value)? {
			DescriptorResource::Buffer { block, offset, .. } => Ok((block, offset)),
			DescriptorResource::Image { .. } => Err(MemoryError::NotAllocated(value.id)),
		}
	}

	/// Remembers that `execution` may write `id` until it completed.
	pub(crate) fn record_writer(&mut self, id: ValueId, execution: PendingExecution<P>) {
		self.writers.insert(id, execution);
	}

	/// Uploads the dirty ranges of all Values and executes queued copies in one transfer submission, then waits for
	/// it. Returns without submitting if there is nothing to transfer.
	pub fn sync_to_device(&mut self, vars: &mut Vars) -> Result<SyncStats, MemoryError<P>> {
		let mut regions: [Vec<CopyRegion>; BufferKind::COUNT] = Default::default();
		let mut uploads = Vec::new();
		let mut synced = Vec::new();
		for (var, value) in vars.values() {
			let Some(offset) = value.offset.filter(|_| value.is_dirty()) else {
				continue;
			};
			let kind = var.role().buffer_kind();
			if kind == BufferKind::Texel {
				match value.image {
					Some(image) => uploads.push((image, offset)),
					None => continue,
				}
			} else {
				regions[kind.index()].extend(
					value
						.dirty
						.iter()
						.filter(|r| r.start < value.size)
						.map(|r| CopyRegion::same_offset(offset + r.start..offset + r.end.min(value.size))),
				);
			}
			synced.push(value.id);
		}
		for regions in &mut regions {
			coalesce(regions);
		}

		let stats = self.upload(&regions, &uploads)?;
		for id in synced {
			vars.value_mut(id)?.dirty.clear();
		}
		Ok(stats)
	}

	/// Executes queued copies and image initialization without touching any Value.
	pub fn flush(&mut self) -> Result<SyncStats, MemoryError<P>> {
		self.upload(&Default::default(), &[])
	}

	fn upload(
		&mut self,
		regions: &[Vec<CopyRegion>; BufferKind::COUNT],
		uploads: &[(ImageHandle, u64)],
	) -> Result<SyncStats, MemoryError<P>> {
		if regions.iter().all(Vec::is_empty)
			&& uploads.is_empty()
			&& self.queued_copies.is_empty()
			&& self.uninit_images.is_empty()
		{
			return Ok(SyncStats::default());
		}

		let queued = std::mem::take(&mut self.queued_copies);
		let uninit = std::mem::take(&mut self.uninit_images);
		let mut stats = SyncStats::default();
		let result = self.transfer(|this, cmd| unsafe {
			let platform = &this.platform;
			platform.cmd_barrier(cmd, Barrier::new(AccessScope::Shader, AccessScope::Transfer));
			for image in &uninit {
				platform.cmd_init_image(cmd, &this.image(*image)?.image);
			}

			for kind in BufferKind::ALL {
				let regions = &regions[kind.index()];
				let buffer = &this.buffers[kind.index()];
				if let (false, Some(host), Some(device)) = (regions.is_empty(), buffer.host, buffer.device) {
					platform.cmd_copy_block(cmd, &this.block(host)?.block, &this.block(device)?.block, regions);
					stats.copy_commands += 1;
					stats.regions += regions.len() as u32;
					stats.bytes += regions.iter().map(|r| r.size).sum::<u64>();
				}
			}

			if let (false, Some(texels)) = (uploads.is_empty(), this.buffers[BufferKind::Texel.index()].host) {
				let texels = &this.block(texels)?.block;
				for (image, offset) in uploads {
					let image = this.image(*image)?;
					platform.cmd_copy_block_to_image(cmd, texels, *offset, &image.image);
					stats.images += 1;
					stats.bytes += image.byte_size();
				}
			}

			if !queued.is_empty() {
				platform.cmd_barrier(cmd, Barrier::new(AccessScope::Transfer, AccessScope::Transfer));
				for copy in &queued {
					platform.cmd_copy_block(cmd, &this.block(copy.src)?.block, &this.block(copy.dst)?.block, &copy.regions);
					stats.copy_commands += 1;
					stats.regions += copy.regions.len() as u32;
					stats.bytes += copy.regions.iter().map(|r| r.size).sum::<u64>();
				}
			}
			platform.cmd_barrier(cmd, Barrier::new(AccessScope::Transfer, AccessScope::Shader));
			Ok(())
		});

		match result {
			Ok(()) => {
				if self.debug {
					log::info!("{}: synced to device {:?}", self.name, stats);
				}
				Ok(stats)
			}
			Err(e) => {
				self.queued_copies = queued;
				self.uninit_images = uninit;
				Err(e)
			}
		}
	}

	/// Copies the device contents of a Value back into its host view and waits for it. Unsynced host writes to the
	/// Value are discarded.
	///
	/// Fails with [`MemoryError::PendingExecution`] if an execution that may write the Value has not completed yet.
	pub fn sync_value_from_device(&mut self, vars: &mut Vars, id: ValueId) -> Result<(), MemoryError<P>> {
		if let Some(pending) = self.writers.get(&id) {
			let completed = pending.completed().map_err(|e| match e {
				ExecutionError::Platform(e) => MemoryError::Platform(e),
			})?;
			if !completed {
				return Err(MemoryError::PendingExecution(id));
			}
			self.writers.remove(&id);
		}

		let (var, value) = vars.var_value(id)?;
		let (host, offset) = self.value_location(var, value)?;
		let kind = var.role().buffer_kind();
		let size = value.size;
		let image = value.image;
		let device = self.buffers[kind.index()].device;
		self.transfer(|this, cmd| unsafe {
			let platform = &this.platform;
			let host = &this.block(host)?.block;
			platform.cmd_barrier(cmd, Barrier::new(AccessScope::Shader, AccessScope::Transfer));
			match (image, device) {
				(Some(image), _) => platform.cmd_copy_image_to_block(cmd, &this.image(image)?.image, host, offset),
				(None, Some(device)) => platform.cmd_copy_block(
					cmd,
					&this.block(device)?.block,
					host,
					&[CopyRegion::same_offset(offset..offset + size)],
				),
				(None, None) => return Err(MemoryError::NotAllocated(id)),
			}
			platform.cmd_barrier(cmd, Barrier::new(AccessScope::Transfer, AccessScope::Host));
			Ok(())
		})?;
		vars.value_mut(id)?.dirty.clear();
		Ok(())
	}

	/// Reads back a whole image tightly packed, waiting for the copy to complete.
	pub fn read_image(&mut self, handle: ImageHandle) -> Result<Vec<u8>, MemoryError<P>> {
		let size = self.image(handle)?.byte_size();
		let readback = match self.readback {
			Some(block) if self.block(block)?.size >= size => block,
			old => {
				if let Some(old) = old {
					// only used by completed transfers
					unsafe { self.free_block(old) };
					self.readback = None;
				}
				let name = format!("{} readback", self.name);
				let block = self.allocate_with(&BlockCreateInfo {
					name: &name,
					size,
					usage: BlockUsage::TRANSFER_DST,
					memory_type: MemoryPropertyFlags::STAGING,
				})?;
				self.readback = Some(block);
				block
			}
		};
		self.transfer(|this, cmd| unsafe {
			let platform = &this.platform;
			platform.cmd_barrier(cmd, Barrier::new(AccessScope::Shader, AccessScope::Transfer));
			platform.cmd_copy_image_to_block(cmd, &this.image(handle)?.image, &this.block(readback)?.block, 0);
			platform.cmd_barrier(cmd, Barrier::new(AccessScope::Transfer, AccessScope::Host));
			Ok(())
		})?;
		Ok(self.mapped(readback, 0, size)?.to_vec())
	}

	/// Records a transfer command buffer with `record`, submits it and waits for completion.
	fn transfer(
		&mut self,
		record: impl FnOnce(&Self, &mut P::CommandBuffer) -> Result<(), MemoryError<P>>,
	) -> Result<(), MemoryError<P>> {
		let mut cmd = match self.transfer_cmd.take() {
			Some(cmd) => cmd,
			None => unsafe { self.platform.alloc_command_buffer() }.map_err(MemoryError::Platform)?,
		};
		let result = self.record_submit_wait(&mut cmd, record);
		self.transfer_cmd = Some(cmd);
		result
	}

	fn record_submit_wait(
		&self,
		cmd: &mut P::CommandBuffer,
		record: impl FnOnce(&Self, &mut P::CommandBuffer) -> Result<(), MemoryError<P>>,
	) -> Result<(), MemoryError<P>> {
		unsafe {
			self.platform.begin_command_buffer(cmd).map_err(MemoryError::Platform)?;
			record(self, cmd)?;
			self.platform.end_command_buffer(cmd).map_err(MemoryError::Platform)?;
			let fence = self.platform.submit(cmd).map_err(MemoryError::Platform)?;
			let result = self.platform.wait_fence(&fence);
			self.platform.destroy_fence(fence);
			result.map_err(MemoryError::Platform)
		}
	}

	/// Frees every block, image and command buffer.
	///
	/// # Safety
	/// No execution accessing this Memory may be pending.
	pub(crate) unsafe fn destroy(&mut self) {
		for i in 0..self.images.len() {
			self.free_image(ImageHandle(i as u32));
		}
		for i in 0..self.blocks.len() {
			self.free_block(BlockHandle(i as u32));
		}
		if let Some(cmd) = self.transfer_cmd.take() {
			self.platform.free_command_buffer(cmd);
		}
		self.buffers = [MemBuffer::default(); BufferKind::COUNT];
		self.queued_copies.clear();
		self.uninit_images.clear();
		self.writers.clear();
		self.readback = None;
	}
}

impl<P: GpuPlatform> Drop for Memory<P> {
	fn drop(&mut self) {
		if self.blocks.iter().all(Option::is_none) && self.images.iter().all(Option::is_none) && self.transfer_cmd.is_none()
		{
			return;
		}
		unsafe {
			if let Err(e) = self.platform.wait_idle() {
				log::error!("{}: waiting for the device before freeing memory failed: {e}", self.name);
			}
			self.destroy();
		}
	}
}

/// Sorts regions by destination and merges touching or overlapping ones.
fn coalesce(regions: &mut Vec<CopyRegion>) {
	regions.sort_by_key(|r| r.dst_offset);
	let mut merged: Vec<CopyRegion> = Vec::with_capacity(regions.len());
	for region in regions.drain(..) {
		match merged.last_mut() {
			Some(last)
				if last.src_offset + last.size >= region.src_offset
					&& last.dst_offset + last.size >= region.dst_offset
					&& region.src_offset >= last.src_offset
					&& region.dst_offset - last.dst_offset == region.src_offset - last.src_offset =>
			{
				let end = (last.src_offset + last.size).max(region.src_offset + region.size);
				last.size = end - last.src_offset;
			}
			_ => merged.push(region),
		}
	}
	*regions = merged;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_coalesce_regions() {
		let mut regions = vec![
			CopyRegion::same_offset(256..512),
			CopyRegion::same_offset(0..64),
			CopyRegion::same_offset(64..128),
			CopyRegion::same_offset(100..200),
			CopyRegion::same_offset(1024..1040),
		];
		coalesce(&mut regions);
		assert_eq!(
			regions,
			vec![
				CopyRegion::same_offset(0..200),
				CopyRegion::same_offset(256..512),
				CopyRegion::same_offset(1024..1040),
			]
		);
	}

	#[test]
	fn test_coalesce_keeps_shifted_regions() {
		let mut regions = vec![
			CopyRegion {
				src_offset: 0,
				dst_offset: 0,
				size: 16,
			},
			CopyRegion {
				src_offset: 64,
				dst_offset: 16,
				size: 16,
			},
		];
		coalesce(&mut regions);
		assert_eq!(regions.len(), 2);
	}
}
