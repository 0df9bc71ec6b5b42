use crate::memory::block::CopyRegion;
use crate::pipeline::graphics_pipeline::{IndexType, Topology, VertexInputLayout};
use crate::pipeline::stage::{Barrier, BindPoint};
use crate::platform::host::memory::{HostImage, HostMemory};
use crate::platform::host::platform::HostError;
use crate::platform::host::shader::{
	ComputeFn, ComputeInvocation, FragmentFn, FragmentInvocation, HostBindings, HostSet, VertexFn, VertexInvocation,
	VertexOutput,
};
use crate::vars::types::{ElementType, ImageFormat};
use glam::{UVec2, UVec3, Vec2, Vec4};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

pub(crate) enum PipelineKind {
	Compute {
		local_size: [u32; 3],
		main: Arc<ComputeFn>,
	},
	Graphics {
		vertex: Arc<VertexFn>,
		fragment: Arc<FragmentFn>,
		topology: Topology,
		vertex_input: VertexInputLayout,
		color_format: ImageFormat,
	},
}

/// A compiled pipeline, cheap to clone into recorded commands.
#[derive(Clone)]
pub struct HostPipeline {
	pub(crate) name: Arc<str>,
	pub(crate) kind: Arc<PipelineKind>,
}

impl HostPipeline {
	pub fn name(&self) -> &str {
		&self.name
	}
}

pub(crate) enum HostCommand {
	Barrier(Barrier),
	CopyBlock {
		src: Arc<HostMemory>,
		dst: Arc<HostMemory>,
		regions: SmallVec<[CopyRegion; 4]>,
	},
	InitImage(HostImage),
	CopyBlockToImage {
		src: Arc<HostMemory>,
		src_offset: u64,
		dst: HostImage,
	},
	CopyImageToBlock {
		src: HostImage,
		dst: Arc<HostMemory>,
		dst_offset: u64,
	},
	BindPipeline(BindPoint, HostPipeline),
	BindDescriptorSet {
		bind_point: BindPoint,
		set_index: u32,
		set: Arc<Mutex<HostSet>>,
	},
	Dispatch([u32; 3]),
	BeginRendering {
		target: HostImage,
		clear: Option<[f32; 4]>,
	},
	EndRendering,
	BindVertex {
		binding: u32,
		memory: Arc<HostMemory>,
		offset: u64,
	},
	BindIndex {
		memory: Arc<HostMemory>,
		offset: u64,
		index_type: IndexType,
	},
	Draw {
		vertices: Range<u32>,
		instances: Range<u32>,
	},
	DrawIndexed {
		indices: Range<u32>,
		vertex_offset: i32,
		instances: Range<u32>,
	},
	/// Recorded in place of a command that could not be recorded, fails the execution
	Invalid(String),
}

#[derive(Default)]
pub struct HostCommandBuffer {
	pub(crate) commands: Vec<HostCommand>,
	pub(crate) recording: bool,
	pub(crate) executable: Option<Arc<[HostCommand]>>,
}

impl HostCommandBuffer {
	pub(crate) fn push(&mut self, command: HostCommand) {
		if self.recording {
			self.commands.push(command);
		} else {
			log::error!("recording into a host command buffer that is not recording");
		}
	}

	pub fn len(&self) -> usize {
		self.commands.len()
	}

	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HostStats {
	pub submissions: u64,
	pub dispatches: u64,
	pub workgroups: u64,
	pub draws: u64,
	pub copies: u64,
	pub barriers: u64,
}

/// Bind state of one execution.
#[derive(Default)]
struct ExecState {
	compute_pipeline: Option<HostPipeline>,
	graphics_pipeline: Option<HostPipeline>,
	compute_sets: Vec<Option<Arc<Mutex<HostSet>>>>,
	graphics_sets: Vec<Option<Arc<Mutex<HostSet>>>>,
	target: Option<HostImage>,
	vertex: BTreeMap<u32, (Arc<HostMemory>, u64)>,
	index: Option<(Arc<HostMemory>, u64, IndexType)>,
}

impl ExecState {
	fn bindings(&self, bind_point: BindPoint) -> HostBindings {
		let sets = match bind_point {
			BindPoint::Compute => &self.compute_sets,
			BindPoint::Graphics => &self.graphics_sets,
		};
		HostBindings::new(
			sets.iter()
				.map(|set| set.as_ref().map(|s| s.lock().clone()).unwrap_or_default())
				.collect(),
		)
	}
}

fn invalid(msg: impl Into<String>) -> HostError {
	HostError::InvalidUsage(msg.into())
}

/// Executes a submitted command buffer to completion.
pub(crate) fn execute(commands: &[HostCommand], stats: &mut HostStats) -> Result<(), HostError> {
	let mut state = ExecState::default();
	stats.submissions += 1;
	for command in commands {
		match command {
			HostCommand::Barrier(_) => stats.barriers += 1,
			HostCommand::CopyBlock { src, dst, regions } => {
				for region in regions {
					if !HostMemory::copy(src, region.src_offset, dst, region.dst_offset, region.size) {
						return Err(invalid(format!("copy region {region:?} out of bounds")));
					}
				}
				stats.copies += 1;
			}
			HostCommand::InitImage(image) => image.0.memory.fill(0),
			HostCommand::CopyBlockToImage { src, src_offset, dst } => {
				let len = dst.0.memory.len() as u64;
				if !HostMemory::copy(src, *src_offset, &dst.0.memory, 0, len) {
					return Err(invalid("block to image copy out of bounds"));
				}
				stats.copies += 1;
			}
			HostCommand::CopyImageToBlock { src, dst, dst_offset } => {
				let len = src.0.memory.len() as u64;
				if !HostMemory::copy(&src.0.memory, 0, dst, *dst_offset, len) {
					return Err(invalid("image to block copy out of bounds"));
				}
				stats.copies += 1;
			}
			HostCommand::BindPipeline(bind_point, pipeline) => match bind_point {
				BindPoint::Compute => state.compute_pipeline = Some(pipeline.clone()),
				BindPoint::Graphics => state.graphics_pipeline = Some(pipeline.clone()),
			},
			HostCommand::BindDescriptorSet {
				bind_point,
				set_index,
				set,
			} => {
				let sets = match bind_point {
					BindPoint::Compute => &mut state.compute_sets,
					BindPoint::Graphics => &mut state.graphics_sets,
				};
				let index = *set_index as usize;
				if sets.len() <= index {
					sets.resize(index + 1, None);
				}
				sets[index] = Some(set.clone());
			}
			HostCommand::Dispatch(groups) => {
				let pipeline = state
					.compute_pipeline
					.as_ref()
					.ok_or_else(|| invalid("dispatch without a compute pipeline"))?;
				let PipelineKind::Compute { local_size, main } = &*pipeline.kind else {
					return Err(invalid("compute pipeline slot holds a graphics pipeline"));
				};
				let bindings = state.bindings(BindPoint::Compute);
				dispatch(&**main, *local_size, *groups, &bindings);
				stats.dispatches += 1;
				stats.workgroups += groups.iter().map(|g| *g as u64).product::<u64>();
			}
			HostCommand::BeginRendering { target, clear } => {
				if let Some(clear) = clear {
					target.0.clear(Vec4::from_array(*clear));
				}
				state.target = Some(target.clone());
			}
			HostCommand::EndRendering => state.target = None,
			HostCommand::BindVertex { binding, memory, offset } => {
				state.vertex.insert(*binding, (memory.clone(), *offset));
			}
			HostCommand::BindIndex {
				memory,
				offset,
				index_type,
			} => state.index = Some((memory.clone(), *offset, *index_type)),
			HostCommand::Draw { vertices, instances } => {
				let ids = vertices.clone().collect::<Vec<_>>();
				for _ in instances.clone() {
					draw(&state, &ids)?;
				}
				stats.draws += 1;
			}
			HostCommand::DrawIndexed {
				indices,
				vertex_offset,
				instances,
			} => {
				let (memory, offset, index_type) = state
					.index
					.as_ref()
					.ok_or_else(|| invalid("indexed draw without an index block"))?;
				let ids = indices
					.clone()
					.map(|i| fetch_index(memory, *offset, *index_type, i).saturating_add_signed(*vertex_offset))
					.collect::<Vec<_>>();
				for _ in instances.clone() {
					draw(&state, &ids)?;
				}
				stats.draws += 1;
			}
			HostCommand::Invalid(msg) => return Err(invalid(msg.clone())),
		}
	}
	Ok(())
}

fn dispatch(main: &dyn Fn(&ComputeInvocation<'_>), local_size: [u32; 3], groups: [u32; 3], bindings: &HostBindings) {
	let local_size = UVec3::from_array(local_size);
	for gz in 0..groups[2] {
		for gy in 0..groups[1] {
			for gx in 0..groups[0] {
				let workgroup_id = UVec3::new(gx, gy, gz);
				for lz in 0..local_size.z {
					for ly in 0..local_size.y {
						for lx in 0..local_size.x {
							let local_id = UVec3::new(lx, ly, lz);
							main(&ComputeInvocation {
								global_id: workgroup_id * local_size + local_id,
								local_id,
								workgroup_id,
								bindings,
							});
						}
					}
				}
			}
		}
	}
}

fn fetch_index(memory: &HostMemory, offset: u64, index_type: IndexType, i: u32) -> u32 {
	match index_type {
		IndexType::Uint16 => {
			let mut bytes = [0u8; 2];
			memory.read(offset + i as u64 * 2, &mut bytes);
			u16::from_le_bytes(bytes) as u32
		}
		IndexType::Uint32 => {
			let mut bytes = [0u8; 4];
			memory.read(offset + i as u64 * 4, &mut bytes);
			u32::from_le_bytes(bytes)
		}
	}
}

/// Widens a vertex attribute to four components, missing components default to `(0, 0, 0, 1)`.
pub(crate) fn decode_attribute(ty: ElementType, bytes: &[u8]) -> Vec4 {
	let f = |i: usize| bytemuck::pod_read_unaligned::<f32>(&bytes[i * 4..i * 4 + 4]);
	let s = |i: usize| bytemuck::pod_read_unaligned::<i32>(&bytes[i * 4..i * 4 + 4]) as f32;
	let u = |i: usize| bytemuck::pod_read_unaligned::<u32>(&bytes[i * 4..i * 4 + 4]) as f32;
	match ty {
		ElementType::Uint16 => Vec4::new(bytemuck::pod_read_unaligned::<u16>(&bytes[..2]) as f32, 0., 0., 1.),
		ElementType::Int32 => Vec4::new(s(0), 0., 0., 1.),
		ElementType::Uint32 => Vec4::new(u(0), 0., 0., 1.),
		ElementType::Float32 => Vec4::new(f(0), 0., 0., 1.),
		ElementType::Int32Vector2 => Vec4::new(s(0), s(1), 0., 1.),
		ElementType::Int32Vector4 => Vec4::new(s(0), s(1), s(2), s(3)),
		ElementType::Uint32Vector2 => Vec4::new(u(0), u(1), 0., 1.),
		ElementType::Uint32Vector4 => Vec4::new(u(0), u(1), u(2), u(3)),
		ElementType::Float32Vector2 => Vec4::new(f(0), f(1), 0., 1.),
		ElementType::Float32Vector3 => Vec4::new(f(0), f(1), f(2), 1.),
		ElementType::Float32Vector4 => Vec4::new(f(0), f(1), f(2), f(3)),
		ElementType::Float32Matrix4 | ElementType::Texel(_) => Vec4::ZERO,
	}
}

/// A vertex after the viewport transform.
#[derive(Copy, Clone)]
struct ScreenVertex {
	pos: Vec2,
	varying: Vec4,
}

fn draw(state: &ExecState, vertex_ids: &[u32]) -> Result<(), HostError> {
	let pipeline = state
		.graphics_pipeline
		.as_ref()
		.ok_or_else(|| invalid("draw without a graphics pipeline"))?;
	let PipelineKind::Graphics {
		vertex,
		fragment,
		topology,
		vertex_input,
		color_format,
	} = &*pipeline.kind
	else {
		return Err(invalid("graphics pipeline slot holds a compute pipeline"));
	};
	let target = state
		.target
		.as_ref()
		.ok_or_else(|| invalid("draw outside of a render pass"))?;
	if target.format() != *color_format {
		return Err(invalid(format!(
			"pipeline {:?} renders {color_format:?} but the target is {:?}",
			pipeline.name,
			target.format()
		)));
	}
	let bindings = state.bindings(BindPoint::Graphics);
	let extent = Vec2::new(target.extent()[0] as f32, target.extent()[1] as f32);

	let mut attributes = Vec::with_capacity(vertex_input.bindings.len());
	let mut shaded = Vec::with_capacity(vertex_ids.len());
	for &id in vertex_ids {
		attributes.clear();
		for input in &vertex_input.bindings {
			let (memory, offset) = state
				.vertex
				.get(&input.binding)
				.ok_or_else(|| invalid(format!("vertex binding {} is not bound", input.binding)))?;
			let mut bytes = [0u8; 16];
			let size = input.format.size().min(16) as usize;
			memory.read(offset + id as u64 * input.stride as u64, &mut bytes[..size]);
			attributes.push(decode_attribute(input.format, &bytes));
		}
		let VertexOutput { position, varying } = vertex(&VertexInvocation {
			vertex_index: id,
			attributes: &attributes,
			bindings: &bindings,
		});
		let w = if position.w == 0. { 1. } else { position.w };
		let ndc = Vec2::new(position.x / w, position.y / w);
		shaded.push(ScreenVertex {
			pos: (ndc * 0.5 + 0.5) * extent,
			varying,
		});
	}

	let mut shade = |pixel: UVec2, varying: Vec4| {
		let color = fragment(&FragmentInvocation {
			frag_coord: pixel.as_vec2() + 0.5,
			varying,
			bindings: &bindings,
		});
		target.0.write_texel(pixel, color);
	};
	match topology {
		Topology::PointList => {
			for v in &shaded {
				if v.pos.x >= 0. && v.pos.y >= 0. && v.pos.x < extent.x && v.pos.y < extent.y {
					shade(v.pos.as_uvec2(), v.varying);
				}
			}
		}
		Topology::LineList => {
			for line in shaded.chunks_exact(2) {
				raster_line(line[0], line[1], extent, &mut shade);
			}
		}
		Topology::LineStrip => {
			for line in shaded.windows(2) {
				raster_line(line[0], line[1], extent, &mut shade);
			}
		}
		Topology::TriangleList => {
			for tri in shaded.chunks_exact(3) {
				raster_triangle([tri[0], tri[1], tri[2]], extent, &mut shade);
			}
		}
		Topology::TriangleStrip => {
			for tri in shaded.windows(3) {
				raster_triangle([tri[0], tri[1], tri[2]], extent, &mut shade);
			}
		}
	}
	Ok(())
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
	(b - a).perp_dot(p - a)
}

/// Fills every pixel whose center lies inside the triangle, either winding. Varyings interpolate linearly in screen
/// space.
fn raster_triangle(v: [ScreenVertex; 3], extent: Vec2, shade: &mut impl FnMut(UVec2, Vec4)) {
	let area = edge(v[0].pos, v[1].pos, v[2].pos);
	if area == 0. {
		return;
	}
	let min = v[0].pos.min(v[1].pos).min(v[2].pos).max(Vec2::ZERO).floor();
	let max = v[0].pos.max(v[1].pos).max(v[2].pos).min(extent).ceil();
	for y in min.y as u32..max.y as u32 {
		for x in min.x as u32..max.x as u32 {
			let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
			let w0 = edge(v[1].pos, v[2].pos, p) / area;
			let w1 = edge(v[2].pos, v[0].pos, p) / area;
			let w2 = edge(v[0].pos, v[1].pos, p) / area;
			if w0 >= 0. && w1 >= 0. && w2 >= 0. {
				shade(UVec2::new(x, y), v[0].varying * w0 + v[1].varying * w1 + v[2].varying * w2);
			}
		}
	}
}

fn raster_line(a: ScreenVertex, b: ScreenVertex, extent: Vec2, shade: &mut impl FnMut(UVec2, Vec4)) {
	let steps = (b.pos - a.pos).abs().max_element().ceil().max(1.) as u32;
	for i in 0..=steps {
		let t = i as f32 / steps as f32;
		let p = a.pos.lerp(b.pos, t);
		if p.x >= 0. && p.y >= 0. && p.x < extent.x && p.y < extent.y {
			shade(p.as_uvec2(), a.varying.lerp(b.varying, t));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_decode_attribute() {
		let bytes = bytemuck::bytes_of(&[1.0f32, 2.0, 3.0]).to_vec();
		assert_eq!(
			decode_attribute(ElementType::Float32Vector3, &bytes),
			Vec4::new(1., 2., 3., 1.)
		);
		assert_eq!(
			decode_attribute(ElementType::Uint16, &7u16.to_le_bytes()),
			Vec4::new(7., 0., 0., 1.)
		);
	}

	#[test]
	fn test_raster_triangle_covers_half() {
		let mut pixels = Vec::new();
		let v = |x: f32, y: f32| ScreenVertex {
			pos: Vec2::new(x, y),
			varying: Vec4::ONE,
		};
		raster_triangle(
			[v(0., 0.), v(4., 0.), v(0., 4.)],
			Vec2::splat(4.),
			&mut |p, _| pixels.push(p),
		);
		// pixel centers on or below the diagonal
		assert_eq!(pixels.len(), 10);
		assert!(pixels.contains(&UVec2::new(0, 0)));
		assert!(!pixels.contains(&UVec2::new(3, 3)));
	}

	#[test]
	fn test_dispatch_ids() {
		let seen = Mutex::new(Vec::new());
		let main = |inv: &ComputeInvocation<'_>| seen.lock().push(inv.global_id);
		dispatch(&main, [2, 1, 1], [2, 2, 1], &HostBindings::default());
		let seen = seen.into_inner();
		assert_eq!(seen.len(), 8);
		assert!(seen.contains(&UVec3::new(3, 1, 0)));
	}
}
