use crate::pipeline::compute_pipeline::ComputePipelineDesc;
use crate::pipeline::graphics_pipeline::{GraphicsPipelineCreateInfo, GraphicsPipelineDesc, VertexInputLayout};
use crate::pipeline::stage::BindPoint;
use crate::platform::GpuPlatform;
use crate::vars::ImageFormat;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Index of a pipeline declared on a [`System`](crate::system::System).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PipelineId(pub(crate) u32);

impl Display for PipelineId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "Pipeline#{}", self.0)
	}
}

pub enum PipelineDesc<P: GpuPlatform> {
	Compute(ComputePipelineDesc<P>),
	Graphics(GraphicsPipelineDesc<P>),
}

impl<P: GpuPlatform> PipelineDesc<P> {
	pub fn bind_point(&self) -> BindPoint {
		match self {
			PipelineDesc::Compute(_) => BindPoint::Compute,
			PipelineDesc::Graphics(_) => BindPoint::Graphics,
		}
	}
}

struct PipelineEntry<P: GpuPlatform> {
	name: String,
	desc: PipelineDesc<P>,
	compiled: Option<P::Pipeline>,
}

/// The pipelines of a System. Declared at any time, compiled against the System's pipeline layout on Config.
pub struct Pipelines<P: GpuPlatform> {
	platform: Arc<P>,
	entries: Vec<PipelineEntry<P>>,
}

impl<P: GpuPlatform> Pipelines<P> {
	pub fn new(platform: Arc<P>) -> Self {
		Self {
			platform,
			entries: Vec::new(),
		}
	}

	pub fn declare(&mut self, name: &str, desc: PipelineDesc<P>) -> PipelineId {
		let id = PipelineId(self.entries.len() as u32);
		self.entries.push(PipelineEntry {
			name: name.to_string(),
			desc,
			compiled: None,
		});
		id
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn name(&self, id: PipelineId) -> Option<&str> {
		self.entries.get(id.0 as usize).map(|e| e.name.as_str())
	}

	pub fn bind_point(&self, id: PipelineId) -> Option<BindPoint> {
		self.entries.get(id.0 as usize).map(|e| e.desc.bind_point())
	}

	/// The compiled pipeline, `None` if unknown or not compiled yet.
	pub(crate) fn compiled(&self, id: PipelineId) -> Option<&P::Pipeline> {
		self.entries.get(id.0 as usize)?.compiled.as_ref()
	}

	/// Compiles pipeline `id` against `layout`, replacing a previous compilation.
	///
	/// # Safety
	/// No pending execution may use the previous compilation.
	pub(crate) unsafe fn compile(
		&mut self,
		id: PipelineId,
		layout: &P::PipelineLayout,
		vertex_input: &VertexInputLayout,
		color_format: Option<ImageFormat>,
	) -> Result<(), P::Error> {
		let Some(entry) = self.entries.get_mut(id.0 as usize) else {
			return Ok(());
		};
		if let Some(old) = entry.compiled.take() {
			self.platform.destroy_pipeline(old);
		}
		let pipeline = match &entry.desc {
			PipelineDesc::Compute(desc) => self.platform.create_compute_pipeline(layout, &entry.name, &desc.shader)?,
			PipelineDesc::Graphics(desc) => {
				// graphics pipelines are only declared on Systems with a render target
				let Some(color_format) = color_format else {
					return Ok(());
				};
				self.platform.create_graphics_pipeline(
					layout,
					&GraphicsPipelineCreateInfo {
						name: &entry.name,
						vertex: &desc.vertex,
						fragment: &desc.fragment,
						topology: desc.topology,
						vertex_input,
						color_format,
					},
				)?
			}
		};
		entry.compiled = Some(pipeline);
		Ok(())
	}

	/// # Safety
	/// see [`Self::compile`]
	pub(crate) unsafe fn compile_all(
		&mut self,
		layout: &P::PipelineLayout,
		vertex_input: &VertexInputLayout,
		color_format: Option<ImageFormat>,
	) -> Result<(), P::Error> {
		for i in 0..self.entries.len() {
			self.compile(PipelineId(i as u32), layout, vertex_input, color_format)?;
		}
		Ok(())
	}

	/// Destroys all compiled pipelines, keeping their declarations.
	///
	/// # Safety
	/// No pending execution may use any of the pipelines.
	pub(crate) unsafe fn destroy_all(&mut self) {
		for entry in &mut self.entries {
			if let Some(pipeline) = entry.compiled.take() {
				self.platform.destroy_pipeline(pipeline);
			}
		}
	}
}

impl<P: GpuPlatform> Drop for Pipelines<P> {
	fn drop(&mut self) {
		unsafe { self.destroy_all() }
	}
}
