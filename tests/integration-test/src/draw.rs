#![cfg(test)]

use crate::host;
use glam::{Vec2, Vec4};
use std::sync::Arc;
use vgpu::config::SystemOptions;
use vgpu::error::{ErrorClass, ErrorKind};
use vgpu::pipeline::{GraphicsPipelineDesc, PipelineId, RecordingError, Topology};
use vgpu::platform::host::{HostPlatform, HostShader, VertexOutput};
use vgpu::system::{RenderTargetDesc, System, SystemError};
use vgpu::vars::{ElementType, ImageFormat, ShaderStages, ValueId, VarRole, VarsError};

const EXTENT: [u32; 2] = [4, 4];

struct Scene {
	system: System<HostPlatform>,
	pipeline: PipelineId,
	positions: ValueId,
	indices: ValueId,
}

/// A triangle covering the whole target, filled with the color of a uniform.
fn scene(platform: &Arc<HostPlatform>) -> anyhow::Result<Scene> {
	let mut system = System::new_graphics(
		platform,
		"triangle",
		RenderTargetDesc {
			format: ImageFormat::Rgba8Unorm,
			extent: EXTENT,
		},
		SystemOptions::default(),
	)?;
	let set = system.vars_mut().add_set()?;
	{
		let set = system.vars_mut().set_mut(set)?;
		set.add("color", ElementType::Float32Vector4, 1, VarRole::Uniform, ShaderStages::FRAGMENT)?;
		set.add("positions", ElementType::Float32Vector2, 3, VarRole::Vertex, ShaderStages::VERTEX)?;
		set.add("indices", ElementType::Uint16, 3, VarRole::Index, ShaderStages::VERTEX)?;
	}
	let pipeline = system.new_graphics_pipeline(
		"triangle",
		GraphicsPipelineDesc {
			vertex: HostShader::vertex(|inv| VertexOutput {
				position: Vec4::new(inv.attributes[0].x, inv.attributes[0].y, 0., 1.),
				varying: Vec4::ZERO,
			}),
			fragment: HostShader::fragment(|inv| inv.bindings.read::<[f32; 4]>(0, 0, 0).into()),
			topology: Topology::TriangleList,
		},
	)?;
	system.config()?;

	let positions = system.vars().value_id(set, "positions", 0)?;
	let indices = system.vars().value_id(set, "indices", 0)?;
	system.value_mut(set, "color", 0)?.write_vec4s(0, &[Vec4::new(1., 0., 0., 1.)]);
	system
		.value_mut_by_id(positions)?
		.write(0, &[Vec2::new(-1., -1.), Vec2::new(3., -1.), Vec2::new(-1., 3.)]);
	system.value_mut_by_id(indices)?.write(0, &[0u16, 1, 2]);
	system.sync_to_device()?;
	Ok(Scene {
		system,
		pipeline,
		positions,
		indices,
	})
}

fn pixels(bytes: &[u8]) -> Vec<[u8; 4]> {
	bytes.chunks_exact(4).map(|p| [p[0], p[1], p[2], p[3]]).collect()
}

#[test]
fn test_clear_only() -> anyhow::Result<()> {
	let platform = host();
	let Scene { mut system, .. } = scene(&platform)?;
	let mut cmd = system.render_cmd_buff()?;
	system.begin_render_pass(&mut cmd, Some(Vec4::new(0., 0., 1., 1.)))?;
	system.end_render_pass(&mut cmd)?;
	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;
	assert!(pixels(&system.read_render_target()?).iter().all(|p| *p == [0, 0, 255, 255]));
	Ok(())
}

#[test]
fn test_draw_triangle() -> anyhow::Result<()> {
	let platform = host();
	let Scene {
		mut system,
		pipeline,
		positions,
		..
	} = scene(&platform)?;
	let mut cmd = system.render_cmd_buff()?;
	system.begin_render_pass(&mut cmd, Some(Vec4::ZERO))?;
	system.reset_bind_vars(&mut cmd, 0)?;
	system.draw(&mut cmd, pipeline, &[positions], 0..3)?;
	system.end_render_pass(&mut cmd)?;
	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;

	let image = pixels(&system.read_render_target()?);
	assert_eq!(image.len(), (EXTENT[0] * EXTENT[1]) as usize);
	assert!(image.iter().all(|p| *p == [255, 0, 0, 255]));
	assert_eq!(platform.stats().draws, 1);
	Ok(())
}

#[test]
fn test_draw_indexed_triangle() -> anyhow::Result<()> {
	let platform = host();
	let Scene {
		mut system,
		pipeline,
		positions,
		indices,
	} = scene(&platform)?;
	system.value_mut(0, "color", 0)?.write_vec4s(0, &[Vec4::new(0., 1., 0., 1.)]);
	system.sync_to_device()?;

	let mut cmd = system.render_cmd_buff()?;
	system.begin_render_pass(&mut cmd, None)?;
	system.reset_bind_vars(&mut cmd, 0)?;
	system.draw_indexed(&mut cmd, pipeline, &[positions], indices, 0..3)?;
	system.end_render_pass(&mut cmd)?;
	system.compute_cmd_end(&mut cmd)?;
	system.compute_submit_wait(cmd)?;
	assert!(pixels(&system.read_render_target()?).iter().all(|p| *p == [0, 255, 0, 255]));
	Ok(())
}

#[test]
fn test_draw_rejects_wrong_roles() -> anyhow::Result<()> {
	let platform = host();
	let Scene {
		mut system,
		pipeline,
		positions,
		indices,
	} = scene(&platform)?;
	let mut cmd = system.render_cmd_buff()?;

	// drawing outside of a render pass
	assert!(system.draw(&mut cmd, pipeline, &[positions], 0..3).is_err());

	system.begin_render_pass(&mut cmd, None)?;
	let err = system
		.draw_indexed(&mut cmd, pipeline, &[positions], positions, 0..3)
		.unwrap_err();
	assert!(matches!(err, SystemError::Vars(VarsError::WrongRole { .. })));
	let err = system.draw(&mut cmd, pipeline, &[indices], 0..3).unwrap_err();
	assert!(matches!(err, SystemError::Vars(VarsError::WrongRole { .. })));
	assert_eq!(cmd.commands(), 0);
	Ok(())
}

#[test]
fn test_compute_system_can_not_draw() -> anyhow::Result<()> {
	let platform = host();
	let mut system = System::new_compute(&platform, "compute", SystemOptions::default());
	let err = system
		.new_graphics_pipeline(
			"triangle",
			GraphicsPipelineDesc {
				vertex: HostShader::vertex(|_| VertexOutput {
					position: Vec4::ZERO,
					varying: Vec4::ZERO,
				}),
				fragment: HostShader::fragment(|_| Vec4::ONE),
				topology: Topology::TriangleList,
			},
		)
		.unwrap_err();
	assert!(matches!(err, SystemError::Recording(RecordingError::NotGraphics)));
	assert_eq!(err.kind(), ErrorKind::Configuration);
	assert!(system.render_cmd_buff().is_err());
	assert!(system.read_render_target().is_err());
	Ok(())
}
