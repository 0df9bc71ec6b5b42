use crate::backing::align::ceil_div;
use crate::descriptor::descriptor_counts::DescriptorCounts;
use crate::descriptor::error::DescriptorError;
use crate::descriptor::layout::{BindingLayout, DescriptorKind, DescriptorWrite};
use crate::memory::Memory;
use crate::pipeline::execution::{ExecutionError, PendingExecution};
use crate::pipeline::stage::BindPoint;
use crate::platform::GpuPlatform;
use crate::vars::{SetKind, ValueId, VarSet, Vars, VarsError};
use std::sync::Arc;

/// One element of a binding of a descriptor set instance and the Value it points at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BoundEntry {
	pub binding: u32,
	pub array_element: u32,
	pub value: ValueId,
}

/// A descriptor binding of a Set and the Var index it belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PlannedBinding {
	pub layout: BindingLayout,
	pub var: u32,
	pub n_values: u32,
}

/// Descriptor layout of one Set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetPlan {
	pub set: u32,
	pub kind: SetKind,
	pub bindings: Vec<PlannedBinding>,
	/// Number of distinct instances the Set needs: the Value count for dynamic Sets, the number of binding array
	/// groups for static Sets
	pub groups: u32,
}

impl SetPlan {
	/// Lays out the descriptor bindings of `set`. Binding arrays of static Sets get as many elements as fit the
	/// per-set limit of their kind, shared evenly between the Vars of that kind.
	pub fn new(set: &VarSet, per_set: &DescriptorCounts, max_textures_per_set: u32) -> Self {
		let mut vars_per_kind = DescriptorCounts::ZERO;
		for var in set.vars() {
			if let Some(kind) = var.role().descriptor_kind() {
				vars_per_kind.add(kind, 1);
			}
		}
		let array_cap = |kind: DescriptorKind| {
			let mut limit = per_set.get(kind);
			if kind == DescriptorKind::SampledImage {
				limit = limit.min(max_textures_per_set);
			}
			(limit / vars_per_kind.get(kind).max(1)).max(1)
		};

		let n_values = set.n_values();
		let bindings = set
			.vars()
			.iter()
			.filter_map(|var| {
				let kind = var.role().descriptor_kind()?;
				let count = match set.kind() {
					SetKind::Dynamic => 1,
					SetKind::Static => n_values.min(array_cap(kind)),
				};
				Some(PlannedBinding {
					layout: BindingLayout {
						binding: var.binding(),
						kind,
						count,
						stages: var.stages(),
					},
					var: var.id().var,
					n_values,
				})
			})
			.collect::<Vec<_>>();
		let groups = match set.kind() {
			SetKind::Dynamic => n_values,
			SetKind::Static => bindings
				.iter()
				.map(|b| ceil_div(n_values, b.layout.count))
				.max()
				.unwrap_or(1),
		};
		Self {
			set: set.index(),
			kind: set.kind(),
			bindings,
			groups: groups.max(1),
		}
	}

	pub fn counts(&self) -> DescriptorCounts {
		let mut counts = DescriptorCounts::ZERO;
		for binding in &self.bindings {
			counts.add(binding.layout.kind, binding.layout.count);
		}
		counts
	}

	pub fn layouts(&self) -> Vec<BindingLayout> {
		self.bindings.iter().map(|b| b.layout).collect()
	}

	/// The Values descriptor set instance `instance` binds.
	pub fn entries(&self, instance: u32) -> Vec<BoundEntry> {
		let mut entries = Vec::new();
		for binding in &self.bindings {
			let value = |index: u32| ValueId {
				set: self.set,
				var: binding.var,
				index,
			};
			match self.kind {
				SetKind::Dynamic => entries.push(BoundEntry {
					binding: binding.layout.binding,
					array_element: 0,
					value: value(instance % binding.n_values),
				}),
				SetKind::Static => {
					let group = instance % self.groups;
					let len = binding.layout.count;
					entries.extend((0..len).map(|element| BoundEntry {
						binding: binding.layout.binding,
						array_element: element,
						value: value((group * len + element).min(binding.n_values - 1)),
					}));
				}
			}
		}
		entries
	}

	/// Instance and array element binding Value `index` of the Var with binding `binding`.
	pub fn value_location(&self, binding: u32, index: u32) -> Option<(u32, u32)> {
		let binding = self.bindings.iter().find(|b| b.layout.binding == binding)?;
		let len = binding.layout.count;
		(index < binding.n_values).then(|| (index / len, index % len))
	}
}

struct SetTable<P: GpuPlatform> {
	plan: SetPlan,
	layout: P::DescriptorLayout,
	pool: P::DescriptorPool,
	/// Bound Values of every instance
	tables: Vec<Vec<BoundEntry>>,
}

/// The descriptor set layouts, pools and pipeline layout of a System, with `n_descs` instances of every Set.
pub struct DescriptorTables<P: GpuPlatform> {
	platform: Arc<P>,
	sets: Vec<SetTable<P>>,
	pipeline_layout: Option<P::PipelineLayout>,
	n_descs: u32,
	in_flight: Vec<PendingExecution<P>>,
	debug: bool,
}

impl<P: GpuPlatform> DescriptorTables<P> {
	/// Creates the descriptor objects for all Sets of `vars` and binds every instance to its default Values.
	///
	/// # Safety
	/// `memory` must be configured for `vars` and owned by the same platform.
	pub(crate) unsafe fn new(
		platform: Arc<P>,
		vars: &Vars,
		memory: &Memory<P>,
		max_textures_per_set: u32,
		debug: bool,
	) -> Result<Self, DescriptorError<P>> {
		let limits = platform.device_info().limits;
		let count = vars.sets().len() as u32;
		if count > limits.max_bound_descriptor_sets {
			return Err(DescriptorError::TooManySets {
				count,
				max: limits.max_bound_descriptor_sets,
			});
		}

		let plans = vars
			.sets()
			.iter()
			.map(|set| SetPlan::new(set, &limits.descriptors_per_set, max_textures_per_set))
			.collect::<Vec<_>>();
		for plan in &plans {
			let counts = plan.counts();
			if !counts.is_within_limit(limits.descriptors_per_set) {
				let kind = [
					DescriptorKind::UniformBuffer,
					DescriptorKind::StorageBuffer,
					DescriptorKind::SampledImage,
					DescriptorKind::StorageImage,
				]
				.into_iter()
				.find(|k| counts.get(*k) > limits.descriptors_per_set.get(*k))
				.unwrap_or(DescriptorKind::UniformBuffer);
				return Err(DescriptorError::TooManyBindings {
					set: plan.set,
					kind,
					count: counts.get(kind),
					max: limits.descriptors_per_set.get(kind),
				});
			}
		}
		let n_descs = plans.iter().map(|p| p.groups).max().unwrap_or(1).max(1);

		// dropping a partially built Self destroys what was created so far
		let mut this = Self {
			platform,
			sets: Vec::with_capacity(plans.len()),
			pipeline_layout: None,
			n_descs,
			in_flight: (0..n_descs).map(|_| PendingExecution::new_completed()).collect(),
			debug,
		};
		for plan in plans {
			let bindings = plan.layouts();
			let layout = this
				.platform
				.create_descriptor_layout(&bindings)
				.map_err(DescriptorError::Platform)?;
			let pool = match this.platform.create_descriptor_pool(&layout, &bindings, n_descs) {
				Ok(pool) => pool,
				Err(e) => {
					this.platform.destroy_descriptor_layout(layout);
					return Err(DescriptorError::Platform(e));
				}
			};
			let tables = (0..n_descs).map(|i| plan.entries(i)).collect();
			this.sets.push(SetTable {
				plan,
				layout,
				pool,
				tables,
			});
		}
		let set_layouts = this.sets.iter().map(|s| &s.layout).collect::<Vec<_>>();
		let pipeline_layout = this
			.platform
			.create_pipeline_layout(&set_layouts)
			.map_err(DescriptorError::Platform)?;
		this.pipeline_layout = Some(pipeline_layout);

		for set in 0..this.sets.len() {
			for instance in 0..n_descs {
				this.write_instance(set, instance, None, vars, memory)?;
			}
		}
		if debug {
			log::info!(
				"descriptor tables: {} sets, {} instances each, groups {:?}",
				this.sets.len(),
				n_descs,
				this.sets.iter().map(|s| s.plan.groups).collect::<Vec<_>>()
			);
		}
		Ok(this)
	}

	/// Number of instances of every Set.
	#[inline]
	pub fn n_descs(&self) -> u32 {
		self.n_descs
	}

	pub fn plan(&self, set: u32) -> Result<&SetPlan, DescriptorError<P>> {
		Ok(&self.table(set)?.plan)
	}

	pub(crate) fn pipeline_layout(&self) -> Option<&P::PipelineLayout> {
		self.pipeline_layout.as_ref()
	}

	fn table(&self, set: u32) -> Result<&SetTable<P>, DescriptorError<P>> {
		self.sets.get(set as usize).ok_or(DescriptorError::Vars(VarsError::UnknownSet(set)))
	}

	pub fn check_desc_index(&self, index: u32) -> Result<(), DescriptorError<P>> {
		if index < self.n_descs {
			Ok(())
		} else {
			Err(DescriptorError::DescIndexOutOfRange {
				index,
				n_descs: self.n_descs,
			})
		}
	}

	fn check_not_in_flight(&self, index: u32) -> Result<(), DescriptorError<P>> {
		self.check_desc_index(index)?;
		let completed = self.in_flight[index as usize].completed().map_err(|e| match e {
			ExecutionError::Platform(e) => DescriptorError::Platform(e),
		})?;
		if completed {
			Ok(())
		} else {
			Err(DescriptorError::InstanceInFlight { index })
		}
	}

	/// Remembers that instance `index` is used by `execution`, rebinding it fails until the execution completed.
	pub(crate) fn mark_in_flight(&mut self, index: u32, execution: PendingExecution<P>) {
		if let Some(slot) = self.in_flight.get_mut(index as usize) {
			*slot = execution;
		}
	}

	/// Writes the current binding table of instance `instance` of Set `set`. Only writes the elements of `binding`
	/// if given.
	unsafe fn write_instance(
		&mut self,
		set: usize,
		instance: u32,
		binding: Option<u32>,
		vars: &Vars,
		memory: &Memory<P>,
	) -> Result<(), DescriptorError<P>> {
		let table = &mut self.sets[set];
		let mut writes = Vec::new();
		for entry in &table.tables[instance as usize] {
			if binding.is_some_and(|b| b != entry.binding) {
				continue;
			}
			let (var, value) = vars.var_value(entry.value)?;
			let kind = var.role().descriptor_kind().ok_or_else(|| VarsError::WrongRole {
				name: var.name().to_string(),
				role: var.role(),
				expected: "a descriptor role",
			})?;
			writes.push(DescriptorWrite {
				binding: entry.binding,
				array_element: entry.array_element,
				kind,
				resource: memory.descriptor_resource(var, value)?,
			});
		}
		if !writes.is_empty() {
			self.platform.write_descriptors(&mut table.pool, instance, &writes);
		}
		Ok(())
	}

	/// Points instance `desc_index` of every dynamic Set at Value `desc_index` of each Var, modulo its Value count.
	pub fn bind_dyn_values_all_index(
		&mut self,
		desc_index: u32,
		vars: &Vars,
		memory: &Memory<P>,
	) -> Result<(), DescriptorError<P>> {
		self.check_not_in_flight(desc_index)?;
		for set in 0..self.sets.len() {
			let table = &mut self.sets[set];
			if table.plan.kind != SetKind::Dynamic {
				continue;
			}
			let entries = table.plan.entries(desc_index);
			if table.tables[desc_index as usize] != entries {
				table.tables[desc_index as usize] = entries;
				unsafe { self.write_instance(set, desc_index, None, vars, memory)? };
			}
		}
		Ok(())
	}

	/// Points Var `var` of dynamic Set `set` at Value `value_index` in instance `desc_index`.
	pub fn bind_dyn_value(
		&mut self,
		desc_index: u32,
		set: u32,
		var: &str,
		value_index: u32,
		vars: &Vars,
		memory: &Memory<P>,
	) -> Result<(), DescriptorError<P>> {
		self.check_not_in_flight(desc_index)?;
		if self.table(set)?.plan.kind != SetKind::Dynamic {
			return Err(VarsError::NotDynamic { set }.into());
		}
		let id = vars.value_id(set, var, value_index)?;
		let declared = vars.var(id.var_id())?;
		let binding = declared.binding();
		let table = &mut self.sets[set as usize];
		let entry = table.tables[desc_index as usize]
			.iter_mut()
			.find(|e| e.binding == binding)
			.ok_or_else(|| VarsError::WrongRole {
				name: var.to_string(),
				role: declared.role(),
				expected: "a descriptor role",
			})?;
		if entry.value != id {
			entry.value = id;
			unsafe { self.write_instance(set as usize, desc_index, Some(binding), vars, memory)? };
		}
		Ok(())
	}

	/// Records binding instance `desc_index` of every Set.
	///
	/// # Safety
	/// `cmd` must be recording and have a pipeline using [`Self::pipeline_layout`] bound at `bind_point`.
	pub(crate) unsafe fn cmd_bind(
		&self,
		cmd: &mut P::CommandBuffer,
		bind_point: BindPoint,
		desc_index: u32,
	) -> Result<(), DescriptorError<P>> {
		self.check_desc_index(desc_index)?;
		if let Some(layout) = self.pipeline_layout.as_ref() {
			for (i, set) in self.sets.iter().enumerate() {
				self.platform
					.cmd_bind_descriptor_set(cmd, bind_point, layout, i as u32, &set.pool, desc_index);
			}
		}
		if self.debug {
			log::info!("bound descriptor instance {desc_index} of {} sets", self.sets.len());
		}
		Ok(())
	}

	/// Every Value instance `desc_index` binds, across all Sets.
	pub fn bound_values(&self, desc_index: u32) -> impl Iterator<Item = ValueId> + '_ {
		self.sets
			.iter()
			.filter_map(move |s| s.tables.get(desc_index as usize))
			.flat_map(|t| t.iter().map(|e| e.value))
	}

	/// The binding table of instance `desc_index` of Set `set`.
	pub fn binding_table(&self, set: u32, desc_index: u32) -> Result<&[BoundEntry], DescriptorError<P>> {
		self.check_desc_index(desc_index)?;
		Ok(&self.table(set)?.tables[desc_index as usize])
	}

	/// `(desc_index, array_element)` binding Value `value_index` of Var `var` of static Set `set`.
	pub fn static_value_location(
		&self,
		set: u32,
		var: &str,
		value_index: u32,
		vars: &Vars,
	) -> Result<(u32, u32), DescriptorError<P>> {
		let table = self.table(set)?;
		if table.plan.kind != SetKind::Static {
			return Err(DescriptorError::NotStatic { set });
		}
		let id = vars.value_id(set, var, value_index)?;
		let var = vars.var(id.var_id())?;
		table
			.plan
			.value_location(var.binding(), value_index)
			.ok_or_else(|| {
				VarsError::WrongRole {
					name: var.name().to_string(),
					role: var.role(),
					expected: "a descriptor role",
				}
				.into()
			})
	}

	/// Destroys the pipeline layout, the pools and the layouts.
	///
	/// # Safety
	/// No execution using these descriptor sets may be pending.
	pub(crate) unsafe fn destroy(&mut self) {
		if let Some(layout) = self.pipeline_layout.take() {
			self.platform.destroy_pipeline_layout(layout);
		}
		for set in self.sets.drain(..) {
			self.platform.destroy_descriptor_pool(set.pool);
			self.platform.destroy_descriptor_layout(set.layout);
		}
	}
}

impl<P: GpuPlatform> Drop for DescriptorTables<P> {
	fn drop(&mut self) {
		unsafe { self.destroy() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vars::{ElementType, ImageFormat, ShaderStages, VarRole};

	fn limits() -> DescriptorCounts {
		DescriptorCounts::REQUIRED_MINIMUM
	}

	#[test]
	fn test_dynamic_plan_binds_value_modulo() -> anyhow::Result<()> {
		let mut vars = Vars::new();
		let set = vars.add_set()?;
		vars.set_mut(set)?
			.add("Params", ElementType::Float32Vector4, 4, VarRole::Uniform, ShaderStages::COMPUTE)?;
		vars.set_mut(set)?
			.add("Data", ElementType::Float32, 16, VarRole::Storage, ShaderStages::COMPUTE)?;
		vars.set_mut(set)?.config_values(2)?;

		let plan = SetPlan::new(vars.set(set)?, &limits(), 16);
		assert_eq!(plan.groups, 2);
		assert_eq!(plan.bindings.len(), 2);
		let entries = plan.entries(3);
		assert_eq!(entries.len(), 2);
		assert!(entries.iter().all(|e| e.value.index == 1 && e.array_element == 0));
		assert_eq!(entries[1].binding, 1);
		Ok(())
	}

	#[test]
	fn test_static_plan_splits_textures() -> anyhow::Result<()> {
		let mut vars = Vars::new();
		let set = vars.add_static_set()?;
		vars.set_mut(set)?.add_image(
			"Tex",
			ImageFormat::Rgba8Srgb,
			[4, 4],
			VarRole::SampledImage,
			ShaderStages::FRAGMENT,
		)?;
		vars.set_mut(set)?.config_values(40)?;

		let plan = SetPlan::new(vars.set(set)?, &limits(), 16);
		assert_eq!(plan.bindings[0].layout.count, 16);
		assert_eq!(plan.groups, 3);
		assert_eq!(plan.value_location(0, 0), Some((0, 0)));
		assert_eq!(plan.value_location(0, 17), Some((1, 1)));
		assert_eq!(plan.value_location(0, 39), Some((2, 7)));
		assert_eq!(plan.value_location(0, 40), None);

		// trailing slots of the last group repeat its last Value
		let last = plan.entries(2);
		assert_eq!(last.len(), 16);
		assert_eq!(last[7].value.index, 39);
		assert!(last[8..].iter().all(|e| e.value.index == 39));
		Ok(())
	}

	#[test]
	fn test_static_plan_without_split() -> anyhow::Result<()> {
		let mut vars = Vars::new();
		let set = vars.add_static_set()?;
		vars.set_mut(set)?
			.add("Lights", ElementType::Float32Vector4, 8, VarRole::Storage, ShaderStages::COMPUTE)?;
		vars.set_mut(set)?.config_values(5)?;

		let plan = SetPlan::new(vars.set(set)?, &limits(), 16);
		assert_eq!(plan.groups, 1);
		assert_eq!(plan.bindings[0].layout.count, 5);
		assert_eq!(
			plan.entries(0).iter().map(|e| e.value.index).collect::<Vec<_>>(),
			vec![0, 1, 2, 3, 4]
		);
		assert_eq!(plan.entries(0), plan.entries(1));
		Ok(())
	}

	#[test]
	fn test_plan_skips_vertex_vars() -> anyhow::Result<()> {
		let mut vars = Vars::new();
		let set = vars.add_set()?;
		vars.set_mut(set)?
			.add("Pos", ElementType::Float32Vector3, 3, VarRole::Vertex, ShaderStages::VERTEX)?;
		let plan = SetPlan::new(vars.set(set)?, &limits(), 16);
		assert!(plan.bindings.is_empty());
		assert_eq!(plan.counts(), DescriptorCounts::ZERO);
		assert_eq!(plan.groups, 1);
		Ok(())
	}
}
