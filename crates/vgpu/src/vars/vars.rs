use crate::pipeline::graphics_pipeline::{VertexBinding, VertexInputLayout};
use crate::vars::error::VarsError;
use crate::vars::role::VarRole;
use crate::vars::set::{SetKind, VarSet};
use crate::vars::value::{Value, ValueId};
use crate::vars::var::{Var, VarId};

/// The registry of all Sets, Vars and Values of a System.
#[derive(Debug, Default)]
pub struct Vars {
	sets: Vec<VarSet>,
	locked: bool,
}

impl Vars {
	pub fn new() -> Self {
		Self::default()
	}

	fn check_unlocked(&self) -> Result<(), VarsError> {
		if self.locked {
			Err(VarsError::AlreadyConfigured {
				set: self.sets.len() as u32,
			})
		} else {
			Ok(())
		}
	}

	/// Adds a dynamic Set and returns its index.
	pub fn add_set(&mut self) -> Result<u32, VarsError> {
		self.push_set(SetKind::Dynamic)
	}

	/// Adds a static Set and returns its index.
	pub fn add_static_set(&mut self) -> Result<u32, VarsError> {
		self.push_set(SetKind::Static)
	}

	fn push_set(&mut self, kind: SetKind) -> Result<u32, VarsError> {
		self.check_unlocked()?;
		let index = self.sets.len() as u32;
		self.sets.push(VarSet::new(index, kind));
		Ok(index)
	}

	pub fn sets(&self) -> &[VarSet] {
		&self.sets
	}

	pub fn set(&self, set: u32) -> Result<&VarSet, VarsError> {
		self.sets.get(set as usize).ok_or(VarsError::UnknownSet(set))
	}

	pub fn set_mut(&mut self, set: u32) -> Result<&mut VarSet, VarsError> {
		self.sets.get_mut(set as usize).ok_or(VarsError::UnknownSet(set))
	}

	pub fn is_locked(&self) -> bool {
		self.locked
	}

	pub(crate) fn set_locked(&mut self, locked: bool) {
		self.locked = locked;
		for set in &mut self.sets {
			set.locked = locked;
		}
	}

	pub fn var(&self, id: VarId) -> Result<&Var, VarsError> {
		self.set(id.set)?.vars.get(id.var as usize).ok_or(VarsError::UnknownVar {
			set: id.set,
			name: format!("#{}", id.var),
		})
	}

	pub fn var_by_name(&self, set: u32, name: &str) -> Result<&Var, VarsError> {
		self.set(set)?.var(name)
	}

	/// The id of Value `index` of Var `name` in `set`.
	pub fn value_id(&self, set: u32, name: &str, index: u32) -> Result<ValueId, VarsError> {
		let var = self.var_by_name(set, name)?;
		if index as usize >= var.values.len() {
			return Err(VarsError::IndexOutOfRange {
				set,
				name: name.to_string(),
				index,
				len: var.values.len() as u32,
			});
		}
		Ok(var.id.value(index))
	}

	pub fn value_by_index(&self, set: u32, name: &str, index: u32) -> Result<&Value, VarsError> {
		self.value(self.value_id(set, name, index)?)
	}

	pub fn value(&self, id: ValueId) -> Result<&Value, VarsError> {
		let var = self.var(id.var_id())?;
		var.values.get(id.index as usize).ok_or_else(|| VarsError::IndexOutOfRange {
			set: id.set,
			name: var.name.clone(),
			index: id.index,
			len: var.values.len() as u32,
		})
	}

	pub fn value_mut(&mut self, id: ValueId) -> Result<&mut Value, VarsError> {
		let set = self.sets.get_mut(id.set as usize).ok_or(VarsError::UnknownSet(id.set))?;
		let var = set.vars.get_mut(id.var as usize).ok_or(VarsError::UnknownVar {
			set: id.set,
			name: format!("#{}", id.var),
		})?;
		let len = var.values.len() as u32;
		let name = &var.name;
		var.values
			.get_mut(id.index as usize)
			.ok_or_else(|| VarsError::IndexOutOfRange {
				set: id.set,
				name: name.clone(),
				index: id.index,
				len,
			})
	}

	/// The Var of a Value together with the Value.
	pub fn var_value(&self, id: ValueId) -> Result<(&Var, &Value), VarsError> {
		let var = self.var(id.var_id())?;
		Ok((var, self.value(id)?))
	}

	pub fn vars(&self) -> impl Iterator<Item = &Var> + '_ {
		self.sets.iter().flat_map(|s| s.vars.iter())
	}

	pub(crate) fn vars_mut(&mut self) -> impl Iterator<Item = &mut Var> + '_ {
		self.sets.iter_mut().flat_map(|s| s.vars.iter_mut())
	}

	pub fn values(&self) -> impl Iterator<Item = (&Var, &Value)> + '_ {
		self.vars().flat_map(|var| var.values.iter().map(move |value| (var, value)))
	}

	/// Global vertex input binding of a [`VarRole::Vertex`] Var, counting vertex Vars in Set order.
	pub fn vertex_binding(&self, id: VarId) -> Option<u32> {
		self.vars()
			.filter(|v| v.role == VarRole::Vertex)
			.position(|v| v.id == id)
			.map(|i| i as u32)
	}

	pub fn vertex_layout(&self) -> VertexInputLayout {
		VertexInputLayout {
			bindings: self
				.vars()
				.filter(|v| v.role == VarRole::Vertex)
				.enumerate()
				.map(|(i, v)| VertexBinding {
					binding: i as u32,
					format: v.ty,
					stride: v.ty.size() as u32,
				})
				.collect(),
		}
	}

	/// Sum of all Value bytes, for diagnostics.
	pub fn total_value_bytes(&self) -> u64 {
		self.values().map(|(_, v)| v.size).sum()
	}
}

impl ValueId {
	pub fn var_id(&self) -> VarId {
		VarId {
			set: self.set,
			var: self.var,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vars::role::ShaderStages;
	use crate::vars::types::ElementType;

	#[test]
	fn test_value_lookup() -> anyhow::Result<()> {
		let mut vars = Vars::new();
		let set = vars.add_set()?;
		vars.set_mut(set)?
			.add("In", ElementType::Float32Vector4, 64, VarRole::Storage, ShaderStages::COMPUTE)?;
		vars.set_mut(set)?.config_values(2)?;

		let id = vars.value_id(set, "In", 1)?;
		assert_eq!(id, ValueId { set: 0, var: 0, index: 1 });
		assert_eq!(vars.value_by_index(set, "In", 1)?.size(), 1024);
		assert!(matches!(
			vars.value_by_index(set, "In", 2),
			Err(VarsError::IndexOutOfRange { index: 2, len: 2, .. })
		));
		assert!(matches!(vars.value_by_index(set, "Out", 0), Err(VarsError::UnknownVar { .. })));
		assert!(matches!(vars.value_by_index(5, "In", 0), Err(VarsError::UnknownSet(5))));
		Ok(())
	}

	#[test]
	fn test_vertex_layout_spans_sets() -> anyhow::Result<()> {
		let mut vars = Vars::new();
		let a = vars.add_set()?;
		let b = vars.add_set()?;
		let pos = vars.set_mut(a)?.add(
			"Pos",
			ElementType::Float32Vector3,
			3,
			VarRole::Vertex,
			ShaderStages::VERTEX,
		)?;
		vars.set_mut(b)?
			.add("Idx", ElementType::Uint16, 3, VarRole::Index, ShaderStages::VERTEX)?;
		let color = vars.set_mut(b)?.add(
			"Color",
			ElementType::Float32Vector4,
			3,
			VarRole::Vertex,
			ShaderStages::VERTEX,
		)?;

		let layout = vars.vertex_layout();
		assert_eq!(layout.bindings.len(), 2);
		assert_eq!(layout.bindings[1].stride, 16);
		assert_eq!(vars.vertex_binding(pos), Some(0));
		assert_eq!(vars.vertex_binding(color), Some(1));
		Ok(())
	}

	#[test]
	fn test_lock() -> anyhow::Result<()> {
		let mut vars = Vars::new();
		let set = vars.add_set()?;
		vars.set_locked(true);
		assert!(vars.add_set().is_err());
		assert!(matches!(
			vars.set_mut(set)?.config_values(2),
			Err(VarsError::AlreadyConfigured { set: 0 })
		));
		vars.set_locked(false);
		vars.set_mut(set)?.config_values(2)?;
		Ok(())
	}
}
