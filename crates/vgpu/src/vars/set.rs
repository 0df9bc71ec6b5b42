use crate::vars::error::VarsError;
use crate::vars::role::{ShaderStages, VarRole};
use crate::vars::types::{ElementType, ImageFormat};
use crate::vars::var::{Var, VarId, MAX_VALUE_SIZE};

/// How the Values of a Set's Vars are bound.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SetKind {
	/// Descriptor set instance `i` binds Value `i` of every Var.
	Dynamic,
	/// All Values of a Var are bound at once as a binding array.
	Static,
}

/// An ordered group of Vars sharing one binding namespace.
#[derive(Debug)]
pub struct VarSet {
	pub(crate) index: u32,
	pub(crate) kind: SetKind,
	pub(crate) vars: Vec<Var>,
	pub(crate) n_values: u32,
	pub(crate) locked: bool,
	next_descriptor_binding: u32,
	next_vertex_binding: u32,
}

impl VarSet {
	pub(crate) fn new(index: u32, kind: SetKind) -> Self {
		Self {
			index,
			kind,
			vars: Vec::new(),
			n_values: 1,
			locked: false,
			next_descriptor_binding: 0,
			next_vertex_binding: 0,
		}
	}

	#[inline]
	pub fn index(&self) -> u32 {
		self.index
	}

	#[inline]
	pub fn kind(&self) -> SetKind {
		self.kind
	}

	/// Number of Values every Var of this Set has.
	#[inline]
	pub fn n_values(&self) -> u32 {
		self.n_values
	}

	pub fn vars(&self) -> &[Var] {
		&self.vars
	}

	pub fn var(&self, name: &str) -> Result<&Var, VarsError> {
		self.vars
			.iter()
			.find(|v| v.name == name)
			.ok_or_else(|| VarsError::UnknownVar {
				set: self.index,
				name: name.to_string(),
			})
	}

	pub(crate) fn var_mut(&mut self, name: &str) -> Result<&mut Var, VarsError> {
		let set = self.index;
		self.vars
			.iter_mut()
			.find(|v| v.name == name)
			.ok_or_else(|| VarsError::UnknownVar {
				set,
				name: name.to_string(),
			})
	}

	fn check_unlocked(&self) -> Result<(), VarsError> {
		if self.locked {
			Err(VarsError::AlreadyConfigured { set: self.index })
		} else {
			Ok(())
		}
	}

	/// Declares a Var of `count` elements of `ty`.
	pub fn add(
		&mut self,
		name: &str,
		ty: ElementType,
		count: u64,
		role: VarRole,
		stages: ShaderStages,
	) -> Result<VarId, VarsError> {
		self.check_unlocked()?;
		if role.is_image() {
			return Err(VarsError::InvalidRole {
				name: name.to_string(),
				role,
				ty,
			});
		}
		self.push(name, ty, count, role, stages, None)
	}

	/// Declares a two dimensional image Var.
	pub fn add_image(
		&mut self,
		name: &str,
		format: ImageFormat,
		extent: [u32; 2],
		role: VarRole,
		stages: ShaderStages,
	) -> Result<VarId, VarsError> {
		self.check_unlocked()?;
		let ty = ElementType::Texel(format);
		if !role.is_image() {
			return Err(VarsError::InvalidRole {
				name: name.to_string(),
				role,
				ty,
			});
		}
		let count = extent[0] as u64 * extent[1] as u64;
		self.push(name, ty, count, role, stages, Some(extent))
	}

	fn push(
		&mut self,
		name: &str,
		ty: ElementType,
		count: u64,
		role: VarRole,
		stages: ShaderStages,
		extent: Option<[u32; 2]>,
	) -> Result<VarId, VarsError> {
		if self.vars.iter().any(|v| v.name == name) {
			return Err(VarsError::DuplicateName {
				set: self.index,
				name: name.to_string(),
			});
		}
		if !role.accepts(ty) {
			return Err(VarsError::InvalidRole {
				name: name.to_string(),
				role,
				ty,
			});
		}
		if count == 0 {
			return Err(VarsError::ZeroCount { name: name.to_string() });
		}
		if ty.size().checked_mul(count).map_or(true, |size| size > MAX_VALUE_SIZE) {
			return Err(VarsError::TooLarge {
				name: name.to_string(),
				count,
				max: MAX_VALUE_SIZE,
			});
		}

		let binding = if role.descriptor_kind().is_some() {
			let binding = self.next_descriptor_binding;
			self.next_descriptor_binding += 1;
			binding
		} else {
			let binding = self.next_vertex_binding;
			self.next_vertex_binding += 1;
			binding
		};
		let id = VarId {
			set: self.index,
			var: self.vars.len() as u32,
		};
		let mut var = Var {
			id,
			name: name.to_string(),
			ty,
			count,
			role,
			stages,
			binding,
			extent,
			values: Vec::new(),
		};
		var.resize_values(self.n_values);
		self.vars.push(var);
		Ok(id)
	}

	/// Sets the number of Values of every Var in this Set.
	pub fn config_values(&mut self, n: u32) -> Result<(), VarsError> {
		self.check_unlocked()?;
		if n == 0 {
			return Err(VarsError::ZeroValues { set: self.index });
		}
		self.n_values = n;
		for var in &mut self.vars {
			var.resize_values(n);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::{ErrorClass, ErrorKind};

	#[test]
	fn test_add_assigns_bindings_per_namespace() -> anyhow::Result<()> {
		let mut set = VarSet::new(0, SetKind::Dynamic);
		let a = set.add("A", ElementType::Float32Vector4, 4, VarRole::Storage, ShaderStages::COMPUTE)?;
		let pos = set.add("Pos", ElementType::Float32Vector3, 3, VarRole::Vertex, ShaderStages::VERTEX)?;
		let b = set.add("B", ElementType::Float32, 1, VarRole::Uniform, ShaderStages::COMPUTE)?;
		assert_eq!((a.var, pos.var, b.var), (0, 1, 2));
		assert_eq!(set.var("A")?.binding(), 0);
		assert_eq!(set.var("Pos")?.binding(), 0);
		assert_eq!(set.var("B")?.binding(), 1);
		Ok(())
	}

	#[test]
	fn test_duplicate_name() -> anyhow::Result<()> {
		let mut set = VarSet::new(2, SetKind::Dynamic);
		set.add("A", ElementType::Float32, 1, VarRole::Storage, ShaderStages::COMPUTE)?;
		let err = set
			.add("A", ElementType::Int32, 1, VarRole::Uniform, ShaderStages::COMPUTE)
			.unwrap_err();
		assert!(matches!(err, VarsError::DuplicateName { set: 2, .. }));
		Ok(())
	}

	#[test]
	fn test_invalid_role() {
		let mut set = VarSet::new(0, SetKind::Static);
		assert!(matches!(
			set.add("T", ElementType::Float32, 1, VarRole::SampledImage, ShaderStages::FRAGMENT),
			Err(VarsError::InvalidRole { .. })
		));
		assert!(matches!(
			set.add_image("T", ImageFormat::Rgba8Srgb, [4, 4], VarRole::Uniform, ShaderStages::FRAGMENT),
			Err(VarsError::InvalidRole { .. })
		));
		assert!(matches!(
			set.add("I", ElementType::Float32, 3, VarRole::Index, ShaderStages::VERTEX),
			Err(VarsError::InvalidRole { .. })
		));
		assert!(matches!(
			set.add("Z", ElementType::Float32, 0, VarRole::Storage, ShaderStages::COMPUTE),
			Err(VarsError::ZeroCount { .. })
		));
	}

	#[test]
	fn test_too_large() -> anyhow::Result<()> {
		let mut set = VarSet::new(0, SetKind::Dynamic);
		let err = set
			.add("X", ElementType::Float32Vector4, 1 << 60, VarRole::Storage, ShaderStages::COMPUTE)
			.unwrap_err();
		assert!(matches!(err, VarsError::TooLarge { .. }));
		assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
		assert!(matches!(
			set.add("Y", ElementType::Float32, u64::MAX, VarRole::Storage, ShaderStages::COMPUTE),
			Err(VarsError::TooLarge { .. })
		));
		assert!(matches!(
			set.add_image(
				"T",
				ImageFormat::Rgba32Float,
				[u32::MAX, u32::MAX],
				VarRole::StorageImage,
				ShaderStages::COMPUTE
			),
			Err(VarsError::TooLarge { .. })
		));
		// failed declarations leave nothing behind
		assert!(set.vars().is_empty());
		set.add("X", ElementType::Float32Vector4, 64, VarRole::Storage, ShaderStages::COMPUTE)?;
		Ok(())
	}

	#[test]
	fn test_config_values() -> anyhow::Result<()> {
		let mut set = VarSet::new(0, SetKind::Dynamic);
		set.add("A", ElementType::Float32Vector4, 64, VarRole::Storage, ShaderStages::COMPUTE)?;
		set.config_values(3)?;
		let var = set.var("A")?;
		assert_eq!(var.values().len(), 3);
		for (i, value) in var.values().iter().enumerate() {
			assert_eq!(value.id().index, i as u32);
			assert_eq!(value.size(), 64 * 16);
		}
		set.add("B", ElementType::Float32, 1, VarRole::Uniform, ShaderStages::COMPUTE)?;
		assert_eq!(set.var("B")?.values().len(), 3);
		assert!(matches!(set.config_values(0), Err(VarsError::ZeroValues { set: 0 })));
		assert_eq!(set.n_values(), 3);
		Ok(())
	}

	#[test]
	fn test_locked_set_rejects_changes() -> anyhow::Result<()> {
		let mut set = VarSet::new(1, SetKind::Dynamic);
		set.locked = true;
		assert!(matches!(set.config_values(2), Err(VarsError::AlreadyConfigured { set: 1 })));
		assert!(matches!(
			set.add("A", ElementType::Float32, 1, VarRole::Storage, ShaderStages::COMPUTE),
			Err(VarsError::AlreadyConfigured { set: 1 })
		));
		Ok(())
	}
}
