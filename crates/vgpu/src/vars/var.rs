use crate::vars::role::{ShaderStages, VarRole};
use crate::vars::types::ElementType;
use crate::vars::value::{Value, ValueId};

/// Upper bound of the bytes of element data per Value.
pub const MAX_VALUE_SIZE: u64 = 1 << 48;

/// Identifies a Var: Set index and Var index within the Set.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VarId {
	pub set: u32,
	pub var: u32,
}

impl VarId {
	pub fn value(&self, index: u32) -> ValueId {
		ValueId {
			set: self.set,
			var: self.var,
			index,
		}
	}
}

/// A named, typed shader resource declaration owning its Values.
#[derive(Debug)]
pub struct Var {
	pub(crate) id: VarId,
	pub(crate) name: String,
	pub(crate) ty: ElementType,
	pub(crate) count: u64,
	pub(crate) role: VarRole,
	pub(crate) stages: ShaderStages,
	pub(crate) binding: u32,
	pub(crate) extent: Option<[u32; 2]>,
	pub(crate) values: Vec<Value>,
}

impl Var {
	#[inline]
	pub fn id(&self) -> VarId {
		self.id
	}

	#[inline]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[inline]
	pub fn element_type(&self) -> ElementType {
		self.ty
	}

	/// Number of elements in every Value.
	#[inline]
	pub fn count(&self) -> u64 {
		self.count
	}

	#[inline]
	pub fn role(&self) -> VarRole {
		self.role
	}

	#[inline]
	pub fn stages(&self) -> ShaderStages {
		self.stages
	}

	/// The descriptor binding within its Set, or the vertex input binding for [`VarRole::Vertex`].
	#[inline]
	pub fn binding(&self) -> u32 {
		self.binding
	}

	/// Width and height of image Vars.
	#[inline]
	pub fn extent(&self) -> Option<[u32; 2]> {
		self.extent
	}

	/// Bytes of element data per Value.
	#[inline]
	pub fn value_size(&self) -> u64 {
		self.count * self.ty.size()
	}

	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn value(&self, index: u32) -> Option<&Value> {
		self.values.get(index as usize)
	}

	pub(crate) fn resize_values(&mut self, n: u32) {
		let size = self.value_size();
		let id = self.id;
		self.values.truncate(n as usize);
		let len = self.values.len() as u32;
		self.values.extend((len..n).map(|index| Value::new(id.value(index), size)));
	}
}
