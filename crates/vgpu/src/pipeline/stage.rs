/// Where a command buffer binds pipelines and descriptor sets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BindPoint {
	Compute,
	Graphics,
}

/// A coarse group of pipeline stages together with their memory accesses.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AccessScope {
	/// Host reads and writes of mapped memory
	Host,
	/// Copy commands
	Transfer,
	/// Shader reads and writes, vertex and index fetch and color attachment output
	Shader,
}

/// A global memory dependency: all `src` accesses recorded before happen before all `dst` accesses recorded after.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Barrier {
	pub src: AccessScope,
	pub dst: AccessScope,
}

impl Barrier {
	pub const fn new(src: AccessScope, dst: AccessScope) -> Self {
		Self { src, dst }
	}
}
