pub mod error;
pub mod role;
pub mod set;
pub mod types;
pub mod value;
pub mod var;
#[allow(clippy::module_inception)]
pub mod vars;

pub use error::*;
pub use role::*;
pub use set::*;
pub use types::*;
pub use value::*;
pub use var::*;
pub use vars::*;
