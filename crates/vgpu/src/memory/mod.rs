pub mod block;
pub mod error;
pub mod image;
pub mod mem_buffer;
#[allow(clippy::module_inception)]
mod memory;
pub mod memory_type;

pub use block::*;
pub use error::*;
pub use image::*;
pub use mem_buffer::*;
pub use memory::*;
pub use memory_type::*;
