pub mod ash;
mod gpu;
pub mod host;

pub use gpu::*;
