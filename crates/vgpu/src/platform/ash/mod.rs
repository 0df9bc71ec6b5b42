//! The Vulkan platform, built on [`ash`] and [`gpu_allocator`].

mod convert;
mod device;
mod gpu;
pub mod init;

pub use device::*;
