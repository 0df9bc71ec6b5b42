//! A device emulated on the host: shaders are closures, memory is host memory and submissions execute when waited on.
//! Used by tests and for running Systems without a Vulkan driver.

mod command;
mod memory;
#[allow(clippy::module_inception)]
mod platform;
mod shader;

pub use command::{HostCommandBuffer, HostPipeline, HostStats};
pub use memory::{decode_texel, encode_texel, HostBlock, HostImage, HostImageData, HostMemory};
pub use platform::*;
pub use shader::*;
