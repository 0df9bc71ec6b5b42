pub mod backing;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod platform;
pub mod system;
pub mod vars;

pub mod __private {
	pub use ash::vk::make_api_version;
}
