pub mod command_pool;
pub mod compute_pipeline;
pub mod execution;
pub mod graphics_pipeline;
pub mod pipelines;
pub mod recording;
pub mod stage;

pub use command_pool::*;
pub use compute_pipeline::*;
pub use execution::*;
pub use graphics_pipeline::*;
pub use pipelines::*;
pub use recording::*;
pub use stage::*;
