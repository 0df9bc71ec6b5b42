pub mod desc_sets;
pub mod descriptor_counts;
pub mod error;
pub mod layout;

pub use desc_sets::*;
pub use descriptor_counts::*;
pub use error::*;
pub use layout::*;
