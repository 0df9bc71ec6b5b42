pub mod align;
pub mod range_set;
