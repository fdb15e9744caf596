//! Domain models for the indication pipeline.

mod catalog;
mod mapping;

pub use catalog::*;
pub use mapping::*;
