//! Mapping Module - relation schema consumed by the end-point subsystem

pub mod metadata;
pub mod registry;

pub use metadata::*;
pub use registry::*;
