//! Application-level contracts shared by the cache and its adapters.

pub mod error;
pub mod renderer;
