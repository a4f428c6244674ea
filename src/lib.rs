//! rendercache: on-demand page rendering behind a two-tier cache.
//!
//! Rendered markup is memoized in process memory and persisted to a shared
//! durable store so that restarts and sibling processes can reuse it.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
