//! rendercache cache system.
//!
//! Two tiers keyed by the same normalized path:
//!
//! - **Volatile**: process-local map of rendered markup, no expiry
//! - **Durable**: shared document store that outlives the process
//!
//! [`PageCache::resolve`] reads through both tiers and renders on a full
//! miss; [`PageCache::invalidate_key`] and [`PageCache::invalidate_pattern`]
//! remove entries from both.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! single_flight = true
//! durable_write_mode = "background"   # or "inline"
//! durable_write_attempts = 3
//! pattern_scans_durable = false
//! ```

mod config;
mod durable;
mod flight;
mod invalidate;
mod keys;
mod lock;
pub mod metric_keys;
mod orchestrator;
mod store;
mod writer;

pub use config::{
    CacheConfig, DEFAULT_DURABLE_WRITE_ATTEMPTS, DEFAULT_DURABLE_WRITE_BACKOFF_MS,
    DEFAULT_DURABLE_WRITE_MAX_BACKOFF_MS, DEFAULT_DURABLE_WRITE_QUEUE, DurableWriteMode,
};
pub use durable::{CacheEntry, DurableRecord, DurableStore, MemoryDurableStore, StoreError};
pub use flight::{Flight, FlightGuard, FlightOutcome, FlightWaiter, InFlightRenders};
pub use invalidate::InvalidationReport;
pub use keys::{CacheKey, KEY_SUBSTITUTE, normalize};
pub use orchestrator::PageCache;
pub use store::{Content, VolatileStore};
pub use writer::{DurableWriter, RetryPolicy, write_with_retry};
