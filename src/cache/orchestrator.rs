//! Read-through / write-through page cache.
//!
//! Lookup order is volatile tier, then durable tier, then the renderer. A
//! durable hit backfills the volatile tier; a render populates both. Durable
//! failures never reach the caller: reads degrade to a miss and writes are
//! skipped with a warning.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, instrument, warn};

use crate::application::renderer::{PageRenderer, RenderError, RenderRequest};

use super::config::{CacheConfig, DurableWriteMode};
use super::durable::{CacheEntry, DurableStore, StoreError};
use super::flight::{Flight, InFlightRenders};
use super::keys::{CacheKey, normalize};
use super::metric_keys::{
    METRIC_DURABLE_HIT_TOTAL, METRIC_MISS_TOTAL, METRIC_RENDER_MS, METRIC_RENDER_SHARED_TOTAL,
    METRIC_RENDER_TOTAL, METRIC_STORE_ERROR_TOTAL, METRIC_VOLATILE_HIT_TOTAL,
};
use super::store::{Content, VolatileStore};
use super::writer::DurableWriter;

/// Two-tier page cache shared by every request handler.
///
/// Construct once at startup and pass it around behind an `Arc`.
pub struct PageCache {
    pub(super) config: CacheConfig,
    pub(super) volatile: VolatileStore,
    pub(super) durable: Arc<dyn DurableStore>,
    flights: InFlightRenders,
    writer: Option<DurableWriter>,
}

impl PageCache {
    /// Build a cache over `durable`.
    ///
    /// In background write mode this spawns the durable writer, so it must be
    /// called from within a Tokio runtime. The writer isolates store panics per
    /// job and only exits once this cache is dropped, so its handle is not kept.
    pub fn new(config: CacheConfig, durable: Arc<dyn DurableStore>) -> Self {
        let writer = match config.durable_write_mode {
            DurableWriteMode::Inline => None,
            DurableWriteMode::Background => {
                let (writer, _task) = DurableWriter::spawn(
                    Arc::clone(&durable),
                    config.retry_policy(),
                    config.durable_write_queue,
                );
                Some(writer)
            }
        };

        Self {
            config,
            volatile: VolatileStore::new(),
            durable,
            flights: InFlightRenders::new(),
            writer,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn volatile(&self) -> &VolatileStore {
        &self.volatile
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.durable
    }

    /// Resolve `request_path` to rendered content, rendering on a full miss.
    ///
    /// Only renderer failures are returned; durable-tier faults are absorbed.
    #[instrument(skip_all, fields(path = %request_path))]
    pub async fn resolve(
        &self,
        request_path: &str,
        renderer: &dyn PageRenderer,
    ) -> Result<Content, RenderError> {
        let key = normalize(request_path);

        if let Some(content) = self.lookup(&key).await {
            return Ok(content);
        }

        counter!(METRIC_MISS_TOTAL).increment(1);
        debug!(key = %key, outcome = "miss", "cache miss, rendering");

        if !self.config.single_flight {
            let content = self.render(request_path, renderer).await?;
            self.volatile.set(key.clone(), content.clone());
            self.persist(key, request_path, &content).await;
            return Ok(content);
        }

        loop {
            match self.flights.join(&key) {
                Flight::Leader(guard) => {
                    // A previous leader may have finished between our lookup and the claim.
                    if let Some(content) = self.volatile.get(&key) {
                        counter!(METRIC_VOLATILE_HIT_TOTAL).increment(1);
                        guard.complete(&Ok(content.clone()));
                        return Ok(content);
                    }

                    let outcome = self.render(request_path, renderer).await;
                    if let Ok(content) = &outcome {
                        self.volatile.set(key.clone(), content.clone());
                    }
                    guard.complete(&outcome);

                    let content = outcome?;
                    self.persist(key, request_path, &content).await;
                    return Ok(content);
                }
                Flight::Follower(waiter) => {
                    if let Some(outcome) = waiter.wait().await {
                        counter!(METRIC_RENDER_SHARED_TOTAL).increment(1);
                        debug!(key = %key, "reusing in-flight render");
                        return outcome;
                    }
                    debug!(key = %key, "in-flight render abandoned, retrying");
                }
            }
        }
    }

    /// Wait for queued background durable writes to finish.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Content> {
        if let Some(content) = self.volatile.get(key) {
            counter!(METRIC_VOLATILE_HIT_TOTAL).increment(1);
            debug!(cache = "volatile", key = %key, outcome = "hit", "serving cached page");
            return Some(content);
        }

        let record = match self.durable.get(key).await {
            Ok(record) => record,
            Err(err) => {
                counter!(METRIC_STORE_ERROR_TOTAL, "op" => "get").increment(1);
                warn!(
                    cache = "durable",
                    key = %key,
                    error = %err,
                    "durable lookup failed, treating as miss"
                );
                return None;
            }
        };

        match record.content() {
            Some(content) => {
                let content = Content::from(content);
                self.volatile.set(key.clone(), content.clone());
                counter!(METRIC_DURABLE_HIT_TOTAL).increment(1);
                debug!(cache = "durable", key = %key, outcome = "hit", "backfilled volatile tier");
                Some(content)
            }
            None => {
                if record.is_malformed() {
                    debug!(
                        cache = "durable",
                        key = %key,
                        outcome = "malformed",
                        "durable record failed shape check, treating as miss"
                    );
                }
                None
            }
        }
    }

    async fn render(
        &self,
        request_path: &str,
        renderer: &dyn PageRenderer,
    ) -> Result<Content, RenderError> {
        let request =
            RenderRequest::new(request_path).with_base_href(self.config.base_href.clone());
        let started = Instant::now();
        let result = renderer.render(&request).await;
        histogram!(METRIC_RENDER_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        counter!(METRIC_RENDER_TOTAL).increment(1);

        match result {
            Ok(markup) => Ok(Content::from(markup)),
            Err(err) => {
                warn!(path = request_path, error = %err, "render failed");
                Err(err)
            }
        }
    }

    /// Remove `key` from the durable tier.
    ///
    /// In background mode the deletion is queued behind pending writes, so a
    /// write submitted earlier cannot land after it.
    pub(super) async fn delete_durable(&self, key: &CacheKey) -> Result<(), StoreError> {
        if let Some(writer) = &self.writer
            && let Some(outcome) = writer.delete(key.clone()).await
        {
            return outcome;
        }
        self.durable.delete(key).await
    }

    async fn persist(&self, key: CacheKey, source_url: &str, content: &Content) {
        let entry = CacheEntry::new(&**content, source_url);

        match &self.writer {
            Some(writer) => {
                writer.enqueue(key, entry);
            }
            None => {
                if let Err(err) = self.durable.set(&key, &entry).await {
                    counter!(METRIC_STORE_ERROR_TOTAL, "op" => "set").increment(1);
                    warn!(
                        cache = "durable",
                        key = %key,
                        error = %err,
                        "durable write failed, entry kept in memory only"
                    );
                }
            }
        }
    }
}
