//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rendercache::application::renderer::{PageRenderer, RenderError, RenderRequest};
use rendercache::cache::{
    CacheEntry, CacheKey, DurableRecord, DurableStore, MemoryDurableStore, StoreError,
};

/// Renderer that records calls and returns `<html>{path}</html>`.
#[derive(Default)]
pub struct CountingRenderer {
    calls: AtomicUsize,
    delay: Option<Duration>,
    failure: Option<RenderError>,
    requests: Mutex<Vec<RenderRequest>>,
}

impl CountingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing(error: RenderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

pub fn markup_for(path: &str) -> String {
    format!("<html>{path}</html>")
}

#[async_trait]
impl PageRenderer for CountingRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(markup_for(&request.path)),
        }
    }
}

/// Memory store with call counters and switchable failures.
#[derive(Default)]
pub struct InstrumentedStore {
    pub inner: MemoryDurableStore,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
    scannable: bool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that can enumerate keys for pattern invalidation.
    pub fn scannable() -> Self {
        Self {
            scannable: true,
            ..Self::default()
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableStore for InstrumentedStore {
    async fn get(&self, key: &CacheKey) -> Result<DurableRecord, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StoreError::backend("get unavailable"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(StoreError::backend("set unavailable"));
        }
        self.inner.set(key, entry).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::backend("delete unavailable"));
        }
        self.inner.delete(key).await
    }

    async fn scan_keys(&self, needle: &str) -> Result<Vec<CacheKey>, StoreError> {
        if self.scannable {
            self.inner.scan_keys(needle).await
        } else {
            Err(StoreError::Unsupported {
                operation: "scan_keys",
            })
        }
    }
}
