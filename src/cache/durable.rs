//! Durable cache tier.
//!
//! A remote document store keyed identically to the volatile tier. Each
//! document holds `{content, sourceUrl, createdAt}` plus a store-assigned
//! write timestamp.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use super::keys::CacheKey;

/// Failure talking to the durable tier.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable store backend error: {0}")]
    Backend(String),
    #[error("durable store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("durable store timed out")]
    Timeout,
    #[error("durable store does not support `{operation}`")]
    Unsupported { operation: &'static str },
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Entry written to the durable tier on population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub content: String,
    /// Request path before normalization, kept for diagnostics.
    pub source_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl CacheEntry {
    pub fn new(content: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_url: source_url.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn to_document(&self) -> Result<Value, StoreError> {
        serde_json::to_value(self).map_err(StoreError::from)
    }
}

/// Result of a durable lookup.
///
/// The payload is only trusted when the record exists and its `content` field
/// is a string. Anything else reads as a miss.
#[derive(Debug, Clone, Default)]
pub struct DurableRecord {
    exists: bool,
    payload: Option<Value>,
    timestamp: Option<OffsetDateTime>,
}

impl DurableRecord {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn found(payload: Value, timestamp: OffsetDateTime) -> Self {
        Self {
            exists: true,
            payload: Some(payload),
            timestamp: Some(timestamp),
        }
    }

    /// Record whose existence flag is set but whose payload could not be read.
    pub fn without_payload(timestamp: Option<OffsetDateTime>) -> Self {
        Self {
            exists: true,
            payload: None,
            timestamp,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Payload accessor gated on the existence flag.
    pub fn payload(&self) -> Option<&Value> {
        if self.exists {
            self.payload.as_ref()
        } else {
            None
        }
    }

    /// Rendered content when the record is a well-formed hit.
    pub fn content(&self) -> Option<&str> {
        self.payload()?.get("content")?.as_str()
    }

    pub fn is_hit(&self) -> bool {
        self.content().is_some()
    }

    /// True when the store reported a document that failed the shape check.
    pub fn is_malformed(&self) -> bool {
        self.exists && !self.is_hit()
    }

    pub fn source_url(&self) -> Option<&str> {
        self.payload()?.get("sourceUrl")?.as_str()
    }

    /// Store-assigned write time, distinct from the entry's `createdAt`.
    pub fn timestamp(&self) -> Option<OffsetDateTime> {
        self.timestamp
    }
}

/// Adapter over the durable document store.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Look up `key`. A missing document is `Ok(DurableRecord::absent())`.
    async fn get(&self, key: &CacheKey) -> Result<DurableRecord, StoreError>;

    /// Upsert `entry` under `key`; last writer wins.
    async fn set(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Keys containing `needle`. Backends without an enumerable index
    /// report [`StoreError::Unsupported`].
    async fn scan_keys(&self, needle: &str) -> Result<Vec<CacheKey>, StoreError> {
        let _ = needle;
        Err(StoreError::Unsupported {
            operation: "scan_keys",
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    payload: Value,
    timestamp: OffsetDateTime,
}

/// In-process document store.
///
/// Used for local development (`store.backend = "memory"`) and tests. Unlike
/// the volatile tier it stores the full document with its write timestamp.
#[derive(Default)]
pub struct MemoryDurableStore {
    documents: DashMap<CacheKey, StoredDocument>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary document, bypassing [`CacheEntry`] serialization.
    pub fn insert_document(&self, key: CacheKey, payload: Value) {
        self.documents.insert(
            key,
            StoredDocument {
                payload,
                timestamp: OffsetDateTime::now_utc(),
            },
        );
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.documents.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn get(&self, key: &CacheKey) -> Result<DurableRecord, StoreError> {
        Ok(match self.documents.get(key) {
            Some(doc) => DurableRecord::found(doc.payload.clone(), doc.timestamp),
            None => DurableRecord::absent(),
        })
    }

    async fn set(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), StoreError> {
        let payload = entry.to_document()?;
        debug!(store = "memory", key = %key, "writing durable document");
        self.insert_document(key.clone(), payload);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.documents.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, needle: &str) -> Result<Vec<CacheKey>, StoreError> {
        Ok(self
            .documents
            .iter()
            .filter(|doc| doc.key().contains(needle))
            .map(|doc| doc.key().clone())
            .collect())
    }
}
