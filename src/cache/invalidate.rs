//! Explicit invalidation across both tiers.
//!
//! Tier deletions are independent: a durable failure never restores the
//! volatile entry and is not retried. Durable deletions go through
//! `PageCache::delete_durable`, which orders them after pending background
//! writes.

use std::collections::BTreeSet;

use futures::future::join_all;
use metrics::counter;
use tracing::{info, instrument, warn};

use super::durable::StoreError;
use super::keys::{CacheKey, normalize};
use super::metric_keys::{METRIC_INVALIDATED_TOTAL, METRIC_STORE_ERROR_TOTAL};
use super::orchestrator::PageCache;

/// Keys targeted by an invalidation and how many durable deletions failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub keys: Vec<CacheKey>,
    pub durable_failures: usize,
}

impl InvalidationReport {
    pub fn merge(mut self, other: InvalidationReport) -> Self {
        self.keys.extend(other.keys);
        self.durable_failures += other.durable_failures;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl PageCache {
    /// Drop the entry for `raw_path` from both tiers. Idempotent.
    #[instrument(skip_all, fields(path = %raw_path))]
    pub async fn invalidate_key(&self, raw_path: &str) -> InvalidationReport {
        let key = normalize(raw_path);
        self.volatile.delete(&key);

        let result = self.delete_durable(&key).await;
        let report = self.report([(key, result)]);
        info!(keys = report.keys.len(), "invalidated key");
        report
    }

    /// Drop every key containing `needle` (plain substring match).
    ///
    /// Candidates come from a snapshot of the volatile tier. Entries that only
    /// exist in the durable tier are missed unless `pattern_scans_durable` is
    /// enabled and the backend can enumerate keys.
    #[instrument(skip_all, fields(pattern = %needle))]
    pub async fn invalidate_pattern(&self, needle: &str) -> InvalidationReport {
        let mut targets: BTreeSet<CacheKey> = self
            .volatile
            .keys()
            .into_iter()
            .filter(|key| key.contains(needle))
            .collect();

        if self.config.pattern_scans_durable {
            match self.durable.scan_keys(needle).await {
                Ok(keys) => targets.extend(keys),
                Err(err) => warn!(
                    cache = "durable",
                    error = %err,
                    "durable key scan failed, invalidating volatile matches only"
                ),
            }
        }

        for key in &targets {
            self.volatile.delete(key);
        }

        let deletions = targets.into_iter().map(|key| async move {
            let result = self.delete_durable(&key).await;
            (key, result)
        });
        let results = join_all(deletions).await;

        let report = self.report(results);
        info!(
            keys = report.keys.len(),
            durable_failures = report.durable_failures,
            "invalidated pattern"
        );
        report
    }

    fn report(
        &self,
        results: impl IntoIterator<Item = (CacheKey, Result<(), StoreError>)>,
    ) -> InvalidationReport {
        let mut report = InvalidationReport::default();
        for (key, result) in results {
            if let Err(err) = result {
                counter!(METRIC_STORE_ERROR_TOTAL, "op" => "delete").increment(1);
                warn!(
                    cache = "durable",
                    key = %key,
                    error = %err,
                    "durable delete failed, volatile entry already removed"
                );
                report.durable_failures += 1;
            }
            counter!(METRIC_INVALIDATED_TOTAL).increment(1);
            report.keys.push(key);
        }
        report
    }
}
