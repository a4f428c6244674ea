//! Background durable writer.
//!
//! Moves durable-tier population off the request path. Jobs are processed in
//! submission order by a single task, so writes and deletions for the same key
//! land in the order they were submitted. A deletion therefore always follows
//! any write queued (or still retrying) ahead of it. Each write is retried with
//! exponential backoff; a write that exhausts its attempts is dropped with a
//! warning. Deletions get one attempt and report their outcome to the caller.
//!
//! A panic inside the store is caught per job, so one faulty call does not
//! close the queue for the rest of the process.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::durable::{CacheEntry, DurableStore, StoreError};
use super::keys::CacheKey;
use super::metric_keys::METRIC_STORE_ERROR_TOTAL;

/// Retry schedule for background durable writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

enum WriteJob {
    Set {
        key: CacheKey,
        entry: CacheEntry,
    },
    Delete {
        key: CacheKey,
        done: oneshot::Sender<Result<(), StoreError>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle used to submit durable writes to the background task.
#[derive(Clone)]
pub struct DurableWriter {
    sender: mpsc::Sender<WriteJob>,
}

impl DurableWriter {
    /// Spawn the writer task. It exits once every handle has been dropped and
    /// the queue is drained.
    pub fn spawn(
        store: Arc<dyn DurableStore>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(store, policy, receiver));
        (Self { sender }, handle)
    }

    /// Queue a write. Returns `false` when the queue is full or closed; the
    /// write is then skipped.
    pub fn enqueue(&self, key: CacheKey, entry: CacheEntry) -> bool {
        match self.sender.try_send(WriteJob::Set { key, entry }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                report_dropped(job, "queue_full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                report_dropped(job, "queue_closed");
                false
            }
        }
    }

    /// Delete `key` after every job queued before this call.
    ///
    /// Waits for queue capacity rather than skipping. Returns `None` when the
    /// writer has stopped; nothing queued can land after that point.
    pub async fn delete(&self, key: CacheKey) -> Option<Result<(), StoreError>> {
        let (done, outcome) = oneshot::channel();
        self.sender
            .send(WriteJob::Delete { key, done })
            .await
            .ok()?;
        Some(
            outcome
                .await
                .unwrap_or_else(|_| Err(StoreError::backend("durable writer dropped the deletion"))),
        )
    }

    /// Wait until every job queued before this call has been processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WriteJob::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

fn report_dropped(job: WriteJob, reason: &'static str) {
    if let WriteJob::Set { key, .. } = job {
        counter!(METRIC_STORE_ERROR_TOTAL, "op" => "set").increment(1);
        warn!(
            cache = "durable",
            key = %key,
            reason,
            "durable write skipped"
        );
    }
}

async fn run(
    store: Arc<dyn DurableStore>,
    policy: RetryPolicy,
    mut receiver: mpsc::Receiver<WriteJob>,
) {
    while let Some(job) = receiver.recv().await {
        let op = job.op();
        if AssertUnwindSafe(process(store.as_ref(), &policy, job))
            .catch_unwind()
            .await
            .is_err()
        {
            counter!(METRIC_STORE_ERROR_TOTAL, "op" => op).increment(1);
            error!(cache = "durable", op, "durable store panicked, job dropped");
        }
    }
    debug!(cache = "durable", "durable writer stopped");
}

async fn process(store: &dyn DurableStore, policy: &RetryPolicy, job: WriteJob) {
    match job {
        WriteJob::Set { key, entry } => {
            if let Err(err) = write_with_retry(store, policy, &key, &entry).await {
                counter!(METRIC_STORE_ERROR_TOTAL, "op" => "set").increment(1);
                warn!(
                    cache = "durable",
                    key = %key,
                    attempts = policy.attempts,
                    error = %err,
                    "durable write abandoned"
                );
            }
        }
        WriteJob::Delete { key, done } => {
            let _ = done.send(store.delete(&key).await);
        }
        WriteJob::Flush(done) => {
            let _ = done.send(());
        }
    }
}

impl WriteJob {
    fn op(&self) -> &'static str {
        match self {
            WriteJob::Set { .. } => "set",
            WriteJob::Delete { .. } => "delete",
            WriteJob::Flush(_) => "flush",
        }
    }
}

/// Write `entry`, retrying per `policy`. Returns the last error on exhaustion.
pub async fn write_with_retry(
    store: &dyn DurableStore,
    policy: &RetryPolicy,
    key: &CacheKey,
    entry: &CacheEntry,
) -> Result<(), StoreError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match store.set(key, entry).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                debug!(
                    cache = "durable",
                    key = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "durable write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
