//! Single-flight coordination for cache misses.
//!
//! The first request to miss on a key becomes the leader and renders; later
//! requests for the same key wait for the leader's outcome instead of
//! rendering again. The marker is released when the leader completes or is
//! dropped, so a cancelled leader never strands its waiters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::application::renderer::RenderError;

use super::keys::CacheKey;
use super::store::Content;

/// Outcome published by a leader to its waiters.
pub type FlightOutcome = Result<Content, RenderError>;

struct Slot {
    id: u64,
    sender: watch::Sender<Option<FlightOutcome>>,
}

/// Registry of keys that currently have a render in progress.
#[derive(Default, Clone)]
pub struct InFlightRenders {
    flights: Arc<DashMap<CacheKey, Slot>>,
    next_id: Arc<AtomicU64>,
}

/// Role assigned to a request that missed both tiers.
pub enum Flight {
    Leader(FlightGuard),
    Follower(FlightWaiter),
}

impl InFlightRenders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the render for `key`, or subscribe to the render already running.
    pub fn join(&self, key: &CacheKey) -> Flight {
        match self.flights.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (sender, _receiver) = watch::channel(None);
                vacant.insert(Slot { id, sender });
                Flight::Leader(FlightGuard {
                    key: key.clone(),
                    id,
                    flights: Arc::clone(&self.flights),
                })
            }
            Entry::Occupied(occupied) => Flight::Follower(FlightWaiter {
                receiver: occupied.get().sender.subscribe(),
            }),
        }
    }

    /// Number of keys with a render in progress.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// Held by the leader for the duration of its render.
pub struct FlightGuard {
    key: CacheKey,
    id: u64,
    flights: Arc<DashMap<CacheKey, Slot>>,
}

impl FlightGuard {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Publish the outcome to every waiter and release the key.
    pub fn complete(self, outcome: &FlightOutcome) {
        if let Some((_, slot)) = self.release() {
            slot.sender.send_replace(Some(outcome.clone()));
        }
    }

    fn release(&self) -> Option<(CacheKey, Slot)> {
        self.flights.remove_if(&self.key, |_, slot| slot.id == self.id)
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // No-op after `complete`; otherwise dropping the sender wakes waiters
        // with a closed channel.
        self.release();
    }
}

/// Held by requests waiting on another request's render.
pub struct FlightWaiter {
    receiver: watch::Receiver<Option<FlightOutcome>>,
}

impl FlightWaiter {
    /// Wait for the leader's outcome.
    ///
    /// Returns `None` when the leader went away without publishing one.
    pub async fn wait(mut self) -> Option<FlightOutcome> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::normalize;

    #[tokio::test]
    async fn follower_receives_leader_outcome() {
        let flights = InFlightRenders::new();
        let key = normalize("/foo");

        let Flight::Leader(guard) = flights.join(&key) else {
            panic!("first join must lead");
        };
        let Flight::Follower(waiter) = flights.join(&key) else {
            panic!("second join must follow");
        };

        let pending = tokio::spawn(waiter.wait());
        guard.complete(&Ok(Content::from("<html></html>")));

        let outcome = pending.await.expect("waiter task").expect("published outcome");
        assert_eq!(&*outcome.expect("render ok"), "<html></html>");
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn failures_are_shared_with_followers() {
        let flights = InFlightRenders::new();
        let key = normalize("/broken");

        let Flight::Leader(guard) = flights.join(&key) else {
            panic!("first join must lead");
        };
        let Flight::Follower(waiter) = flights.join(&key) else {
            panic!("second join must follow");
        };

        guard.complete(&Err(RenderError::Timeout));
        assert_eq!(waiter.wait().await, Some(Err(RenderError::Timeout)));
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters() {
        let flights = InFlightRenders::new();
        let key = normalize("/cancelled");

        let Flight::Leader(guard) = flights.join(&key) else {
            panic!("first join must lead");
        };
        let Flight::Follower(waiter) = flights.join(&key) else {
            panic!("second join must follow");
        };

        drop(guard);
        assert!(waiter.wait().await.is_none());
        assert!(matches!(flights.join(&key), Flight::Leader(_)));
    }

    #[test]
    fn stale_guard_does_not_release_newer_flight() {
        let flights = InFlightRenders::new();
        let key = normalize("/reused");

        let Flight::Leader(first) = flights.join(&key) else {
            panic!("first join must lead");
        };
        first.complete(&Ok(Content::from("one")));

        let Flight::Leader(second) = flights.join(&key) else {
            panic!("key was released, next join must lead");
        };
        assert_eq!(flights.len(), 1);
        assert_eq!(second.key(), &key);
    }
}
