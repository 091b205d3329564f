//! Temporary exclusion of failing endpoints.
//!
//! An endpoint that answered with 429 or could not be reached is admitted to
//! the [`ExclusionCache`] and skipped by the selector until its TTL runs out.
//! The TTL is measured from the admitting call and is never extended by later
//! failures of the same endpoint.
//!
//! Expired entries are ignored by lookups straight away and physically
//! removed by the [`Reaper`] on its next tick.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::two_queue::TwoQueue;

/// How often the reaper sweeps expired entries by default.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Expiry used when `now + ttl` is not representable; roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Shared map from endpoint to the instant its exclusion ends.
///
/// All access is serialized by a single lock that is only held for the
/// bookkeeping itself. The backing store is bounded; when it overflows, the
/// 2Q policy may drop an entry early, which only makes that endpoint
/// selectable sooner. An endpoint that was never admitted is never reported
/// as excluded.
pub struct ExclusionCache {
    entries: Mutex<TwoQueue<String, Instant>>,
    ttl: Duration,
}

impl ExclusionCache {
    /// Creates a cache holding at most `capacity` exclusions, each lasting `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(TwoQueue::new(capacity)),
            ttl,
        }
    }

    /// The TTL applied by [`exclude`](Self::exclude).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true while `endpoint` has an unexpired exclusion.
    pub fn is_excluded(&self, endpoint: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        matches!(entries.get(endpoint), Some(expires_at) if *expires_at > now)
    }

    /// Excludes `endpoint` for the configured TTL.
    ///
    /// Returns `false` when the endpoint was already excluded, in which case
    /// nothing changes.
    pub fn exclude(&self, endpoint: &str) -> bool {
        self.exclude_for(endpoint, self.ttl)
    }

    /// Excludes `endpoint` for `ttl`. A duplicate admission before expiry is a
    /// no-op; an expired entry that has not been swept yet is replaced.
    pub fn exclude_for(&self, endpoint: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(expires_at) = entries.peek(endpoint) {
            if *expires_at > now {
                return false;
            }
        }
        let expires_at = now.checked_add(ttl).unwrap_or(now + FAR_FUTURE);
        entries.insert(endpoint.to_string(), expires_at);
        true
    }

    /// Removes expired entries and returns the endpoints that became
    /// selectable again.
    pub fn purge_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries
            .remove_where(|_, expires_at| *expires_at <= now)
            .into_iter()
            .map(|(endpoint, _)| endpoint)
            .collect()
    }

    /// Snapshot of the endpoints currently excluded.
    pub fn excluded_endpoints(&self) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|(_, expires_at)| **expires_at > now)
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    /// Number of endpoints currently excluded.
    pub fn len(&self) -> usize {
        self.excluded_endpoints().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background task that sweeps expired exclusions.
pub struct Reaper {
    cache: Arc<ExclusionCache>,
    interval: Duration,
}

impl Reaper {
    pub fn new(cache: Arc<ExclusionCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Starts the reaper task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!("Exclusion reaper running every {:?}", self.interval);

        loop {
            interval.tick().await;
            for endpoint in self.cache.purge_expired() {
                info!("Endpoint {} is selectable again after exclusion expired", endpoint);
            }
        }
    }
}
