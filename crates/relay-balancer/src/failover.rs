use std::sync::Arc;
use std::time::Duration;

use relay_common::error::Result;
use relay_common::RelayConfig;
use tracing::{info, warn};

use crate::alert::{AlertLevel, Notifier, SlackNotifier};
use crate::exclusion::{ExclusionCache, Reaper, DEFAULT_REAP_INTERVAL};
use crate::forwarder::{Attempt, Forwarder, RequestSnapshot, UpstreamResponse};
use crate::selector::CandidateSelector;

/// Timeout for a single alert delivery.
const ALERT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which pool a routing pass runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Primary,
    Fallback,
}

/// Result of routing one inbound request, or one phase of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingOutcome {
    /// An endpoint gave a usable answer
    Relayed(UpstreamResponse),
    /// No primary endpoint gave a usable answer
    PrimaryExhausted,
    /// No fallback endpoint gave a usable answer; the request fails
    FallbackExhausted,
}

/// Two-tier failover router.
///
/// Each inbound request is tried against the primary pool in random order,
/// skipping excluded endpoints. Endpoints answering 429 or failing at the
/// transport level are excluded for the configured TTL and the next
/// candidate is tried. When the primary pool runs out, a warning alert is
/// raised and the same pass runs over the fallback pool; when that runs out
/// too, a fatal alert is raised and the request fails.
///
/// The only shared mutable state is the [`ExclusionCache`]. Pools are fixed
/// at construction.
pub struct FailoverRouter {
    primary: Vec<String>,
    fallback: Vec<String>,
    exclusions: Arc<ExclusionCache>,
    selector: CandidateSelector,
    forwarder: Forwarder,
    notifier: Arc<dyn Notifier>,
    /// Background reaper task handle, aborted on drop
    reaper_handle: Option<tokio::task::JoinHandle<()>>,
}

impl FailoverRouter {
    /// Creates a router that sends alerts to the configured Slack webhook.
    ///
    /// Must be called from within a tokio runtime; the exclusion reaper is
    /// spawned here.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let notifier = SlackNotifier::new(config.slack_webhook_url.clone(), ALERT_TIMEOUT)?;
        Self::with_notifier(config, Arc::new(notifier))
    }

    /// Creates a router with a custom alert sink.
    ///
    /// # Arguments
    /// * `config` - Validated relay configuration; pools are copied out of it
    /// * `notifier` - Receives the warning and fatal escalation alerts
    ///
    /// # Returns
    /// - `Ok(FailoverRouter)` - Router ready to route, reaper running
    /// - `Err(RelayError)` - The configuration is invalid or the HTTP client
    ///   could not be built
    ///
    /// # Behavior
    /// - Spawns the exclusion reaper, so a tokio runtime must be running
    /// - The reaper is aborted when the router is dropped
    pub fn with_notifier(config: &RelayConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;

        let exclusions = Arc::new(ExclusionCache::new(
            config.exclusion_capacity,
            config.exclusion_ttl,
        ));
        let reaper = Reaper::new(
            exclusions.clone(),
            DEFAULT_REAP_INTERVAL.min(config.exclusion_ttl),
        );
        let reaper_handle = reaper.spawn();

        info!(
            "Failover router initialized with {} primary and {} fallback RPCs, exclusion TTL {:?}",
            config.primary.len(),
            config.fallback.len(),
            config.exclusion_ttl
        );

        Ok(Self {
            primary: config.primary.clone(),
            fallback: config.fallback.clone(),
            selector: CandidateSelector::new(exclusions.clone()),
            exclusions,
            forwarder: Forwarder::new(config.upstream_timeout)?,
            notifier,
            reaper_handle: Some(reaper_handle),
        })
    }

    /// Routes one request through the primary pool and, if needed, the
    /// fallback pool.
    ///
    /// # Arguments
    /// * `request` - The buffered inbound request, replayed to every candidate
    ///
    /// # Returns
    /// - `RoutingOutcome::Relayed` - The first usable upstream response
    /// - `RoutingOutcome::FallbackExhausted` - No endpoint in either pool answered usably
    ///
    /// # Behavior
    /// - Tries each selectable endpoint of a pool at most once, in random order
    /// - Raises exactly one warning alert when the primary pool is exhausted
    /// - Raises exactly one fatal alert when the fallback pool is exhausted too
    pub async fn route(&self, request: &RequestSnapshot) -> RoutingOutcome {
        if let RoutingOutcome::Relayed(response) = self.try_phase(Phase::Primary, request).await {
            return RoutingOutcome::Relayed(response);
        }
        self.notifier.notify(AlertLevel::Warning);

        match self.try_phase(Phase::Fallback, request).await {
            RoutingOutcome::Relayed(response) => RoutingOutcome::Relayed(response),
            _ => {
                self.notifier.notify(AlertLevel::Fatal);
                RoutingOutcome::FallbackExhausted
            }
        }
    }

    /// Runs one pass over the pool of `phase`.
    ///
    /// Every non-excluded endpoint is tried at most once. Returns `Relayed` on
    /// the first usable response, otherwise the exhaustion outcome of the
    /// phase.
    pub async fn try_phase(&self, phase: Phase, request: &RequestSnapshot) -> RoutingOutcome {
        for endpoint in self.selector.candidates(self.pool(phase)) {
            match self.forwarder.forward(&endpoint, request).await {
                Attempt::Usable(response) => {
                    info!("{} {}", response.status.as_u16(), endpoint);
                    return RoutingOutcome::Relayed(response);
                }
                Attempt::RateLimited => {
                    warn!("Endpoint {} is rate limited, excluding for {:?}", endpoint, self.exclusions.ttl());
                    self.exclusions.exclude(&endpoint);
                }
                Attempt::TransportError(e) => {
                    warn!("Request to {} failed: {}", endpoint, e);
                    self.exclusions.exclude(&endpoint);
                }
            }
        }

        match phase {
            Phase::Primary => RoutingOutcome::PrimaryExhausted,
            Phase::Fallback => RoutingOutcome::FallbackExhausted,
        }
    }

    /// Endpoints of the pool used by `phase`, in configured order.
    pub fn pool(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Primary => &self.primary,
            Phase::Fallback => &self.fallback,
        }
    }

    /// The shared exclusion cache.
    pub fn exclusions(&self) -> &Arc<ExclusionCache> {
        &self.exclusions
    }
}

impl Drop for FailoverRouter {
    fn drop(&mut self) {
        if let Some(handle) = self.reaper_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method};
    use hyper::body::Bytes;
    use parking_lot::Mutex;

    /// Records alerts instead of sending them.
    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<AlertLevel>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, level: AlertLevel) {
            self.alerts.lock().push(level);
        }
    }

    fn config(primary: &[&str], fallback: &[&str]) -> RelayConfig {
        RelayConfig {
            primary: primary.iter().map(|s| s.to_string()).collect(),
            fallback: fallback.iter().map(|s| s.to_string()).collect(),
            port: 0,
            exclusion_ttl: Duration::from_secs(60),
            slack_webhook_url: "http://127.0.0.1:1/hook".to_string(),
            upstream_timeout: Duration::from_secs(2),
            exclusion_capacity: 10,
        }
    }

    fn request() -> RequestSnapshot {
        RequestSnapshot::new(Method::POST, "/", HeaderMap::new(), Bytes::from_static(b"{}"))
    }

    #[tokio::test]
    async fn test_router_creation() {
        let router = FailoverRouter::new(&config(&["http://a"], &["http://b"]));
        assert!(router.is_ok());
    }

    #[tokio::test]
    async fn test_router_rejects_empty_pool() {
        let notifier = Arc::new(RecordingNotifier::default());
        assert!(FailoverRouter::with_notifier(&config(&[], &["http://b"]), notifier.clone()).is_err());
        assert!(FailoverRouter::with_notifier(&config(&["http://a"], &[]), notifier).is_err());
    }

    #[tokio::test]
    async fn test_pools_keep_configured_order() {
        let router = FailoverRouter::with_notifier(
            &config(&["http://a", "http://b"], &["http://a"]),
            Arc::new(RecordingNotifier::default()),
        )
        .unwrap();
        assert_eq!(router.pool(Phase::Primary), ["http://a", "http://b"]);
        assert_eq!(router.pool(Phase::Fallback), ["http://a"]);
    }

    #[tokio::test]
    async fn test_unreachable_pools_raise_both_alerts_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let router = FailoverRouter::with_notifier(
            &config(&["http://127.0.0.1:1", "http://127.0.0.1:2"], &["http://127.0.0.1:3"]),
            notifier.clone(),
        )
        .unwrap();

        let outcome = router.route(&request()).await;

        assert_eq!(outcome, RoutingOutcome::FallbackExhausted);
        assert_eq!(*notifier.alerts.lock(), vec![AlertLevel::Warning, AlertLevel::Fatal]);
        assert_eq!(router.exclusions().len(), 3);
    }

    #[tokio::test]
    async fn test_excluded_endpoints_are_not_retried() {
        let notifier = Arc::new(RecordingNotifier::default());
        let router = FailoverRouter::with_notifier(
            &config(&["http://127.0.0.1:1"], &["http://127.0.0.1:2"]),
            notifier.clone(),
        )
        .unwrap();
        router.exclusions().exclude("http://127.0.0.1:1");
        router.exclusions().exclude("http://127.0.0.1:2");

        // Nothing is selectable, so both phases exhaust without any attempt
        assert_eq!(router.try_phase(Phase::Primary, &request()).await, RoutingOutcome::PrimaryExhausted);
        assert_eq!(router.route(&request()).await, RoutingOutcome::FallbackExhausted);
        assert_eq!(notifier.alerts.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_primary_exclusion_carries_into_fallback_phase() {
        let notifier = Arc::new(RecordingNotifier::default());
        let shared = "http://127.0.0.1:1";
        let router = FailoverRouter::with_notifier(&config(&[shared], &[shared]), notifier).unwrap();

        assert_eq!(router.route(&request()).await, RoutingOutcome::FallbackExhausted);
        assert_eq!(router.exclusions().excluded_endpoints(), vec![shared.to_string()]);
    }
}
