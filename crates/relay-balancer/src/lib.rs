//! Failover request routing for rpc-relay
//!
//! Inbound HTTP requests are forwarded verbatim to one of a set of
//! interchangeable upstream RPC endpoints. Endpoints that answer 429 or cannot
//! be reached are excluded for a fixed cooldown. When every primary endpoint
//! is exhausted the request escalates to a fallback pool, and operators are
//! alerted at each escalation.
//!
//! # Components
//!
//! - [`two_queue`] - bounded 2Q store backing the exclusion cache
//! - [`exclusion`] - [`ExclusionCache`] and its background [`Reaper`]
//! - [`selector`] - random candidate ordering with live exclusion checks
//! - [`forwarder`] - one outbound attempt and its classification
//! - [`alert`] - escalation alerts and the Slack webhook sink
//! - [`failover`] - the primary/fallback escalation controller
//! - [`http_server`] - catch-all axum listener

pub mod alert;
pub mod exclusion;
pub mod failover;
pub mod forwarder;
pub mod http_server;
pub mod selector;
pub mod two_queue;

pub use alert::{AlertLevel, LogNotifier, Notifier, SlackNotifier};
pub use exclusion::{ExclusionCache, Reaper};
pub use failover::{FailoverRouter, Phase, RoutingOutcome};
pub use forwarder::{Attempt, Forwarder, RequestSnapshot, UpstreamResponse};
pub use http_server::HttpServer;
pub use selector::CandidateSelector;
