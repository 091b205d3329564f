//! # rpc-relay CLI
//!
//! Command-line arguments for the `relay` binary. Every flag is optional and,
//! when given, overrides the matching environment variable; see
//! [`relay_common::config`] for the variables themselves.

use argh::FromArgs;
use relay_common::ConfigOverrides;

/// Failover router for upstream RPC endpoints.
///
/// Forwards every inbound HTTP request to a random primary endpoint,
/// excluding endpoints that answer 429 or fail, and escalates to the
/// fallback pool when every primary endpoint is exhausted.
#[derive(FromArgs, Debug, Default, PartialEq)]
/// rpc-relay - failover router for upstream RPC endpoints
pub struct Cli {
    /// primary RPC endpoint base URL
    ///
    /// Can be specified multiple times. Overrides the RPCs environment
    /// variable. Must include the http:// or https:// prefix.
    #[argh(option, long = "rpc")]
    pub rpcs: Vec<String>,

    /// fallback RPC endpoint base URL
    ///
    /// Can be specified multiple times. Overrides FALLBACK_RPCs.
    #[argh(option, long = "fallback-rpc")]
    pub fallback_rpcs: Vec<String>,

    /// port to listen on (overrides PORT)
    #[argh(option, short = 'p')]
    pub port: Option<u16>,

    /// minutes a failing endpoint stays excluded (overrides ERROR_TIME_TO_LIVE_MINUTES)
    #[argh(option, long = "error-ttl-minutes")]
    pub error_ttl_minutes: Option<u64>,

    /// webhook receiving escalation alerts (overrides SLACK_WEBHOOK_URL)
    #[argh(option, long = "slack-webhook-url")]
    pub slack_webhook_url: Option<String>,

    /// timeout for each upstream attempt in milliseconds (overrides UPSTREAM_TIMEOUT_MS)
    #[argh(option, long = "upstream-timeout-ms")]
    pub upstream_timeout_ms: Option<u64>,

    /// number of exclusions kept before the oldest are dropped (overrides EXCLUSION_CAPACITY)
    #[argh(option, long = "exclusion-capacity")]
    pub exclusion_capacity: Option<usize>,
}

impl From<Cli> for ConfigOverrides {
    fn from(cli: Cli) -> Self {
        ConfigOverrides {
            primary: cli.rpcs,
            fallback: cli.fallback_rpcs,
            port: cli.port,
            error_ttl_minutes: cli.error_ttl_minutes,
            slack_webhook_url: cli.slack_webhook_url,
            upstream_timeout_ms: cli.upstream_timeout_ms,
            exclusion_capacity: cli.exclusion_capacity,
        }
    }
}
