//! Operator alerts raised when a pool is exhausted.
//!
//! Alerts are fire-and-forget. Delivery happens on its own task, and any
//! failure is logged and dropped so it can never change how a request is
//! answered.

use std::time::Duration;

use relay_common::error::{RelayError, Result};
use serde::Serialize;
use tracing::{error, info, warn};

const ALERT_SOURCE: &str = "LoadBalancer";
const ALERT_TITLE: &str = "Load Balancer Error";
const ALERT_DETAIL: &str = "All RPCs are reaching their ratelimits, consider increasing the number of RPCs or the rate limit for each one.";

/// Severity of an escalation alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    /// Every primary endpoint is exhausted, fallback pool is being used
    Warning,
    /// Fallback pool is exhausted too, the request failed
    Fatal,
}

impl AlertLevel {
    pub fn message(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "WARNING : All RPCs are reaching their ratelimits.",
            AlertLevel::Fatal => "FATAL : Even fallback RPCs are reaching their ratelimits.",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "#FFA500",
            AlertLevel::Fatal => "#FF0000",
        }
    }
}

/// Sink for escalation alerts.
///
/// `notify` must return without waiting on delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: AlertLevel);
}

/// Slack incoming-webhook message body.
#[derive(Debug, Serialize)]
pub struct SlackPayload {
    pub attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
pub struct SlackAttachment {
    pub fallback: String,
    pub pretext: String,
    pub color: &'static str,
    pub fields: Vec<SlackField>,
}

#[derive(Debug, Serialize)]
pub struct SlackField {
    pub title: &'static str,
    pub value: &'static str,
    pub short: bool,
}

impl SlackPayload {
    pub fn for_level(level: AlertLevel) -> Self {
        let text = format!("{} > {}", ALERT_SOURCE, level.message());
        Self {
            attachments: vec![SlackAttachment {
                fallback: text.clone(),
                pretext: text,
                color: level.color(),
                fields: vec![SlackField {
                    title: ALERT_TITLE,
                    value: ALERT_DETAIL,
                    short: false,
                }],
            }],
        }
    }
}

/// Posts alerts to a Slack-compatible webhook.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Alert(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    /// Delivers one alert and waits for the webhook to answer.
    pub async fn deliver(&self, level: AlertLevel) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&SlackPayload::for_level(level))
            .send()
            .await
            .map_err(|e| RelayError::Alert(format!("Failed to send request to Slack: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Alert(format!(
                "Slack notification failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(())
    }
}

impl Notifier for SlackNotifier {
    fn notify(&self, level: AlertLevel) {
        log_alert(level);

        let notifier = self.clone();
        tokio::spawn(async move {
            match notifier.deliver(level).await {
                Ok(()) => info!("Slack notification sent successfully"),
                Err(e) => warn!("{}", e),
            }
        });
    }
}

/// Logs alerts without delivering them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: AlertLevel) {
        log_alert(level);
    }
}

fn log_alert(level: AlertLevel) {
    match level {
        AlertLevel::Warning => warn!("{}", level.message()),
        AlertLevel::Fatal => error!("{}", level.message()),
    }
}
