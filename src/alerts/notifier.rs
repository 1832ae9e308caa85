use crate::error::AlertError;
use crate::events::AlertEvent;
use log::{debug, info};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Default time allowed for one webhook delivery
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery channel for alerts
///
/// Implementations perform a single best-effort attempt. Callers never retry.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn send(&self, alert: &AlertEvent) -> Result<(), AlertError>;
}

/// Slack incoming-webhook notifier
///
/// Delivery is synchronous from the caller's point of view: each alert is posted
/// on a private current-thread runtime and bounded by `timeout`, so a slow
/// endpoint cannot stall log ingestion for longer than that.
pub struct SlackNotifier {
    client: Client,
    runtime: tokio::runtime::Runtime,
    webhook_url: String,
    timeout: Duration,
}

/// Slack message payload using Block Kit
#[derive(Debug, Serialize)]
pub struct SlackMessage {
    /// Fallback text shown in notifications
    pub text: String,
    pub blocks: Vec<SlackBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackBlock {
    Header { text: SlackText },
    Section { text: SlackText },
    Context { elements: Vec<SlackText> },
}

#[derive(Debug, Serialize)]
pub struct SlackText {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<bool>,
}

impl SlackText {
    fn plain(text: String) -> Self {
        Self {
            kind: "plain_text",
            text,
            emoji: Some(true),
        }
    }

    fn mrkdwn(text: String) -> Self {
        Self {
            kind: "mrkdwn",
            text,
            emoji: None,
        }
    }
}

impl SlackNotifier {
    /// Create a new Slack notifier
    ///
    /// # Arguments
    /// * `webhook_url` - Slack incoming webhook URL
    /// * `timeout` - Upper bound for a single delivery attempt
    ///
    /// # Errors
    ///
    /// Returns `AlertError` if the HTTP client or runtime cannot be created.
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        // the per-delivery bound is applied around the whole post in `send`
        let client = Client::builder().build()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                AlertError::NotificationFailed(format!("Failed to create runtime: {}", e))
            })?;

        Ok(Self {
            client,
            runtime,
            webhook_url: webhook_url.into(),
            timeout,
        })
    }

    /// Build the Block Kit payload for an alert
    pub fn build_payload(alert: &AlertEvent) -> SlackMessage {
        let emoji = alert.kind.emoji();
        SlackMessage {
            text: format!("{} *Blue/Green Alert*", emoji),
            blocks: vec![
                SlackBlock::Header {
                    text: SlackText::plain(format!("{} Blue/Green Alert", emoji)),
                },
                SlackBlock::Section {
                    text: SlackText::mrkdwn(alert.message.clone()),
                },
                SlackBlock::Context {
                    elements: vec![SlackText::mrkdwn(format!(
                        "*Timestamp:* {}",
                        alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                    ))],
                },
            ],
        }
    }

    async fn post(&self, payload: &SlackMessage) -> Result<(), AlertError> {
        let response = self
            .client
            .post(self.webhook_url.as_str())
            .json(payload)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AlertError::NotificationFailed(format!(
                "Slack returned status {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

fn http_error(e: reqwest::Error) -> AlertError {
    if e.is_timeout() {
        AlertError::Timeout
    } else {
        AlertError::HttpError(e)
    }
}

impl Notifier for SlackNotifier {
    fn send(&self, alert: &AlertEvent) -> Result<(), AlertError> {
        let payload = Self::build_payload(alert);
        debug!("Sending {} alert to Slack", alert.kind);

        self.runtime.block_on(async {
            match tokio::time::timeout(self.timeout, self.post(&payload)).await {
                Ok(result) => result,
                Err(_) => Err(AlertError::Timeout),
            }
        })
    }
}

/// Notifier used when no webhook is configured
///
/// Logs the alert locally and reports it as not delivered.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, alert: &AlertEvent) -> Result<(), AlertError> {
        info!(
            "No Slack webhook configured, skipping {} alert: {}",
            alert.kind,
            alert.message.lines().next().unwrap_or_default()
        );
        Err(AlertError::NotConfigured)
    }
}
