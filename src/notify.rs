//! Run notifications.
//!
//! Delivery is best effort: a notifier logs its own failures and never
//! returns an error to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

const SUCCESS_COLOR: u32 = 0x00ff00;
const FAILURE_COLOR: u32 = 0xff0000;

/// Longest embed description the webhook accepts.
const MAX_DESCRIPTION_CHARS: usize = 4096;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn success(&self, title: &str, body: &str);
    async fn failure(&self, title: &str, body: &str);
}

/// Does nothing. Used when no webhook is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn success(&self, _title: &str, _body: &str) {}
    async fn failure(&self, _title: &str, _body: &str) {}
}

/// Posts embeds to a Discord channel webhook.
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    async fn send(&self, title: &str, body: &str, color: u32) {
        let Some(payload) = embed(title, body, color) else {
            warn!(title, "notification has no content, not sending");
            return;
        };

        let result = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match result {
            Ok(_) => info!(title, "notification sent"),
            Err(e) => warn!(title, error = %e, "failed to send notification"),
        }
    }
}

/// Build the webhook body, or nothing when the body text is blank.
fn embed(title: &str, body: &str, color: u32) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    let description: String = body.chars().take(MAX_DESCRIPTION_CHARS).collect();
    let mut embed = json!({ "description": description, "color": color });
    if !title.is_empty() {
        embed["title"] = json!(title);
    }
    Some(json!({ "embeds": [embed] }))
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn success(&self, title: &str, body: &str) {
        self.send(title, body, SUCCESS_COLOR).await;
    }

    async fn failure(&self, title: &str, body: &str) {
        self.send(title, body, FAILURE_COLOR).await;
    }
}

/// Pick the webhook notifier when a URL is configured.
pub fn from_webhook_url(url: &str) -> Arc<dyn Notifier> {
    if url.trim().is_empty() {
        debug!("no webhook configured, notifications disabled");
        Arc::new(NullNotifier)
    } else {
        Arc::new(DiscordWebhook::new(url))
    }
}

/// Records every notification in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub sent: tokio::sync::Mutex<Vec<(bool, String, String)>>,
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn success(&self, title: &str, body: &str) {
        self.sent.lock().await.push((true, title.into(), body.into()));
    }

    async fn failure(&self, title: &str, body: &str) {
        self.sent.lock().await.push((false, title.into(), body.into()));
    }
}
