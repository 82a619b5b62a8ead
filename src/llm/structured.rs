//! Typed JSON extraction from free-form model replies.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::provider::{CompletionRequest, LlmProvider};
use crate::{Error, Result};

/// How often and how patiently a failed call is retried.
///
/// Only errors for which [`Error::is_retryable`] holds are retried. Rate
/// limits wait `rate_limit_delay`, everything else waits `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            rate_limit_delay: Duration::from_secs(28),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run
    /// out. The last error is returned.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1));
        let rate_limit_delay = self.rate_limit_delay;

        operation
            .retry(backoff)
            .when(Error::is_retryable)
            .adjust(move |err: &Error, delay: Option<Duration>| {
                delay.map(|d| if err.is_rate_limit() { rate_limit_delay } else { d })
            })
            .notify(|err: &Error, delay: Duration| {
                warn!(error = %err, delay_secs = delay.as_secs(), "call failed, retrying");
            })
            .await
    }
}

/// Asks a model for JSON shaped like an example and decodes it into `T`.
pub struct StructuredExtractor<T> {
    provider: Arc<dyn LlmProvider>,
    shape: Value,
    max_tokens: u32,
    retry: RetryPolicy,
    _output: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> StructuredExtractor<T> {
    /// `shape` is an example value shown to the model, e.g.
    /// `json!({ "description": "someone doing something somewhere" })`.
    pub fn new(provider: Arc<dyn LlmProvider>, shape: Value) -> Self {
        Self {
            provider,
            shape,
            max_tokens: 1024,
            retry: RetryPolicy::default(),
            _output: PhantomData,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Send `query` and decode the reply. Unparseable replies count as
    /// retryable failures.
    pub async fn extract(&self, query: &str) -> Result<T> {
        let request = CompletionRequest::user(query)
            .with_system_prompt(format!(
                "Reply with one JSON object shaped like:\n{}\nDo not add any text outside the JSON.",
                self.shape
            ))
            .with_max_tokens(self.max_tokens);

        self.retry
            .run(|| async {
                let response = self.provider.complete(request.clone()).await?;
                parse_reply::<T>(&response.content)
            })
            .await
    }
}

/// Decode the JSON object embedded in a model reply.
///
/// Code fences and surrounding prose are ignored. A top-level array is
/// accepted when its first element is an object.
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let value = reply_object(reply)?;
    Ok(serde_json::from_value(value)?)
}

fn reply_object(reply: &str) -> Result<Value> {
    let body = strip_fences(reply.trim());

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value {
            Value::Object(_) => return Ok(value),
            Value::Array(items) => {
                if let Some(first @ Value::Object(_)) = items.into_iter().next() {
                    return Ok(first);
                }
            }
            _ => {}
        }
    }

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(serde_json::from_str(&body[start..=end])?),
        _ => {
            let preview: String = body.chars().take(80).collect();
            debug!(reply = %preview, "no JSON object in reply");
            Err(Error::invalid_response(format!(
                "no JSON object in reply: {preview}"
            )))
        }
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) along with the opening fence.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
