//! Scripted provider for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::provider::{CompletionRequest, CompletionResponse, LlmProvider, StopReason, TokenUsage};
use crate::{Error, Result};

/// Mock provider that returns canned responses.
///
/// Queued failures are served first, one per call. After that responses are
/// returned in order, cycling back to the first once all have been used.
#[derive(Clone)]
pub struct MockLlmProvider {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    canned: Vec<String>,
    index: usize,
    failures: VecDeque<(u16, String)>,
    stop_reason: StopReason,
    requests: Vec<CompletionRequest>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                canned: responses,
                index: 0,
                failures: VecDeque::new(),
                stop_reason: StopReason::EndTurn,
                requests: Vec::new(),
            })),
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Queue an API failure with the given status for the next call.
    pub async fn fail_next(&self, status: u16, body: impl Into<String>) {
        self.state
            .lock()
            .await
            .failures
            .push_back((status, body.into()));
    }

    /// Report `reason` as the stop reason of every later response.
    pub async fn stop_with(&self, reason: StopReason) {
        self.state.lock().await.stop_reason = reason;
    }

    /// Every request received so far, failed ones included.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().await.requests.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut state = self.state.lock().await;
        state.requests.push(request);

        if let Some((status, body)) = state.failures.pop_front() {
            return Err(Error::Api { status, body });
        }
        if state.canned.is_empty() {
            return Err(Error::upstream_empty("mock completion"));
        }

        let content = state.canned[state.index].clone();
        state.index = (state.index + 1) % state.canned.len();

        Ok(CompletionResponse {
            content,
            tokens_used: TokenUsage {
                input: 10,
                output: 20,
            },
            stop_reason: state.stop_reason,
        })
    }
}
