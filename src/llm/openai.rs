//! Provider for OpenAI-compatible chat completion endpoints.
//!
//! Works against OpenAI itself and routers such as OpenRouter that expose the
//! same `/chat/completions` shape.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::provider::{
    CompletionRequest, CompletionResponse, LlmProvider, StopReason, TokenUsage,
};
use crate::{Error, Result};

pub struct OpenAiCompatProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// # Arguments
    ///
    /// * `api_key` - bearer token for the endpoint
    /// * `base_url` - API root, e.g. `https://openrouter.ai/api/v1`
    /// * `model` - model id passed through unchanged
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        );

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        })
    }
}

/// Pull content, usage and stop reason out of a chat completion body.
fn parse_completion(body: &Value) -> Result<CompletionResponse> {
    let choice = &body["choices"][0];
    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .trim()
        .to_string();
    if content.is_empty() {
        return Err(Error::upstream_empty("chat completion"));
    }

    let stop_reason = match choice["finish_reason"].as_str() {
        Some("length") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    };

    let usage = &body["usage"];
    Ok(CompletionResponse {
        content,
        tokens_used: TokenUsage {
            input: usage["prompt_tokens"].as_u64().unwrap_or(0),
            output: usage["completion_tokens"].as_u64().unwrap_or(0),
        },
        stop_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.request_body(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::http("chat completion", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Api {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::http("chat completion", e))?;

        let completion = parse_completion(&body)?;
        debug!(
            model = %self.model,
            input = completion.tokens_used.input,
            output = completion.tokens_used.output,
            total = completion.tokens_used.total(),
            "completion finished"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn construction_trims_base_url() {
        let provider = OpenAiCompatProvider::new("key", "https://openrouter.ai/api/v1/", "gpt-4o-mini");
        assert_eq!(provider.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(provider.model(), "gpt-4o-mini");
    }

    #[test]
    fn body_puts_system_prompt_first() {
        let provider = OpenAiCompatProvider::new("key", "http://llm.test", "m");
        let request = CompletionRequest::new(vec![Message::user("hi")])
            .with_system_prompt("be brief")
            .with_max_tokens(64);

        assert_eq!(
            provider.request_body(&request),
            json!({
                "model": "m",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "hi" },
                ],
                "max_tokens": 64,
            })
        );
    }

    #[test]
    fn parses_choice_and_usage() {
        let completion = parse_completion(&json!({
            "choices": [{ "message": { "role": "assistant", "content": " # Draft\n" }, "finish_reason": "length" }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 7 }
        }))
        .unwrap();
        assert_eq!(completion.content, "# Draft");
        assert_eq!(completion.stop_reason, StopReason::MaxTokens);
        assert_eq!(completion.tokens_used.total(), 12);
    }

    #[test]
    fn empty_choice_is_upstream_empty() {
        let err = parse_completion(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, Error::UpstreamEmpty { ref context } if context == "chat completion"));
    }

    #[tokio::test]
    async fn completes_against_chat_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer key"))
            .and(body_partial_json(json!({ "model": "m", "max_tokens": 64 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "Hello" }, "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 3, "completion_tokens": 1 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("key", format!("{}/", server.uri()), "m");
        let completion = provider
            .complete(CompletionRequest::user("hi").with_max_tokens(64))
            .await
            .unwrap();

        assert_eq!(completion.content, "Hello");
        assert_eq!(completion.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn rate_limit_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = OpenAiCompatProvider::new("key", server.uri(), "m")
            .complete(CompletionRequest::user("hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { status: 429, ref body } if body == "slow down"));
        assert!(err.is_rate_limit());
    }
}
