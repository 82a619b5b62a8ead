//! Text generation provider abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A chat-completion backend.
///
/// The model is chosen when the provider is built, so one provider instance
/// stands for one model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a prompt and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// A request to complete a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt (context/instructions)
    pub system_prompt: Option<String>,

    pub messages: Vec<Message>,

    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system_prompt: None,
            messages,
            max_tokens: 1024,
        }
    }

    /// Single user message, the shape most calls here use.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(vec![Message::user(content)])
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// Response from a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,

    pub tokens_used: TokenUsage,

    /// Why the model stopped generating
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StopReason {
    EndTurn,
    /// Hit the token limit; the content is probably cut short
    MaxTokens,
    StopSequence,
}
