//! Text generation providers and typed extraction on top of them.

mod mock;
mod openai;
mod provider;
mod structured;

pub use mock::MockLlmProvider;
pub use openai::OpenAiCompatProvider;
pub use provider::{
    CompletionRequest, CompletionResponse, LlmProvider, Message, Role, StopReason, TokenUsage,
};
pub use structured::{RetryPolicy, StructuredExtractor, parse_reply};
