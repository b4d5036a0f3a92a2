//! Hosted model access.
//!
//! The agent only ever talks to the model through [`LlmClient`]: a request
//! carrying the system instruction, the conversation and the tool schemas
//! goes in, one assistant [`Message`] comes out. Tests swap in a scripted
//! implementation.

mod openai;
mod rate_limit;
mod types;

pub use openai::OpenAiCompatClient;
pub use rate_limit::RateLimiter;
pub use types::{Content, ContentPart, Message, Role, ToolCall, ToolSchema};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

/// A single model call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSchema],
}

/// Trait for chat-completion providers with tool calling.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation and return the model's reply as an assistant message.
    async fn chat_completion(&self, request: CompletionRequest<'_>) -> Result<Message, LlmError>;
}
