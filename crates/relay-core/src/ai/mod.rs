//! AI provider layer
//!
//! The agent treats the LLM as a single request/response exchange returning a
//! final message and/or a list of requested tool calls.

pub mod client;
pub mod error;
pub mod format;
pub mod types;

use async_trait::async_trait;

pub use client::{AiClient, AiClientConfig};
pub use error::{LlmError, LlmErrorKind};
pub use format::ApiFormat;
pub use types::{AiTool, AiToolCall, Content, LlmRequest, LlmResponse, ModelMessage, Role};

/// Anything that can answer an `LlmRequest`
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}
