//! Model provider abstraction
//!
//! The assistant talks to a provider through [`LlmService`]; the only
//! concrete implementation is [`gemini::GeminiService`]. Keeping the
//! trait object-safe lets tests substitute a scripted provider.

pub mod error;
pub mod gemini;
pub mod types;

pub use error::{LlmError, LlmErrorKind};
pub use types::{
    ChatRequest, MessagePart, ModelReply, ProviderMessage, ProviderRole, ToolCallRequest,
    ToolCallResult, ToolDeclaration,
};

use async_trait::async_trait;

/// A chat-capable model provider.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Send a conversation turn and get either a final answer or a
    /// batch of tool calls.
    async fn chat(&self, request: &ChatRequest) -> Result<ModelReply, LlmError>;

    /// One-shot structured generation: the provider is asked for JSON
    /// and the decoded value is returned.
    async fn generate_json(&self, prompt: &str) -> Result<serde_json::Value, LlmError>;

    /// Model identifier for logging.
    fn model_id(&self) -> &str;
}
