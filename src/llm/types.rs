//! Provider-neutral chat types

use serde::{Deserialize, Serialize};

/// A tool call the model wants executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of executing one tool call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub name: String,
    pub response: serde_json::Value,
}

/// A tool advertised to the model. `parameters` is a JSON schema.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    Text(String),
    ToolCall(ToolCallRequest),
    ToolResult(ToolCallResult),
}

/// One message in the provider-side transcript. Distinct from the
/// user-visible conversation: tool calls and their results live here
/// but never reach the UI verbatim.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub parts: Vec<MessagePart>,
}

impl ProviderMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: ProviderRole::User,
            parts: vec![MessagePart::Text(text.into())],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: ProviderRole::Model,
            parts: vec![MessagePart::Text(text.into())],
        }
    }

    pub fn model_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: ProviderRole::Model,
            parts: calls.into_iter().map(MessagePart::ToolCall).collect(),
        }
    }

    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self {
            role: ProviderRole::User,
            parts: results.into_iter().map(MessagePart::ToolResult).collect(),
        }
    }
}

/// Everything a provider needs for one chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ProviderMessage>,
    /// Tools offered for THIS request. An empty list means the model
    /// must answer in text; the dispatch loop relies on that to cap
    /// tool usage at one round per turn.
    pub tools: Vec<ToolDeclaration>,
}

/// What the model came back with: a finished answer, or a request to
/// run tools first. Mixed replies collapse to the tool calls; any
/// interleaved text is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Answer(String),
    ToolCalls(Vec<ToolCallRequest>),
}
