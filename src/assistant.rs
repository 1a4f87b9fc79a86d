//! Academic assistant: conversation store, tools, and the dispatch loop
//!
//! A [`session::ChatSession`] owns the user-visible [`Conversation`]
//! and the provider-side transcript, and drives one model turn at a
//! time through the [`tools::ToolRegistry`].

pub mod catalog;
pub mod session;
pub mod tools;

#[cfg(test)]
pub mod testing;

use serde::Serialize;

/// Who produced a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
    Error,
    ToolResult,
}

/// One user-visible message. `payload` carries structured tool output
/// (generated lessons, quizzes) for clients that render it specially.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            payload: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            payload: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Error,
            text: text.into(),
            payload: None,
        }
    }

    pub fn tool_result(text: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            sender: Sender::ToolResult,
            text: text.into(),
            payload,
        }
    }
}

/// Append-only message log for one session. Snapshots are cheap
/// clones; callers never mutate history in place.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
