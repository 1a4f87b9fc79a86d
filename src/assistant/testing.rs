//! Scripted model provider for dispatch loop tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatRequest, LlmError, LlmService, ModelReply};

/// Replays canned replies in order and records every chat request it
/// receives so tests can assert on what was sent.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    json_replies: Mutex<VecDeque<serde_json::Value>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A cheap-to-clone view of one received request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub message_count: usize,
    pub tool_names: Vec<String>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            json_replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, reply: ModelReply) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn with_error(self, error: LlmError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_json(self, value: serde_json::Value) -> Self {
        self.json_replies.lock().unwrap().push_back(value);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn chat(&self, request: &ChatRequest) -> Result<ModelReply, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system: request.system.clone(),
            message_count: request.messages.len(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
        });

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::unknown("script exhausted")))
    }

    async fn generate_json(&self, _prompt: &str) -> Result<serde_json::Value, LlmError> {
        self.json_replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::unknown("json script exhausted"))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
