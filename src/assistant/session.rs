//! Chat session and the single-tool-round dispatch loop
//!
//! A turn is: send the user message with tools offered; if the model
//! answers in text, done. If it requests tools, run them all, feed the
//! results back WITHOUT offering tools again, and take the next text
//! reply as final. A model that asks for tools twice in one turn ends
//! the turn with [`TurnError::ExtraToolRound`].

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use super::tools::{ToolError, ToolRegistry};
use super::{ChatMessage, Conversation};
use crate::llm::{
    ChatRequest, LlmError, LlmService, ModelReply, ProviderMessage, ToolCallResult,
};

const STUDENT_SYSTEM_PROMPT: &str = "You are a friendly academic assistant. Use the \
available tools to answer questions about class schedules and teacher availability. \
If the information is not available, tell the user.";

const TURN_FAILED_MESSAGE: &str =
    "Sorry, I could not process your request. Please try again.";

#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Model provider error: {0}")]
    Provider(#[from] LlmError),
    #[error("Tool execution failed: {0}")]
    Tool(#[from] ToolError),
    #[error("Model requested tools after the tool round was spent")]
    ExtraToolRound,
}

/// One user's assistant session. Owns both transcripts: the
/// user-visible conversation and the provider-side message history.
pub struct ChatSession {
    conversation: Conversation,
    history: Vec<ProviderMessage>,
    registry: ToolRegistry,
    llm: Arc<dyn LlmService>,
    system_prompt: String,
}

impl ChatSession {
    /// Session for a student: catalog tools, schedule-focused prompt.
    pub fn student(registry: ToolRegistry, llm: Arc<dyn LlmService>) -> Self {
        let mut session = Self {
            conversation: Conversation::new(),
            history: Vec::new(),
            registry,
            llm,
            system_prompt: STUDENT_SYSTEM_PROMPT.to_string(),
        };
        session.conversation.append(ChatMessage::assistant(
            "Hello! How can I help with your studies today? Ask me about class \
             schedules or teacher office hours.",
        ));
        session
    }

    /// Session for an administrator building course material.
    pub fn curriculum(registry: ToolRegistry, llm: Arc<dyn LlmService>, course_name: &str) -> Self {
        let mut session = Self {
            conversation: Conversation::new(),
            history: Vec::new(),
            registry,
            llm,
            system_prompt: format!(
                "You are an expert instructional design assistant. Help the \
                 administrator create course content, exercises, and quizzes for \
                 the course \"{course_name}\". Use the available tools to generate \
                 the requested material."
            ),
        };
        session.conversation.append(ChatMessage::assistant(format!(
            "Hello! How can I help build content for **{course_name}**? I can \
             generate lessons, exercises, and quizzes."
        )));
        session
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.conversation.snapshot()
    }

    /// Run one full turn for a user message.
    ///
    /// On failure the user message stays in the conversation, exactly
    /// one error message is appended, and the error is returned so the
    /// caller can decide about billing. No retry.
    pub async fn run_turn(&mut self, text: &str) -> Result<(), TurnError> {
        self.conversation.append(ChatMessage::user(text));
        self.history.push(ProviderMessage::user_text(text));

        match self.drive().await {
            Ok(answer) => {
                self.history.push(ProviderMessage::model_text(&answer));
                self.conversation.append(ChatMessage::assistant(answer));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "assistant turn failed");
                self.conversation.append(ChatMessage::error(TURN_FAILED_MESSAGE));
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<String, TurnError> {
        let reply = self
            .llm
            .chat(&ChatRequest {
                system: Some(self.system_prompt.clone()),
                messages: self.history.clone(),
                tools: self.registry.declarations(),
            })
            .await?;

        let calls = match reply {
            ModelReply::Answer(text) => return Ok(text),
            ModelReply::ToolCalls(calls) => calls,
        };

        info!(count = calls.len(), "model requested tools");
        self.history.push(ProviderMessage::model_calls(calls.clone()));

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let response = match self.registry.lookup(&call.name) {
                None => {
                    warn!(tool = %call.name, "model requested unknown tool");
                    json!({ "error": format!("unknown tool: {}", call.name) })
                }
                Some(id) => match self.registry.invoke(id, &call.arguments).await {
                    Ok(outcome) => {
                        // Only payload-bearing tools surface in the visible
                        // history; plain lookups reach the user through the
                        // model's final answer.
                        if outcome.payload.is_some() {
                            self.conversation.append(ChatMessage::tool_result(
                                outcome.note.clone(),
                                outcome.payload,
                            ));
                        }
                        outcome.result
                    }
                    Err(ToolError::InvalidArguments { tool, reason }) => {
                        warn!(tool, %reason, "tool rejected arguments");
                        json!({ "error": format!("invalid arguments: {reason}") })
                    }
                    // Generation backends failing is a turn failure,
                    // not something to argue with the model about.
                    Err(e) => return Err(e.into()),
                },
            };
            results.push(ToolCallResult {
                name: call.name.clone(),
                response,
            });
        }
        self.history.push(ProviderMessage::tool_results(results));

        // Feedback round: no tools offered, the model must answer.
        let reply = self
            .llm
            .chat(&ChatRequest {
                system: Some(self.system_prompt.clone()),
                messages: self.history.clone(),
                tools: Vec::new(),
            })
            .await?;

        match reply {
            ModelReply::Answer(text) => Ok(text),
            ModelReply::ToolCalls(_) => Err(TurnError::ExtraToolRound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::catalog::Catalog;
    use crate::assistant::testing::ScriptedLlm;
    use crate::assistant::Sender;
    use crate::llm::ToolCallRequest;

    fn student_session(llm: Arc<ScriptedLlm>) -> ChatSession {
        let registry = ToolRegistry::for_student(Arc::new(Catalog::sample()));
        ChatSession::student(registry, llm)
    }

    fn senders(session: &ChatSession) -> Vec<Sender> {
        session.snapshot().iter().map(|m| m.sender).collect()
    }

    #[tokio::test]
    async fn test_plain_answer_turn() {
        let llm = Arc::new(
            ScriptedLlm::new().with_reply(ModelReply::Answer("Hi there!".to_string())),
        );
        let mut session = student_session(Arc::clone(&llm));

        session.run_turn("hello").await.unwrap();

        // Greeting, user, assistant
        assert_eq!(
            senders(&session),
            vec![Sender::Assistant, Sender::User, Sender::Assistant]
        );
        assert_eq!(session.snapshot()[2].text, "Hi there!");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].tool_names,
            vec!["get_course_schedule", "get_teacher_availability"]
        );
    }

    #[tokio::test]
    async fn test_tool_round_feeds_result_back() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_reply(ModelReply::ToolCalls(vec![ToolCallRequest {
                    name: "get_course_schedule".to_string(),
                    arguments: serde_json::json!({"courseName": "Calculus I"}),
                }]))
                .with_reply(ModelReply::Answer(
                    "Calculus I meets Mondays and Wednesdays.".to_string(),
                )),
        );
        let mut session = student_session(Arc::clone(&llm));

        session.run_turn("when is calculus?").await.unwrap();

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        // First request offers tools, the feedback round offers none
        assert!(!requests[0].tool_names.is_empty());
        assert!(requests[1].tool_names.is_empty());
        // Feedback round sees user msg + model calls + tool results
        assert_eq!(requests[1].message_count, 3);

        let snap = session.snapshot();
        assert_eq!(snap.last().unwrap().sender, Sender::Assistant);
        assert!(snap.last().unwrap().text.contains("Mondays"));
    }

    #[tokio::test]
    async fn test_catalog_tool_round_stays_out_of_visible_history() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_reply(ModelReply::ToolCalls(vec![ToolCallRequest {
                    name: "get_course_schedule".to_string(),
                    arguments: serde_json::json!({"courseName": "Calculus I"}),
                }]))
                .with_reply(ModelReply::Answer("Mondays at 10.".to_string())),
        );
        let mut session = student_session(llm);

        session.run_turn("when is calculus?").await.unwrap();

        // Lookup results flow back to the model only; the user sees
        // greeting, their message, and the final answer.
        assert_eq!(
            senders(&session),
            vec![Sender::Assistant, Sender::User, Sender::Assistant]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_not_fatal() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_reply(ModelReply::ToolCalls(vec![ToolCallRequest {
                    name: "open_pod_bay_doors".to_string(),
                    arguments: serde_json::json!({}),
                }]))
                .with_reply(ModelReply::Answer(
                    "I don't have a tool for that.".to_string(),
                )),
        );
        let mut session = student_session(Arc::clone(&llm));

        session.run_turn("do the thing").await.unwrap();

        // Turn completed normally despite the bogus tool name
        let snap = session.snapshot();
        assert_eq!(snap.last().unwrap().sender, Sender::Assistant);
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_appends_one_error_message() {
        let llm = Arc::new(ScriptedLlm::new().with_error(LlmError::server_error("boom")));
        let mut session = student_session(llm);

        let err = session.run_turn("hello?").await.unwrap_err();
        assert!(matches!(err, TurnError::Provider(_)));

        // Greeting, user message retained, single error entry
        assert_eq!(
            senders(&session),
            vec![Sender::Assistant, Sender::User, Sender::Error]
        );
        assert_eq!(session.snapshot()[2].text, TURN_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn test_second_tool_round_is_refused() {
        let calls = vec![ToolCallRequest {
            name: "get_course_schedule".to_string(),
            arguments: serde_json::json!({"courseName": "Calculus I"}),
        }];
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_reply(ModelReply::ToolCalls(calls.clone()))
                .with_reply(ModelReply::ToolCalls(calls)),
        );
        let mut session = student_session(llm);

        let err = session.run_turn("schedule?").await.unwrap_err();
        assert!(matches!(err, TurnError::ExtraToolRound));
        assert_eq!(session.snapshot().last().unwrap().sender, Sender::Error);
    }

    #[tokio::test]
    async fn test_conversation_grows_by_two_per_successful_turn() {
        let mut llm = ScriptedLlm::new();
        for i in 0..5 {
            llm = llm.with_reply(ModelReply::Answer(format!("answer {i}")));
        }
        let mut session = student_session(Arc::new(llm));

        let before = session.snapshot().len();
        for i in 0..5 {
            session.run_turn(&format!("question {i}")).await.unwrap();
        }
        assert_eq!(session.snapshot().len(), before + 10);
    }

    #[tokio::test]
    async fn test_curriculum_quiz_turn_emits_tool_result_message() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_reply(ModelReply::ToolCalls(vec![ToolCallRequest {
                    name: "generate_multiple_choice_quiz".to_string(),
                    arguments: serde_json::json!({"topic": "Loops", "count": 1}),
                }]))
                .with_reply(ModelReply::Answer("Quiz ready!".to_string()))
                .with_json(serde_json::json!([
                    {
                        "question": "Which loop runs at least once?",
                        "options": {"A": "for", "B": "while", "C": "do-while", "D": "none"},
                        "answer": "C"
                    }
                ])),
        );
        let registry =
            ToolRegistry::for_curriculum(Arc::new(Catalog::sample()), Arc::clone(&llm) as _);
        let mut session = ChatSession::curriculum(registry, llm, "Introduction to Programming");

        session.run_turn("make a quiz about loops").await.unwrap();

        let snap = session.snapshot();
        // Greeting, user, tool result with payload, final answer
        assert_eq!(
            snap.iter().map(|m| m.sender).collect::<Vec<_>>(),
            vec![
                Sender::Assistant,
                Sender::User,
                Sender::ToolResult,
                Sender::Assistant
            ]
        );
        let payload = snap[2].payload.as_ref().unwrap();
        assert_eq!(payload["type"], "quiz");
        assert_eq!(payload["quiz"][0]["answer"], "C");
    }
}
