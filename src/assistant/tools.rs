//! Tool registry
//!
//! Tools are a closed set: the model can only name a [`ToolId`], and a
//! registry instance only enables the subset its assistant kind needs.
//! Catalog tools answer from in-memory data; generation tools make a
//! second structured call to the model provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::catalog::Catalog;
use crate::llm::{LlmError, LlmService, ToolDeclaration};

/// Every tool the portal knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolId {
    CourseSchedule,
    TeacherAvailability,
    GenerateCourseContent,
    GenerateExerciseQuestions,
    GenerateQuiz,
}

impl ToolId {
    pub fn name(self) -> &'static str {
        match self {
            ToolId::CourseSchedule => "get_course_schedule",
            ToolId::TeacherAvailability => "get_teacher_availability",
            ToolId::GenerateCourseContent => "generate_course_content",
            ToolId::GenerateExerciseQuestions => "generate_exercise_questions",
            ToolId::GenerateQuiz => "generate_multiple_choice_quiz",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "get_course_schedule" => Some(ToolId::CourseSchedule),
            "get_teacher_availability" => Some(ToolId::TeacherAvailability),
            "generate_course_content" => Some(ToolId::GenerateCourseContent),
            "generate_exercise_questions" => Some(ToolId::GenerateExerciseQuestions),
            "generate_multiple_choice_quiz" => Some(ToolId::GenerateQuiz),
            _ => None,
        }
    }

    fn declaration(self) -> ToolDeclaration {
        let (description, parameters) = match self {
            ToolId::CourseSchedule => (
                "Gets the schedule for a specific course.",
                json!({
                    "type": "object",
                    "properties": {
                        "courseName": {
                            "type": "string",
                            "description": "The course name, e.g. \"Classical Physics\""
                        }
                    },
                    "required": ["courseName"]
                }),
            ),
            ToolId::TeacherAvailability => (
                "Gets a teacher's office hours.",
                json!({
                    "type": "object",
                    "properties": {
                        "teacherName": {
                            "type": "string",
                            "description": "The teacher's name, e.g. \"Prof. Ricardo\""
                        }
                    },
                    "required": ["teacherName"]
                }),
            ),
            ToolId::GenerateCourseContent => (
                "Generates lesson content in HTML plus example JavaScript code for a topic.",
                json!({
                    "type": "object",
                    "properties": {
                        "topic": {
                            "type": "string",
                            "description": "The topic to generate content for, e.g. \"for loops in javascript\""
                        }
                    },
                    "required": ["topic"]
                }),
            ),
            ToolId::GenerateExerciseQuestions => (
                "Generates a given number of question-and-answer exercises for a topic.",
                json!({
                    "type": "object",
                    "properties": {
                        "topic": {
                            "type": "string",
                            "description": "The topic for the exercises, e.g. \"Arrays in JavaScript\""
                        },
                        "count": {
                            "type": "number",
                            "description": "How many exercises to generate."
                        }
                    },
                    "required": ["topic", "count"]
                }),
            ),
            ToolId::GenerateQuiz => (
                "Generates a multiple choice quiz with a given number of questions.",
                json!({
                    "type": "object",
                    "properties": {
                        "topic": {
                            "type": "string",
                            "description": "The topic for the quiz, e.g. \"Functions in JavaScript\""
                        },
                        "count": {
                            "type": "number",
                            "description": "How many questions to generate."
                        }
                    },
                    "required": ["topic", "count"]
                }),
            ),
        };

        ToolDeclaration {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
    #[error("Content generation failed: {0}")]
    Generation(#[from] LlmError),
    #[error("Generated content had an unexpected shape: {0}")]
    Decode(String),
}

/// What a successful tool invocation produced.
#[derive(Debug)]
pub struct ToolOutcome {
    /// Fed back to the model as the function response.
    pub result: Value,
    /// Structured data for the client, when the tool produces any.
    pub payload: Option<Value>,
    /// User-visible caption for the payload.
    pub note: String,
}

impl ToolOutcome {
    fn text(result: String) -> Self {
        Self {
            result: json!({ "result": result }),
            payload: None,
            note: String::new(),
        }
    }
}

/// The tools one assistant kind may use.
pub struct ToolRegistry {
    enabled: Vec<ToolId>,
    catalog: Arc<Catalog>,
    generator: Option<Arc<dyn LlmService>>,
}

impl ToolRegistry {
    /// Catalog lookups only.
    pub fn for_student(catalog: Arc<Catalog>) -> Self {
        Self {
            enabled: vec![ToolId::CourseSchedule, ToolId::TeacherAvailability],
            catalog,
            generator: None,
        }
    }

    /// Content generation tools, backed by a provider for the
    /// structured generation calls.
    pub fn for_curriculum(catalog: Arc<Catalog>, generator: Arc<dyn LlmService>) -> Self {
        Self {
            enabled: vec![
                ToolId::GenerateCourseContent,
                ToolId::GenerateExerciseQuestions,
                ToolId::GenerateQuiz,
            ],
            catalog,
            generator: Some(generator),
        }
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.enabled.iter().map(|t| t.declaration()).collect()
    }

    /// Resolve a model-supplied name to an enabled tool. Disabled tools
    /// are indistinguishable from unknown ones on purpose.
    pub fn lookup(&self, name: &str) -> Option<ToolId> {
        ToolId::from_name(name).filter(|id| self.enabled.contains(id))
    }

    pub async fn invoke(&self, id: ToolId, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        match id {
            ToolId::CourseSchedule => {
                let args: ScheduleArgs = decode_args(id, arguments)?;
                Ok(ToolOutcome::text(
                    self.catalog.course_schedule(&args.course_name),
                ))
            }
            ToolId::TeacherAvailability => {
                let args: AvailabilityArgs = decode_args(id, arguments)?;
                Ok(ToolOutcome::text(
                    self.catalog.teacher_availability(&args.teacher_name),
                ))
            }
            ToolId::GenerateCourseContent => {
                let args: TopicArgs = decode_args(id, arguments)?;
                self.generate_content(&args.topic).await
            }
            ToolId::GenerateExerciseQuestions => {
                let args: TopicCountArgs = decode_args(id, arguments)?;
                self.generate_exercises(&args.topic, args.count).await
            }
            ToolId::GenerateQuiz => {
                let args: TopicCountArgs = decode_args(id, arguments)?;
                self.generate_quiz(&args.topic, args.count).await
            }
        }
    }

    fn generator(&self, id: ToolId) -> Result<&Arc<dyn LlmService>, ToolError> {
        self.generator
            .as_ref()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: id.name(),
                reason: "no generation backend configured".to_string(),
            })
    }

    async fn generate_content(&self, topic: &str) -> Result<ToolOutcome, ToolError> {
        let prompt = format!(
            "Generate a simple HTML lesson and a related JavaScript code example \
             for the topic: \"{topic}\". Return the response as a JSON object with \
             the keys \"html\" and \"js\". The HTML should be well structured and \
             the JS should be a practical example."
        );
        let value = self
            .generator(ToolId::GenerateCourseContent)?
            .generate_json(&prompt)
            .await?;
        let content: LessonContent =
            serde_json::from_value(value).map_err(|e| ToolError::Decode(e.to_string()))?;

        Ok(ToolOutcome {
            result: json!({ "result": format!("Generated lesson content about \"{topic}\".") }),
            payload: Some(json!({
                "type": "content",
                "html": content.html,
                "js": content.js,
            })),
            note: format!("Here is the suggested content about \"{topic}\":"),
        })
    }

    async fn generate_exercises(&self, topic: &str, count: u32) -> Result<ToolOutcome, ToolError> {
        let prompt = format!(
            "Generate {count} exercises with questions and answers for the topic: \
             \"{topic}\". Return the response as a JSON array of objects, where each \
             object has the keys \"question\" and \"answer\"."
        );
        let value = self
            .generator(ToolId::GenerateExerciseQuestions)?
            .generate_json(&prompt)
            .await?;
        let exercises: Vec<ExerciseQuestion> =
            serde_json::from_value(value).map_err(|e| ToolError::Decode(e.to_string()))?;

        Ok(ToolOutcome {
            result: json!({ "result": format!("Generated {count} exercises about \"{topic}\".") }),
            payload: Some(json!({
                "type": "exercises",
                "exercises": exercises,
            })),
            note: format!("Here are {count} suggested exercises about \"{topic}\":"),
        })
    }

    async fn generate_quiz(&self, topic: &str, count: u32) -> Result<ToolOutcome, ToolError> {
        let prompt = format!(
            "Generate a multiple choice quiz with {count} questions about the topic: \
             \"{topic}\". Return the response as a JSON array of objects. Each object \
             must have the keys: \"question\" (string), \"options\" (an object with \
             keys \"A\", \"B\", \"C\", \"D\"), and \"answer\" (the key of the correct \
             option, e.g. \"B\")."
        );
        let value = self
            .generator(ToolId::GenerateQuiz)?
            .generate_json(&prompt)
            .await?;
        let quiz: Vec<QuizQuestion> =
            serde_json::from_value(value).map_err(|e| ToolError::Decode(e.to_string()))?;

        Ok(ToolOutcome {
            result: json!({ "result": format!("Generated a {count}-question quiz about \"{topic}\".") }),
            payload: Some(json!({
                "type": "quiz",
                "quiz": quiz,
            })),
            note: format!("Here is a suggested quiz about \"{topic}\":"),
        })
    }
}

fn decode_args<T: serde::de::DeserializeOwned>(
    id: ToolId,
    arguments: &Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments.clone()).map_err(|e| ToolError::InvalidArguments {
        tool: id.name(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleArgs {
    course_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityArgs {
    teacher_name: String,
}

#[derive(Debug, Deserialize)]
struct TopicArgs {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct TopicCountArgs {
    topic: String,
    count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LessonContent {
    html: String,
    js: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExerciseQuestion {
    question: String,
    answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuizQuestion {
    question: String,
    options: BTreeMap<String, String>,
    answer: String,
}
