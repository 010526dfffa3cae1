//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AnswerSubmission, PartialQuiz, Quiz, QuizResult};
use crate::reveal::RevealPhase;
use crate::session::AnswerProgress;

fn default_true() -> bool {
    true
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Begin a quiz run; any run already in flight is replaced.
    StartQuiz {
        #[serde(flatten)]
        request: GenerateIn,
        #[serde(default = "default_true")]
        stream: bool,
    },
    Answer {
        #[serde(rename = "questionId")]
        question_id: String,
        #[serde(rename = "selectedAnswer")]
        selected_answer: usize,
    },
    SpeechToTextInput {
        #[serde(rename = "audioBase64")]
        audio_base64: String,
        mime: String,
    },
    /// Stop the in-flight generation; revealed questions stay usable.
    Abort,
    /// Drop the whole run, answers included.
    Restart,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    /// Latest state of the quiz under generation.
    Snapshot {
        partial: PartialQuiz,
        revealed: usize,
        available: usize,
        phase: RevealPhase,
    },
    QuestionRevealed {
        index: usize,
    },
    /// Generation finished and a session is open for answers.
    QuizReady {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        quiz: Quiz,
    },
    AnswerRecorded {
        #[serde(rename = "questionId")]
        question_id: String,
        #[serde(rename = "answeredCount")]
        answered_count: u32,
        #[serde(rename = "totalQuestions")]
        total_questions: u32,
        complete: bool,
    },
    Result {
        result: QuizResult,
    },
    SpeechToText {
        text: String,
    },
    SpeechToTextError {
        message: String,
    },
    Aborted,
    Restarted,
    Error {
        message: String,
    },
}

impl ServerWsMessage {
    /// Progress report split into its wire messages: always AnswerRecorded,
    /// plus Result when the final answer just landed.
    pub fn from_progress(progress: AnswerProgress) -> Vec<ServerWsMessage> {
        let mut out = vec![ServerWsMessage::AnswerRecorded {
            question_id: progress.question_id,
            answered_count: progress.answered,
            total_questions: progress.total,
            complete: progress.complete,
        }];
        if let Some(result) = progress.result {
            out.push(ServerWsMessage::Result { result });
        }
        out
    }
}

//
// HTTP request/response DTOs
//

/// Raw generation request as received; the schema layer turns it into a
/// validated `GenerationRequest`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerateIn {
    pub topic: String,
    pub difficulty: String,
    pub number_of_questions: Option<i64>,
    pub language: Option<String>,
}

/// Quiz as submitted for direct evaluation. Loose on purpose: clients may
/// round-trip a quiz they received earlier, minus derived fields.
#[derive(Clone, Debug, Deserialize)]
pub struct QuizIn {
    pub title: String,
    pub questions: Vec<QuestionIn>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionIn {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default)]
    pub explanation: String,
}

impl QuizIn {
    pub fn into_quiz(self) -> Quiz {
        let questions: Vec<_> = self
            .questions
            .into_iter()
            .map(|q| crate::domain::Question {
                id: q.id,
                question: q.question,
                options: q.options,
                correct_answer: q.correct_answer,
                explanation: q.explanation,
            })
            .collect();
        Quiz {
            title: self.title,
            description: String::new(),
            total_questions: questions.len() as u32,
            estimated_time: String::new(),
            questions,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateIn {
    pub quiz: QuizIn,
    pub user_answers: Vec<AnswerSubmission>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessageIn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatIn {
    pub messages: Vec<ChatMessageIn>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuizChatIn {
    pub messages: Vec<ChatMessageIn>,
}

/// Events on the quiz-chat SSE stream.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChatEvent {
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        id: String,
        name: String,
        result: serde_json::Value,
    },
    Delta {
        text: String,
    },
    Done,
    Error {
        message: String,
    },
}

impl ToolChatEvent {
    /// SSE event name; identical to the serialized `type` tag.
    pub fn event_name(&self) -> &'static str {
        match self {
            ToolChatEvent::ToolCall { .. } => "tool_call",
            ToolChatEvent::ToolResult { .. } => "tool_result",
            ToolChatEvent::Delta { .. } => "delta",
            ToolChatEvent::Done => "done",
            ToolChatEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OutlineIn {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechIn {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageIn {
    pub prompt: String,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Serialize)]
pub struct ImageOut {
    pub success: bool,
    /// Base64-encoded image payload.
    pub image: String,
    pub prompt: String,
    pub size: String,
}

#[derive(Serialize)]
pub struct TranscribeOut {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Serialize)]
pub struct GenerateOut {
    pub quiz: Quiz,
    /// "openai" or "seed", for observability.
    pub origin: &'static str,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
