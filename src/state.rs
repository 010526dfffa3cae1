//! Application state: quiz sessions, prompts/policy, and the OpenAI client.
//!
//! This module owns:
//!   - the in-memory session store (quiz + collected answers, by session id)
//!   - prompts, policy and feedback tiers (from TOML or defaults)
//!   - optional OpenAI client
//!
//! Sessions live only as long as the process; a restart forgets them. That is
//! deliberate: a quiz run is an interactive, short-lived exchange.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{load_app_config_from_env, FeedbackTier, Policy, Prompts};
use crate::domain::Quiz;
use crate::error::ApiError;
use crate::evaluate::evaluate_quiz;
use crate::openai::OpenAI;
use crate::seeds::seed_bank;
use crate::session::{AnswerProgress, QuizSession};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, QuizSession>>>,
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub policy: Policy,
    pub feedback_tiers: Vec<FeedbackTier>,
}

impl AppState {
    /// Build state from env: load config, log the seed inventory, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default();

        // Inventory summary by difficulty.
        let mut count_by_diff: HashMap<&'static str, usize> = HashMap::new();
        for entry in seed_bank() {
            *count_by_diff.entry(entry.difficulty.as_str()).or_insert(0) += 1;
        }
        for (diff, seeds) in count_by_diff {
            info!(target: "quiz", %diff, seeds, "Startup seed inventory");
        }

        // Build optional OpenAI client (if API key present).
        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(
                target: "quizcraft_backend",
                base_url = %oa.base_url,
                fast_model = %oa.fast_model,
                strong_model = %oa.strong_model,
                transcribe_model = %oa.transcribe_model,
                speech_model = %oa.speech_model,
                image_model = %oa.image_model,
                "OpenAI enabled."
            );
        } else {
            info!(target: "quizcraft_backend", "OpenAI disabled (no OPENAI_API_KEY). Serving seed quizzes.");
        }

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            openai,
            prompts: cfg.prompts,
            policy: cfg.policy,
            feedback_tiers: cfg.feedback_tiers,
        }
    }

    /// State with defaults and no model, for exercising handlers offline.
    #[cfg(test)]
    pub fn offline() -> Self {
        let cfg = crate::config::AppConfig::default();
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            openai: None,
            prompts: cfg.prompts,
            policy: cfg.policy,
            feedback_tiers: cfg.feedback_tiers,
        }
    }

    /// Open a session for a finished quiz and return its id.
    #[instrument(level = "debug", skip(self, quiz), fields(title = %quiz.title, questions = quiz.questions.len()))]
    pub async fn insert_session(&self, quiz: Quiz) -> Uuid {
        let session = QuizSession::new(quiz);
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        id
    }

    /// Drop a session and everything it collected.
    #[instrument(level = "debug", skip(self), fields(%session_id))]
    pub async fn remove_session(&self, session_id: Uuid) -> bool {
        self.sessions.write().await.remove(&session_id).is_some()
    }

    /// Record one answer against a session. When the final answer lands, the
    /// result is computed inside the same lock so it can never be torn.
    #[instrument(level = "info", skip(self), fields(%session_id, %question_id, selected_answer))]
    pub async fn record_answer(
        &self,
        session_id: Uuid,
        question_id: &str,
        selected_answer: usize,
    ) -> Result<AnswerProgress, ApiError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(ApiError::UnknownSession(session_id))?;
        session.record_answer(question_id, selected_answer)?;

        let complete = session.is_complete();
        let result = if complete {
            Some(evaluate_quiz(&session.quiz, &session.submissions(), &self.feedback_tiers)?)
        } else {
            None
        };

        Ok(AnswerProgress {
            question_id: question_id.to_string(),
            answered: session.answered_count(),
            total: session.total_questions(),
            complete,
            result,
        })
    }
}
