//! Error taxonomy shared by HTTP and WebSocket surfaces.
//!
//! Two layers:
//! - `GenerationError`: classified upstream model failures (network, auth,
//!   quota, timeout, schema-violating output) plus the media-input causes a
//!   user can fix by editing their request (too long, bad format).
//! - `ApiError`: everything a handler can return, including request
//!   validation and quiz-session misuse. Maps onto HTTP status codes.
//!
//! Handlers never panic on these; sessions survive every variant.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use uuid::Uuid;

use crate::schema::Violation;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model endpoint unreachable: {0}")]
    Network(String),
    #[error("model endpoint rejected credentials: {0}")]
    Auth(String),
    #[error("model endpoint quota exhausted: {0}")]
    Quota(String),
    #[error("model request timed out after {0}s")]
    Timeout(u64),
    #[error("model output failed validation: {0}")]
    MalformedOutput(String),
    #[error("input too long for this operation: {0}")]
    ContentTooLong(String),
    #[error("unsupported media format: {0}")]
    UnsupportedFormat(String),
    #[error("model integration is not configured (set OPENAI_API_KEY)")]
    Disabled,
}

impl GenerationError {
    /// Classify a non-2xx upstream response. `media` widens the search for
    /// causes the user can fix by editing their input.
    pub fn from_status(status: StatusCode, detail: String, media: bool) -> Self {
        let lower = detail.to_lowercase();
        match status.as_u16() {
            401 | 403 => GenerationError::Auth(detail),
            429 => GenerationError::Quota(detail),
            _ if media
                && (lower.contains("too long")
                    || lower.contains("maximum length")
                    || lower.contains("string_above_max_length")) =>
            {
                GenerationError::ContentTooLong(detail)
            }
            _ if media
                && (lower.contains("format")
                    || lower.contains("unsupported")
                    || lower.contains("invalid file")) =>
            {
                GenerationError::UnsupportedFormat(detail)
            }
            _ => GenerationError::Network(format!("HTTP {}: {}", status, detail)),
        }
    }

    /// Classify a transport-level failure. `budget_secs` is the timeout we
    /// attached to the request, so timeouts report the real ceiling.
    pub fn from_reqwest(e: reqwest::Error, budget_secs: u64) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout(budget_secs)
        } else {
            GenerationError::Network(e.to_string())
        }
    }

    /// User can retry after editing their input (not an upstream outage).
    pub fn retryable_by_edit(&self) -> bool {
        matches!(
            self,
            GenerationError::ContentTooLong(_) | GenerationError::UnsupportedFormat(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {}", join_violations(.violations))]
    Validation { violations: Vec<Violation> },
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("question {question_id} already has a recorded answer")]
    AlreadyAnswered { question_id: String },
    #[error("{missing} of {total} questions still unanswered")]
    IncompleteAnswers { missing: usize, total: usize },
    #[error("unknown session {0}")]
    UnknownSession(Uuid),
    #[error("unknown question {0}")]
    UnknownQuestion(String),
}

impl ApiError {
    pub fn validation(violations: Vec<Violation>) -> Self {
        ApiError::Validation { violations }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::AlreadyAnswered { .. } | ApiError::IncompleteAnswers { .. } => {
                StatusCode::CONFLICT
            }
            ApiError::UnknownSession(_) | ApiError::UnknownQuestion(_) => StatusCode::NOT_FOUND,
            ApiError::Generation(e) => match e {
                GenerationError::ContentTooLong(_) | GenerationError::UnsupportedFormat(_) => {
                    StatusCode::BAD_REQUEST
                }
                GenerationError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
                GenerationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let ApiError::Validation { violations } = &self {
            body["violations"] = serde_json::to_value(violations).unwrap_or_default();
        }
        if let ApiError::Generation(e) = &self {
            if e.retryable_by_edit() {
                body["retryable"] = serde_json::Value::Bool(true);
            }
        }
        (status, Json(body)).into_response()
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
