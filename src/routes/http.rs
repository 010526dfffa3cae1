//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Fallible handlers return `Result<_, ApiError>` so the error taxonomy picks
//! the status code; streaming handlers translate their streams into SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::{PartialQuiz, QuizResult};
use crate::error::ApiError;
use crate::logic;
use crate::protocol::*;
use crate::schema::{self, Violation};
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic, difficulty = %body.difficulty))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Json<GenerateOut>, ApiError> {
  let (quiz, origin) = logic::generate_quiz(&state, &body).await?;
  info!(target: "quiz", title = %quiz.title, questions = quiz.questions.len(), %origin, "HTTP quiz served");
  Ok(Json(GenerateOut { quiz, origin }))
}

/// SSE stream of `snapshot` events (growing PartialQuiz), terminated by one
/// `complete` (validated full Quiz) or one `error` event.
#[instrument(level = "info", skip(state, body), fields(topic = %body.topic))]
pub async fn http_post_generate_stream(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
  let req = schema::parse_request(&body).map_err(ApiError::validation)?;
  let snapshots = logic::open_quiz_stream(&state, &req).await?;

  let stream = futures::stream::unfold(
    (snapshots, None::<PartialQuiz>, false),
    |(mut snapshots, mut last, done)| async move {
      if done {
        return None;
      }
      match snapshots.next().await {
        Some(Ok(partial)) => {
          let event = sse_event("snapshot", &partial);
          last = Some(partial);
          Some((Ok(event), (snapshots, last, false)))
        }
        Some(Err(e)) => {
          let event = sse_event("error", &serde_json::json!({ "error": e.to_string() }));
          Some((Ok(event), (snapshots, last, true)))
        }
        None => {
          let event = match last.take() {
            Some(partial) => match schema::finalize(&partial) {
              Ok(quiz) => sse_event("complete", &quiz),
              Err(violations) => sse_event(
                "error",
                &serde_json::json!({ "error": "quiz incomplete at end of stream", "violations": violations }),
              ),
            },
            None => sse_event("error", &serde_json::json!({ "error": "stream produced no quiz" })),
          };
          Some((Ok(event), (snapshots, last, true)))
        }
      }
    },
  );
  Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[instrument(level = "info", skip(state, body), fields(answers = body.user_answers.len()))]
pub async fn http_post_evaluate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EvaluateIn>,
) -> Result<Json<QuizResult>, ApiError> {
  let result = logic::evaluate_direct(&state, body)?;
  info!(
    target: "quiz",
    correct = result.correct_answers,
    total = result.total_questions,
    percentage = result.percentage,
    "HTTP evaluation served"
  );
  Ok(Json(result))
}

/// Plain chat: SSE `delta` events with text fragments, then `done`.
#[instrument(level = "info", skip(state, body), fields(messages = body.messages.len()))]
pub async fn http_post_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChatIn>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
  let deltas = logic::open_chat_stream(&state, &body).await?;
  let stream = futures::stream::unfold((deltas, false), |(mut deltas, done)| async move {
    if done {
      return None;
    }
    let event = match deltas.next().await {
      Some(Ok(text)) => {
        let event = sse_event("delta", &serde_json::json!({ "text": text }));
        return Some((Ok(event), (deltas, false)));
      }
      Some(Err(e)) => sse_event("error", &serde_json::json!({ "error": e.to_string() })),
      None => sse_event("done", &serde_json::json!({})),
    };
    Some((Ok(event), (deltas, true)))
  });
  Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Tool-calling quiz assistant. Event names mirror the payload `type` tag:
/// `tool_call`, `tool_result`, `delta`, `done`, `error`.
#[instrument(level = "info", skip(state, body), fields(messages = body.messages.len()))]
pub async fn http_post_quiz_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizChatIn>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
  let events = logic::quiz_chat_stream(state, body);
  let stream = events.map(|event| Ok(sse_event(event.event_name(), &event)));
  Sse::new(stream).keep_alive(KeepAlive::default())
}

/// SSE `snapshot` events with the growing chapter outline, then `done`.
#[instrument(level = "info", skip(state, body))]
pub async fn http_post_outline(
  State(state): State<Arc<AppState>>,
  Json(body): Json<OutlineIn>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
  let snapshots = logic::open_outline_stream(&state, &body).await?;
  let stream = futures::stream::unfold((snapshots, false), |(mut snapshots, done)| async move {
    if done {
      return None;
    }
    let event = match snapshots.next().await {
      Some(Ok(outline)) => {
        let event = sse_event("snapshot", &outline);
        return Some((Ok(event), (snapshots, false)));
      }
      Some(Err(e)) => sse_event("error", &serde_json::json!({ "error": e.to_string() })),
      None => sse_event("done", &serde_json::json!({})),
    };
    Some((Ok(event), (snapshots, true)))
  });
  Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[instrument(level = "info", skip(state, multipart))]
pub async fn http_post_transcribe(
  State(state): State<Arc<AppState>>,
  mut multipart: Multipart,
) -> Result<Json<TranscribeOut>, ApiError> {
  while let Some(field) = multipart.next_field().await.map_err(|e| {
    ApiError::validation(vec![Violation::new("audio", format!("unreadable multipart body: {e}"))])
  })? {
    if field.name() != Some("audio") {
      continue;
    }
    let filename = field.file_name().unwrap_or("audio.webm").to_string();
    let mime = field.content_type().unwrap_or("audio/webm").to_string();
    let bytes = field.bytes().await.map_err(|e| {
      ApiError::validation(vec![Violation::new("audio", format!("unreadable upload: {e}"))])
    })?;
    let out = logic::do_transcribe(&state, bytes.to_vec(), &filename, &mime).await?;
    return Ok(Json(out));
  }
  Err(ApiError::validation(vec![Violation::new("audio", "multipart field is required")]))
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len()))]
pub async fn http_post_speech(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SpeechIn>,
) -> Result<Response, ApiError> {
  let audio = logic::do_speech(&state, &body).await?;
  let content_type = HeaderValue::try_from(audio.media_type.as_str())
    .unwrap_or_else(|_| HeaderValue::from_static("audio/mpeg"));
  let headers = [
    (CONTENT_TYPE, content_type),
    (CONTENT_DISPOSITION, HeaderValue::from_static("attachment; filename=\"generated-speech.mp3\"")),
    (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
  ];
  Ok((headers, audio.bytes).into_response())
}

#[instrument(level = "info", skip(state, body), fields(prompt_len = body.prompt.len()))]
pub async fn http_post_image(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ImageIn>,
) -> Result<Json<ImageOut>, ApiError> {
  let out = logic::do_image(&state, &body).await?;
  Ok(Json(out))
}

/// Build a named SSE event carrying a JSON payload.
fn sse_event(name: &'static str, payload: &impl Serialize) -> Event {
  match Event::default().event(name).json_data(payload) {
    Ok(event) => event,
    Err(_) => Event::default().event("error").data(r#"{"error":"event serialization failed"}"#),
  }
}
