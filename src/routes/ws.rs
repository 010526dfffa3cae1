//! WebSocket upgrade + quiz session loop.
//!
//! A quiz run pushes server-initiated messages (snapshots, reveals, the
//! final result), so unlike plain request/reply the socket loop multiplexes
//! client messages with a channel fed by the generation task. One active
//! run per connection; errors are reported in-band and never close the
//! socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::GenerationRequest;
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::reveal::{RevealController, RevealStep};
use crate::schema;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "quizcraft_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "quizcraft_backend", "WebSocket connected");
  let (tx, mut rx) = mpsc::channel::<ServerWsMessage>(32);
  let mut generation: Option<JoinHandle<()>> = None;
  let mut session_id: Option<Uuid> = None;

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => {
                debug!(target = "quizcraft_backend", "WS received: {:?}", &incoming);
                handle_client_ws(incoming, &state, &tx, &mut generation, &mut session_id).await;
              }
              Err(e) => {
                let _ = tx.send(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }).await;
              }
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      outgoing = rx.recv() => {
        let Some(msg) = outgoing else { break };
        // The generation task announces the open session; remember it so
        // answer and restart messages can reach it.
        if let ServerWsMessage::QuizReady { session_id: sid, .. } = &msg {
          session_id = Some(*sid);
        }
        if !send_ws(&mut socket, &msg).await {
          break;
        }
      }
    }
  }

  if let Some(task) = generation.take() {
    task.abort();
  }
  if let Some(sid) = session_id.take() {
    state.remove_session(sid).await;
  }
  info!(target: "quizcraft_backend", "WebSocket disconnected");
}

async fn send_ws(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  if let Err(e) = socket.send(Message::Text(out)).await {
    error!(target: "quizcraft_backend", error = %e, "WS send error");
    return false;
  }
  true
}

#[instrument(level = "info", skip(state, tx, generation, session_id))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &Arc<AppState>,
  tx: &mpsc::Sender<ServerWsMessage>,
  generation: &mut Option<JoinHandle<()>>,
  session_id: &mut Option<Uuid>,
) {
  match msg {
    ClientWsMessage::Ping => {
      let _ = tx.send(ServerWsMessage::Pong).await;
    }

    ClientWsMessage::StartQuiz { request, stream } => {
      // One run per connection: a new start supersedes the old one.
      if let Some(task) = generation.take() {
        task.abort();
      }
      if let Some(sid) = session_id.take() {
        state.remove_session(sid).await;
      }
      let req = match schema::parse_request(&request) {
        Ok(req) => req,
        Err(violations) => {
          let message = violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; ");
          let _ = tx.send(ServerWsMessage::Error { message }).await;
          return;
        }
      };
      info!(target: "quiz", topic = %req.topic, difficulty = %req.difficulty, stream, "WS quiz generation started");
      *generation = Some(tokio::spawn(run_generation(state.clone(), req, stream, tx.clone())));
    }

    ClientWsMessage::Answer { question_id, selected_answer } => {
      let Some(sid) = *session_id else {
        let _ = tx.send(ServerWsMessage::Error { message: "No active quiz session.".into() }).await;
        return;
      };
      match state.record_answer(sid, &question_id, selected_answer).await {
        Ok(progress) => {
          for out in ServerWsMessage::from_progress(progress) {
            let _ = tx.send(out).await;
          }
        }
        Err(e) => {
          let _ = tx.send(ServerWsMessage::Error { message: e.to_string() }).await;
        }
      }
    }

    ClientWsMessage::SpeechToTextInput { audio_base64, mime } => {
      match logic::do_transcribe_b64(state, &audio_base64, &mime).await {
        Ok(out) => {
          let _ = tx.send(ServerWsMessage::SpeechToText { text: out.text }).await;
        }
        Err(e) => {
          let _ = tx.send(ServerWsMessage::SpeechToTextError { message: e.to_string() }).await;
        }
      }
    }

    ClientWsMessage::Abort => {
      if let Some(task) = generation.take() {
        task.abort();
        info!(target: "quiz", "WS generation aborted by client");
      }
      let _ = tx.send(ServerWsMessage::Aborted).await;
    }

    ClientWsMessage::Restart => {
      if let Some(task) = generation.take() {
        task.abort();
      }
      if let Some(sid) = session_id.take() {
        state.remove_session(sid).await;
        info!(target: "quiz", %sid, "WS session discarded on restart");
      }
      let _ = tx.send(ServerWsMessage::Restarted).await;
    }
  }
}

/// Drive one quiz generation to completion, pushing protocol messages into
/// the connection channel. Aborting this task leaves the last pushed state
/// as the final word: no completion, no error.
async fn run_generation(
  state: Arc<AppState>,
  req: GenerationRequest,
  stream: bool,
  tx: mpsc::Sender<ServerWsMessage>,
) {
  if stream && state.openai.is_some() {
    run_streaming_generation(state, req, tx).await;
  } else {
    run_batch_generation(state, req, tx).await;
  }
}

async fn run_batch_generation(
  state: Arc<AppState>,
  req: GenerationRequest,
  tx: mpsc::Sender<ServerWsMessage>,
) {
  match logic::generate_validated(&state, &req).await {
    Ok((quiz, origin)) => {
      info!(target: "quiz", title = %quiz.title, %origin, "WS quiz ready (batch)");
      let session_id = state.insert_session(quiz.clone()).await;
      let _ = tx.send(ServerWsMessage::QuizReady { session_id, quiz }).await;
    }
    Err(e) => {
      let _ = tx.send(ServerWsMessage::Error { message: e.to_string() }).await;
    }
  }
}

async fn run_streaming_generation(
  state: Arc<AppState>,
  req: GenerationRequest,
  tx: mpsc::Sender<ServerWsMessage>,
) {
  let mut snapshots = match logic::open_quiz_stream(&state, &req).await {
    Ok(s) => s,
    Err(e) => {
      let _ = tx.send(ServerWsMessage::Error { message: e.to_string() }).await;
      return;
    }
  };

  let mut reveal = RevealController::new();
  let mut ticker = tokio::time::interval(Duration::from_millis(state.policy.reveal_interval_ms));
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      next = snapshots.next() => {
        match next {
          Some(Ok(partial)) => {
            reveal.apply(partial);
            let _ = tx.send(ServerWsMessage::Snapshot {
              partial: reveal.snapshot().clone(),
              revealed: reveal.revealed(),
              available: reveal.available(),
              phase: reveal.phase(),
            }).await;
          }
          Some(Err(e)) => {
            error!(target: "quiz", error = %e, "WS quiz stream failed");
            let _ = tx.send(ServerWsMessage::Error { message: e.to_string() }).await;
            return;
          }
          None => break,
        }
      }
      _ = ticker.tick() => {
        if step_reveal(&state, &mut reveal, &tx).await {
          return;
        }
      }
    }
  }

  // Upstream exhausted: pace out the remaining reveals, then the terminal.
  reveal.finish();
  loop {
    ticker.tick().await;
    if step_reveal(&state, &mut reveal, &tx).await {
      return;
    }
  }
}

/// One reveal tick. Returns true once a terminal step has been delivered.
async fn step_reveal(
  state: &Arc<AppState>,
  reveal: &mut RevealController,
  tx: &mpsc::Sender<ServerWsMessage>,
) -> bool {
  match reveal.tick() {
    Some(RevealStep::Revealed { index }) => {
      let _ = tx.send(ServerWsMessage::QuestionRevealed { index }).await;
      false
    }
    Some(RevealStep::Completed(quiz)) => {
      info!(target: "quiz", title = %quiz.title, questions = quiz.questions.len(), "WS quiz ready (streamed)");
      let session_id = state.insert_session((*quiz).clone()).await;
      let _ = tx.send(ServerWsMessage::QuizReady { session_id, quiz: *quiz }).await;
      true
    }
    Some(RevealStep::Incomplete(violations)) => {
      let detail = violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; ");
      warn!(target: "quiz", %detail, "WS quiz incomplete at end of stream");
      let _ = tx.send(ServerWsMessage::Error {
        message: format!("quiz incomplete at end of stream: {}", detail),
      }).await;
      true
    }
    None => false,
  }
}
