//! Core quiz behaviors shared by the HTTP and WebSocket surfaces.
//!
//! Every function here takes `AppState` and returns domain values or
//! `ApiError`, so the route layer stays a thin translation to wire shapes.
//! When no model is configured, generation falls back to the seed bank;
//! chat, voice and image calls have nothing sensible to fall back to and
//! surface `GenerationError::Disabled` instead.

use std::sync::Arc;

use base64::Engine;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::domain::{GenerationRequest, PartialQuiz, Quiz, QuizResult};
use crate::error::{ApiError, GenerationError};
use crate::evaluate::{evaluate_quiz, feedback_for};
use crate::openai::{
  self, ChatMessageReq, ChatOutcome, DeltaStream, SnapshotStream, SpeechAudio,
};
use crate::outline::ChapterOutline;
use crate::protocol::{
  ChatIn, EvaluateIn, GenerateIn, ImageIn, ImageOut, OutlineIn, QuizChatIn, SpeechIn,
  ToolChatEvent, TranscribeOut,
};
use crate::schema::{self, Violation};
use crate::seeds;
use crate::state::AppState;

/// Validate a raw generation request and produce a quiz in one shot.
///
/// Returns the quiz together with its origin ("openai" or "seed") so
/// callers can tell clients where the content came from.
#[instrument(level = "info", skip(state, raw), fields(topic = %raw.topic, difficulty = %raw.difficulty))]
pub async fn generate_quiz(
  state: &AppState,
  raw: &GenerateIn,
) -> Result<(Quiz, &'static str), ApiError> {
  let req = schema::parse_request(raw).map_err(ApiError::validation)?;
  generate_validated(state, &req).await
}

/// Produce a quiz for an already-validated request.
pub async fn generate_validated(
  state: &AppState,
  req: &GenerationRequest,
) -> Result<(Quiz, &'static str), ApiError> {
  if let Some(oa) = &state.openai {
    let quiz = oa
      .generate_quiz(&state.prompts, req, state.policy.request_timeout_secs)
      .await?;
    Ok((quiz, "openai"))
  } else {
    info!(target: "quiz", topic = %req.topic, "No model configured; serving a seed quiz");
    Ok((seeds::seed_quiz(req), "seed"))
  }
}

/// Open a stream of progressively larger quiz snapshots.
///
/// Without a model the seed quiz arrives as a single complete snapshot,
/// so streaming consumers behave the same either way.
#[instrument(level = "info", skip(state, req), fields(topic = %req.topic))]
pub async fn open_quiz_stream(
  state: &AppState,
  req: &GenerationRequest,
) -> Result<SnapshotStream<PartialQuiz>, ApiError> {
  if let Some(oa) = &state.openai {
    let stream = oa.stream_quiz(&state.prompts, req).await?;
    return Ok(stream);
  }
  info!(target: "quiz", topic = %req.topic, "No model configured; streaming a seed snapshot");
  let partial = PartialQuiz::from(seeds::seed_quiz(req));
  Ok(Box::pin(futures::stream::iter(vec![Ok::<_, GenerationError>(partial)])))
}

/// Score a quiz against submitted answers without any session state.
///
/// The quiz payload comes from the client, so its internal consistency is
/// re-checked before a single answer is looked at.
#[instrument(level = "info", skip(state, input), fields(answers = input.user_answers.len()))]
pub fn evaluate_direct(state: &AppState, input: EvaluateIn) -> Result<QuizResult, ApiError> {
  let quiz = input.quiz.into_quiz();
  let violations = schema::validate_questions(&quiz.questions);
  if !violations.is_empty() {
    return Err(ApiError::validation(violations));
  }
  evaluate_quiz(&quiz, &input.user_answers, &state.feedback_tiers)
}

/// Open a plain assistant chat stream (no tools).
#[instrument(level = "info", skip(state, input), fields(messages = input.messages.len()))]
pub async fn open_chat_stream(state: &AppState, input: &ChatIn) -> Result<DeltaStream, ApiError> {
  let oa = state
    .openai
    .as_ref()
    .ok_or(ApiError::Generation(GenerationError::Disabled))?;
  let model = oa.resolve_model(input.model.as_deref());
  let mut messages = vec![ChatMessageReq::system(&state.prompts.chat_system)];
  for m in &input.messages {
    messages.push(ChatMessageReq::from_role(&m.role, &m.content));
  }
  let stream = oa.chat_stream(&model, messages, 0.7, false).await?;
  Ok(stream)
}

/// Open the quiz assistant stream: a tool-calling loop that can generate
/// quizzes and evaluate answer sheets mid-conversation.
///
/// Events arrive over a channel so the loop keeps its own pace; dropping
/// the consumer only stops delivery.
pub fn quiz_chat_stream(
  state: Arc<AppState>,
  input: QuizChatIn,
) -> impl futures::Stream<Item = ToolChatEvent> + Send {
  let (tx, rx) = mpsc::channel::<ToolChatEvent>(16);
  tokio::spawn(run_tool_loop(state, input, tx));
  futures::stream::unfold(rx, |mut rx| async move {
    rx.recv().await.map(|event| (event, rx))
  })
}

#[instrument(level = "info", skip(state, input, tx), fields(messages = input.messages.len()))]
async fn run_tool_loop(state: Arc<AppState>, input: QuizChatIn, tx: mpsc::Sender<ToolChatEvent>) {
  let Some(oa) = state.openai.clone() else {
    let _ = tx
      .send(ToolChatEvent::Error {
        message: GenerationError::Disabled.to_string(),
      })
      .await;
    return;
  };

  let mut messages = vec![ChatMessageReq::system(&state.prompts.quiz_chat_system)];
  for m in &input.messages {
    messages.push(ChatMessageReq::from_role(&m.role, &m.content));
  }

  let budget = state.policy.request_timeout_secs;
  for _ in 0..state.policy.max_tool_steps {
    let outcome = oa
      .chat_once(
        &oa.strong_model,
        messages.clone(),
        0.7,
        Some(openai::quiz_tool_defs()),
        budget,
      )
      .await;
    let outcome = match outcome {
      Ok(outcome) => outcome,
      Err(e) => {
        let _ = tx.send(ToolChatEvent::Error { message: e.to_string() }).await;
        return;
      }
    };
    match outcome {
      ChatOutcome::Text(text) => {
        if !text.is_empty() {
          let _ = tx.send(ToolChatEvent::Delta { text }).await;
        }
        let _ = tx.send(ToolChatEvent::Done).await;
        return;
      }
      ChatOutcome::ToolCalls(calls) => {
        messages.push(ChatMessageReq::assistant_tool_calls(&calls));
        for call in calls {
          let args: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
          let _ = tx
            .send(ToolChatEvent::ToolCall {
              id: call.id.clone(),
              name: call.name.clone(),
              arguments: args.clone(),
            })
            .await;
          let result = execute_tool(&state, &call.name, args).await;
          let echoed = result.to_string();
          let _ = tx
            .send(ToolChatEvent::ToolResult {
              id: call.id.clone(),
              name: call.name.clone(),
              result,
            })
            .await;
          messages.push(ChatMessageReq::tool_result(call.id, echoed));
        }
      }
    }
  }
  warn!(target: "quiz", "Tool loop hit the step limit without a final answer");
  let _ = tx.send(ToolChatEvent::Done).await;
}

async fn execute_tool(state: &AppState, name: &str, args: serde_json::Value) -> serde_json::Value {
  match name {
    "generateQuiz" => execute_generate_quiz(state, args).await,
    "evaluateAnswers" => execute_evaluate_answers(state, args),
    other => serde_json::json!({
      "success": false,
      "error": format!("未知工具: {other}"),
    }),
  }
}

async fn execute_generate_quiz(state: &AppState, args: serde_json::Value) -> serde_json::Value {
  let raw: GenerateIn = match serde_json::from_value(args) {
    Ok(raw) => raw,
    Err(e) => {
      return serde_json::json!({
        "success": false,
        "error": format!("生成测试失败: {e}"),
      })
    }
  };
  match generate_quiz(state, &raw).await {
    Ok((quiz, _)) => {
      let message = format!(
        "已为您生成关于\"{}\"的测试，共{}道{}难度题目。请逐一回答以下问题：",
        raw.topic,
        quiz.questions.len(),
        raw.difficulty
      );
      serde_json::json!({
        "type": "quiz_generated",
        "success": true,
        "quiz": quiz,
        "message": message,
      })
    }
    Err(e) => serde_json::json!({
      "success": false,
      "error": format!("生成测试失败: {e}"),
    }),
  }
}

/// Score an answer sheet the assistant collected in conversation. The
/// sheet carries the assistant's own correctness marks, so this only
/// aggregates; it never re-derives answers it cannot see.
fn execute_evaluate_answers(state: &AppState, args: serde_json::Value) -> serde_json::Value {
  #[derive(serde::Deserialize)]
  #[serde(rename_all = "camelCase")]
  struct SheetIn {
    user_answers: Vec<SheetAnswerIn>,
  }
  #[derive(serde::Deserialize)]
  #[serde(rename_all = "camelCase")]
  struct SheetAnswerIn {
    #[serde(default)]
    question_text: String,
    #[serde(default)]
    user_answer: String,
    #[serde(default)]
    correct_answer: String,
    is_correct: bool,
  }

  let sheet: SheetIn = match serde_json::from_value(args) {
    Ok(sheet) => sheet,
    Err(e) => {
      return serde_json::json!({
        "success": false,
        "error": format!("评估失败: {e}"),
      })
    }
  };
  if sheet.user_answers.is_empty() {
    return serde_json::json!({
      "success": false,
      "error": "评估失败: 没有答题记录",
    });
  }

  let total = sheet.user_answers.len() as u32;
  let correct = sheet.user_answers.iter().filter(|a| a.is_correct).count() as u32;
  let percentage = ((correct * 100) as f64 / total as f64).round() as u8;
  let feedback = feedback_for(percentage, &state.feedback_tiers);
  let detailed: Vec<serde_json::Value> = sheet
    .user_answers
    .iter()
    .enumerate()
    .map(|(i, a)| {
      serde_json::json!({
        "questionNumber": i + 1,
        "question": a.question_text,
        "userAnswer": a.user_answer,
        "correctAnswer": a.correct_answer,
        "isCorrect": a.is_correct,
        "status": if a.is_correct { "✅ 正确" } else { "❌ 错误" },
      })
    })
    .collect();
  serde_json::json!({
    "type": "quiz_evaluated",
    "success": true,
    "result": {
      "totalQuestions": total,
      "correctAnswers": correct,
      "percentage": percentage,
      "feedback": feedback,
      "detailedAnalysis": detailed,
    },
  })
}

/// Open a stream of progressively larger chapter outlines.
#[instrument(level = "info", skip(state, input))]
pub async fn open_outline_stream(
  state: &AppState,
  input: &OutlineIn,
) -> Result<SnapshotStream<ChapterOutline>, ApiError> {
  let oa = state
    .openai
    .as_ref()
    .ok_or(ApiError::Generation(GenerationError::Disabled))?;
  let prompt = match input.prompt.as_deref().map(str::trim) {
    Some(p) if !p.is_empty() => p.to_string(),
    _ => state.prompts.outline_default_prompt.clone(),
  };
  let stream = oa.stream_outline(&state.prompts, &prompt).await?;
  Ok(stream)
}

/// Transcribe an uploaded audio clip.
#[instrument(level = "info", skip(state, audio), fields(bytes = audio.len(), mime = %mime))]
pub async fn do_transcribe(
  state: &AppState,
  audio: Vec<u8>,
  filename: &str,
  mime: &str,
) -> Result<TranscribeOut, ApiError> {
  let oa = state
    .openai
    .as_ref()
    .ok_or(ApiError::Generation(GenerationError::Disabled))?;
  let out = oa
    .transcribe(audio, filename, mime, state.policy.media_timeout_secs)
    .await?;
  Ok(TranscribeOut {
    text: out.text,
    duration: out.duration,
    language: out.language,
  })
}

/// Transcribe audio delivered as base64 over the WebSocket.
pub async fn do_transcribe_b64(
  state: &AppState,
  audio_base64: &str,
  mime: &str,
) -> Result<TranscribeOut, ApiError> {
  let audio = base64::engine::general_purpose::STANDARD
    .decode(audio_base64.trim())
    .map_err(|_| {
      ApiError::Generation(GenerationError::UnsupportedFormat("audio is not valid base64".into()))
    })?;
  let filename = if mime.contains("wav") {
    "audio.wav"
  } else if mime.contains("mp3") || mime.contains("mpeg") {
    "audio.mp3"
  } else {
    "audio.webm"
  };
  do_transcribe(state, audio, filename, mime).await
}

/// Synthesize speech for a piece of text.
#[instrument(level = "info", skip(state, input), fields(text_len = input.text.len()))]
pub async fn do_speech(state: &AppState, input: &SpeechIn) -> Result<SpeechAudio, ApiError> {
  if input.text.trim().is_empty() {
    return Err(ApiError::validation(vec![Violation::new(
      "text",
      "must not be empty",
    )]));
  }
  let oa = state
    .openai
    .as_ref()
    .ok_or(ApiError::Generation(GenerationError::Disabled))?;
  let voice = input.voice.as_deref().unwrap_or(&state.policy.speech_voice);
  let audio = oa
    .speech(&input.text, voice, state.policy.media_timeout_secs)
    .await?;
  Ok(audio)
}

/// Generate an illustration for a prompt.
#[instrument(level = "info", skip(state, input), fields(prompt_len = input.prompt.len()))]
pub async fn do_image(state: &AppState, input: &ImageIn) -> Result<ImageOut, ApiError> {
  if input.prompt.trim().is_empty() {
    return Err(ApiError::validation(vec![Violation::new(
      "prompt",
      "must not be empty",
    )]));
  }
  let oa = state
    .openai
    .as_ref()
    .ok_or(ApiError::Generation(GenerationError::Disabled))?;
  let size = input
    .size
    .clone()
    .unwrap_or_else(|| state.policy.image_size.clone());
  let image = oa
    .generate_image(&input.prompt, &size, state.policy.media_timeout_secs)
    .await?;
  Ok(ImageOut {
    success: true,
    image,
    prompt: input.prompt.clone(),
    size,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::AnswerSubmission;
  use crate::protocol::{ChatMessageIn, QuestionIn, QuizIn};
  use crate::schema::validate_quiz;
  use futures::StreamExt;

  fn req(topic: &str, difficulty: &str, count: Option<i64>) -> GenerateIn {
    GenerateIn {
      topic: topic.to_string(),
      difficulty: difficulty.to_string(),
      number_of_questions: count,
      language: None,
    }
  }

  #[tokio::test]
  async fn offline_generation_serves_seed_quizzes() {
    let state = AppState::offline();
    let (quiz, origin) = generate_quiz(&state, &req("JavaScript 基础", "medium", Some(3)))
      .await
      .unwrap();
    assert_eq!(origin, "seed");
    assert!(validate_quiz(&quiz).is_empty());
    assert_eq!(quiz.questions.len(), 3);
  }

  #[tokio::test]
  async fn invalid_requests_are_rejected_before_any_model_call() {
    let state = AppState::offline();
    let err = generate_quiz(&state, &req("历史", "medium", Some(11)))
      .await
      .unwrap_err();
    match err {
      ApiError::Validation { violations } => {
        assert!(violations.iter().any(|v| v.field == "numberOfQuestions"));
      }
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn offline_stream_is_one_complete_snapshot() {
    let state = AppState::offline();
    let parsed = schema::parse_request(&req("JavaScript 基础", "medium", Some(3))).unwrap();
    let stream = open_quiz_stream(&state, &parsed).await.unwrap();
    let snapshots: Vec<_> = stream.collect().await;
    assert_eq!(snapshots.len(), 1);
    let partial = snapshots.into_iter().next().unwrap().unwrap();
    assert_eq!(partial.available(), 3);
    assert!(schema::finalize(&partial).is_ok());
  }

  #[tokio::test]
  async fn evaluate_direct_scores_deterministically() {
    let state = AppState::offline();
    let quiz = crate::seeds::fixture_quiz();
    let input = EvaluateIn {
      quiz: QuizIn {
        title: quiz.title.clone(),
        questions: quiz
          .questions
          .iter()
          .map(|q| QuestionIn {
            id: q.id.clone(),
            question: q.question.clone(),
            options: q.options.clone(),
            correct_answer: q.correct_answer,
            explanation: q.explanation.clone(),
          })
          .collect(),
      },
      user_answers: vec![
        AnswerSubmission { question_id: "js-1".into(), selected_answer: 1 },
        AnswerSubmission { question_id: "js-2".into(), selected_answer: 0 },
        AnswerSubmission { question_id: "js-3".into(), selected_answer: 0 },
      ],
    };
    let first = evaluate_direct(&state, input.clone()).unwrap();
    let second = evaluate_direct(&state, input).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.correct_answers, 2);
    assert_eq!(first.percentage, 67);
  }

  #[tokio::test]
  async fn evaluate_direct_rejects_inconsistent_quizzes() {
    let state = AppState::offline();
    let input = EvaluateIn {
      quiz: QuizIn {
        title: "坏测试".into(),
        questions: vec![QuestionIn {
          id: "q1".into(),
          question: "?".into(),
          options: vec!["a".into(), "b".into()],
          correct_answer: 5,
          explanation: String::new(),
        }],
      },
      user_answers: vec![AnswerSubmission { question_id: "q1".into(), selected_answer: 0 }],
    };
    assert!(matches!(
      evaluate_direct(&state, input),
      Err(ApiError::Validation { .. })
    ));
  }

  #[tokio::test]
  async fn chat_requires_a_model() {
    let state = AppState::offline();
    let input = ChatIn {
      messages: vec![ChatMessageIn { role: "user".into(), content: "你好".into() }],
      model: None,
    };
    assert!(matches!(
      open_chat_stream(&state, &input).await,
      Err(ApiError::Generation(GenerationError::Disabled))
    ));
  }

  #[tokio::test]
  async fn quiz_chat_without_a_model_reports_one_error_and_closes() {
    let state = Arc::new(AppState::offline());
    let input = QuizChatIn {
      messages: vec![ChatMessageIn {
        role: "user".into(),
        content: "出一套 React 测试".into(),
      }],
    };
    let events: Vec<_> = quiz_chat_stream(state, input).collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ToolChatEvent::Error { .. }));
  }

  #[tokio::test]
  async fn answer_sheet_evaluation_matches_the_tier_copy() {
    let state = AppState::offline();
    let args = serde_json::json!({
      "quizTitle": "JavaScript 基础测试",
      "userAnswers": [
        { "questionText": "第一题", "userAnswer": "let", "correctAnswer": "let", "isCorrect": true },
        { "questionText": "第二题", "userAnswer": "var", "correctAnswer": "object", "isCorrect": false },
        { "questionText": "第三题", "userAnswer": "map", "correctAnswer": "map", "isCorrect": true },
      ],
    });
    let result = execute_evaluate_answers(&state, args);
    assert_eq!(result["type"], "quiz_evaluated");
    assert_eq!(result["result"]["totalQuestions"], 3);
    assert_eq!(result["result"]["correctAnswers"], 2);
    assert_eq!(result["result"]["percentage"], 67);
    assert_eq!(
      result["result"]["feedback"],
      "👍 不错的开始！建议重点复习基础概念，然后再尝试更多练习。"
    );
    assert_eq!(result["result"]["detailedAnalysis"][1]["status"], "❌ 错误");
    assert_eq!(result["result"]["detailedAnalysis"][0]["questionNumber"], 1);
  }

  #[tokio::test]
  async fn unknown_tools_fail_softly() {
    let state = AppState::offline();
    let result = execute_tool(&state, "deleteEverything", serde_json::Value::Null).await;
    assert_eq!(result["success"], false);
  }
}
