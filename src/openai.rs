//! Minimal OpenAI client for our use-cases.
//!
//! We call chat.completions (plain, JSON-object and streaming variants, plus
//! tool calls), audio transcription/speech, and image generation. Calls are
//! instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{instrument, debug, info, error};

use crate::config::Prompts;
use crate::domain::{GenerationRequest, PartialQuiz, Quiz};
use crate::error::GenerationError;
use crate::outline::ChapterOutline;
use crate::partialjson;
use crate::schema;
use crate::util::{fill_template, trunc_for_log};

/// Raw text deltas from a streaming chat completion.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Deduplicated object snapshots reassembled from a delta stream.
pub type SnapshotStream<T> = Pin<Box<dyn Stream<Item = Result<T, GenerationError>> + Send>>;

const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;
const MAX_SPEECH_CHARS: usize = 4096;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub transcribe_model: String,
  pub speech_model: String,
  pub image_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let transcribe_model =
      std::env::var("OPENAI_TRANSCRIBE_MODEL").unwrap_or_else(|_| "whisper-1".into());
    let speech_model =
      std::env::var("OPENAI_SPEECH_MODEL").unwrap_or_else(|_| "tts-1".into());
    let image_model =
      std::env::var("OPENAI_IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".into());

    // No blanket timeout: streaming responses stay open well past any fixed
    // total. Each non-streaming call sets its own budget.
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .ok()?;

    Some(Self {
      client,
      api_key,
      base_url,
      fast_model,
      strong_model,
      transcribe_model,
      speech_model,
      image_model,
    })
  }

  /// Model for plain chat: the caller may pick one, otherwise the fast default.
  pub fn resolve_model(&self, requested: Option<&str>) -> String {
    match requested {
      Some(m) if !m.trim().is_empty() => m.trim().to_string(),
      _ => self.fast_model.clone(),
    }
  }

  fn authed(&self, url: &str) -> reqwest::RequestBuilder {
    self.client.post(url)
      .header(USER_AGENT, "quizcraft-backend/0.1")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
    budget_secs: u64,
  ) -> Result<T, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![ChatMessageReq::system(system), ChatMessageReq::user(user)],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
      stream: None,
      tools: None,
    };

    let res = self.authed(&url)
      .timeout(Duration::from_secs(budget_secs))
      .header(CONTENT_TYPE, "application/json")
      .json(&req).send().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::from_status(status, msg, false));
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| {
      debug!(error = %e, body = %trunc_for_log(&text, 400), "Failed to parse model JSON");
      GenerationError::MalformedOutput(e.to_string())
    })
  }

  /// One chat round that may answer with text or ask for tool calls.
  #[instrument(level = "info", skip(self, messages, tools), fields(model = %model, messages = messages.len()))]
  pub async fn chat_once(
    &self,
    model: &str,
    messages: Vec<ChatMessageReq>,
    temperature: f32,
    tools: Option<Vec<serde_json::Value>>,
    budget_secs: u64,
  ) -> Result<ChatOutcome, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages,
      temperature,
      response_format: None,
      max_tokens: None,
      stream: None,
      tools,
    };

    let res = self.authed(&url)
      .timeout(Duration::from_secs(budget_secs))
      .header(CONTENT_TYPE, "application/json")
      .json(&req).send().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::from_status(status, msg, false));
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let message = body.choices.into_iter().next()
      .ok_or_else(|| GenerationError::MalformedOutput("response carried no choices".into()))?
      .message;

    if let Some(calls) = message.tool_calls {
      if !calls.is_empty() {
        let calls = calls.into_iter()
          .map(|c| ToolCallReq { id: c.id, name: c.function.name, arguments: c.function.arguments })
          .collect();
        return Ok(ChatOutcome::ToolCalls(calls));
      }
    }
    Ok(ChatOutcome::Text(message.content.unwrap_or_default().trim().to_string()))
  }

  /// Streaming chat completion: yields raw content deltas as they arrive.
  #[instrument(level = "info", skip(self, messages), fields(model = %model, messages = messages.len(), json_mode))]
  pub async fn chat_stream(
    &self,
    model: &str,
    messages: Vec<ChatMessageReq>,
    temperature: f32,
    json_mode: bool,
  ) -> Result<DeltaStream, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages,
      temperature,
      response_format: json_mode.then(|| ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
      stream: Some(true),
      tools: None,
    };

    let res = self.authed(&url)
      .header(CONTENT_TYPE, "application/json")
      .json(&req).send().await
      .map_err(|e| GenerationError::from_reqwest(e, 10))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::from_status(status, msg, false));
    }

    // Reassemble SSE lines from byte chunks. Only complete lines are parsed,
    // so a multi-byte char split across chunks stays buffered until whole.
    let state = (Box::pin(res.bytes_stream()), Vec::<u8>::new(), VecDeque::<String>::new(), false);
    let stream = futures::stream::try_unfold(state, |(mut body, mut buf, mut pending, mut done)| async move {
      loop {
        if let Some(delta) = pending.pop_front() {
          return Ok(Some((delta, (body, buf, pending, done))));
        }
        if done {
          return Ok(None);
        }
        match body.next().await {
          Some(Ok(chunk)) => {
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
              let line: Vec<u8> = buf.drain(..=pos).collect();
              let line = String::from_utf8_lossy(&line);
              match parse_stream_line(line.trim()) {
                Some(StreamEvent::Delta(text)) => pending.push_back(text),
                Some(StreamEvent::Done) => done = true,
                None => {}
              }
            }
          }
          Some(Err(e)) => return Err(GenerationError::from_reqwest(e, 10)),
          None => done = true,
        }
      }
    });
    Ok(Box::pin(stream))
  }

  // --- High-level helpers (domain-specialized) ---

  /// Generate a complete quiz in one shot.
  #[instrument(
    level = "info",
    skip(self, prompts, req),
    fields(topic = %req.topic, difficulty = %req.difficulty, count = req.number_of_questions, model = %self.strong_model)
  )]
  pub async fn generate_quiz(
    &self,
    prompts: &Prompts,
    req: &GenerationRequest,
    budget_secs: u64,
  ) -> Result<Quiz, GenerationError> {
    let user = quiz_prompt(prompts, req);
    let start = std::time::Instant::now();
    let result = self.chat_json::<Quiz>(&self.strong_model, &prompts.quiz_system, &user, 0.7, budget_secs).await;
    let elapsed = start.elapsed();

    match &result {
      Ok(_) => info!(?elapsed, "Model response received successfully"),
      Err(e) => error!(?elapsed, error = %e, "Model call failed during quiz generation"),
    }

    let quiz = result?;
    let violations = schema::validate_quiz(&quiz);
    if !violations.is_empty() {
      error!(?violations, "Model returned an out-of-contract quiz");
      let detail = violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; ");
      return Err(GenerationError::MalformedOutput(detail));
    }

    info!(
      title_preview = %quiz.title.chars().take(30).collect::<String>(),
      questions = quiz.questions.len(),
      "Quiz successfully generated"
    );
    Ok(quiz)
  }

  /// Streaming quiz generation: snapshots of the growing quiz object.
  #[instrument(level = "info", skip(self, prompts, req), fields(topic = %req.topic, model = %self.strong_model))]
  pub async fn stream_quiz(
    &self,
    prompts: &Prompts,
    req: &GenerationRequest,
  ) -> Result<SnapshotStream<PartialQuiz>, GenerationError> {
    let user = format!("{}\n\n{}", quiz_prompt(prompts, req), prompts.quiz_stream_hint);
    let deltas = self.chat_stream(
      &self.strong_model,
      vec![ChatMessageReq::system(&prompts.quiz_system), ChatMessageReq::user(user)],
      0.7,
      true,
    ).await?;
    Ok(snapshot_stream::<PartialQuiz>(deltas))
  }

  /// Streaming chapter-outline generation.
  #[instrument(level = "info", skip(self, prompts, prompt), fields(prompt_len = prompt.len(), model = %self.fast_model))]
  pub async fn stream_outline(
    &self,
    prompts: &Prompts,
    prompt: &str,
  ) -> Result<SnapshotStream<ChapterOutline>, GenerationError> {
    let deltas = self.chat_stream(
      &self.fast_model,
      vec![ChatMessageReq::system(&prompts.outline_system), ChatMessageReq::user(prompt)],
      0.7,
      true,
    ).await?;
    Ok(snapshot_stream::<ChapterOutline>(deltas))
  }

  /// Speech-to-text via the audio transcription endpoint.
  #[instrument(level = "info", skip(self, audio), fields(bytes = audio.len(), mime = %mime, model = %self.transcribe_model))]
  pub async fn transcribe(
    &self,
    audio: Vec<u8>,
    filename: &str,
    mime: &str,
    budget_secs: u64,
  ) -> Result<Transcription, GenerationError> {
    if audio.len() > MAX_AUDIO_BYTES {
      return Err(GenerationError::ContentTooLong(format!(
        "audio is {} bytes, limit is {}", audio.len(), MAX_AUDIO_BYTES
      )));
    }
    let url = format!("{}/audio/transcriptions", self.base_url);
    let part = reqwest::multipart::Part::bytes(audio)
      .file_name(filename.to_string())
      .mime_str(mime)
      .map_err(|_| GenerationError::UnsupportedFormat(mime.to_string()))?;
    let form = reqwest::multipart::Form::new()
      .text("model", self.transcribe_model.clone())
      .text("response_format", "verbose_json")
      .part("file", part);

    let res = self.authed(&url)
      .timeout(Duration::from_secs(budget_secs))
      .multipart(form)
      .send().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::from_status(status, msg, true));
    }

    let out: Transcription = res.json().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;
    info!(text_len = out.text.len(), duration = ?out.duration, "Transcription received");
    Ok(out)
  }

  /// Text-to-speech; returns the raw audio bytes and their media type.
  #[instrument(level = "info", skip(self, text), fields(text_len = text.len(), voice = %voice, model = %self.speech_model))]
  pub async fn speech(
    &self,
    text: &str,
    voice: &str,
    budget_secs: u64,
  ) -> Result<SpeechAudio, GenerationError> {
    if text.chars().count() > MAX_SPEECH_CHARS {
      return Err(GenerationError::ContentTooLong(format!(
        "text is {} chars, limit is {}", text.chars().count(), MAX_SPEECH_CHARS
      )));
    }
    let url = format!("{}/audio/speech", self.base_url);
    let req = serde_json::json!({
      "model": self.speech_model,
      "input": text,
      "voice": voice,
    });

    let res = self.authed(&url)
      .timeout(Duration::from_secs(budget_secs))
      .header(CONTENT_TYPE, "application/json")
      .json(&req).send().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::from_status(status, msg, true));
    }

    let media_type = res.headers().get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or("audio/mpeg")
      .to_string();
    let bytes = res.bytes().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?
      .to_vec();
    info!(bytes = bytes.len(), media_type = %media_type, "Speech audio received");
    Ok(SpeechAudio { bytes, media_type })
  }

  /// Image generation; returns the base64-encoded image payload.
  #[instrument(level = "info", skip(self, prompt), fields(prompt_len = prompt.len(), size = %size, model = %self.image_model))]
  pub async fn generate_image(
    &self,
    prompt: &str,
    size: &str,
    budget_secs: u64,
  ) -> Result<String, GenerationError> {
    let url = format!("{}/images/generations", self.base_url);
    let req = serde_json::json!({
      "model": self.image_model,
      "prompt": prompt,
      "size": size,
      "n": 1,
      "response_format": "b64_json",
    });

    let res = self.authed(&url)
      .timeout(Duration::from_secs(budget_secs))
      .header(CONTENT_TYPE, "application/json")
      .json(&req).send().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(GenerationError::from_status(status, msg, true));
    }

    #[derive(Deserialize)]
    struct ImagesResponse { data: Vec<ImageDatum> }
    #[derive(Deserialize)]
    struct ImageDatum { #[serde(default)] b64_json: Option<String> }

    let body: ImagesResponse = res.json().await
      .map_err(|e| GenerationError::from_reqwest(e, budget_secs))?;
    body.data.into_iter().next()
      .and_then(|d| d.b64_json)
      .ok_or_else(|| GenerationError::MalformedOutput("response carried no image payload".into()))
  }
}

/// User prompt for quiz generation, shared by batch and streaming paths.
pub fn quiz_prompt(prompts: &Prompts, req: &GenerationRequest) -> String {
  let count = req.number_of_questions.to_string();
  fill_template(&prompts.quiz_user_template, &[
    ("topic", req.topic.as_str()),
    ("difficulty", req.difficulty.as_str()),
    ("count", count.as_str()),
    ("language", req.language.as_str()),
  ])
}

/// Turn raw deltas into parsed snapshots, dropping consecutive duplicates.
pub fn snapshot_stream<T>(deltas: DeltaStream) -> SnapshotStream<T>
where
  T: DeserializeOwned + PartialEq + Clone + Send + 'static,
{
  let stream = futures::stream::try_unfold(
    (deltas, String::new(), None::<T>),
    |(mut deltas, mut acc, mut last)| async move {
      while let Some(delta) = deltas.next().await {
        acc.push_str(&delta?);
        if let Some(snapshot) = partialjson::parse_partial::<T>(&acc) {
          if last.as_ref() != Some(&snapshot) {
            last = Some(snapshot.clone());
            return Ok(Some((snapshot, (deltas, acc, last))));
          }
        }
      }
      Ok(None)
    },
  );
  Box::pin(stream)
}

/// Tool definitions for the quiz-chat agent, in chat.completions format.
pub fn quiz_tool_defs() -> Vec<serde_json::Value> {
  vec![
    serde_json::json!({
      "type": "function",
      "function": {
        "name": "generateQuiz",
        "description": "根据用户需求生成个性化的知识测试题目",
        "parameters": {
          "type": "object",
          "properties": {
            "topic": { "type": "string", "description": "测试主题，如 JavaScript、React、历史等" },
            "difficulty": { "type": "string", "enum": ["easy", "medium", "hard"], "description": "难度级别" },
            "numberOfQuestions": { "type": "number", "minimum": 1, "maximum": 10, "description": "题目数量" },
            "language": { "type": "string", "description": "语言设置" }
          },
          "required": ["topic", "difficulty", "numberOfQuestions"]
        }
      }
    }),
    serde_json::json!({
      "type": "function",
      "function": {
        "name": "evaluateAnswers",
        "description": "评估用户的答题结果并提供详细反馈",
        "parameters": {
          "type": "object",
          "properties": {
            "quizTitle": { "type": "string", "description": "测试标题" },
            "userAnswers": {
              "type": "array",
              "description": "用户答题情况",
              "items": {
                "type": "object",
                "properties": {
                  "questionText": { "type": "string", "description": "题目内容" },
                  "userAnswer": { "type": "string", "description": "用户的答案" },
                  "correctAnswer": { "type": "string", "description": "正确答案" },
                  "isCorrect": { "type": "boolean", "description": "是否回答正确" }
                },
                "required": ["questionText", "userAnswer", "correctAnswer", "isCorrect"]
              }
            }
          },
          "required": ["quizTitle", "userAnswers"]
        }
      }
    }),
  ]
}

/// Outcome of a single chat round.
pub enum ChatOutcome {
  Text(String),
  ToolCalls(Vec<ToolCallReq>),
}

/// A tool invocation requested by the model. `arguments` is raw JSON text.
#[derive(Clone, Debug)]
pub struct ToolCallReq {
  pub id: String,
  pub name: String,
  pub arguments: String,
}

/// Transcription result, `verbose_json` shape.
#[derive(Debug, Deserialize)]
pub struct Transcription {
  pub text: String,
  #[serde(default)]
  pub duration: Option<f64>,
  #[serde(default)]
  pub language: Option<String>,
}

pub struct SpeechAudio {
  pub bytes: Vec<u8>,
  pub media_type: String,
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  stream: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tools: Option<Vec<serde_json::Value>>,
}

#[derive(Clone, Serialize)]
pub struct ChatMessageReq {
  role: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tool_calls: Option<Vec<ToolCallEcho>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tool_call_id: Option<String>,
}

impl ChatMessageReq {
  fn plain(role: &str, content: impl Into<String>) -> Self {
    Self { role: role.into(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
  }

  pub fn system(content: impl Into<String>) -> Self {
    Self::plain("system", content)
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self::plain("user", content)
  }

  /// History entry from the client; unknown roles are forwarded as-is.
  pub fn from_role(role: &str, content: &str) -> Self {
    Self::plain(role, content)
  }

  /// Assistant turn that requested tool calls, echoed back verbatim so the
  /// follow-up round has the full exchange.
  pub fn assistant_tool_calls(calls: &[ToolCallReq]) -> Self {
    Self {
      role: "assistant".into(),
      content: None,
      tool_calls: Some(
        calls.iter()
          .map(|c| ToolCallEcho {
            id: c.id.clone(),
            kind: "function".into(),
            function: FunctionEcho { name: c.name.clone(), arguments: c.arguments.clone() },
          })
          .collect(),
      ),
      tool_call_id: None,
    }
  }

  pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      role: "tool".into(),
      content: Some(content.into()),
      tool_calls: None,
      tool_call_id: Some(tool_call_id.into()),
    }
  }
}

#[derive(Clone, Serialize)]
struct ToolCallEcho {
  id: String,
  #[serde(rename = "type")]
  kind: String,
  function: FunctionEcho,
}

#[derive(Clone, Serialize)]
struct FunctionEcho {
  name: String,
  arguments: String,
}

#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
  #[serde(default)]
  tool_calls: Option<Vec<ToolCallResp>>,
}
#[derive(Deserialize)]
struct ToolCallResp { id: String, function: FunctionResp }
#[derive(Deserialize)]
struct FunctionResp { name: String, arguments: String }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

// --- Streaming chunk DTOs ---

enum StreamEvent {
  Delta(String),
  Done,
}

#[derive(Deserialize)]
struct ChatCompletionChunk { choices: Vec<ChunkChoice> }
#[derive(Deserialize)]
struct ChunkChoice { delta: ChunkDelta }
#[derive(Deserialize)]
struct ChunkDelta { #[serde(default)] content: Option<String> }

/// Parse one SSE line from a streaming completion. Non-data lines, keepalive
/// comments and empty deltas all come back as None.
fn parse_stream_line(line: &str) -> Option<StreamEvent> {
  let data = line.strip_prefix("data:")?.trim();
  if data.is_empty() {
    return None;
  }
  if data == "[DONE]" {
    return Some(StreamEvent::Done);
  }
  let chunk: ChatCompletionChunk = serde_json::from_str(data).ok()?;
  let delta = chunk.choices.into_iter().next()?.delta.content?;
  if delta.is_empty() { None } else { Some(StreamEvent::Delta(delta)) }
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stream_lines_parse_deltas_and_done() {
    let line = r#"data: {"choices":[{"delta":{"content":"标题"}}]}"#;
    match parse_stream_line(line) {
      Some(StreamEvent::Delta(text)) => assert_eq!(text, "标题"),
      _ => panic!("expected a delta"),
    }
    assert!(matches!(parse_stream_line("data: [DONE]"), Some(StreamEvent::Done)));
    // role-only chunk carries no content
    assert!(parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
    assert!(parse_stream_line(": keepalive").is_none());
    assert!(parse_stream_line("").is_none());
  }

  #[test]
  fn tool_defs_match_the_advertised_names() {
    let defs = quiz_tool_defs();
    let names: Vec<_> = defs.iter()
      .filter_map(|d| d["function"]["name"].as_str())
      .collect();
    assert_eq!(names, vec!["generateQuiz", "evaluateAnswers"]);
  }

  #[test]
  fn tool_messages_serialize_in_wire_shape() {
    let calls = vec![ToolCallReq {
      id: "call_1".into(),
      name: "generateQuiz".into(),
      arguments: r#"{"topic":"js"}"#.into(),
    }];
    let assistant = serde_json::to_value(ChatMessageReq::assistant_tool_calls(&calls)).expect("serialize");
    assert_eq!(assistant["role"], "assistant");
    assert!(assistant.get("content").is_none());
    assert_eq!(assistant["tool_calls"][0]["type"], "function");
    assert_eq!(assistant["tool_calls"][0]["function"]["name"], "generateQuiz");

    let tool = serde_json::to_value(ChatMessageReq::tool_result("call_1", "{}")).expect("serialize");
    assert_eq!(tool["role"], "tool");
    assert_eq!(tool["tool_call_id"], "call_1");
  }

  #[tokio::test]
  async fn snapshot_stream_dedupes_and_parses_growing_json() {
    let deltas: Vec<Result<String, GenerationError>> = vec![
      Ok(r#"{"title":"测"#.into()),
      Ok(r#"试""#.into()),
      Ok(r#", "questions":["#.into()),
      Ok(r#"{"id":"q1"}"#.into()),
      Ok(r#"]}"#.into()),
    ];
    let deltas: DeltaStream = Box::pin(futures::stream::iter(deltas));
    let snapshots: Vec<_> = snapshot_stream::<PartialQuiz>(deltas)
      .collect::<Vec<_>>().await
      .into_iter()
      .collect::<Result<Vec<_>, _>>()
      .expect("snapshots");

    assert!(!snapshots.is_empty());
    for pair in snapshots.windows(2) {
      assert_ne!(pair[0], pair[1], "consecutive snapshots must differ");
      assert!(pair[0].available() <= pair[1].available());
    }
    let last = snapshots.last().expect("at least one snapshot");
    assert_eq!(last.title.as_deref(), Some("测试"));
    assert_eq!(last.available(), 1);
  }
}
