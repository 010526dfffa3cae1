//! Loading app configuration (prompts + policy + feedback tiers) from TOML.
//!
//! Everything has a built-in default, so the file is only needed to override
//! prompt wording, pacing policy, or the feedback tiers.

use serde::Deserialize;
use tracing::{info, error};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub prompts: Prompts,
  pub policy: Policy,
  pub feedback_tiers: Vec<FeedbackTier>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      prompts: Prompts::default(),
      policy: Policy::default(),
      feedback_tiers: default_feedback_tiers(),
    }
  }
}

/// Prompts used by the OpenAI client. `{placeholders}` are filled via
/// `util::fill_template`. Defaults target Chinese-language quizzes; override
/// in TOML to tune tone or structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Quiz generation
  pub quiz_system: String,
  pub quiz_user_template: String,
  /// Appended on the streaming path so fields arrive in display order.
  pub quiz_stream_hint: String,
  // Chat
  pub chat_system: String,
  pub quiz_chat_system: String,
  // Chapter outlines
  pub outline_system: String,
  pub outline_default_prompt: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      quiz_system: "You are a quiz generator. Respond ONLY with one strict JSON object shaped as {\"title\": string, \"description\": string, \"questions\": [{\"id\": string, \"question\": string, \"options\": [string], \"correctAnswer\": number, \"explanation\": string}], \"totalQuestions\": number, \"estimatedTime\": string}. correctAnswer is a 0-based index into options. Emit fields in the listed order so partial output stays parseable. No markdown fences, no commentary.".into(),
      quiz_user_template: "请为以下主题生成一个知识测试：\n\n主题：{topic}\n难度：{difficulty}\n题目数量：{count}\n语言：{language}\n\n要求：\n1. 题目应该有清晰的问题表述\n2. 每个题目提供2-4个选项\n3. 必须有正确答案的索引（从0开始）\n4. 每个题目都要有详细的解释说明为什么这个答案是正确的\n5. 整个测试要有标题和描述\n6. 估算完成时间\n\n请确保题目具有教育价值且符合指定难度级别。".into(),
      quiz_stream_hint: "请按照以下顺序逐步生成：\n1. 首先生成测试的标题和描述\n2. 然后逐个生成每个题目\n3. 最后补充总题数和预估时间\n\n这样可以让用户看到实时的生成过程。".into(),
      chat_system: "You are a helpful assistant.".into(),
      quiz_chat_system: "你是一个专业的知识问答助手。你的任务是：\n\n1. **理解用户需求**：当用户描述想要测试的知识领域时，分析其需求\n2. **生成测试题目**：使用 generateQuiz 工具创建个性化测试\n3. **指导答题**：清晰地展示题目，引导用户回答\n4. **评估结果**：使用 evaluateAnswers 工具分析答题情况并提供反馈\n\n交互要求：\n- 使用友好、鼓励的语气\n- 提供清晰的指导和反馈\n- 根据用户表现给出建设性建议\n- 支持中文交流\n\n示例对话流程：\n用户：\"我想测试 JavaScript 基础知识\"\n助手：使用工具生成测试 → 展示题目 → 收集答案 → 评估并反馈".into(),
      outline_system: "You are an expert educator. Generate a well-structured chapter outline for the given topic. Each chapter should build upon the previous one with clear progression. Focus on practical, hands-on learning. Respond ONLY with one strict JSON object shaped as {\"topic\": string, \"totalChapters\": number, \"chapters\": [{\"chapterNumber\": number, \"title\": string, \"description\": string, \"topics\": [string], \"estimatedTime\": string}]}. No markdown fences.".into(),
      outline_default_prompt: "Create 5-7 chapters for learning TypeScript".into(),
    }
  }
}

/// Runtime knobs that are policy rather than wiring.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Policy {
  /// Pause between question reveals on the WebSocket path (milliseconds).
  pub reveal_interval_ms: u64,
  pub request_timeout_secs: u64,
  /// Transcription, speech and image calls get a longer budget.
  pub media_timeout_secs: u64,
  pub max_tool_steps: u32,
  pub speech_voice: String,
  pub image_size: String,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      reveal_interval_ms: 500,
      request_timeout_secs: 30,
      media_timeout_secs: 60,
      max_tool_steps: 5,
      speech_voice: "alloy".into(),
      image_size: "1024x1024".into(),
    }
  }
}

/// One feedback band: applies to any percentage at or above `min_percentage`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FeedbackTier {
  pub min_percentage: u8,
  pub message: String,
}

pub fn default_feedback_tiers() -> Vec<FeedbackTier> {
  vec![
    FeedbackTier {
      min_percentage: 90,
      message: "🏆 优秀！您对这个主题掌握得非常好，建议继续深入学习更高级的内容。".into(),
    },
    FeedbackTier {
      min_percentage: 80,
      message: "🎉 很好！您已经掌握了大部分知识点，可以针对错误的部分进行复习。".into(),
    },
    FeedbackTier {
      min_percentage: 60,
      message: "👍 不错的开始！建议重点复习基础概念，然后再尝试更多练习。".into(),
    },
    FeedbackTier {
      min_percentage: 0,
      message: "💪 继续努力！建议从基础开始系统性地学习这个主题。".into(),
    },
  ]
}

/// Attempt to load `AppConfig` from QUIZ_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizcraft_backend", %path, "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizcraft_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizcraft_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
