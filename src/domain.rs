//! Domain models used by the backend: quizzes, in-flight partial quizzes,
//! answers, and evaluation results. Wire naming is camelCase throughout.

use serde::{Deserialize, Serialize};

/// How hard the generated questions should be.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "easy" => Some(Difficulty::Easy),
      "medium" => Some(Difficulty::Medium),
      "hard" => Some(Difficulty::Hard),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Validated request for quiz generation. Produced by the schema layer only;
/// handlers never build one from raw input directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
  pub topic: String,
  pub difficulty: Difficulty,
  pub number_of_questions: u8,
  pub language: String,
}

/// One multiple-choice question. `correct_answer` indexes into `options`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer: usize,
  pub explanation: String,
}

/// A complete quiz. Once generation finishes, `total_questions` equals
/// `questions.len()`; during streaming the two may transiently disagree.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
  pub title: String,
  pub description: String,
  pub questions: Vec<Question>,
  pub total_questions: u32,
  pub estimated_time: String,
}

/// Question as it appears mid-stream: any field may still be missing.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialQuestion {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub question: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub correct_answer: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub explanation: Option<String>,
}

/// In-progress snapshot of a quiz under generation. Each snapshot received
/// from the stream replaces the previous one wholesale (last write wins);
/// snapshots are never merged.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialQuiz {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub questions: Option<Vec<PartialQuestion>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub total_questions: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub estimated_time: Option<String>,
}

impl PartialQuiz {
  /// Questions currently present in this snapshot.
  pub fn available(&self) -> usize {
    self.questions.as_ref().map(|q| q.len()).unwrap_or(0)
  }
}

impl From<Quiz> for PartialQuiz {
  fn from(quiz: Quiz) -> Self {
    PartialQuiz {
      title: Some(quiz.title),
      description: Some(quiz.description),
      questions: Some(
        quiz.questions
          .into_iter()
          .map(|q| PartialQuestion {
            id: Some(q.id),
            question: Some(q.question),
            options: Some(q.options),
            correct_answer: Some(q.correct_answer),
            explanation: Some(q.explanation),
          })
          .collect(),
      ),
      total_questions: Some(quiz.total_questions),
      estimated_time: Some(quiz.estimated_time),
    }
  }
}

/// Answer as submitted over the wire. Correctness is never accepted from the
/// client; the evaluator re-derives it from the quiz.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
  pub question_id: String,
  pub selected_answer: usize,
}

/// Recorded answer with derived correctness. At most one per question id
/// within a quiz-taking session; discarded when the session restarts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAnswer {
  pub question_id: String,
  pub selected_answer: usize,
  pub is_correct: bool,
}

/// Final evaluation of a completed quiz. Computed once, never mutated;
/// `score` is the exact 0-100 value, `percentage` the round-half-up integer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
  pub total_questions: u32,
  pub correct_answers: u32,
  pub score: f32,
  pub percentage: u8,
  pub feedback: String,
  pub answers: Vec<UserAnswer>,
}
