//! Declarative validation for generation requests and quiz payloads.
//!
//! One pass over the input produces a list of `Violation`s naming the field
//! and the constraint it broke. Handlers reject with the full list before any
//! model call is made; model output goes through the same checks before being
//! surfaced to a caller.

use serde::Serialize;

use crate::domain::{Difficulty, GenerationRequest, PartialQuiz, Question, Quiz};
use crate::protocol::GenerateIn;

pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 10;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 4;

pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// A single broken constraint, e.g. `{ field: "numberOfQuestions",
/// constraint: "must be between 1 and 10" }`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Violation {
  pub field: String,
  pub constraint: String,
}

impl Violation {
  pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
    Self { field: field.into(), constraint: constraint.into() }
  }
}

impl std::fmt::Display for Violation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.field, self.constraint)
  }
}

/// Turn an untyped generation request into a strongly-typed one, or report
/// every violated constraint. No side effects.
pub fn parse_request(body: &GenerateIn) -> Result<GenerationRequest, Vec<Violation>> {
  let mut violations = Vec::new();

  let topic = body.topic.trim().to_string();
  if topic.is_empty() {
    violations.push(Violation::new("topic", "must not be empty"));
  }

  let difficulty = match Difficulty::parse(&body.difficulty) {
    Some(d) => d,
    None => {
      violations.push(Violation::new("difficulty", "must be one of easy, medium, hard"));
      Difficulty::Medium
    }
  };

  let number_of_questions = match body.number_of_questions {
    None => {
      violations.push(Violation::new("numberOfQuestions", "is required"));
      0
    }
    Some(n) if n < MIN_QUESTIONS as i64 || n > MAX_QUESTIONS as i64 => {
      violations.push(Violation::new("numberOfQuestions", "must be between 1 and 10"));
      0
    }
    Some(n) => n as u8,
  };

  let language = body
    .language
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .unwrap_or(DEFAULT_LANGUAGE)
    .to_string();

  if violations.is_empty() {
    Ok(GenerationRequest { topic, difficulty, number_of_questions, language })
  } else {
    Err(violations)
  }
}

/// Structural checks shared by every surface that accepts a question list
/// (generated quizzes and the stateless evaluate endpoint).
pub fn validate_questions(questions: &[Question]) -> Vec<Violation> {
  let mut violations = Vec::new();

  if questions.len() < MIN_QUESTIONS || questions.len() > MAX_QUESTIONS {
    violations.push(Violation::new("questions", "must contain between 1 and 10 questions"));
  }

  let mut seen_ids = std::collections::HashSet::new();
  for (i, q) in questions.iter().enumerate() {
    let at = |name: &str| format!("questions[{}].{}", i, name);

    if q.id.trim().is_empty() {
      violations.push(Violation::new(at("id"), "must not be empty"));
    } else if !seen_ids.insert(q.id.as_str()) {
      violations.push(Violation::new(at("id"), "must be unique within the quiz"));
    }
    if q.question.trim().is_empty() {
      violations.push(Violation::new(at("question"), "must not be empty"));
    }
    if q.options.len() < MIN_OPTIONS || q.options.len() > MAX_OPTIONS {
      violations.push(Violation::new(at("options"), "must contain between 2 and 4 options"));
    }
    if q.correct_answer >= q.options.len() {
      violations.push(Violation::new(at("correctAnswer"), "must index into options"));
    }
  }

  violations
}

/// Full-quiz invariants, applied to inbound quizzes and to model output
/// before it is surfaced.
pub fn validate_quiz(quiz: &Quiz) -> Vec<Violation> {
  let mut violations = Vec::new();

  if quiz.title.trim().is_empty() {
    violations.push(Violation::new("title", "must not be empty"));
  }
  violations.extend(validate_questions(&quiz.questions));
  if quiz.total_questions as usize != quiz.questions.len() {
    violations.push(Violation::new("totalQuestions", "must equal the number of questions"));
  }

  violations
}

/// Promote the terminal snapshot of a stream to a complete `Quiz`, or report
/// what is still missing. `total_questions` is filled in when the stream
/// never produced it; a present-but-wrong value is a violation.
pub fn finalize(partial: &PartialQuiz) -> Result<Quiz, Vec<Violation>> {
  let mut violations = Vec::new();

  let title = match &partial.title {
    Some(t) if !t.trim().is_empty() => t.clone(),
    _ => {
      violations.push(Violation::new("title", "is required"));
      String::new()
    }
  };

  let mut questions = Vec::new();
  match &partial.questions {
    None => violations.push(Violation::new("questions", "is required")),
    Some(list) => {
      for (i, pq) in list.iter().enumerate() {
        let at = |name: &str| format!("questions[{}].{}", i, name);
        let id = pq.id.clone().unwrap_or_else(|| {
          violations.push(Violation::new(at("id"), "is required"));
          String::new()
        });
        let question = pq.question.clone().unwrap_or_else(|| {
          violations.push(Violation::new(at("question"), "is required"));
          String::new()
        });
        let options = pq.options.clone().unwrap_or_else(|| {
          violations.push(Violation::new(at("options"), "is required"));
          Vec::new()
        });
        let correct_answer = match pq.correct_answer {
          Some(c) => c,
          None => {
            violations.push(Violation::new(at("correctAnswer"), "is required"));
            0
          }
        };
        let explanation = pq.explanation.clone().unwrap_or_else(|| {
          violations.push(Violation::new(at("explanation"), "is required"));
          String::new()
        });
        questions.push(Question { id, question, options, correct_answer, explanation });
      }
    }
  }

  let quiz = Quiz {
    title,
    description: partial.description.clone().unwrap_or_default(),
    total_questions: partial.total_questions.unwrap_or(questions.len() as u32),
    estimated_time: partial.estimated_time.clone().unwrap_or_default(),
    questions,
  };

  if violations.is_empty() {
    violations = validate_quiz(&quiz);
  }
  if violations.is_empty() {
    Ok(quiz)
  } else {
    Err(violations)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::PartialQuestion;

  fn generate_in(topic: &str, difficulty: &str, n: Option<i64>) -> GenerateIn {
    GenerateIn {
      topic: topic.into(),
      difficulty: difficulty.into(),
      number_of_questions: n,
      language: None,
    }
  }

  fn question(id: &str, correct: usize, options: usize) -> Question {
    Question {
      id: id.into(),
      question: format!("What is {id}?"),
      options: (0..options).map(|i| format!("option {i}")).collect(),
      correct_answer: correct,
      explanation: "because".into(),
    }
  }

  #[test]
  fn request_bounds_are_enforced() {
    assert!(parse_request(&generate_in("JavaScript", "medium", Some(3))).is_ok());

    let err = parse_request(&generate_in("  ", "medium", Some(3))).unwrap_err();
    assert!(err.iter().any(|v| v.field == "topic"));

    let err = parse_request(&generate_in("JS", "brutal", Some(3))).unwrap_err();
    assert!(err.iter().any(|v| v.field == "difficulty"));

    for n in [0, 11, -1] {
      let err = parse_request(&generate_in("JS", "easy", Some(n))).unwrap_err();
      assert!(err.iter().any(|v| v.field == "numberOfQuestions"), "n={n}");
    }

    let err = parse_request(&generate_in("JS", "easy", None)).unwrap_err();
    assert!(err.iter().any(|v| v.field == "numberOfQuestions"));
  }

  #[test]
  fn language_defaults_when_absent() {
    let req = parse_request(&generate_in("JS", "hard", Some(5))).unwrap();
    assert_eq!(req.language, DEFAULT_LANGUAGE);

    let mut body = generate_in("JS", "hard", Some(5));
    body.language = Some("en-US".into());
    assert_eq!(parse_request(&body).unwrap().language, "en-US");
  }

  #[test]
  fn question_invariants_are_checked() {
    // correctAnswer out of range
    let v = validate_questions(&[question("q1", 4, 4)]);
    assert!(v.iter().any(|v| v.field == "questions[0].correctAnswer"));

    // too few / too many options
    let v = validate_questions(&[question("q1", 0, 1)]);
    assert!(v.iter().any(|v| v.field == "questions[0].options"));
    let v = validate_questions(&[question("q1", 0, 5)]);
    assert!(v.iter().any(|v| v.field == "questions[0].options"));

    // duplicate ids
    let v = validate_questions(&[question("q1", 0, 3), question("q1", 1, 3)]);
    assert!(v.iter().any(|v| v.field == "questions[1].id"));

    // in-range everything
    assert!(validate_questions(&[question("q1", 2, 3), question("q2", 0, 2)]).is_empty());
  }

  #[test]
  fn quiz_totals_must_match_once_complete() {
    let quiz = Quiz {
      title: "T".into(),
      description: String::new(),
      questions: vec![question("q1", 0, 2)],
      total_questions: 3,
      estimated_time: "5 分钟".into(),
    };
    let v = validate_quiz(&quiz);
    assert!(v.iter().any(|v| v.field == "totalQuestions"));
  }

  #[test]
  fn finalize_fills_totals_and_rejects_missing_fields() {
    let partial = PartialQuiz {
      title: Some("JS 测试".into()),
      description: Some("基础".into()),
      questions: Some(vec![PartialQuestion {
        id: Some("q1".into()),
        question: Some("1+1?".into()),
        options: Some(vec!["1".into(), "2".into()]),
        correct_answer: Some(1),
        explanation: Some("算术".into()),
      }]),
      total_questions: None,
      estimated_time: None,
    };
    let quiz = finalize(&partial).unwrap();
    assert_eq!(quiz.total_questions, 1);

    let missing_title = PartialQuiz { title: None, ..partial.clone() };
    let err = finalize(&missing_title).unwrap_err();
    assert!(err.iter().any(|v| v.field == "title"));

    let err = finalize(&PartialQuiz::default()).unwrap_err();
    assert!(err.iter().any(|v| v.field == "title"));
    assert!(err.iter().any(|v| v.field == "questions"));
  }
}
