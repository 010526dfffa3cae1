//! A quiz session: one generated quiz plus the answers collected so far.
//!
//! Answers are write-once per question. Correctness is derived at record
//! time from the quiz itself, never trusted from the client.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{AnswerSubmission, Quiz, QuizResult, UserAnswer};
use crate::error::ApiError;
use crate::schema::Violation;

#[derive(Debug)]
pub struct QuizSession {
  pub id: Uuid,
  pub quiz: Quiz,
  slots: Vec<Option<UserAnswer>>,
  index_by_id: HashMap<String, usize>,
}

/// Progress report returned after each recorded answer. `result` is filled
/// only once the final answer lands.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerProgress {
  pub question_id: String,
  pub answered: u32,
  pub total: u32,
  pub complete: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<QuizResult>,
}

impl QuizSession {
  pub fn new(quiz: Quiz) -> Self {
    let index_by_id = quiz
      .questions
      .iter()
      .enumerate()
      .map(|(i, q)| (q.id.clone(), i))
      .collect();
    let slots = vec![None; quiz.questions.len()];
    Self { id: Uuid::new_v4(), quiz, slots, index_by_id }
  }

  /// Record one answer. Rejects unknown question ids, out-of-range option
  /// indexes and re-answers; an error leaves the session untouched.
  pub fn record_answer(&mut self, question_id: &str, selected_answer: usize) -> Result<UserAnswer, ApiError> {
    let index = *self
      .index_by_id
      .get(question_id)
      .ok_or_else(|| ApiError::UnknownQuestion(question_id.to_string()))?;
    let question = &self.quiz.questions[index];
    if selected_answer >= question.options.len() {
      return Err(ApiError::Validation {
        violations: vec![Violation::new(
          "selectedAnswer",
          format!("must be less than {}", question.options.len()),
        )],
      });
    }
    if self.slots[index].is_some() {
      return Err(ApiError::AlreadyAnswered { question_id: question_id.to_string() });
    }
    let answer = UserAnswer {
      question_id: question_id.to_string(),
      selected_answer,
      is_correct: selected_answer == question.correct_answer,
    };
    self.slots[index] = Some(answer.clone());
    Ok(answer)
  }

  /// Index of the first unanswered question, None once everything is in.
  pub fn current_index(&self) -> Option<usize> {
    self.slots.iter().position(Option::is_none)
  }

  pub fn answered_count(&self) -> u32 {
    self.slots.iter().flatten().count() as u32
  }

  pub fn total_questions(&self) -> u32 {
    self.slots.len() as u32
  }

  pub fn is_complete(&self) -> bool {
    self.slots.iter().all(Option::is_some)
  }

  /// Collected answers in quiz order, ready for evaluation.
  pub fn submissions(&self) -> Vec<AnswerSubmission> {
    self
      .slots
      .iter()
      .flatten()
      .map(|a| AnswerSubmission {
        question_id: a.question_id.clone(),
        selected_answer: a.selected_answer,
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds;

  fn session() -> QuizSession {
    QuizSession::new(seeds::fixture_quiz())
  }

  #[test]
  fn answers_are_write_once() {
    let mut s = session();
    let first = s.record_answer("js-1", 1).expect("first answer");
    assert!(first.is_correct);

    let err = s.record_answer("js-1", 0).expect_err("second answer must fail");
    assert!(matches!(err, ApiError::AlreadyAnswered { ref question_id } if question_id == "js-1"));

    // first answer survives the rejected overwrite
    let subs = s.submissions();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].selected_answer, 1);
  }

  #[test]
  fn unknown_question_is_rejected() {
    let mut s = session();
    let err = s.record_answer("nope", 0).expect_err("unknown id");
    assert!(matches!(err, ApiError::UnknownQuestion(ref id) if id == "nope"));
    assert_eq!(s.answered_count(), 0);
  }

  #[test]
  fn out_of_range_selection_is_rejected() {
    let mut s = session();
    let err = s.record_answer("js-1", 9).expect_err("index past options");
    assert!(matches!(err, ApiError::Validation { .. }));
    // slot stays open for a corrected submission
    assert!(s.record_answer("js-1", 2).is_ok());
  }

  #[test]
  fn current_index_tracks_first_unanswered() {
    let mut s = session();
    assert_eq!(s.current_index(), Some(0));
    s.record_answer("js-1", 0).expect("answer 1");
    assert_eq!(s.current_index(), Some(1));
    // answering out of order skips back to the gap
    s.record_answer("js-3", 0).expect("answer 3");
    assert_eq!(s.current_index(), Some(1));
    s.record_answer("js-2", 0).expect("answer 2");
    assert_eq!(s.current_index(), None);
    assert!(s.is_complete());
    assert_eq!(s.answered_count(), 3);
  }

  #[test]
  fn submissions_come_back_in_quiz_order() {
    let mut s = session();
    s.record_answer("js-3", 0).expect("answer 3");
    s.record_answer("js-1", 1).expect("answer 1");
    let ids: Vec<_> = s.submissions().into_iter().map(|a| a.question_id).collect();
    assert_eq!(ids, vec!["js-1", "js-3"]);
  }
}
