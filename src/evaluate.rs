//! Deterministic quiz scoring. No model involvement: the same quiz and the
//! same submissions always produce the same result.

use std::collections::{HashMap, HashSet};

use crate::config::FeedbackTier;
use crate::domain::{AnswerSubmission, Quiz, QuizResult, UserAnswer};
use crate::error::ApiError;

/// Score a complete set of submissions against a quiz.
///
/// Every question must be answered exactly once. Correctness is re-derived
/// here; a selected index outside the option range simply counts as wrong
/// rather than failing the whole evaluation.
pub fn evaluate_quiz(
  quiz: &Quiz,
  submissions: &[AnswerSubmission],
  tiers: &[FeedbackTier],
) -> Result<QuizResult, ApiError> {
  let index_by_id: HashMap<&str, usize> = quiz
    .questions
    .iter()
    .enumerate()
    .map(|(i, q)| (q.id.as_str(), i))
    .collect();

  let mut by_index: Vec<Option<UserAnswer>> = vec![None; quiz.questions.len()];
  let mut seen: HashSet<usize> = HashSet::new();
  for submission in submissions {
    let index = *index_by_id
      .get(submission.question_id.as_str())
      .ok_or_else(|| ApiError::UnknownQuestion(submission.question_id.clone()))?;
    if !seen.insert(index) {
      return Err(ApiError::AlreadyAnswered { question_id: submission.question_id.clone() });
    }
    let question = &quiz.questions[index];
    by_index[index] = Some(UserAnswer {
      question_id: submission.question_id.clone(),
      selected_answer: submission.selected_answer,
      is_correct: submission.selected_answer == question.correct_answer,
    });
  }

  let total = quiz.questions.len() as u32;
  let missing = total - seen.len() as u32;
  if missing > 0 {
    return Err(ApiError::IncompleteAnswers { missing: missing as usize, total: total as usize });
  }

  let answers: Vec<UserAnswer> = by_index.into_iter().flatten().collect();
  let correct = answers.iter().filter(|a| a.is_correct).count() as u32;
  let score = (correct * 100) as f32 / total as f32;
  let percentage = ((correct * 100) as f64 / total as f64).round() as u8;

  Ok(QuizResult {
    total_questions: total,
    correct_answers: correct,
    score,
    percentage,
    feedback: feedback_for(percentage, tiers),
    answers,
  })
}

/// Pick the feedback line for a percentage: the matching tier with the
/// highest threshold wins.
pub fn feedback_for(percentage: u8, tiers: &[FeedbackTier]) -> String {
  tiers
    .iter()
    .filter(|t| percentage >= t.min_percentage)
    .max_by_key(|t| t.min_percentage)
    .map(|t| t.message.clone())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::default_feedback_tiers;
  use crate::seeds;

  fn submit(pairs: &[(&str, usize)]) -> Vec<AnswerSubmission> {
    pairs
      .iter()
      .map(|(id, sel)| AnswerSubmission { question_id: (*id).to_string(), selected_answer: *sel })
      .collect()
  }

  #[test]
  fn two_of_three_rounds_to_sixty_seven() {
    let quiz = seeds::fixture_quiz();
    let tiers = default_feedback_tiers();
    let subs = submit(&[("js-1", 1), ("js-2", 0), ("js-3", 0)]);

    let first = evaluate_quiz(&quiz, &subs, &tiers).expect("evaluation");
    assert_eq!(first.total_questions, 3);
    assert_eq!(first.correct_answers, 2);
    assert_eq!(first.percentage, 67);
    assert!((first.score - 200.0 / 3.0).abs() < 1e-4);

    // same inputs, same result
    let second = evaluate_quiz(&quiz, &subs, &tiers).expect("evaluation");
    assert_eq!(first, second);
  }

  #[test]
  fn percentage_rounds_half_up() {
    // 1 of 8 = 12.5 -> 13
    let mut quiz = seeds::fixture_quiz();
    let mut questions = Vec::new();
    for i in 0..8 {
      let mut q = quiz.questions[0].clone();
      q.id = format!("q{i}");
      questions.push(q);
    }
    quiz.questions = questions;
    quiz.total_questions = 8;

    let mut pairs: Vec<(String, usize)> = (0..8).map(|i| (format!("q{i}"), 0)).collect();
    pairs[0].1 = 1; // the only correct pick
    let subs: Vec<AnswerSubmission> = pairs
      .into_iter()
      .map(|(id, sel)| AnswerSubmission { question_id: id, selected_answer: sel })
      .collect();

    let result = evaluate_quiz(&quiz, &subs, &default_feedback_tiers()).expect("evaluation");
    assert_eq!(result.correct_answers, 1);
    assert_eq!(result.percentage, 13);
  }

  #[test]
  fn feedback_tiers_switch_at_their_thresholds() {
    let tiers = default_feedback_tiers();
    assert!(feedback_for(90, &tiers).starts_with("🏆"));
    assert!(feedback_for(89, &tiers).starts_with("🎉"));
    assert!(feedback_for(80, &tiers).starts_with("🎉"));
    assert!(feedback_for(60, &tiers).starts_with("👍"));
    assert!(feedback_for(59, &tiers).starts_with("💪"));
    assert!(feedback_for(0, &tiers).starts_with("💪"));
  }

  #[test]
  fn incomplete_submissions_are_rejected() {
    let quiz = seeds::fixture_quiz();
    let subs = submit(&[("js-1", 1)]);
    let err = evaluate_quiz(&quiz, &subs, &default_feedback_tiers()).expect_err("missing answers");
    assert!(matches!(err, ApiError::IncompleteAnswers { missing: 2, total: 3 }));
  }

  #[test]
  fn duplicate_submissions_are_rejected() {
    let quiz = seeds::fixture_quiz();
    let subs = submit(&[("js-1", 1), ("js-1", 0), ("js-2", 0)]);
    let err = evaluate_quiz(&quiz, &subs, &default_feedback_tiers()).expect_err("duplicate");
    assert!(matches!(err, ApiError::AlreadyAnswered { ref question_id } if question_id == "js-1"));
  }

  #[test]
  fn unknown_question_id_is_rejected() {
    let quiz = seeds::fixture_quiz();
    let subs = submit(&[("ghost", 0), ("js-2", 0), ("js-3", 2)]);
    let err = evaluate_quiz(&quiz, &subs, &default_feedback_tiers()).expect_err("unknown id");
    assert!(matches!(err, ApiError::UnknownQuestion(ref id) if id == "ghost"));
  }

  #[test]
  fn out_of_range_selection_counts_as_wrong() {
    let quiz = seeds::fixture_quiz();
    let subs = submit(&[("js-1", 99), ("js-2", 0), ("js-3", 2)]);
    let result = evaluate_quiz(&quiz, &subs, &default_feedback_tiers()).expect("evaluation");
    assert_eq!(result.correct_answers, 2);
    assert!(!result.answers[0].is_correct);
  }
}
