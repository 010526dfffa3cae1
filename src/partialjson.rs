//! Best-effort completion of a streamed JSON prefix.
//!
//! While a model streams a JSON document we only ever hold a prefix of it.
//! `complete_json` closes that prefix (open strings, arrays, objects) into a
//! parseable document so each delta can yield a display snapshot. Repair only
//! truncates and closes; it never invents keys or values, so a snapshot never
//! contains data the model has not produced yet. When a prefix cannot be
//! repaired the caller skips it and retries on the next delta.

use serde::de::DeserializeOwned;

/// How far back we search for a truncation point that yields valid JSON.
const MAX_REPAIR_ATTEMPTS: usize = 16;

/// Close an in-flight JSON object prefix into a complete document.
/// Returns None when no truncation point yields valid JSON.
pub fn complete_json(input: &str) -> Option<String> {
  let body = strip_fences(input);
  let start = body.find('{')?;
  let body = &body[start..];

  // Byte offsets (exclusive) where truncating the prefix may leave a
  // closeable document: after openers, after closers, and just before a
  // comma outside any string. The full prefix is always the first attempt.
  let mut cuts: Vec<usize> = Vec::new();
  let mut in_string = false;
  let mut escape = false;
  for (i, ch) in body.char_indices() {
    if in_string {
      if escape {
        escape = false;
      } else if ch == '\\' {
        escape = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }
    match ch {
      '"' => in_string = true,
      '{' | '[' => cuts.push(i + 1),
      '}' | ']' => cuts.push(i + ch.len_utf8()),
      ',' => cuts.push(i),
      _ => {}
    }
  }
  cuts.push(body.len());

  for &end in cuts.iter().rev().take(MAX_REPAIR_ATTEMPTS) {
    if let Some(candidate) = close_prefix(&body[..end]) {
      if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
        return Some(candidate);
      }
    }
  }
  None
}

/// Complete a JSON prefix and parse it into `T`. `T` should be a fully
/// optional "partial" mirror of the target schema.
pub fn parse_partial<T: DeserializeOwned>(raw: &str) -> Option<T> {
  let completed = complete_json(raw)?;
  serde_json::from_str(&completed).ok()
}

/// Append the closers a prefix still owes. Returns None when the prefix is
/// structurally hopeless (mismatched closer, key with no value).
fn close_prefix(prefix: &str) -> Option<String> {
  let mut stack: Vec<char> = Vec::new();
  let mut in_string = false;
  let mut escape = false;

  for ch in prefix.chars() {
    if in_string {
      if escape {
        escape = false;
      } else if ch == '\\' {
        escape = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }
    match ch {
      '"' => in_string = true,
      '{' => stack.push('}'),
      '[' => stack.push(']'),
      '}' | ']' => {
        if stack.last() == Some(&ch) {
          stack.pop();
        } else {
          return None;
        }
      }
      _ => {}
    }
  }

  let mut out = prefix.to_string();
  if escape {
    out.pop();
  }
  if in_string {
    out.push('"');
  }
  while out.ends_with(|c: char| c.is_whitespace()) {
    out.pop();
  }
  if out.ends_with(',') {
    out.pop();
  }
  // A dangling key ("title":) cannot be closed without inventing a value;
  // the caller backtracks to an earlier cut instead.
  if out.ends_with(':') {
    return None;
  }
  for closer in stack.iter().rev() {
    out.push(*closer);
  }
  Some(out)
}

/// Drop a leading markdown code fence, if the model wrapped its output.
fn strip_fences(s: &str) -> &str {
  let t = s.trim_start();
  if let Some(rest) = t.strip_prefix("```") {
    match rest.find('\n') {
      Some(i) => &rest[i + 1..],
      None => rest,
    }
  } else {
    t
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::PartialQuiz;

  const FULL: &str = r#"{"title":"JS 基础","description":"入门测试","questions":[{"id":"q1","question":"1+1?","options":["1","2","3"],"correctAnswer":1,"explanation":"算术"},{"id":"q2","question":"typeof []?","options":["array","object"],"correctAnswer":1,"explanation":"历史原因"}],"totalQuestions":2,"estimatedTime":"3 分钟"}"#;

  #[test]
  fn every_prefix_yields_a_snapshot_or_is_skipped() {
    let mut last_count = 0usize;
    let mut parsed_any = false;
    for end in 1..=FULL.len() {
      if !FULL.is_char_boundary(end) {
        continue;
      }
      if let Some(snap) = parse_partial::<PartialQuiz>(&FULL[..end]) {
        parsed_any = true;
        // question count never decreases and never exceeds the data present
        assert!(snap.available() >= last_count, "shrank at byte {end}");
        assert!(snap.available() <= 2);
        last_count = snap.available();
      }
    }
    assert!(parsed_any);
    assert_eq!(last_count, 2);
  }

  #[test]
  fn full_document_passes_through_unchanged() {
    let done = complete_json(FULL).unwrap();
    let a: serde_json::Value = serde_json::from_str(&done).unwrap();
    let b: serde_json::Value = serde_json::from_str(FULL).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn open_string_is_closed_not_extended() {
    let snap = parse_partial::<PartialQuiz>(r#"{"title":"JavaScr"#).unwrap();
    assert_eq!(snap.title.as_deref(), Some("JavaScr"));
    assert_eq!(snap.available(), 0);
  }

  #[test]
  fn dangling_key_backtracks_without_inventing_a_value() {
    let snap = parse_partial::<PartialQuiz>(r#"{"title":"X","descri"#).unwrap();
    assert_eq!(snap.title.as_deref(), Some("X"));
    assert!(snap.description.is_none());

    let snap = parse_partial::<PartialQuiz>(r#"{"title":"X","description":"#).unwrap();
    assert_eq!(snap.title.as_deref(), Some("X"));
    assert!(snap.description.is_none());
  }

  #[test]
  fn half_finished_question_is_dropped_not_fabricated() {
    let prefix = r#"{"title":"T","questions":[{"id":"q1","question":"ok?","options":["a","b"],"correctAnswer":0,"explanation":"e"},{"id":"q2","question":"part"#;
    let snap = parse_partial::<PartialQuiz>(prefix).unwrap();
    let questions = snap.questions.unwrap();
    // q2 may appear with only the fields streamed so far, never more
    match questions.len() {
      1 => assert_eq!(questions[0].id.as_deref(), Some("q1")),
      2 => {
        assert_eq!(questions[1].id.as_deref(), Some("q2"));
        assert!(questions[1].options.is_none());
        assert!(questions[1].correct_answer.is_none());
      }
      n => panic!("unexpected question count {n}"),
    }
  }

  #[test]
  fn code_fences_and_trailing_noise_are_tolerated() {
    let fenced = format!("```json\n{}\n```", FULL);
    let snap = parse_partial::<PartialQuiz>(&fenced).unwrap();
    assert_eq!(snap.available(), 2);
  }

  #[test]
  fn non_object_input_is_rejected() {
    assert!(complete_json("no json here").is_none());
    assert!(complete_json("").is_none());
    assert!(complete_json("[1, 2, 3]").is_none());
  }

  #[test]
  fn structurally_broken_tail_is_truncated_to_the_last_valid_point() {
    // a stray closer is unsalvageable at full length, so repair falls back
    // to the widest earlier cut that still parses
    let done = complete_json(r#"{"title":"X", ]"#).unwrap();
    let v: serde_json::Value = serde_json::from_str(&done).unwrap();
    assert_eq!(v["title"], "X");
  }
}
