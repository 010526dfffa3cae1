//! Progressive reveal of a quiz while it streams in.
//!
//! The controller is timer-free: the caller applies snapshots as they arrive
//! and drives `tick()` on whatever cadence it likes (the WebSocket layer uses
//! a tokio interval). Each tick reveals at most one more question, never
//! ahead of the data actually present. Once the upstream stream has finished
//! and everything available is revealed, exactly one terminal step fires:
//! `Completed` with the finalized quiz, or `Incomplete` with what is missing.

use serde::Serialize;
use tracing::warn;

use crate::domain::{PartialQuiz, Quiz};
use crate::schema::{self, Violation};

/// Where the reveal currently stands. `Complete` means the quiz finalized
/// successfully, not merely that the stream ended.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevealPhase {
  Idle,
  Revealing,
  Complete,
}

/// One observable step produced by `tick()`.
#[derive(Clone, Debug, PartialEq)]
pub enum RevealStep {
  /// Question at `index` became eligible for display.
  Revealed { index: usize },
  /// Terminal: the stream finished and the snapshot finalized into a quiz.
  Completed(Box<Quiz>),
  /// Terminal: the stream finished but required fields never arrived.
  Incomplete(Vec<Violation>),
}

#[derive(Debug, Default)]
pub struct RevealController {
  snapshot: PartialQuiz,
  has_snapshot: bool,
  revealed: usize,
  upstream_done: bool,
  terminal_fired: bool,
  completed: bool,
}

impl RevealController {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace the current snapshot (last write wins; snapshots are never
  /// merged). The reveal count survives replacement.
  pub fn apply(&mut self, snapshot: PartialQuiz) {
    let available = snapshot.available();
    if available < self.revealed {
      // The upstream contract is cumulative-or-replacing, so a shrinking
      // snapshot is a misbehaving stream; clamp rather than un-reveal.
      warn!(
        target: "quiz",
        revealed = self.revealed,
        available,
        "snapshot shrank below revealed count; clamping"
      );
      self.revealed = available;
    }
    self.snapshot = snapshot;
    self.has_snapshot = true;
  }

  /// Upstream end-of-stream signal. Idempotent.
  pub fn finish(&mut self) {
    self.upstream_done = true;
  }

  /// Advance by at most one reveal. Returns None when there is nothing to do
  /// yet (waiting on data) or ever again (terminal already fired).
  pub fn tick(&mut self) -> Option<RevealStep> {
    if self.terminal_fired {
      return None;
    }
    if self.revealed < self.available() {
      self.revealed += 1;
      return Some(RevealStep::Revealed { index: self.revealed - 1 });
    }
    if self.upstream_done {
      self.terminal_fired = true;
      return Some(match schema::finalize(&self.snapshot) {
        Ok(quiz) => {
          self.completed = true;
          RevealStep::Completed(Box::new(quiz))
        }
        Err(violations) => RevealStep::Incomplete(violations),
      });
    }
    None
  }

  pub fn available(&self) -> usize {
    self.snapshot.available()
  }

  pub fn revealed(&self) -> usize {
    self.revealed
  }

  pub fn snapshot(&self) -> &PartialQuiz {
    &self.snapshot
  }

  pub fn phase(&self) -> RevealPhase {
    if self.completed {
      RevealPhase::Complete
    } else if self.has_snapshot {
      RevealPhase::Revealing
    } else {
      RevealPhase::Idle
    }
  }
}
