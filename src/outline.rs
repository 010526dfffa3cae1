//! Chapter outlines streamed by the course-planning endpoint. Like quizzes,
//! an outline arrives as a growing snapshot, so every field stays optional
//! until the stream finishes.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Chapter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub chapter_number: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub topics: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub estimated_time: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterOutline {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub topic: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub total_chapters: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub chapters: Option<Vec<Chapter>>,
}
