use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String, // Stable identifier issued by the auth provider
    pub email: String,
    pub selected_class: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subject {
    pub id: Uuid,
    pub class: i32,
    pub title: String,
    pub icon: String,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chapter {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Topic {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub title: String,
    pub summary: String,
    pub order: i64, // Stable sort key, not necessarily 0-based or contiguous
}

/// Per-topic marker a user can set while browsing cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    GotIt,
    ReviseLater,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicStatus::GotIt => "got_it",
            TopicStatus::ReviseLater => "revise_later",
        }
    }
}

impl fmt::Display for TopicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "got_it" => Ok(TopicStatus::GotIt),
            "revise_later" => Ok(TopicStatus::ReviseLater),
            other => Err(anyhow::anyhow!("Unknown topic status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicStatusRecord {
    pub user_id: String,
    pub topic_id: Uuid,
    pub status: TopicStatus,
    pub updated_at: DateTime<Utc>,
}

/// Last card a user viewed in a chapter. One row per (user, chapter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub chapter_id: Uuid,
    pub last_viewed_topic_order: i64,
    pub updated_at: DateTime<Utc>,
}

/// Server-side resume position handed to the card view at render time.
/// A chapter that was never visited reports order 0 at time 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub last_viewed_topic_order: i64,
    pub updated_at_ms: i64,
}

impl From<&ProgressRecord> for ProgressSnapshot {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            last_viewed_topic_order: record.last_viewed_topic_order,
            updated_at_ms: record.updated_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicWithStatus {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub order: i64,
    pub status: Option<TopicStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub order: i32,
    pub topic_count: i64,
}

/// Everything the card view needs for one chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterView {
    pub chapter: Chapter,
    pub subject_title: String,
    pub topics: Vec<TopicWithStatus>,
    pub progress: ProgressSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviseLaterItem {
    pub topic_id: Uuid,
    pub topic_title: String,
    pub summary: String,
    pub chapter_id: Uuid,
    pub chapter_title: String,
    pub subject_id: Uuid,
    pub subject_title: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueReading {
    pub chapter_id: Uuid,
    pub chapter_title: String,
    pub subject_title: String,
    pub last_viewed_topic_order: i64,
    pub topic_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubjectRequest {
    pub class: i32,
    pub title: String,
    pub icon: String,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChapterRequest {
    pub subject_id: Uuid,
    pub title: String,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub chapter_id: Uuid,
    pub title: String,
    pub summary: String,
    pub order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveProgressRequest {
    pub chapter_id: Uuid,
    pub last_viewed_topic_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTopicStatusRequest {
    pub topic_id: Uuid,
    pub status: String, // Validated against TopicStatus so bad input maps to 400
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearTopicStatusRequest {
    pub topic_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingRequest {
    pub selected_class: i32,
}
