use anyhow::Result;
use std::time::Instant;
use uuid::Uuid;

use crate::database::Database;
use crate::models::*;
use crate::{log_service_start, log_service_success, log_service_warn};

const SERVICE: &str = "revision_service";

/// Classes the content is organised for.
pub const SUPPORTED_CLASSES: [i32; 3] = [8, 9, 10];

#[derive(Clone)]
pub struct RevisionService {
    db: Database,
}

impl RevisionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // Content
    pub async fn list_subjects(&self, class: Option<i32>) -> Result<Vec<Subject>> {
        self.db.get_subjects(class).await
    }

    pub async fn list_chapters(&self, subject_id: Uuid) -> Result<Option<Vec<ChapterSummary>>> {
        if self.db.get_subject(subject_id).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.db.get_chapters_for_subject(subject_id).await?))
    }

    /// Topics in display order with the caller's statuses, plus the server-side
    /// resume snapshot (order 0 at time 0 when the chapter was never opened).
    pub async fn chapter_view(&self, user_id: &str, chapter_id: Uuid) -> Result<Option<ChapterView>> {
        log_service_start!(SERVICE, "chapter_view", user_id = user_id);
        let start = Instant::now();

        let chapter = match self.db.get_chapter(chapter_id).await? {
            Some(chapter) => chapter,
            None => return Ok(None),
        };
        let subject_title = self
            .db
            .get_subject(chapter.subject_id)
            .await?
            .map(|s| s.title)
            .unwrap_or_default();

        let statuses = self.db.get_topic_statuses_for_chapter(user_id, chapter_id).await?;
        let topics = self
            .db
            .get_topics_for_chapter(chapter_id)
            .await?
            .into_iter()
            .map(|topic| TopicWithStatus {
                status: statuses.get(&topic.id).copied(),
                id: topic.id,
                title: topic.title,
                summary: topic.summary,
                order: topic.order,
            })
            .collect();

        let progress = self
            .db
            .get_progress(user_id, chapter_id)
            .await?
            .as_ref()
            .map(ProgressSnapshot::from)
            .unwrap_or_default();

        log_service_success!(
            SERVICE,
            "chapter_view",
            user_id = user_id,
            duration_ms = start.elapsed().as_millis() as u64
        );

        Ok(Some(ChapterView {
            chapter,
            subject_title,
            topics,
            progress,
        }))
    }

    // Progress
    pub async fn get_progress(&self, user_id: &str, chapter_id: Uuid) -> Result<Option<ProgressRecord>> {
        self.db.get_progress(user_id, chapter_id).await
    }

    /// Returns `None` when the chapter does not exist.
    pub async fn save_progress(
        &self,
        user_id: &str,
        chapter_id: Uuid,
        last_viewed_topic_order: i64,
    ) -> Result<Option<ProgressRecord>> {
        if self.db.get_chapter(chapter_id).await?.is_none() {
            log_service_warn!(SERVICE, "save_progress", format!("unknown chapter {}", chapter_id));
            return Ok(None);
        }
        self.db.get_or_create_user(user_id).await?;
        let record = self
            .db
            .upsert_progress(user_id, chapter_id, last_viewed_topic_order)
            .await?;
        Ok(Some(record))
    }

    pub async fn continue_reading(&self, user_id: &str) -> Result<Option<ContinueReading>> {
        self.db.get_latest_progress(user_id).await
    }

    // Topic status
    /// Returns `None` when the topic does not exist.
    pub async fn set_topic_status(
        &self,
        user_id: &str,
        topic_id: Uuid,
        status: TopicStatus,
    ) -> Result<Option<TopicStatusRecord>> {
        if self.db.get_topic(topic_id).await?.is_none() {
            log_service_warn!(SERVICE, "set_topic_status", format!("unknown topic {}", topic_id));
            return Ok(None);
        }
        self.db.get_or_create_user(user_id).await?;
        Ok(Some(self.db.upsert_topic_status(user_id, topic_id, status).await?))
    }

    /// Clearing an unmarked topic is not an error.
    pub async fn clear_topic_status(&self, user_id: &str, topic_id: Uuid) -> Result<bool> {
        Ok(self.db.delete_topic_status(user_id, topic_id).await? > 0)
    }

    /// Bookmarked topics, newest first, scoped to the user's class when one is set.
    pub async fn revise_later(&self, user_id: &str) -> Result<Vec<ReviseLaterItem>> {
        let user = self.db.get_or_create_user(user_id).await?;
        self.db.get_revise_later(user_id, user.selected_class).await
    }

    // Users
    /// Returns `None` for a class outside [`SUPPORTED_CLASSES`].
    pub async fn onboard(&self, user_id: &str, selected_class: i32) -> Result<Option<User>> {
        if !SUPPORTED_CLASSES.contains(&selected_class) {
            return Ok(None);
        }
        Ok(Some(self.db.set_selected_class(user_id, selected_class).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with_chapter(class: i32) -> (RevisionService, Chapter, Vec<Topic>) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let subject = db
            .create_subject(CreateSubjectRequest {
                class,
                title: "Geography".to_string(),
                icon: "G".to_string(),
                order: 1,
            })
            .await
            .unwrap();
        let chapter = db
            .create_chapter(CreateChapterRequest {
                subject_id: subject.id,
                title: "Resources and Development".to_string(),
                order: 1,
            })
            .await
            .unwrap();
        let mut topics = Vec::new();
        for order in 1..=3 {
            topics.push(
                db.create_topic(CreateTopicRequest {
                    chapter_id: chapter.id,
                    title: format!("Topic {}", order),
                    summary: "summary".to_string(),
                    order,
                })
                .await
                .unwrap(),
            );
        }
        (RevisionService::new(db), chapter, topics)
    }

    #[tokio::test]
    async fn test_chapter_view_defaults_progress_for_unvisited_chapter() {
        let (service, chapter, _) = service_with_chapter(10).await;
        let view = service.chapter_view("u1", chapter.id).await.unwrap().unwrap();
        assert_eq!(view.topics.len(), 3);
        assert_eq!(view.progress, ProgressSnapshot::default());
        assert_eq!(view.subject_title, "Geography");
        assert!(view.topics.iter().all(|t| t.status.is_none()));
    }

    #[tokio::test]
    async fn test_chapter_view_reflects_saved_state() {
        let (service, chapter, topics) = service_with_chapter(10).await;
        service.save_progress("u1", chapter.id, 2).await.unwrap().unwrap();
        service
            .set_topic_status("u1", topics[0].id, TopicStatus::GotIt)
            .await
            .unwrap()
            .unwrap();

        let view = service.chapter_view("u1", chapter.id).await.unwrap().unwrap();
        assert_eq!(view.progress.last_viewed_topic_order, 2);
        assert!(view.progress.updated_at_ms > 0);
        assert_eq!(view.topics[0].status, Some(TopicStatus::GotIt));

        // Another user sees none of it
        let other = service.chapter_view("u2", chapter.id).await.unwrap().unwrap();
        assert_eq!(other.progress, ProgressSnapshot::default());
        assert!(other.topics[0].status.is_none());
    }

    #[tokio::test]
    async fn test_unknown_resources_return_none() {
        let (service, _, _) = service_with_chapter(10).await;
        assert!(service.chapter_view("u1", Uuid::new_v4()).await.unwrap().is_none());
        assert!(service.save_progress("u1", Uuid::new_v4(), 1).await.unwrap().is_none());
        assert!(service
            .set_topic_status("u1", Uuid::new_v4(), TopicStatus::ReviseLater)
            .await
            .unwrap()
            .is_none());
        assert!(!service.clear_topic_status("u1", Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_revise_later_respects_selected_class() {
        let (service, _, topics) = service_with_chapter(9).await;
        service
            .set_topic_status("u1", topics[1].id, TopicStatus::ReviseLater)
            .await
            .unwrap();
        service
            .set_topic_status("u1", topics[2].id, TopicStatus::GotIt)
            .await
            .unwrap();

        let items = service.revise_later("u1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].topic_id, topics[1].id);

        service.onboard("u1", 10).await.unwrap().unwrap();
        assert!(service.revise_later("u1").await.unwrap().is_empty());

        service.onboard("u1", 9).await.unwrap().unwrap();
        assert_eq!(service.revise_later("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_onboard_rejects_unsupported_class() {
        let (service, _, _) = service_with_chapter(10).await;
        assert!(service.onboard("u1", 12).await.unwrap().is_none());
        let user = service.onboard("u1", 8).await.unwrap().unwrap();
        assert_eq!(user.selected_class, Some(8));
    }

    #[tokio::test]
    async fn test_continue_reading_returns_latest_chapter() {
        let (service, chapter, _) = service_with_chapter(10).await;
        assert!(service.continue_reading("u1").await.unwrap().is_none());

        service.save_progress("u1", chapter.id, 3).await.unwrap();
        let latest = service.continue_reading("u1").await.unwrap().unwrap();
        assert_eq!(latest.chapter_id, chapter.id);
        assert_eq!(latest.last_viewed_topic_order, 3);
        assert_eq!(latest.topic_count, 3);
    }
}
