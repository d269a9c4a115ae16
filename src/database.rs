use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

// Fixed-width timestamps keep TEXT ordering equal to time ordering.
fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "schema ready");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL DEFAULT '',
                selected_class INTEGER,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id TEXT PRIMARY KEY,
                class INTEGER NOT NULL,
                title TEXT NOT NULL,
                icon TEXT NOT NULL DEFAULT '',
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapters (
                id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL,
                title TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                id TEXT PRIMARY KEY,
                chapter_id TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                sort_order INTEGER NOT NULL,
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chapter_progress (
                user_id TEXT NOT NULL,
                chapter_id TEXT NOT NULL,
                last_viewed_topic_order INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, chapter_id),
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topic_statuses (
                user_id TEXT NOT NULL,
                topic_id TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('got_it', 'revise_later')),
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, topic_id),
                FOREIGN KEY (topic_id) REFERENCES topics(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // User operations
    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(User {
                id: row.get("id"),
                email: row.get("email"),
                selected_class: row.get("selected_class"),
                created_at: from_db_time(&row.get::<String, _>("created_at"))?,
            })),
            None => Ok(None),
        }
    }

    /// Users come from the external auth provider, so they are created lazily.
    pub async fn get_or_create_user(&self, id: &str) -> Result<User> {
        if let Some(user) = self.get_user(id).await? {
            return Ok(user);
        }

        let user = User {
            id: id.to_string(),
            email: String::new(),
            selected_class: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, email, selected_class, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(user.selected_class)
        .bind(to_db_time(user.created_at))
        .execute(&self.pool)
        .await?;

        Ok(self.get_user(id).await?.unwrap_or(user))
    }

    pub async fn set_selected_class(&self, id: &str, class: i32) -> Result<User> {
        let mut user = self.get_or_create_user(id).await?;
        sqlx::query("UPDATE users SET selected_class = ?1 WHERE id = ?2")
            .bind(class)
            .bind(id)
            .execute(&self.pool)
            .await?;
        user.selected_class = Some(class);
        Ok(user)
    }

    // Content operations
    pub async fn create_subject(&self, request: CreateSubjectRequest) -> Result<Subject> {
        let subject = Subject {
            id: Uuid::new_v4(),
            class: request.class,
            title: request.title,
            icon: request.icon,
            order: request.order,
        };

        sqlx::query(
            "INSERT INTO subjects (id, class, title, icon, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(subject.id.to_string())
        .bind(subject.class)
        .bind(&subject.title)
        .bind(&subject.icon)
        .bind(subject.order)
        .execute(&self.pool)
        .await?;

        Ok(subject)
    }

    pub async fn create_chapter(&self, request: CreateChapterRequest) -> Result<Chapter> {
        let chapter = Chapter {
            id: Uuid::new_v4(),
            subject_id: request.subject_id,
            title: request.title,
            order: request.order,
        };

        sqlx::query(
            "INSERT INTO chapters (id, subject_id, title, sort_order) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(chapter.id.to_string())
        .bind(chapter.subject_id.to_string())
        .bind(&chapter.title)
        .bind(chapter.order)
        .execute(&self.pool)
        .await?;

        Ok(chapter)
    }

    pub async fn create_topic(&self, request: CreateTopicRequest) -> Result<Topic> {
        let topic = Topic {
            id: Uuid::new_v4(),
            chapter_id: request.chapter_id,
            title: request.title,
            summary: request.summary,
            order: request.order,
        };

        sqlx::query(
            "INSERT INTO topics (id, chapter_id, title, summary, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(topic.id.to_string())
        .bind(topic.chapter_id.to_string())
        .bind(&topic.title)
        .bind(&topic.summary)
        .bind(topic.order)
        .execute(&self.pool)
        .await?;

        Ok(topic)
    }

    pub async fn get_subjects(&self, class: Option<i32>) -> Result<Vec<Subject>> {
        let rows = match class {
            Some(class) => {
                sqlx::query("SELECT * FROM subjects WHERE class = ?1 ORDER BY sort_order ASC")
                    .bind(class)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM subjects ORDER BY class ASC, sort_order ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut subjects = Vec::new();
        for row in rows {
            subjects.push(Subject {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                class: row.get("class"),
                title: row.get("title"),
                icon: row.get("icon"),
                order: row.get("sort_order"),
            });
        }

        Ok(subjects)
    }

    pub async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        let row = sqlx::query("SELECT * FROM subjects WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Subject {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                class: row.get("class"),
                title: row.get("title"),
                icon: row.get("icon"),
                order: row.get("sort_order"),
            })),
            None => Ok(None),
        }
    }

    pub async fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>> {
        let row = sqlx::query("SELECT * FROM chapters WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Chapter {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                subject_id: Uuid::parse_str(&row.get::<String, _>("subject_id"))?,
                title: row.get("title"),
                order: row.get("sort_order"),
            })),
            None => Ok(None),
        }
    }

    pub async fn get_chapters_for_subject(&self, subject_id: Uuid) -> Result<Vec<ChapterSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.subject_id, c.title, c.sort_order,
                   (SELECT COUNT(*) FROM topics t WHERE t.chapter_id = c.id) AS topic_count
            FROM chapters c
            WHERE c.subject_id = ?1
            ORDER BY c.sort_order ASC
            "#,
        )
        .bind(subject_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut chapters = Vec::new();
        for row in rows {
            chapters.push(ChapterSummary {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                subject_id: Uuid::parse_str(&row.get::<String, _>("subject_id"))?,
                title: row.get("title"),
                order: row.get("sort_order"),
                topic_count: row.get("topic_count"),
            });
        }

        Ok(chapters)
    }

    pub async fn get_topic(&self, id: Uuid) -> Result<Option<Topic>> {
        let row = sqlx::query("SELECT * FROM topics WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_topic(&row)?)),
            None => Ok(None),
        }
    }

    /// Topics of a chapter in display order.
    pub async fn get_topics_for_chapter(&self, chapter_id: Uuid) -> Result<Vec<Topic>> {
        let start = Instant::now();
        let rows = sqlx::query("SELECT * FROM topics WHERE chapter_id = ?1 ORDER BY sort_order ASC")
            .bind(chapter_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let topics = rows
            .iter()
            .map(|row| self.row_to_topic(row))
            .collect::<Result<Vec<_>>>()?;

        log_db_operation!(
            debug,
            "select_topics_for_chapter",
            count = topics.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(topics)
    }

    fn row_to_topic(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Topic> {
        Ok(Topic {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            chapter_id: Uuid::parse_str(&row.get::<String, _>("chapter_id"))?,
            title: row.get("title"),
            summary: row.get("summary"),
            order: row.get("sort_order"),
        })
    }

    // Progress operations
    pub async fn get_progress(&self, user_id: &str, chapter_id: Uuid) -> Result<Option<ProgressRecord>> {
        let row = sqlx::query(
            "SELECT * FROM chapter_progress WHERE user_id = ?1 AND chapter_id = ?2",
        )
        .bind(user_id)
        .bind(chapter_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ProgressRecord {
                user_id: row.get("user_id"),
                chapter_id: Uuid::parse_str(&row.get::<String, _>("chapter_id"))?,
                last_viewed_topic_order: row.get("last_viewed_topic_order"),
                updated_at: from_db_time(&row.get::<String, _>("updated_at"))?,
            })),
            None => Ok(None),
        }
    }

    /// Last write wins per (user, chapter); every call refreshes `updated_at`.
    pub async fn upsert_progress(
        &self,
        user_id: &str,
        chapter_id: Uuid,
        last_viewed_topic_order: i64,
    ) -> Result<ProgressRecord> {
        let record = ProgressRecord {
            user_id: user_id.to_string(),
            chapter_id,
            last_viewed_topic_order,
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO chapter_progress (user_id, chapter_id, last_viewed_topic_order, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, chapter_id) DO UPDATE SET
                last_viewed_topic_order = excluded.last_viewed_topic_order,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(record.chapter_id.to_string())
        .bind(record.last_viewed_topic_order)
        .bind(to_db_time(record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_latest_progress(&self, user_id: &str) -> Result<Option<ContinueReading>> {
        let row = sqlx::query(
            r#"
            SELECT p.chapter_id, p.last_viewed_topic_order, p.updated_at,
                   c.title AS chapter_title, s.title AS subject_title,
                   (SELECT COUNT(*) FROM topics t WHERE t.chapter_id = c.id) AS topic_count
            FROM chapter_progress p
            JOIN chapters c ON c.id = p.chapter_id
            JOIN subjects s ON s.id = c.subject_id
            WHERE p.user_id = ?1
            ORDER BY p.updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ContinueReading {
                chapter_id: Uuid::parse_str(&row.get::<String, _>("chapter_id"))?,
                chapter_title: row.get("chapter_title"),
                subject_title: row.get("subject_title"),
                last_viewed_topic_order: row.get("last_viewed_topic_order"),
                topic_count: row.get("topic_count"),
                updated_at: from_db_time(&row.get::<String, _>("updated_at"))?,
            })),
            None => Ok(None),
        }
    }

    // Topic status operations
    pub async fn get_topic_statuses_for_chapter(
        &self,
        user_id: &str,
        chapter_id: Uuid,
    ) -> Result<HashMap<Uuid, TopicStatus>> {
        let rows = sqlx::query(
            r#"
            SELECT ts.topic_id, ts.status
            FROM topic_statuses ts
            JOIN topics t ON t.id = ts.topic_id
            WHERE ts.user_id = ?1 AND t.chapter_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(chapter_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut statuses = HashMap::new();
        for row in rows {
            let topic_id = Uuid::parse_str(&row.get::<String, _>("topic_id"))?;
            let status: TopicStatus = row.get::<String, _>("status").parse()?;
            statuses.insert(topic_id, status);
        }

        Ok(statuses)
    }

    /// A topic holds at most one status; a new one replaces the old.
    pub async fn upsert_topic_status(
        &self,
        user_id: &str,
        topic_id: Uuid,
        status: TopicStatus,
    ) -> Result<TopicStatusRecord> {
        let record = TopicStatusRecord {
            user_id: user_id.to_string(),
            topic_id,
            status,
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO topic_statuses (user_id, topic_id, status, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, topic_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.user_id)
        .bind(record.topic_id.to_string())
        .bind(record.status.as_str())
        .bind(to_db_time(record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// Returns the number of rows removed (0 when the topic was already unmarked).
    pub async fn delete_topic_status(&self, user_id: &str, topic_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM topic_statuses WHERE user_id = ?1 AND topic_id = ?2")
            .bind(user_id)
            .bind(topic_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn get_revise_later(&self, user_id: &str, class: Option<i32>) -> Result<Vec<ReviseLaterItem>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id AS topic_id, t.title AS topic_title, t.summary,
                   c.id AS chapter_id, c.title AS chapter_title,
                   s.id AS subject_id, s.title AS subject_title,
                   ts.updated_at
            FROM topic_statuses ts
            JOIN topics t ON t.id = ts.topic_id
            JOIN chapters c ON c.id = t.chapter_id
            JOIN subjects s ON s.id = c.subject_id
            WHERE ts.user_id = ?1
              AND ts.status = 'revise_later'
              AND (?2 IS NULL OR s.class = ?2)
            ORDER BY ts.updated_at DESC
            "#,
        )
        .bind(user_id)
        .bind(class)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::new();
        for row in rows {
            items.push(ReviseLaterItem {
                topic_id: Uuid::parse_str(&row.get::<String, _>("topic_id"))?,
                topic_title: row.get("topic_title"),
                summary: row.get("summary"),
                chapter_id: Uuid::parse_str(&row.get::<String, _>("chapter_id"))?,
                chapter_title: row.get("chapter_title"),
                subject_id: Uuid::parse_str(&row.get::<String, _>("subject_id"))?,
                subject_title: row.get("subject_title"),
                updated_at: from_db_time(&row.get::<String, _>("updated_at"))?,
            });
        }

        Ok(items)
    }
}
