use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::config::DEFAULT_USER_HEADER;
use crate::log_client_event;
use crate::models::TopicStatus;

/// Remote side of progress and topic-status persistence, keyed by the
/// caller's user.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn save_progress(&self, chapter_id: Uuid, last_viewed_topic_order: i64) -> Result<()>;
    async fn set_topic_status(&self, topic_id: Uuid, status: TopicStatus) -> Result<()>;
    async fn clear_topic_status(&self, topic_id: Uuid) -> Result<()>;
}

/// Talks to the revision API over HTTP as one authenticated user.
#[derive(Clone)]
pub struct HttpProgressStore {
    client: reqwest::Client,
    base_url: String,
    user_header: String,
    user_id: String,
}

impl HttpProgressStore {
    pub fn new(base_url: &str, user_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_header: DEFAULT_USER_HEADER.to_string(),
            user_id: user_id.to_string(),
        }
    }

    pub fn with_user_header(mut self, header: &str) -> Self {
        self.user_header = header.to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    async fn save_progress(&self, chapter_id: Uuid, last_viewed_topic_order: i64) -> Result<()> {
        self.client
            .post(self.url("/api/chapters/progress"))
            .header(self.user_header.as_str(), &self.user_id)
            .json(&json!({
                "chapter_id": chapter_id,
                "last_viewed_topic_order": last_viewed_topic_order,
            }))
            .send()
            .await
            .context("sending progress save")?
            .error_for_status()
            .context("progress save rejected")?;
        Ok(())
    }

    async fn set_topic_status(&self, topic_id: Uuid, status: TopicStatus) -> Result<()> {
        self.client
            .post(self.url("/api/topics/status"))
            .header(self.user_header.as_str(), &self.user_id)
            .json(&json!({ "topic_id": topic_id, "status": status.as_str() }))
            .send()
            .await
            .context("sending topic status")?
            .error_for_status()
            .context("topic status rejected")?;
        Ok(())
    }

    async fn clear_topic_status(&self, topic_id: Uuid) -> Result<()> {
        self.client
            .delete(self.url("/api/topics/status"))
            .header(self.user_header.as_str(), &self.user_id)
            .json(&json!({ "topic_id": topic_id }))
            .send()
            .await
            .context("sending topic status clear")?
            .error_for_status()
            .context("topic status clear rejected")?;
        Ok(())
    }
}

/// One progress write: always an absolute position, so racing writes are
/// safe under last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRequest {
    pub chapter_id: Uuid,
    pub last_viewed_topic_order: i64,
}

/// Fire-and-forget delivery of progress saves. Neither method blocks or
/// reports failure to the caller.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, save: SaveRequest);

    /// Last-chance save that must outlive the session issuing it.
    fn beacon(&self, save: SaveRequest);
}

/// Spawns saves onto a tokio runtime and swallows failures.
#[derive(Clone)]
pub struct TokioDispatcher {
    store: Arc<dyn ProgressStore>,
    handle: Handle,
}

impl TokioDispatcher {
    /// Must be called from inside a tokio runtime.
    pub fn new(store: Arc<dyn ProgressStore>) -> Result<Self> {
        let handle = Handle::try_current().context("no tokio runtime for progress dispatch")?;
        Ok(Self { store, handle })
    }
}

async fn deliver(store: Arc<dyn ProgressStore>, save: SaveRequest) {
    match store
        .save_progress(save.chapter_id, save.last_viewed_topic_order)
        .await
    {
        Ok(()) => {
            log_client_event!(debug, "save_progress", chapter_id = save.chapter_id, "progress saved");
        }
        Err(e) => {
            log_client_event!(failed, "save_progress", error = e);
        }
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, save: SaveRequest) {
        self.handle.spawn(deliver(self.store.clone(), save));
    }

    // Runs on its own thread and runtime so that tearing down the caller's
    // runtime cannot cancel it.
    fn beacon(&self, save: SaveRequest) {
        let store = self.store.clone();
        std::thread::spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(deliver(store, save)),
                Err(e) => {
                    log_client_event!(failed, "beacon", error = e);
                }
            }
        });
    }
}
