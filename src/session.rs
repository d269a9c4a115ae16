//! One open card deck on one device: a chapter or the revise-later pile, its
//! resume position, the live status map and the persistence side effects that
//! follow navigation.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::local_cache::{LocalCache, LocalCacheEntry};
use crate::log_client_event;
use crate::models::{ChapterView, ReviseLaterItem, TopicStatus, TopicWithStatus};
use crate::navigation::{
    key_command, summary_swipe_goes_back, CardNavigator, CardTransform, Direction,
    GestureOutcome, GestureTracker, Key, NavCommand, NavEvent, View,
};
use crate::progress_client::{Dispatcher, ProgressStore, SaveRequest};
use crate::reconcile::{clamp_index, index_for_order, resume_from_cache, ResumeSource};
use crate::status_tracker::{StatusCounts, StatusOutcome, TopicStatusTracker};

/// How long a renderer keeps the "continuing where you left off" notice up.
pub const RESUME_NOTICE: Duration = Duration::from_secs(3);

/// Epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Normal reading: resumes from and records the last viewed card.
    Progress,
    /// Practising revise-later topics; position is neither read nor saved.
    Revise,
}

/// Collaborators a session persists through.
#[derive(Clone)]
pub struct SessionDeps {
    pub cache: LocalCache,
    pub store: Arc<dyn ProgressStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub clock: Clock,
}

impl SessionDeps {
    pub fn new(
        cache: LocalCache,
        store: Arc<dyn ProgressStore>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            cache,
            store,
            dispatcher,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// What a renderer needs for the current frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSessionState {
    pub view: View,
    pub total: usize,
    pub animating: bool,
    pub transform: CardTransform,
    pub exit_direction: Option<Direction>,
    pub enter_direction: Option<Direction>,
    pub drag_offset: f32,
    pub current_topic: Uuid,
    pub current_status: Option<TopicStatus>,
}

pub struct CardSession {
    user_id: String,
    /// `None` for the cross-chapter revise deck.
    chapter_id: Option<Uuid>,
    mode: SessionMode,
    topics: Vec<TopicWithStatus>,
    revise_items: Vec<ReviseLaterItem>,
    initial_index: usize,
    navigator: CardNavigator,
    gesture: GestureTracker,
    tracker: TopicStatusTracker,
    deps: SessionDeps,
    resumed_from: Option<ResumeSource>,
    unloaded: bool,
}

impl CardSession {
    /// Opens the deck for `view`. A chapter without topics has no deck and
    /// yields `None`.
    pub fn open(
        user_id: &str,
        view: ChapterView,
        mode: SessionMode,
        deps: SessionDeps,
    ) -> Option<Self> {
        let ChapterView {
            chapter, topics, progress, ..
        } = view;
        if topics.is_empty() {
            log_client_event!(debug, "open", chapter_id = chapter.id, "chapter has no topics");
            return None;
        }

        let orders: Vec<i64> = topics.iter().map(|t| t.order).collect();
        let (initial, resumed_from) = match mode {
            SessionMode::Progress => {
                let resolution =
                    resume_from_cache(&deps.cache, user_id, chapter.id, progress, &orders);
                (resolution.index, Some(resolution.source))
            }
            SessionMode::Revise => {
                let index = index_for_order(&orders, progress.last_viewed_topic_order);
                (clamp_index(index as i64, orders.len()), None)
            }
        };

        let mut session = Self::assemble(user_id, Some(chapter.id), mode, topics, initial, deps)?;
        session.resumed_from = resumed_from;
        session.persist_index(initial);
        Some(session)
    }

    /// Practice deck over the user's revise-later topics across chapters, in
    /// the order given (newest first from the service). Starts at the first
    /// card and never reads or records a position. `None` when nothing is
    /// bookmarked.
    pub fn open_revise(
        user_id: &str,
        items: Vec<ReviseLaterItem>,
        deps: SessionDeps,
    ) -> Option<Self> {
        if items.is_empty() {
            log_client_event!(debug, "open_revise", "no revise-later topics");
            return None;
        }
        let topics = items
            .iter()
            .enumerate()
            .map(|(position, item)| TopicWithStatus {
                id: item.topic_id,
                title: item.topic_title.clone(),
                summary: item.summary.clone(),
                order: position as i64,
                status: Some(TopicStatus::ReviseLater),
            })
            .collect();
        let mut session = Self::assemble(user_id, None, SessionMode::Revise, topics, 0, deps)?;
        session.revise_items = items;
        Some(session)
    }

    fn assemble(
        user_id: &str,
        chapter_id: Option<Uuid>,
        mode: SessionMode,
        topics: Vec<TopicWithStatus>,
        initial: usize,
        deps: SessionDeps,
    ) -> Option<Self> {
        let navigator = CardNavigator::new(topics.len(), initial)?;
        let tracker = TopicStatusTracker::new(topics.iter().map(|t| (t.id, t.status)));
        Some(Self {
            user_id: user_id.to_string(),
            chapter_id,
            mode,
            topics,
            revise_items: Vec::new(),
            initial_index: navigator.current_index(),
            navigator,
            gesture: GestureTracker::new(),
            tracker,
            deps,
            resumed_from: None,
            unloaded: false,
        })
    }

    pub fn chapter_id(&self) -> Option<Uuid> {
        self.chapter_id
    }

    /// Chapter and subject of a card in the revise deck.
    pub fn revise_item(&self, index: usize) -> Option<&ReviseLaterItem> {
        self.revise_items.get(index)
    }

    /// Opened on a later card than the first, so a renderer should show the
    /// resume notice for [`RESUME_NOTICE`].
    pub fn resumed_at_nonzero(&self) -> bool {
        self.mode == SessionMode::Progress && self.initial_index > 0
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// `None` in revise mode, where nothing is reconciled.
    pub fn resumed_from(&self) -> Option<ResumeSource> {
        self.resumed_from
    }

    pub fn topics(&self) -> &[TopicWithStatus] {
        &self.topics
    }

    pub fn navigator(&self) -> &CardNavigator {
        &self.navigator
    }

    /// Shared handle, so status submissions can run on their own task.
    pub fn status_tracker(&self) -> TopicStatusTracker {
        self.tracker.clone()
    }

    pub fn state(&self) -> CardSessionState {
        let index = self.navigator.current_index();
        let topic = &self.topics[index];
        CardSessionState {
            view: self.navigator.view(),
            total: self.navigator.total(),
            animating: self.navigator.is_animating(),
            transform: self.navigator.card_transform(),
            exit_direction: self.navigator.exit_direction(),
            enter_direction: self.navigator.enter_direction(),
            drag_offset: self.navigator.drag_offset(),
            current_topic: topic.id,
            current_status: self.tracker.status(topic.id),
        }
    }

    /// Final counts, available once the summary shows.
    pub fn summary(&self) -> Option<StatusCounts> {
        self.navigator.in_summary().then(|| self.tracker.counts())
    }

    pub fn advance(&mut self) -> bool {
        let moved = self.navigator.advance();
        self.flush_events();
        moved
    }

    pub fn retreat(&mut self) -> bool {
        let moved = self.navigator.retreat();
        self.flush_events();
        moved
    }

    pub fn jump_to(&mut self, index: usize) -> bool {
        let moved = self.navigator.jump_to(index);
        self.flush_events();
        moved
    }

    pub fn back_from_summary(&mut self) -> bool {
        let moved = self.navigator.go_back_from_summary();
        self.flush_events();
        moved
    }

    pub fn restart(&mut self) -> bool {
        let moved = self.navigator.restart();
        self.flush_events();
        moved
    }

    /// Feeds elapsed animation time; the new card's index is persisted when it
    /// becomes visible.
    pub fn tick(&mut self, elapsed: Duration) {
        self.navigator.tick(elapsed);
        self.flush_events();
    }

    pub fn key(&mut self, key: Key, from_text_input: bool) -> bool {
        match key_command(key, self.navigator.in_summary(), from_text_input) {
            Some(NavCommand::Advance) => self.advance(),
            Some(NavCommand::Retreat) => self.retreat(),
            Some(NavCommand::BackFromSummary) => self.back_from_summary(),
            None => false,
        }
    }

    fn gestures_blocked(&self) -> bool {
        self.navigator.is_animating() || self.navigator.in_summary()
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        let blocked = self.gestures_blocked();
        self.gesture.pointer_down(x, y, blocked);
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        let blocked = self.gestures_blocked();
        if let Some(offset) = self.gesture.pointer_move(x, y, blocked) {
            self.navigator.set_drag_offset(offset);
        }
    }

    pub fn pointer_up(&mut self) -> GestureOutcome {
        let blocked = self.gestures_blocked();
        let outcome = self.gesture.pointer_up(blocked);
        self.navigator.set_drag_offset(0.0);
        match outcome {
            GestureOutcome::Advance => {
                self.advance();
            }
            GestureOutcome::Retreat => {
                self.retreat();
            }
            GestureOutcome::SnapBack => {}
        }
        outcome
    }

    pub fn summary_swipe(&mut self, start: (f32, f32), end: (f32, f32)) -> bool {
        self.navigator.in_summary()
            && summary_swipe_goes_back(start, end)
            && self.back_from_summary()
    }

    /// Optimistically marks a topic and writes it through the store.
    pub async fn set_status(&self, topic_id: Uuid, status: TopicStatus) -> StatusOutcome {
        self.tracker
            .submit(self.deps.store.as_ref(), topic_id, status)
            .await
    }

    /// The page was hidden: save the current position normally.
    pub fn on_hidden(&self) {
        if let Some(save) = self.current_save() {
            self.deps.dispatcher.dispatch(save);
        }
    }

    /// The page is going away: one beacon save, never repeated.
    pub fn on_unload(&mut self) {
        if self.unloaded {
            return;
        }
        self.unloaded = true;
        if let Some(save) = self.current_save() {
            self.deps.dispatcher.beacon(save);
        }
    }

    fn flush_events(&mut self) {
        for event in self.navigator.drain_events() {
            match event {
                NavEvent::IndexChanged(index) => self.persist_index(index),
                NavEvent::SummaryEntered => {
                    log_client_event!(debug, "summary", "summary entered");
                }
                NavEvent::SummaryLeft => {
                    log_client_event!(debug, "summary", "summary left");
                }
            }
        }
    }

    fn save_for(&self, index: usize) -> Option<SaveRequest> {
        if self.mode == SessionMode::Revise {
            return None;
        }
        let chapter_id = self.chapter_id?;
        let topic = self.topics.get(index)?;
        Some(SaveRequest {
            chapter_id,
            last_viewed_topic_order: topic.order,
        })
    }

    fn current_save(&self) -> Option<SaveRequest> {
        self.save_for(self.navigator.current_index())
    }

    // Local write first, then the remote save is fired without waiting.
    fn persist_index(&self, index: usize) {
        let Some(save) = self.save_for(index) else {
            return;
        };
        self.deps.cache.write(
            &self.user_id,
            save.chapter_id,
            LocalCacheEntry {
                index: index as i64,
                timestamp: (self.deps.clock)(),
            },
        );
        self.deps.dispatcher.dispatch(save);
    }
}

impl Drop for CardSession {
    fn drop(&mut self) {
        if self.unloaded {
            return;
        }
        if let Some(save) = self.current_save() {
            self.deps.dispatcher.dispatch(save);
        }
    }
}
