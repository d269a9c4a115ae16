use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::log_client_event;
use crate::models::TopicStatus;
use crate::progress_client::ProgressStore;

/// Remote call a status change needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRequest {
    Set(Uuid, TopicStatus),
    Clear(Uuid),
}

/// Snapshot-before-mutate record of one optimistic status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCommand {
    pub topic_id: Uuid,
    pub requested: TopicStatus,
    pub previous: Option<TopicStatus>,
    pub desired: Option<TopicStatus>,
}

impl StatusCommand {
    /// Tapping the status a topic already has clears it.
    pub fn new(topic_id: Uuid, requested: TopicStatus, previous: Option<TopicStatus>) -> Self {
        let desired = if previous == Some(requested) {
            None
        } else {
            Some(requested)
        };
        Self {
            topic_id,
            requested,
            previous,
            desired,
        }
    }

    pub fn request(&self) -> StatusRequest {
        match self.desired {
            Some(status) => StatusRequest::Set(self.topic_id, status),
            None => StatusRequest::Clear(self.topic_id),
        }
    }

    fn apply(&self, statuses: &mut HashMap<Uuid, Option<TopicStatus>>) {
        statuses.insert(self.topic_id, self.desired);
    }

    fn rollback(&self, statuses: &mut HashMap<Uuid, Option<TopicStatus>>) {
        statuses.insert(self.topic_id, self.previous);
    }

    fn key(&self) -> (Uuid, TopicStatus) {
        (self.topic_id, self.requested)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusOutcome {
    /// A request for the topic is already in flight, or unknown topic.
    Ignored,
    Committed(Option<TopicStatus>),
    RolledBack(Option<TopicStatus>),
}

/// Summary partition; the three counts always add up to the deck size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusCounts {
    pub got_it: usize,
    pub revise_later: usize,
    pub unmarked: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.got_it + self.revise_later + self.unmarked
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    order: Vec<Uuid>,
    statuses: HashMap<Uuid, Option<TopicStatus>>,
    in_flight: HashSet<(Uuid, TopicStatus)>,
}

/// Live per-topic statuses for one deck, with optimistic updates.
///
/// Cloning shares the same state, so a submission can run on a spawned task
/// while the UI keeps reading.
#[derive(Debug, Clone, Default)]
pub struct TopicStatusTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl TopicStatusTracker {
    pub fn new(topics: impl IntoIterator<Item = (Uuid, Option<TopicStatus>)>) -> Self {
        let mut state = TrackerState::default();
        for (id, status) in topics {
            if state.statuses.insert(id, status).is_none() {
                state.order.push(id);
            }
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // Nothing panics while holding the lock; recover the data if it ever did.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self, topic_id: Uuid) -> Option<TopicStatus> {
        self.lock().statuses.get(&topic_id).copied().flatten()
    }

    pub fn statuses(&self) -> HashMap<Uuid, Option<TopicStatus>> {
        self.lock().statuses.clone()
    }

    pub fn is_in_flight(&self, topic_id: Uuid, status: TopicStatus) -> bool {
        self.lock().in_flight.contains(&(topic_id, status))
    }

    /// Any request for the topic is pending, whichever status it targets.
    pub fn is_topic_busy(&self, topic_id: Uuid) -> bool {
        self.lock().in_flight.iter().any(|(id, _)| *id == topic_id)
    }

    /// Applies the optimistic change and marks it in flight. One request per
    /// topic at a time; anything else for that topic is dropped until it settles.
    pub fn begin(&self, topic_id: Uuid, status: TopicStatus) -> Option<StatusCommand> {
        let mut state = self.lock();
        let previous = *state.statuses.get(&topic_id)?;
        if state.in_flight.iter().any(|(id, _)| *id == topic_id) {
            return None;
        }
        state.in_flight.insert((topic_id, status));
        let command = StatusCommand::new(topic_id, status, previous);
        command.apply(&mut state.statuses);
        Some(command)
    }

    /// Settles a command with the store's answer, rolling back on failure.
    pub fn complete(&self, command: &StatusCommand, result: &Result<()>) -> StatusOutcome {
        let mut state = self.lock();
        state.in_flight.remove(&command.key());
        match result {
            Ok(()) => StatusOutcome::Committed(command.desired),
            Err(e) => {
                log_client_event!(failed, "topic_status", error = e);
                command.rollback(&mut state.statuses);
                log_client_event!(debug, "rollback", topic_id = command.topic_id, "status restored");
                StatusOutcome::RolledBack(state.statuses.get(&command.topic_id).copied().flatten())
            }
        }
    }

    /// Optimistic set-or-toggle-off followed by the remote write. No retry.
    pub async fn submit(
        &self,
        store: &dyn ProgressStore,
        topic_id: Uuid,
        status: TopicStatus,
    ) -> StatusOutcome {
        let Some(command) = self.begin(topic_id, status) else {
            return StatusOutcome::Ignored;
        };
        let result = match command.request() {
            StatusRequest::Set(topic_id, status) => store.set_topic_status(topic_id, status).await,
            StatusRequest::Clear(topic_id) => store.clear_topic_status(topic_id).await,
        };
        self.complete(&command, &result)
    }

    pub fn counts(&self) -> StatusCounts {
        let state = self.lock();
        let mut counts = StatusCounts::default();
        for id in &state.order {
            match state.statuses.get(id).copied().flatten() {
                Some(TopicStatus::GotIt) => counts.got_it += 1,
                Some(TopicStatus::ReviseLater) => counts.revise_later += 1,
                None => counts.unmarked += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<StatusRequest>>,
        fail: bool,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingStore {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        async fn record(&self, request: StatusRequest) -> Result<()> {
            self.calls.lock().unwrap().push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                anyhow::bail!("network down");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProgressStore for RecordingStore {
        async fn save_progress(&self, _chapter_id: Uuid, _order: i64) -> Result<()> {
            Ok(())
        }

        async fn set_topic_status(&self, topic_id: Uuid, status: TopicStatus) -> Result<()> {
            self.record(StatusRequest::Set(topic_id, status)).await
        }

        async fn clear_topic_status(&self, topic_id: Uuid) -> Result<()> {
            self.record(StatusRequest::Clear(topic_id)).await
        }
    }

    fn deck(n: usize) -> (TopicStatusTracker, Vec<Uuid>) {
        let ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        let tracker = TopicStatusTracker::new(ids.iter().map(|id| (*id, None)));
        (tracker, ids)
    }

    #[tokio::test]
    async fn test_same_status_twice_toggles_off() {
        let (tracker, ids) = deck(3);
        let store = RecordingStore::default();

        let first = tracker.submit(&store, ids[0], TopicStatus::GotIt).await;
        assert_eq!(first, StatusOutcome::Committed(Some(TopicStatus::GotIt)));
        let second = tracker.submit(&store, ids[0], TopicStatus::GotIt).await;
        assert_eq!(second, StatusOutcome::Committed(None));

        assert_eq!(tracker.status(ids[0]), None);
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec![
                StatusRequest::Set(ids[0], TopicStatus::GotIt),
                StatusRequest::Clear(ids[0]),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_status_replaces_old() {
        let (tracker, ids) = deck(2);
        let store = RecordingStore::default();

        tracker.submit(&store, ids[1], TopicStatus::GotIt).await;
        tracker.submit(&store, ids[1], TopicStatus::ReviseLater).await;

        assert_eq!(tracker.status(ids[1]), Some(TopicStatus::ReviseLater));
        assert_eq!(
            store.calls.lock().unwrap().last(),
            Some(&StatusRequest::Set(ids[1], TopicStatus::ReviseLater))
        );
    }

    #[tokio::test]
    async fn test_revise_later_tapped_twice_issues_one_delete() {
        let (tracker, ids) = deck(1);
        let store = RecordingStore::default();

        tracker.submit(&store, ids[0], TopicStatus::ReviseLater).await;
        tracker.submit(&store, ids[0], TopicStatus::ReviseLater).await;

        assert_eq!(tracker.status(ids[0]), None);
        let deletes = store
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, StatusRequest::Clear(_)))
            .count();
        assert_eq!(deletes, 1);
    }

    #[tokio::test]
    async fn test_failed_set_rolls_back() {
        let ids = [Uuid::new_v4()];
        let tracker = TopicStatusTracker::new([(ids[0], Some(TopicStatus::GotIt))]);
        let store = RecordingStore::failing();

        let outcome = tracker.submit(&store, ids[0], TopicStatus::ReviseLater).await;

        assert_eq!(outcome, StatusOutcome::RolledBack(Some(TopicStatus::GotIt)));
        assert_eq!(tracker.status(ids[0]), Some(TopicStatus::GotIt));
        assert!(!tracker.is_in_flight(ids[0], TopicStatus::ReviseLater));
    }

    #[tokio::test]
    async fn test_failed_clear_rolls_back() {
        let ids = [Uuid::new_v4()];
        let tracker = TopicStatusTracker::new([(ids[0], Some(TopicStatus::ReviseLater))]);
        let store = RecordingStore::failing();

        let outcome = tracker.submit(&store, ids[0], TopicStatus::ReviseLater).await;

        assert_eq!(outcome, StatusOutcome::RolledBack(Some(TopicStatus::ReviseLater)));
        assert_eq!(tracker.status(ids[0]), Some(TopicStatus::ReviseLater));
    }

    #[test]
    fn test_optimistic_value_visible_before_completion() {
        let (tracker, ids) = deck(1);
        let command = tracker.begin(ids[0], TopicStatus::GotIt).unwrap();
        assert_eq!(tracker.status(ids[0]), Some(TopicStatus::GotIt));
        assert!(tracker.is_in_flight(ids[0], TopicStatus::GotIt));

        // Duplicate submission for the same target is dropped
        assert!(tracker.begin(ids[0], TopicStatus::GotIt).is_none());

        tracker.complete(&command, &Ok(()));
        assert!(!tracker.is_in_flight(ids[0], TopicStatus::GotIt));
    }

    #[test]
    fn test_second_status_for_busy_topic_is_rejected() {
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let tracker = TopicStatusTracker::new([(ids[0], Some(TopicStatus::GotIt)), (ids[1], None)]);

        let clear = tracker.begin(ids[0], TopicStatus::GotIt).unwrap();
        assert_eq!(clear.request(), StatusRequest::Clear(ids[0]));
        assert!(tracker.is_topic_busy(ids[0]));
        assert!(tracker.begin(ids[0], TopicStatus::ReviseLater).is_none());
        assert_eq!(tracker.status(ids[0]), None);

        // Other topics are independent
        assert!(tracker.begin(ids[1], TopicStatus::ReviseLater).is_some());

        let outcome = tracker.complete(&clear, &Err(anyhow::anyhow!("timeout")));
        assert_eq!(outcome, StatusOutcome::RolledBack(Some(TopicStatus::GotIt)));
        assert!(!tracker.is_topic_busy(ids[0]));
        assert!(tracker.begin(ids[0], TopicStatus::ReviseLater).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_different_status_is_ignored() {
        let (tracker, ids) = deck(1);
        let gate = Arc::new(Notify::new());
        let store = Arc::new(RecordingStore {
            gate: Some(gate.clone()),
            ..Default::default()
        });

        let first = tokio::spawn({
            let tracker = tracker.clone();
            let store = store.clone();
            let topic = ids[0];
            async move { tracker.submit(store.as_ref(), topic, TopicStatus::GotIt).await }
        });
        while !tracker.is_in_flight(ids[0], TopicStatus::GotIt) {
            tokio::task::yield_now().await;
        }

        let second = tracker.submit(store.as_ref(), ids[0], TopicStatus::ReviseLater).await;
        assert_eq!(second, StatusOutcome::Ignored);

        gate.notify_one();
        assert_eq!(
            first.await.unwrap(),
            StatusOutcome::Committed(Some(TopicStatus::GotIt))
        );
        assert_eq!(tracker.status(ids[0]), Some(TopicStatus::GotIt));
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec![StatusRequest::Set(ids[0], TopicStatus::GotIt)]
        );
    }

    #[test]
    fn test_unknown_topic_is_ignored() {
        let (tracker, _) = deck(1);
        assert!(tracker.begin(Uuid::new_v4(), TopicStatus::GotIt).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_submission_is_ignored() {
        let (tracker, ids) = deck(1);
        let gate = Arc::new(Notify::new());
        let store = Arc::new(RecordingStore {
            gate: Some(gate.clone()),
            ..Default::default()
        });

        let first = tokio::spawn({
            let tracker = tracker.clone();
            let store = store.clone();
            let topic = ids[0];
            async move { tracker.submit(store.as_ref(), topic, TopicStatus::GotIt).await }
        });
        while !tracker.is_in_flight(ids[0], TopicStatus::GotIt) {
            tokio::task::yield_now().await;
        }

        let duplicate = tracker.submit(store.as_ref(), ids[0], TopicStatus::GotIt).await;
        assert_eq!(duplicate, StatusOutcome::Ignored);

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert_eq!(outcome, StatusOutcome::Committed(Some(TopicStatus::GotIt)));
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_counts_partition_deck() {
        let (tracker, ids) = deck(5);
        let store = RecordingStore::default();
        let script = [
            (0, TopicStatus::GotIt),
            (1, TopicStatus::ReviseLater),
            (1, TopicStatus::GotIt),
            (2, TopicStatus::ReviseLater),
            (2, TopicStatus::ReviseLater),
            (4, TopicStatus::ReviseLater),
        ];
        for (i, status) in script {
            tracker.submit(&store, ids[i], status).await;
            assert_eq!(tracker.counts().total(), 5);
        }

        assert_eq!(
            tracker.counts(),
            StatusCounts {
                got_it: 2,
                revise_later: 1,
                unmarked: 2,
            }
        );
    }
}
