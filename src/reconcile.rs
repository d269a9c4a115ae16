//! Decides which card a freshly opened chapter resumes on when this device's
//! cached position and the server's persisted position disagree.

use serde::Serialize;
use uuid::Uuid;

use crate::local_cache::{LocalCache, LocalCacheEntry};
use crate::log_client_event;
use crate::models::ProgressSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeSource {
    Local,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub index: usize,
    pub source: ResumeSource,
    /// Entry the local cache must be overwritten with when the server won.
    pub cache_overwrite: Option<LocalCacheEntry>,
}

/// Position of the topic carrying `order`, or 0 when no topic has it.
pub fn index_for_order(topic_orders: &[i64], order: i64) -> usize {
    topic_orders.iter().position(|&o| o == order).unwrap_or(0)
}

/// Clamp into `[0, total - 1]`; an empty deck clamps to 0.
pub fn clamp_index(raw: i64, total: usize) -> usize {
    if total == 0 || raw <= 0 {
        return 0;
    }
    (raw as u64).min(total as u64 - 1) as usize
}

/// Pure resume decision.
///
/// The newer timestamp wins and a tie goes to the local entry, since the local
/// write always lands before the matching server write. A missing local entry
/// defers to the server.
pub fn reconcile(
    local: Option<LocalCacheEntry>,
    server: ProgressSnapshot,
    topic_orders: &[i64],
) -> Resolution {
    let total = topic_orders.len();
    let server_index = clamp_index(
        index_for_order(topic_orders, server.last_viewed_topic_order) as i64,
        total,
    );

    match local {
        Some(entry) if entry.timestamp >= server.updated_at_ms => Resolution {
            index: clamp_index(entry.index, total),
            source: ResumeSource::Local,
            cache_overwrite: None,
        },
        _ => Resolution {
            index: server_index,
            source: ResumeSource::Server,
            cache_overwrite: Some(LocalCacheEntry {
                index: server_index as i64,
                timestamp: server.updated_at_ms,
            }),
        },
    }
}

/// Reads the cached entry once, reconciles it and applies the overwrite.
pub fn resume_from_cache(
    cache: &LocalCache,
    user_id: &str,
    chapter_id: Uuid,
    server: ProgressSnapshot,
    topic_orders: &[i64],
) -> Resolution {
    let local = cache.read(user_id, chapter_id);
    let resolution = reconcile(local, server, topic_orders);

    if let Some(entry) = resolution.cache_overwrite {
        cache.write(user_id, chapter_id, entry);
    }

    log_client_event!(
        debug,
        "resume",
        chapter_id = chapter_id,
        format!("resuming at index {} from {:?}", resolution.index, resolution.source)
    );
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: [i64; 5] = [1, 2, 3, 4, 5];

    fn server(order: i64, updated_at_ms: i64) -> ProgressSnapshot {
        ProgressSnapshot {
            last_viewed_topic_order: order,
            updated_at_ms,
        }
    }

    fn local(index: i64, timestamp: i64) -> Option<LocalCacheEntry> {
        Some(LocalCacheEntry { index, timestamp })
    }

    #[test]
    fn test_no_local_uses_server_order() {
        let resolution = reconcile(None, server(3, 1000), &ORDERS);
        assert_eq!(resolution.index, 2);
        assert_eq!(resolution.source, ResumeSource::Server);
    }

    #[test]
    fn test_newer_local_wins() {
        let resolution = reconcile(local(4, 2000), server(1, 1500), &ORDERS);
        assert_eq!(resolution.index, 4);
        assert_eq!(resolution.source, ResumeSource::Local);
        assert_eq!(resolution.cache_overwrite, None);
    }

    #[test]
    fn test_newer_server_wins_and_overwrites_cache() {
        let resolution = reconcile(local(0, 500), server(5, 1500), &ORDERS);
        assert_eq!(resolution.index, 4);
        assert_eq!(resolution.source, ResumeSource::Server);
        assert_eq!(
            resolution.cache_overwrite,
            Some(LocalCacheEntry { index: 4, timestamp: 1500 })
        );
    }

    #[test]
    fn test_tie_goes_to_local() {
        let resolution = reconcile(local(1, 1500), server(5, 1500), &ORDERS);
        assert_eq!(resolution.index, 1);
        assert_eq!(resolution.source, ResumeSource::Local);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let first = reconcile(local(3, 10), server(2, 20), &ORDERS);
        let second = reconcile(local(3, 10), server(2, 20), &ORDERS);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_server_order_falls_back_to_first_card() {
        let resolution = reconcile(None, server(42, 1000), &ORDERS);
        assert_eq!(resolution.index, 0);
    }

    #[test]
    fn test_non_contiguous_orders() {
        let orders = [10, 20, 35];
        assert_eq!(reconcile(None, server(35, 5), &orders).index, 2);
        assert_eq!(reconcile(None, server(0, 0), &orders).index, 0);
    }

    #[test]
    fn test_out_of_range_local_index_is_clamped() {
        assert_eq!(reconcile(local(99, 2000), server(1, 1000), &ORDERS).index, 4);
        assert_eq!(reconcile(local(-3, 2000), server(1, 1000), &ORDERS).index, 0);
    }

    #[test]
    fn test_legacy_entry_without_time_loses_to_visited_server() {
        let resolution = reconcile(local(3, 0), server(2, 1), &ORDERS);
        assert_eq!(resolution.index, 1);
        assert_eq!(resolution.source, ResumeSource::Server);
    }

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(0, 5), 0);
        assert_eq!(clamp_index(4, 5), 4);
        assert_eq!(clamp_index(5, 5), 4);
        assert_eq!(clamp_index(-1, 5), 0);
        assert_eq!(clamp_index(i64::MAX, 5), 4);
        assert_eq!(clamp_index(3, 0), 0);
    }

    #[test]
    fn test_resume_from_cache_applies_server_overwrite() {
        let cache = LocalCache::in_memory();
        let chapter = Uuid::new_v4();
        cache.write("u1", chapter, LocalCacheEntry { index: 0, timestamp: 500 });

        let resolution = resume_from_cache(&cache, "u1", chapter, server(5, 1500), &ORDERS);

        assert_eq!(resolution.index, 4);
        assert_eq!(
            cache.read("u1", chapter),
            Some(LocalCacheEntry { index: 4, timestamp: 1500 })
        );
    }

    #[test]
    fn test_resume_from_cache_leaves_winning_local_entry_untouched() {
        let cache = LocalCache::in_memory();
        let chapter = Uuid::new_v4();
        cache.write("u1", chapter, LocalCacheEntry { index: 4, timestamp: 2000 });

        let resolution = resume_from_cache(&cache, "u1", chapter, server(1, 1500), &ORDERS);

        assert_eq!(resolution.index, 4);
        assert_eq!(
            cache.read("u1", chapter),
            Some(LocalCacheEntry { index: 4, timestamp: 2000 })
        );
    }
}
