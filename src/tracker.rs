use derive_new::new;
use tracing::instrument;

use crate::session::SessionId;
use crate::store::{SessionRecord, StatKind, Stats, Store};
use crate::time::now;

/// Records page views against the stats store.
///
/// Every data-access failure is logged and swallowed. Callers only ever notice that the counters did not move.
#[derive(Debug, Clone, new)]
pub struct Tracker {
    store: Store,
}

impl Tracker {
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Count one page view of `session_id`, and one visitor if the session has never been seen before.
    #[instrument(skip(self))]
    pub async fn track(&self, session_id: &SessionId) {
        let existing = match self.store.find_session(session_id).await {
            Ok(existing) => existing,
            Err(error) => {
                tracing::error!(%error, "could not fetch session");
                return;
            }
        };

        match existing {
            Some(session) => {
                let page_views = session.page_views.saturating_add(1);

                if let Err(error) = self.store.touch_session(session_id, now(), page_views).await {
                    tracing::error!(%error, "could not update session");
                    return;
                }

                tracing::debug!(page_views, "returning session");
                self.increment(StatKind::Views).await;
            }
            None => {
                let session = SessionRecord::first(session_id.clone(), now());

                if let Err(error) = self.store.insert_session(&session).await {
                    tracing::error!(%error, "could not insert session");
                    return;
                }

                tracing::info!("new visitor");
                tokio::join!(
                    self.increment(StatKind::Visitors),
                    self.increment(StatKind::Views)
                );
            }
        }
    }

    /// Read the current counters. Errors read as all-zero stats.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Stats {
        match self.store.counters().await {
            Ok(counters) => Stats::from_counters(&counters),
            Err(error) => {
                tracing::error!(%error, "could not fetch visitor stats");
                Stats::default()
            }
        }
    }

    /// Atomic increment through the store, falling back to read-then-write when the store rejects it.
    ///
    /// The fallback races with concurrent writers and can lose updates.
    async fn increment(&self, kind: StatKind) {
        let Err(error) = self.store.increment_stat(kind).await else {
            return;
        };

        tracing::warn!(%error, %kind, "atomic increment failed, falling back to read-then-write");

        let count = match self.store.stat_count(kind).await {
            Ok(Some(count)) => count,
            Ok(None) => {
                tracing::warn!(%kind, "counter row is missing, nothing to increment");
                return;
            }
            Err(error) => {
                tracing::warn!(%error, %kind, "could not read counter");
                return;
            }
        };

        if let Err(error) = self.store.set_stat_count(kind, count.saturating_add(1), now()).await {
            tracing::warn!(%error, %kind, "could not write counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::store::{MemoryStore, StatsStore};
    use crate::time::Timestamp;

    fn tracker(store: &Arc<MemoryStore>) -> Tracker {
        Tracker::new(store.clone())
    }

    fn stats(visitors: u64, views: u64) -> Stats {
        Stats { visitors, views }
    }

    fn hour_ago() -> Timestamp {
        (*now() - Duration::hours(1)).into()
    }

    #[tokio::test]
    async fn new_session_counts_a_visitor_and_a_view() {
        let store = Arc::new(MemoryStore::with_counters(10, 20));
        let tracker = tracker(&store);
        let id = SessionId::from("session_1_a");

        tracker.track(&id).await;

        assert_eq!(tracker.stats().await, stats(11, 21));
        assert_eq!(store.session_count(), 1);

        let session = store.session(&id).unwrap();
        assert_eq!(session.page_views, 1);
        assert_eq!(session.first_visit, session.last_visit);
    }

    #[tokio::test]
    async fn returning_session_counts_only_a_view() {
        let store = Arc::new(MemoryStore::with_counters(10, 20));
        let id = SessionId::from("session_1_a");

        let mut existing = SessionRecord::first(id.clone(), hour_ago());
        existing.page_views = 5;
        store.insert_session(&existing).await.unwrap();

        tracker(&store).track(&id).await;

        let session = store.session(&id).unwrap();
        assert_eq!(session.page_views, 6);
        assert_eq!(session.first_visit, existing.first_visit);
        assert!(session.last_visit > existing.last_visit);
        assert_eq!(tracker(&store).stats().await, stats(10, 21));
    }

    #[tokio::test]
    async fn second_observation_adds_exactly_one_view() {
        let store = Arc::new(MemoryStore::with_counters(0, 0));
        let tracker = tracker(&store);
        let id = SessionId::from("session_1_a");

        tracker.track(&id).await;
        let first = store.session(&id).unwrap();

        tracker.track(&id).await;
        let second = store.session(&id).unwrap();

        assert_eq!(second.page_views, first.page_views + 1);
        assert_eq!(second.first_visit, first.first_visit);
        assert!(second.last_visit >= first.last_visit);
        assert_eq!(tracker.stats().await, stats(1, 2));
    }

    #[tokio::test]
    async fn fallback_keeps_counts_correct_for_a_single_writer() {
        let store = Arc::new(MemoryStore::with_counters(10, 20));
        store.fail_increments(true);
        let tracker = tracker(&store);

        tracker.track(&SessionId::from("session_1_a")).await;
        tracker.track(&SessionId::from("session_1_a")).await;
        tracker.track(&SessionId::from("session_2_b")).await;

        assert_eq!(tracker.stats().await, stats(12, 23));
    }

    #[tokio::test]
    async fn fallback_skips_missing_counters() {
        let store = Arc::new(MemoryStore::default());
        store.set_counter(StatKind::Views, 3);
        store.fail_increments(true);

        tracker(&store).track(&SessionId::from("session_1_a")).await;

        assert_eq!(store.counter(StatKind::Visitors), None);
        assert_eq!(store.counter(StatKind::Views), Some(4));
    }

    #[tokio::test]
    async fn failed_fallback_leaves_counters_untouched() {
        let store = Arc::new(MemoryStore::with_counters(10, 20));
        store.fail_increments(true);
        store.fail_counters(true);

        tracker(&store).track(&SessionId::from("session_1_a")).await;

        assert_eq!(store.counter(StatKind::Visitors), Some(10));
        assert_eq!(store.counter(StatKind::Views), Some(20));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn page_views_saturate() {
        let store = Arc::new(MemoryStore::with_counters(0, 0));
        let id = SessionId::from("session_1_a");

        let mut existing = SessionRecord::first(id.clone(), hour_ago());
        existing.page_views = u64::MAX;
        store.insert_session(&existing).await.unwrap();

        tracker(&store).track(&id).await;

        assert_eq!(store.session(&id).unwrap().page_views, u64::MAX);
        assert_eq!(store.counter(StatKind::Views), Some(1));
    }

    #[tokio::test]
    async fn session_errors_leave_counters_untouched() {
        let store = Arc::new(MemoryStore::with_counters(10, 20));
        store.fail_sessions(true);
        let tracker = tracker(&store);

        tracker.track(&SessionId::from("session_1_a")).await;

        assert_eq!(tracker.stats().await, stats(10, 20));
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn empty_counters_read_as_zero() {
        let store = Arc::new(MemoryStore::default());
        assert_eq!(tracker(&store).stats().await, stats(0, 0));
    }

    #[tokio::test]
    async fn read_errors_read_as_zero() {
        let store = Arc::new(MemoryStore::with_counters(10, 20));
        store.fail_counters(true);
        assert_eq!(tracker(&store).stats().await, stats(0, 0));
    }
}
