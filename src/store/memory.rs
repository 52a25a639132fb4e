use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;

use super::*;
use crate::time::now;

/// In-process store used for tests and local runs. Failures of individual operations can be simulated.
#[derive(Debug)]
pub struct MemoryStore {
    sessions: DashMap<SessionId, SessionRecord>,
    counters: DashMap<StatKind, CounterRecord>,
    changes: broadcast::Sender<StatsChange>,

    fail_increments: AtomicBool,
    fail_sessions: AtomicBool,
    fail_counters: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(64);

        Self {
            sessions: DashMap::new(),
            counters: DashMap::new(),
            changes,
            fail_increments: AtomicBool::new(false),
            fail_sessions: AtomicBool::new(false),
            fail_counters: AtomicBool::new(false),
        }
    }
}

impl MemoryStore {
    /// A store with both counter rows provisioned.
    pub fn with_counters(visitors: u64, views: u64) -> Self {
        let store = Self::default();
        store.set_counter(StatKind::Visitors, visitors);
        store.set_counter(StatKind::Views, views);
        store
    }

    /// Make the atomic increment procedure report an error.
    pub fn fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    /// Make every query on the sessions table report an error.
    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Make every read of the counters table report an error.
    pub fn fail_counters(&self, fail: bool) {
        self.fail_counters.store(fail, Ordering::SeqCst);
    }

    /// Out-of-band write to a counter row, creating it if needed.
    pub fn set_counter(&self, kind: StatKind, count: u64) {
        let previous = self.counters.insert(
            kind,
            CounterRecord {
                stat_type: kind,
                count,
                updated_at: now(),
            },
        );

        let action = if previous.is_some() {
            ChangeAction::Update
        } else {
            ChangeAction::Create
        };
        self.notify(action);
    }

    pub fn remove_counter(&self, kind: StatKind) {
        if self.counters.remove(&kind).is_some() {
            self.notify(ChangeAction::Delete);
        }
    }

    pub fn session(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.get(id).map(|session| session.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn counter(&self, kind: StatKind) -> Option<u64> {
        self.counters.get(&kind).map(|counter| counter.count)
    }

    fn notify(&self, action: ChangeAction) {
        // nobody listening is fine
        let _ = self.changes.send(StatsChange { action });
    }

    fn check(flag: &AtomicBool, operation: &'static str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return UnavailableSnafu { operation }.fail();
        }
        Ok(())
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn find_session(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        Self::check(&self.fail_sessions, "find_session")?;
        Ok(self.session(id))
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        Self::check(&self.fail_sessions, "insert_session")?;
        self.sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn touch_session(&self, id: &SessionId, last_visit: Timestamp, page_views: u64) -> Result<()> {
        Self::check(&self.fail_sessions, "touch_session")?;
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_visit = last_visit;
            session.page_views = page_views;
        }
        Ok(())
    }

    async fn increment_stat(&self, kind: StatKind) -> Result<()> {
        Self::check(&self.fail_increments, "increment_stat")?;

        let updated = match self.counters.get_mut(&kind) {
            Some(mut counter) => {
                counter.count += 1;
                counter.updated_at = now();
                true
            }
            None => false,
        };

        if updated {
            self.notify(ChangeAction::Update);
        }
        Ok(())
    }

    async fn stat_count(&self, kind: StatKind) -> Result<Option<u64>> {
        Self::check(&self.fail_counters, "stat_count")?;
        Ok(self.counter(kind))
    }

    async fn set_stat_count(&self, kind: StatKind, count: u64, updated_at: Timestamp) -> Result<()> {
        Self::check(&self.fail_counters, "set_stat_count")?;

        let updated = match self.counters.get_mut(&kind) {
            Some(mut counter) => {
                counter.count = count;
                counter.updated_at = updated_at;
                true
            }
            None => false,
        };

        if updated {
            self.notify(ChangeAction::Update);
        }
        Ok(())
    }

    async fn counters(&self) -> Result<Vec<CounterRecord>> {
        Self::check(&self.fail_counters, "counters")?;

        let mut counters: Vec<CounterRecord> =
            self.counters.iter().map(|counter| counter.value().clone()).collect();
        counters.sort_by_key(|counter| counter.stat_type);
        Ok(counters)
    }

    async fn watch(&self) -> Result<ChangeStream> {
        let receiver = self.changes.subscribe();

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            let change = match receiver.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "change listener lagged behind");
                    StatsChange {
                        action: ChangeAction::Update,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            Some((Ok(change), receiver))
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_missing_counter_is_a_no_op() {
        let store = MemoryStore::default();
        store.increment_stat(StatKind::Views).await.unwrap();
        assert_eq!(store.counter(StatKind::Views), None);
    }

    #[tokio::test]
    async fn simulated_failures() {
        let store = MemoryStore::with_counters(1, 1);

        store.fail_increments(true);
        assert!(store.increment_stat(StatKind::Views).await.is_err());
        assert_eq!(store.stat_count(StatKind::Views).await.unwrap(), Some(1));

        store.fail_sessions(true);
        assert!(store.find_session(&"session_1".into()).await.is_err());

        store.fail_counters(true);
        assert!(store.counters().await.is_err());
        assert!(store.set_stat_count(StatKind::Views, 5, now()).await.is_err());
        assert_eq!(store.counter(StatKind::Views), Some(1));
    }

    #[tokio::test]
    async fn watch_reports_every_kind_of_change() {
        let store = MemoryStore::default();
        let mut changes = store.watch().await.unwrap();

        store.set_counter(StatKind::Views, 1);
        store.increment_stat(StatKind::Views).await.unwrap();
        store.remove_counter(StatKind::Views);

        let actions: Vec<ChangeAction> = changes
            .by_ref()
            .take(3)
            .map(|change| change.unwrap().action)
            .collect()
            .await;

        assert_eq!(
            actions,
            vec![ChangeAction::Create, ChangeAction::Update, ChangeAction::Delete]
        );
    }
}
