use futures::StreamExt;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::store::{Stats, StoreError};
use crate::tracker::Tracker;

/// Push updates of the aggregate counters.
///
/// Every change on the counters table triggers a fresh read through [Tracker::stats], whose result is handed to
/// `callback`. Only changes made after this function returns are observed.
pub async fn subscribe<F>(tracker: Tracker, mut callback: F) -> Result<Subscription, StoreError>
where
    F: FnMut(Stats) + Send + 'static,
{
    let mut changes = tracker.store().watch().await?;
    let (quit, mut signal) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = &mut signal => break,

                change = changes.next() => match change {
                    None => {
                        tracing::debug!("stats channel closed");
                        break;
                    }
                    Some(Err(error)) => {
                        tracing::error!(%error, "could not receive stats event");
                    }
                    Some(Ok(change)) => {
                        tracing::debug!(?change.action, "stats changed");
                        let stats = tracker.stats().await;

                        // unsubscribed while the snapshot was being read
                        if !matches!(signal.try_recv(), Err(TryRecvError::Empty)) {
                            break;
                        }

                        callback(stats);
                    }
                },
            }
        }
    });

    Ok(Subscription { quit, handle })
}

/// Handle to a live stats subscription. Dropping it tears the channel down as well.
#[derive(Debug)]
pub struct Subscription {
    quit: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stops the subscription. Once this returns the callback is never invoked again.
    pub async fn unsubscribe(self) {
        let _ = self.quit.send(());
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::store::{MemoryStore, StatKind, StatsStore};

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn push_fresh_snapshots() {
        let store = Arc::new(MemoryStore::with_counters(1, 1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = subscribe(Tracker::new(store.clone()), move |stats| {
            let _ = tx.send(stats);
        })
        .await
        .unwrap();

        store.increment_stat(StatKind::Views).await.unwrap();
        let stats = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(stats, Stats { visitors: 1, views: 2 });

        store.remove_counter(StatKind::Visitors);
        let stats = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(stats, Stats { visitors: 0, views: 2 });

        subscription.unsubscribe().await;
    }

    #[tokio::test]
    async fn changes_before_subscribing_are_not_replayed() {
        let store = Arc::new(MemoryStore::with_counters(1, 1));
        store.set_counter(StatKind::Views, 9);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = subscribe(Tracker::new(store.clone()), move |stats| {
            let _ = tx.send(stats);
        })
        .await
        .unwrap();

        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
        subscription.unsubscribe().await;
    }

    #[tokio::test]
    async fn no_callbacks_after_unsubscribe() {
        let store = Arc::new(MemoryStore::with_counters(1, 1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let subscription = subscribe(Tracker::new(store.clone()), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        subscription.unsubscribe().await;

        for _ in 0..10 {
            store.increment_stat(StatKind::Views).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_listener() {
        let store = Arc::new(MemoryStore::with_counters(1, 1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = subscribe(Tracker::new(store.clone()), move |stats| {
            let _ = tx.send(stats);
        })
        .await
        .unwrap();
        drop(subscription);

        // the listener owns the only sender, so the channel closes once it exits
        let closed = timeout(WAIT, async {
            loop {
                store.increment_stat(StatKind::Views).await.unwrap();
                if rx.recv().await.is_none() {
                    break;
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}
