use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::session::SessionId;
use crate::store::Stats;
use crate::subscriber::{self, Subscription};
use crate::tracker::Tracker;

/// What a stats widget renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayState {
    pub stats: Stats,
    pub loading: bool,
}

impl DisplayState {
    pub fn loading() -> Self {
        Self {
            stats: Stats::default(),
            loading: true,
        }
    }

    pub fn loaded(stats: Stats) -> Self {
        Self {
            stats,
            loading: false,
        }
    }
}

/// State sink behind a visitor counter widget. It computes nothing itself.
///
/// Dropping the display tears down its subscription just like [StatsDisplay::unmount].
#[derive(Debug)]
pub struct StatsDisplay {
    state: Arc<watch::Sender<DisplayState>>,
    subscription: Option<Subscription>,
}

impl StatsDisplay {
    /// Tracks the visit, loads the counters, then keeps the state in sync with pushed updates.
    pub async fn mount(tracker: Tracker, session_id: &SessionId) -> Self {
        let state = Arc::new(watch::Sender::new(DisplayState::loading()));

        tracker.track(session_id).await;
        let stats = tracker.stats().await;
        state.send_replace(DisplayState::loaded(stats));

        let sink = state.clone();
        let subscription = subscriber::subscribe(tracker, move |stats| {
            sink.send_replace(DisplayState::loaded(stats));
        })
        .await;

        let subscription = match subscription {
            Ok(subscription) => Some(subscription),
            Err(error) => {
                tracing::warn!(%error, "live stats are unavailable, showing a static snapshot");
                None
            }
        };

        Self { state, subscription }
    }

    pub fn state(&self) -> DisplayState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<DisplayState> {
        self.state.subscribe()
    }

    pub async fn unmount(self) {
        if let Some(subscription) = self.subscription {
            subscription.unsubscribe().await;
        }
    }
}
