use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use snafu::{Location, Snafu};

use crate::session::SessionId;
use crate::time::Timestamp;

pub use memory::MemoryStore;
pub use surreal::SurrealStore;

mod memory;
mod surreal;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Shared handle to the stats store, constructed once at startup and passed to whoever needs it.
pub type Store = Arc<dyn StatsStore>;

pub const STATS_TABLE: &str = "visitor_stats";
pub const SESSIONS_TABLE: &str = "visitor_sessions";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("cannot connect to the database `{url}` at {location}: {source}"))]
    Connection {
        url: String,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to query the database at {location}: {source}"))]
    Query {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to deserialize the database response at {location}: {source}"))]
    Deserialize {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to subscribe to changes on `{table}` at {location}: {source}"))]
    Subscription {
        table: &'static str,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("store is unavailable for `{operation}`"))]
    Unavailable {
        operation: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
}

/// The kind of an aggregate counter. Each kind has exactly one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    Visitors,
    Views,
}

impl StatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Visitors => "visitors",
            Self::Views => "views",
        }
    }
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub stat_type: StatKind,
    pub count: u64,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub first_visit: Timestamp,
    pub last_visit: Timestamp,
    pub page_views: u64,
}

impl SessionRecord {
    pub fn first(session_id: SessionId, now: Timestamp) -> Self {
        Self {
            session_id,
            first_visit: now,
            last_visit: now,
            page_views: 1,
        }
    }
}

/// A snapshot of the aggregate counters. Missing rows read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub visitors: u64,
    pub views: u64,
}

impl Stats {
    pub fn from_counters(counters: &[CounterRecord]) -> Self {
        counters.iter().fold(Self::default(), |mut stats, counter| {
            match counter.stat_type {
                StatKind::Visitors => stats.visitors = counter.count,
                StatKind::Views => stats.views = counter.count,
            }
            stats
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// Notification that a row of the counters table changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsChange {
    pub action: ChangeAction,
}

pub type ChangeStream = BoxStream<'static, Result<StatsChange>>;

/// Accessor over the hosted data service: the counters table, the sessions table and the atomic increment procedure.
#[async_trait]
pub trait StatsStore: std::fmt::Debug + Send + Sync {
    async fn find_session(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    async fn insert_session(&self, session: &SessionRecord) -> Result<()>;

    /// Overwrite `last_visit` and `page_views` of an existing session.
    async fn touch_session(&self, id: &SessionId, last_visit: Timestamp, page_views: u64) -> Result<()>;

    /// Race-free `+1` on a counter, executed by the data service.
    async fn increment_stat(&self, kind: StatKind) -> Result<()>;

    async fn stat_count(&self, kind: StatKind) -> Result<Option<u64>>;

    async fn set_stat_count(&self, kind: StatKind, count: u64, updated_at: Timestamp) -> Result<()>;

    async fn counters(&self) -> Result<Vec<CounterRecord>>;

    /// Live change notifications on the counters table. Only changes after the call are delivered.
    async fn watch(&self) -> Result<ChangeStream>;
}
