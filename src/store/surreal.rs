use async_trait::async_trait;
use futures::StreamExt;
use snafu::ResultExt;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::opt::QueryResult;
use surrealdb::{Action, Notification, Surreal};

use super::*;
use crate::config::SurrealConfig;

const SCHEMA: &str = include_str!("../../schema.surrealql");

/// Stats store backed by SurrealDB.
///
/// The connection is opened by [SurrealStore::connect] and closed when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct SurrealStore {
    database: Surreal<Any>,
}

impl SurrealStore {
    /// Connects to the database, signs in when credentials are configured and applies the schema.
    ///
    /// Any address understood by [surrealdb::engine::any] works, including `mem://` for an embedded store.
    pub async fn connect(config: &SurrealConfig) -> Result<Self> {
        let url = config.url.clone();

        let database = surrealdb::engine::any::connect(url.as_str())
            .await
            .context(ConnectionSnafu { url: url.clone() })?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            database
                .signin(Root { username, password })
                .await
                .context(ConnectionSnafu { url: url.clone() })?;
        }

        database
            .use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .context(ConnectionSnafu { url: url.clone() })?;

        let store = Self { database };
        store.sql(SCHEMA).execute().await?;

        tracing::info!(%url, namespace = %config.namespace, database = %config.database, "connected to the stats store");
        Ok(store)
    }

    /// Create a builder to execute arbitrary SurrealQL on the database.
    ///
    /// ```ignore
    /// let count: Option<u64> = store
    ///     .sql("SELECT VALUE count FROM visitor_stats WHERE stat_type = $stat_type LIMIT 1")
    ///     .bind(("stat_type", "views"))
    ///     .fetch()
    ///     .await?;
    /// ```
    fn sql(&self, query: &str) -> Query<'_> {
        Query {
            query: self.database.query(query),
        }
    }
}

struct Query<'a> {
    query: surrealdb::method::Query<'a, Any>,
}

impl Query<'_> {
    fn bind(mut self, params: impl serde::Serialize) -> Self {
        let query = self.query;
        self.query = query.bind(params);
        self
    }

    /// Run the statements and fail if any of them failed.
    async fn execute(self) -> Result<()> {
        let response = self.query.await.context(QuerySnafu)?;
        response.check().context(QuerySnafu)?;
        Ok(())
    }

    /// Run the statements and deserialize the result of the first one.
    async fn fetch<T: serde::de::DeserializeOwned>(self) -> Result<T>
    where
        usize: QueryResult<T>,
    {
        let mut statements = self.query.await.context(QuerySnafu)?;
        let result = statements.take::<T>(0).context(DeserializeSnafu)?;
        Ok(result)
    }
}

#[async_trait]
impl StatsStore for SurrealStore {
    async fn find_session(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        self.sql("SELECT session_id, first_visit, last_visit, page_views FROM visitor_sessions WHERE session_id = $session_id LIMIT 1")
            .bind(("session_id", id.to_string()))
            .fetch()
            .await
    }

    async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        self.sql("CREATE visitor_sessions CONTENT $record")
            .bind(("record", session.clone()))
            .execute()
            .await
    }

    async fn touch_session(&self, id: &SessionId, last_visit: Timestamp, page_views: u64) -> Result<()> {
        self.sql("UPDATE visitor_sessions SET last_visit = $last_visit, page_views = $page_views WHERE session_id = $session_id")
            .bind(("session_id", id.to_string()))
            .bind(("last_visit", last_visit))
            .bind(("page_views", page_views))
            .execute()
            .await
    }

    async fn increment_stat(&self, kind: StatKind) -> Result<()> {
        self.sql("RETURN fn::increment_stat($stat_type)")
            .bind(("stat_type", kind.as_str()))
            .execute()
            .await
    }

    async fn stat_count(&self, kind: StatKind) -> Result<Option<u64>> {
        self.sql("SELECT VALUE count FROM visitor_stats WHERE stat_type = $stat_type LIMIT 1")
            .bind(("stat_type", kind.as_str()))
            .fetch()
            .await
    }

    async fn set_stat_count(&self, kind: StatKind, count: u64, updated_at: Timestamp) -> Result<()> {
        self.sql("UPDATE visitor_stats SET count = $count, updated_at = $updated_at WHERE stat_type = $stat_type")
            .bind(("stat_type", kind.as_str()))
            .bind(("count", count))
            .bind(("updated_at", updated_at))
            .execute()
            .await
    }

    async fn counters(&self) -> Result<Vec<CounterRecord>> {
        self.sql("SELECT stat_type, count, updated_at FROM visitor_stats ORDER BY stat_type")
            .fetch()
            .await
    }

    async fn watch(&self) -> Result<ChangeStream> {
        let stream = self
            .database
            .select::<Vec<serde_json::Value>>(STATS_TABLE)
            .live()
            .into_owned()
            .await
            .context(SubscriptionSnafu { table: STATS_TABLE })?;

        let changes = stream.map(|notification| -> Result<StatsChange> {
            let Notification { action, .. } = notification.context(QuerySnafu)?;

            let action = match action {
                Action::Create => ChangeAction::Create,
                Action::Delete => ChangeAction::Delete,
                _ => ChangeAction::Update,
            };

            Ok(StatsChange { action })
        });

        Ok(changes.boxed())
    }
}
