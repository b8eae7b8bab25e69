//! `PostgreSQL` implementation of the `EventStore` trait.
//!
//! Each stream has a row in `event_streams` holding its current version. An
//! append locks that row (`SELECT ... FOR UPDATE`) inside the same
//! transaction that inserts the events, so the version check and the write
//! are atomic and concurrent writers to one stream serialize on a single row
//! while other streams proceed in parallel. If the transaction is dropped
//! before commit it rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use eventide_core::error::DomainError;
use eventide_core::store::{EventRecord, EventStore, NewEvent};

use crate::error::StoreError;
use crate::schema;

/// PostgreSQL-backed event store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    event_type: String,
    kind: String,
    payload: sqlx::types::Json<serde_json::Value>,
    correlation_id: Uuid,
    causation_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            version: row.version,
            event_type: row.event_type,
            kind: row.kind,
            payload: row.payload.0,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            occurred_at: row.occurred_at,
        }
    }
}

enum AppendOutcome {
    Appended(i64),
    Conflict(i64),
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<AppendOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO event_streams (aggregate_type, aggregate_id, version)
              VALUES ($1, $2, 0)
              ON CONFLICT (aggregate_type, aggregate_id) DO NOTHING",
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .execute(&mut *tx)
        .await?;

        let actual: i64 = sqlx::query_scalar(
            r"SELECT version FROM event_streams
              WHERE aggregate_type = $1 AND aggregate_id = $2
              FOR UPDATE",
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await?;

        if actual != expected_version {
            tx.rollback().await?;
            return Ok(AppendOutcome::Conflict(actual));
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO domain_events (event_id, aggregate_type, aggregate_id, version, \
             event_type, kind, payload, correlation_id, causation_id, occurred_at) ",
        );
        qb.push_values(
            events.iter().zip(expected_version + 1..),
            |mut b, (event, version)| {
                b.push_bind(event.event_id)
                    .push_bind(aggregate_type.to_owned())
                    .push_bind(aggregate_id)
                    .push_bind(version)
                    .push_bind(event.event_type.clone())
                    .push_bind(event.kind.clone())
                    .push_bind(sqlx::types::Json(event.payload.clone()))
                    .push_bind(event.correlation_id)
                    .push_bind(event.causation_id)
                    .push_bind(event.occurred_at);
            },
        );
        qb.build().execute(&mut *tx).await?;

        let final_version =
            expected_version.saturating_add(i64::try_from(events.len()).unwrap_or(i64::MAX));
        sqlx::query(
            r"UPDATE event_streams SET version = $1
              WHERE aggregate_type = $2 AND aggregate_id = $3",
        )
        .bind(final_version)
        .bind(aggregate_type)
        .bind(aggregate_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AppendOutcome::Appended(final_version))
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<i64, DomainError> {
        if events.is_empty() {
            return Ok(expected_version);
        }

        let actual = match self
            .try_append(aggregate_id, aggregate_type, expected_version, events)
            .await
        {
            Ok(AppendOutcome::Appended(version)) => return Ok(version),
            Ok(AppendOutcome::Conflict(actual)) => actual,
            // Rows written outside this store can still collide on the
            // unique (type, id, version) constraint. A reused event id is
            // not a conflict and falls through as a validation error.
            Err(e) if e.is_stream_version_violation() => {
                self.current_version(aggregate_id, aggregate_type).await?
            }
            Err(e) => return Err(e.into()),
        };

        debug!(expected_version, actual, "append rejected");
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: expected_version,
            actual,
        })
    }

    async fn load_events(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        from_version: i64,
    ) -> Result<Vec<EventRecord>, DomainError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT event_id, aggregate_id, aggregate_type, version, event_type, kind,
                     payload, correlation_id, causation_id, occurred_at
              FROM domain_events
              WHERE aggregate_type = $1 AND aggregate_id = $2 AND version > $3
              ORDER BY version ASC",
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .bind(from_version)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows.into_iter().map(EventRecord::from).collect())
    }

    async fn current_version(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<i64, DomainError> {
        let version: i64 = sqlx::query_scalar(
            r"SELECT COALESCE(MAX(version), 0)::BIGINT FROM domain_events
              WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(version)
    }

    async fn initialize(&self, aggregate_types: &[&str]) -> Result<(), DomainError> {
        sqlx::raw_sql(schema::CREATE_EVENT_STORE_TABLES)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        info!(?aggregate_types, "event store initialized");
        Ok(())
    }

    async fn validate_configuration(&self) -> Result<(), DomainError> {
        schema::ensure_tables(&self.pool, schema::EVENT_STORE_TABLES).await?;
        Ok(())
    }
}
