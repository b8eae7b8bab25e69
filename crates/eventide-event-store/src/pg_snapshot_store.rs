//! `PostgreSQL` implementation of the `SnapshotStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use eventide_core::error::DomainError;
use eventide_core::snapshot::{Snapshot, SnapshotStore};

use crate::error::StoreError;
use crate::schema;

/// PostgreSQL-backed snapshot store holding one row per stream.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    taken_at: DateTime<Utc>,
    data: sqlx::types::Json<serde_json::Value>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            version: row.version,
            taken_at: row.taken_at,
            data: row.data.0,
        }
    }
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    /// Upserts the stream's snapshot. An older snapshot never replaces a
    /// newer one.
    #[tracing::instrument(
        skip(self, snapshot),
        fields(aggregate_id = %snapshot.aggregate_id, version = snapshot.version)
    )]
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        sqlx::query(
            r"INSERT INTO aggregate_snapshots
                (aggregate_type, aggregate_id, version, taken_at, data)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE
              SET version = excluded.version,
                  taken_at = excluded.taken_at,
                  data = excluded.data
              WHERE excluded.version >= aggregate_snapshots.version",
        )
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.aggregate_id)
        .bind(snapshot.version)
        .bind(snapshot.taken_at)
        .bind(sqlx::types::Json(&snapshot.data))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::SnapshotWriteFailure(e.to_string()))?;
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r"SELECT aggregate_id, aggregate_type, version, taken_at, data
              FROM aggregate_snapshots
              WHERE aggregate_type = $1 AND aggregate_id = $2",
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(row.map(Snapshot::from))
    }

    async fn initialize(&self, aggregate_types: &[&str]) -> Result<(), DomainError> {
        sqlx::raw_sql(schema::CREATE_SNAPSHOT_TABLE)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        tracing::info!(?aggregate_types, "snapshot store initialized");
        Ok(())
    }

    async fn validate_configuration(&self) -> Result<(), DomainError> {
        schema::ensure_tables(&self.pool, schema::SNAPSHOT_TABLES).await?;
        Ok(())
    }
}
