//! Event store database schema.
//!
//! Kept in sync with `migrations/` at the workspace root, which the
//! integration tests apply.

/// SQL to create the stream, event and snapshot tables.
pub const CREATE_EVENT_STORE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS event_streams (
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    UUID NOT NULL,
    version         BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (aggregate_type, aggregate_id)
);

CREATE TABLE IF NOT EXISTS domain_events (
    event_id        UUID PRIMARY KEY,
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    UUID NOT NULL,
    version         BIGINT NOT NULL CHECK (version >= 1),
    event_type      VARCHAR(255) NOT NULL,
    kind            VARCHAR(255) NOT NULL,
    payload         JSONB NOT NULL,
    correlation_id  UUID NOT NULL,
    causation_id    UUID NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    CONSTRAINT domain_events_stream_version_key
        UNIQUE (aggregate_type, aggregate_id, version)
);

CREATE INDEX IF NOT EXISTS idx_domain_events_correlation_id
    ON domain_events (correlation_id);
";

/// SQL to create the snapshot table.
pub const CREATE_SNAPSHOT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS aggregate_snapshots (
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    UUID NOT NULL,
    version         BIGINT NOT NULL CHECK (version >= 1),
    taken_at        TIMESTAMPTZ NOT NULL,
    data            JSONB NOT NULL,
    PRIMARY KEY (aggregate_type, aggregate_id)
);
";

/// Unique constraint that makes each stream version single-writer.
pub(crate) const STREAM_VERSION_CONSTRAINT: &str = "domain_events_stream_version_key";

/// Tables `PgEventStore::validate_configuration` expects to exist.
pub const EVENT_STORE_TABLES: &[&str] = &["event_streams", "domain_events"];

/// Tables `PgSnapshotStore::validate_configuration` expects to exist.
pub const SNAPSHOT_TABLES: &[&str] = &["aggregate_snapshots"];

/// Fails with `StoreError::MissingTable` for the first table in `tables`
/// that does not exist.
pub(crate) async fn ensure_tables(
    pool: &sqlx::PgPool,
    tables: &[&str],
) -> Result<(), crate::error::StoreError> {
    for table in tables {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1::text) IS NOT NULL")
            .bind(*table)
            .fetch_one(pool)
            .await?;
        if !exists {
            return Err(crate::error::StoreError::MissingTable((*table).to_owned()));
        }
    }
    Ok(())
}
