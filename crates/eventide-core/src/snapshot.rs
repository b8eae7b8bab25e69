//! Snapshot records and the snapshot store abstraction.
//!
//! Snapshots are a best-effort cache of compacted aggregate state. The event
//! stream stays authoritative: losing or failing to write a snapshot only
//! makes the next load replay more events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Point-in-time serialization of an aggregate's full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Aggregate identifier.
    pub aggregate_id: Uuid,
    /// Aggregate type.
    pub aggregate_type: String,
    /// Aggregate version captured by this snapshot.
    pub version: i64,
    /// When the snapshot was taken.
    #[serde(rename = "timestamp")]
    pub taken_at: DateTime<Utc>,
    /// Serialized aggregate state.
    pub data: serde_json::Value,
}

/// Storage for the latest snapshot per aggregate.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists `snapshot`. A stored snapshot with a higher version is kept.
    ///
    /// # Errors
    ///
    /// `DomainError::SnapshotWriteFailure` or `DomainError::StorageUnavailable`.
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError>;

    /// Returns the most recent snapshot for the aggregate, if any.
    ///
    /// # Errors
    ///
    /// `DomainError::StorageUnavailable` for transient backend failures.
    async fn latest_snapshot(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// One-time backend setup for these aggregate types.
    ///
    /// Backends that keep every snapshot in a shared table need no per-type
    /// setup; for them the list is informational and may only be logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be prepared.
    async fn initialize(&self, _aggregate_types: &[&str]) -> Result<(), DomainError> {
        Ok(())
    }

    /// Fail-fast startup check.
    ///
    /// # Errors
    ///
    /// `DomainError::Configuration` when the backend is unusable.
    async fn validate_configuration(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Snapshot store that never returns a snapshot and discards writes.
///
/// The default for repositories built without snapshot support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSnapshots;

#[async_trait]
impl SnapshotStore for NoSnapshots {
    async fn save_snapshot(&self, _snapshot: &Snapshot) -> Result<(), DomainError> {
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        Ok(None)
    }
}
