//! Event store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifies one event stream: an aggregate of a given type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Aggregate identifier.
    pub aggregate_id: Uuid,
}

impl StreamKey {
    /// Creates a stream key.
    #[must_use]
    pub fn new(aggregate_type: impl Into<String>, aggregate_id: Uuid) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id,
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.aggregate_id)
    }
}

/// An event ready to be appended. The store assigns its version.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Schema tag.
    pub event_type: String,
    /// Category label.
    pub kind: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl NewEvent {
    /// Turns this event into the persisted record at `version` of the stream.
    #[must_use]
    pub fn into_record(self, key: &StreamKey, version: i64) -> EventRecord {
        EventRecord {
            event_id: self.event_id,
            aggregate_id: key.aggregate_id,
            aggregate_type: key.aggregate_type.clone(),
            version,
            event_type: self.event_type,
            kind: self.kind,
            payload: self.payload,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            occurred_at: self.occurred_at,
        }
    }
}

/// Persisted representation of a domain event.
///
/// `(aggregate_id, aggregate_type, version)` is unique and versions within a
/// stream are contiguous from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type this event belongs to.
    pub aggregate_type: String,
    /// Position within the aggregate stream.
    pub version: i64,
    /// Schema tag for deserialization routing.
    pub event_type: String,
    /// Category label.
    pub kind: String,
    /// Serialized event payload.
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    #[serde(rename = "timestamp")]
    pub occurred_at: DateTime<Utc>,
}

/// Append-only, per-stream event storage with optimistic concurrency.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` to the stream if its current version equals
    /// `expected_version`, assigning versions `expected_version + 1..`.
    ///
    /// All events are persisted or none are. Returns the stream's new version.
    ///
    /// # Errors
    ///
    /// `DomainError::ConcurrencyConflict` when the stream has moved on,
    /// `DomainError::StorageUnavailable` for transient backend failures.
    async fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<i64, DomainError>;

    /// Loads every event with `version > from_version`, ascending.
    ///
    /// # Errors
    ///
    /// `DomainError::StorageUnavailable` for transient backend failures.
    async fn load_events(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        from_version: i64,
    ) -> Result<Vec<EventRecord>, DomainError>;

    /// Returns the version of the newest event in the stream, or 0.
    ///
    /// # Errors
    ///
    /// `DomainError::StorageUnavailable` for transient backend failures.
    async fn current_version(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<i64, DomainError> {
        let events = self.load_events(aggregate_id, aggregate_type, 0).await?;
        Ok(events.last().map_or(0, |record| record.version))
    }

    /// One-time setup of whatever the backend needs for these aggregate types.
    ///
    /// Backends that keep every stream in shared tables need no per-type
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
