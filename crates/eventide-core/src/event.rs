//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Schema tag used for deserialization routing and upcasting.
    pub event_type: String,
    /// Category label.
    pub kind: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type, the second half of the stream key.
    pub aggregate_type: String,
    /// Position of this event within the aggregate stream, starting at 1.
    pub version: i64,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// Trait that all domain events implement.
///
/// Implementors are typically an enum with one variant per payload struct;
/// each variant reports its own stable schema tag.
pub trait DomainEvent: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Returns the schema tag of this variant.
    fn event_type(&self) -> &'static str;

    /// Returns the category label of this variant.
    fn kind(&self) -> &'static str {
        "domain"
    }

    /// Serializes the variant payload (without the enum wrapper) to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;
}

/// A domain event together with its metadata.
#[derive(Debug, Clone)]
pub struct EventEnvelope<E> {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub payload: E,
}

impl<E> EventEnvelope<E> {
    /// Returns the stream version of this event.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.metadata.version
    }
}

/// Serializes any payload struct to a JSON value, mapping failures into the
/// domain error taxonomy.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if `serde_json` rejects the value.
pub fn payload_to_value<T: Serialize>(payload: &T) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(payload)
        .map_err(|e| DomainError::Serialization(format!("event serialization failed: {e}")))
}
