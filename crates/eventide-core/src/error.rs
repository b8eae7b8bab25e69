//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
///
/// Expected outcomes (`AggregateNotFound`, `ConcurrencyConflict`) are ordinary
/// variants so callers can match on them; everything else is either transient
/// (`StorageUnavailable`) or fatal.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Neither a snapshot nor any events exist for the requested identity.
    #[error("aggregate not found: {aggregate_type}/{aggregate_id}")]
    AggregateNotFound {
        /// The aggregate type that was requested.
        aggregate_type: String,
        /// The aggregate that was requested.
        aggregate_id: Uuid,
    },

    /// Optimistic concurrency conflict.
    #[error("conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// The backing store could not be reached. Transient; retry with backoff.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An event or snapshot could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored schema tag has no registered payload type.
    #[error("unregistered event type: {event_type}")]
    UnregisteredEventType {
        /// The unresolved schema tag.
        event_type: String,
    },

    /// The upcaster chain did not terminate within the iteration ceiling.
    #[error("upcasting chain for {event_type} exceeded {limit} steps")]
    UpcastingChainExceeded {
        /// The schema tag the chain started from.
        event_type: String,
        /// The configured ceiling.
        limit: usize,
    },

    /// An individual upcaster rejected its input.
    #[error("upcast from {source_schema} to {target_schema} failed: {reason}")]
    UpcastFailed {
        /// Schema the upcaster reads.
        source_schema: String,
        /// Schema the upcaster writes.
        target_schema: String,
        /// Why the transform failed.
        reason: String,
    },

    /// Replay met an event the aggregate has no transition for, and the
    /// repository is configured to fail fast.
    #[error("aggregate {aggregate_type} has no transition for event {event_type}")]
    UnhandledEvent {
        /// The replaying aggregate type.
        aggregate_type: String,
        /// The event schema tag.
        event_type: String,
    },

    /// Replayed versions were not contiguous.
    #[error("event stream {aggregate_id} is corrupted: expected version {expected}, found {found}")]
    StreamCorrupted {
        /// The aggregate whose stream is broken.
        aggregate_id: Uuid,
        /// The version the replay engine expected next.
        expected: i64,
        /// The version actually read.
        found: i64,
    },

    /// Persisting a snapshot failed. Never escalated by the repository.
    #[error("snapshot write failed: {0}")]
    SnapshotWriteFailure(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// A store or registry is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DomainError {
    /// Returns `true` for errors that may succeed on a later retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Returns `true` for optimistic concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Errors raised while populating the process-wide registries at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two payload types were registered under the same schema tag.
    #[error("event type {0} is already registered")]
    DuplicateEventType(String),

    /// A second upcaster was registered for the same source schema.
    #[error("an upcaster for {0} is already registered")]
    DuplicateUpcaster(String),

    /// An upcaster maps a schema onto itself.
    #[error("upcaster for {0} targets its own source schema")]
    SelfReferencingUpcaster(String),

    /// Following upcasters from a schema eventually revisits it.
    #[error("upcaster chain starting at {0} is cyclic")]
    CyclicUpcasterChain(String),
}

impl From<RegistryError> for DomainError {
    fn from(err: RegistryError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_unavailable_is_transient() {
        assert!(DomainError::StorageUnavailable("connection refused".into()).is_transient());
        assert!(!DomainError::Serialization("bad json".into()).is_transient());
    }

    #[test]
    fn test_conflict_display_includes_versions() {
        let aggregate_id = Uuid::new_v4();
        let err = DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: 2,
            actual: 3,
        };

        assert!(err.is_conflict());
        let msg = err.to_string();
        assert!(msg.contains("expected version 2"));
        assert!(msg.contains("found 3"));
    }

    #[test]
    fn test_registry_error_converts_to_configuration() {
        let err: DomainError = RegistryError::DuplicateUpcaster("person.renamed.v1".into()).into();
        assert!(matches!(
            err,
            DomainError::Configuration(msg) if msg.contains("person.renamed.v1")
        ));
    }
}
