//! Aggregate root abstraction and the replay engine.
//!
//! Every aggregate embeds an [`AggregateCore`] carrying identity, version and
//! the queue of uncommitted events, and implements exactly one state
//! transition per event variant in [`AggregateRoot::apply`]. The provided
//! trait methods (`raise`, `load_from_history`) drive those transitions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::command::CommandContext;
use crate::error::DomainError;
use crate::event::{DomainEvent, EventEnvelope, EventMetadata};
use crate::snapshot::Snapshot;

/// Outcome of applying one event to aggregate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The aggregate has a rule for this event and applied it.
    Applied,
    /// The aggregate has no rule for this event; state is unchanged.
    Unhandled,
}

/// What replay does with events the aggregate has no transition for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledEventPolicy {
    /// Log a warning, count the event towards the version and carry on.
    #[default]
    WarnAndContinue,
    /// Abort the load with `DomainError::UnhandledEvent`.
    FailFast,
}

/// Minimal lifecycle shared by all aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No event applied yet (`version == 0`).
    Uninitialized,
    /// At least one event applied.
    Active,
}

/// Version and time of the snapshot an aggregate was last captured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMark {
    /// Aggregate version the snapshot captured.
    pub version: i64,
    /// When it was taken.
    pub taken_at: DateTime<Utc>,
}

/// Engine-owned bookkeeping embedded in every aggregate.
#[derive(Debug, Clone)]
pub struct AggregateCore<E> {
    id: Uuid,
    version: i64,
    uncommitted: Vec<EventEnvelope<E>>,
    last_snapshot: Option<SnapshotMark>,
}

impl<E> AggregateCore<E> {
    /// Creates the core of an empty aggregate.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            uncommitted: Vec::new(),
            last_snapshot: None,
        }
    }

    /// Core of an aggregate rehydrated from a snapshot.
    #[must_use]
    pub fn restored(id: Uuid, mark: SnapshotMark) -> Self {
        Self {
            id,
            version: mark.version,
            uncommitted: Vec::new(),
            last_snapshot: Some(mark),
        }
    }

    /// Aggregate identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of events applied, committed or not.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Events raised but not yet appended.
    #[must_use]
    pub fn uncommitted(&self) -> &[EventEnvelope<E>] {
        &self.uncommitted
    }

    /// The last snapshot this aggregate was loaded from or saved to.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<SnapshotMark> {
        self.last_snapshot
    }

    /// Version the store held before the uncommitted events were raised.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn committed_version(&self) -> i64 {
        self.version - self.uncommitted.len() as i64
    }

    pub(crate) fn mark_committed(&mut self, final_version: i64) {
        self.uncommitted.clear();
        self.version = final_version;
    }

    pub(crate) fn mark_snapshot(&mut self, mark: SnapshotMark) {
        self.last_snapshot = Some(mark);
    }
}

impl<E> Default for AggregateCore<E> {
    fn default() -> Self {
        Self::new(Uuid::nil())
    }
}

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync + Sized {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Stable aggregate type name; the second half of the stream key.
    const AGGREGATE_TYPE: &'static str;

    /// Creates an empty aggregate at version 0.
    fn new(id: Uuid) -> Self;

    /// Engine bookkeeping.
    fn core(&self) -> &AggregateCore<Self::Event>;

    /// Mutable engine bookkeeping.
    fn core_mut(&mut self) -> &mut AggregateCore<Self::Event>;

    /// Deterministic, side-effect-free state transition for one event.
    fn apply(&mut self, event: &Self::Event) -> Transition;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid {
        self.core().id()
    }

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64 {
        self.core().version()
    }

    /// Returns the lifecycle stage.
    fn lifecycle(&self) -> Lifecycle {
        if self.version() == 0 {
            Lifecycle::Uninitialized
        } else {
            Lifecycle::Active
        }
    }

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[EventEnvelope<Self::Event>] {
        self.core().uncommitted()
    }

    /// Applies `event` immediately and queues it for the next save.
    ///
    /// Business operations call this so that logic later in the same operation
    /// observes the new state. Performs no I/O.
    fn raise(&mut self, event: Self::Event, ctx: &CommandContext<'_>) {
        if self.apply(&event) == Transition::Unhandled {
            tracing::debug!(
                aggregate_type = Self::AGGREGATE_TYPE,
                event_type = event.event_type(),
                "raised event has no transition"
            );
        }
        let core = self.core_mut();
        core.version += 1;
        let metadata = EventMetadata {
            event_id: Uuid::new_v4(),
            event_type: event.event_type().to_owned(),
            kind: event.kind().to_owned(),
            aggregate_id: core.id,
            aggregate_type: Self::AGGREGATE_TYPE.to_owned(),
            version: core.version,
            correlation_id: ctx.correlation_id,
            causation_id: ctx.causation_id,
            occurred_at: ctx.clock.now(),
        };
        core.uncommitted.push(EventEnvelope {
            metadata,
            payload: event,
        });
    }

    /// Replays already-durable events in ascending version order.
    ///
    /// Each event advances the version by one whether or not the aggregate
    /// handles it. Nothing is queued as uncommitted. Returns the number of
    /// events replayed.
    ///
    /// # Errors
    ///
    /// `DomainError::StreamCorrupted` if versions are not contiguous with the
    /// current version, `DomainError::UnhandledEvent` under
    /// [`UnhandledEventPolicy::FailFast`].
    fn load_from_history<I>(
        &mut self,
        events: I,
        policy: UnhandledEventPolicy,
    ) -> Result<usize, DomainError>
    where
        I: IntoIterator<Item = EventEnvelope<Self::Event>>,
    {
        let mut replayed = 0;
        for envelope in events {
            let expected = self.version() + 1;
            if envelope.metadata.version != expected {
                return Err(DomainError::StreamCorrupted {
                    aggregate_id: self.aggregate_id(),
                    expected,
                    found: envelope.metadata.version,
                });
            }

            if self.apply(&envelope.payload) == Transition::Unhandled {
                match policy {
                    UnhandledEventPolicy::WarnAndContinue => tracing::warn!(
                        aggregate_type = Self::AGGREGATE_TYPE,
                        aggregate_id = %self.aggregate_id(),
                        event_type = %envelope.metadata.event_type,
                        version = envelope.metadata.version,
                        "skipping event without transition"
                    ),
                    UnhandledEventPolicy::FailFast => {
                        return Err(DomainError::UnhandledEvent {
                            aggregate_type: Self::AGGREGATE_TYPE.to_owned(),
                            event_type: envelope.metadata.event_type,
                        });
                    }
                }
            }

            self.core_mut().version = expected;
            replayed += 1;
        }
        Ok(replayed)
    }

    /// Serializes the aggregate's state for a snapshot.
    ///
    /// # Errors
    ///
    /// `DomainError::Serialization` if the state cannot be encoded.
    fn to_snapshot_data(&self) -> Result<serde_json::Value, DomainError>
    where
        Self: Serialize,
    {
        serde_json::to_value(self)
            .map_err(|e| DomainError::Serialization(format!("snapshot serialization failed: {e}")))
    }

    /// Rehydrates an aggregate from a snapshot.
    ///
    /// # Errors
    ///
    /// `DomainError::Serialization` if the snapshot data does not decode.
    fn restore(snapshot: Snapshot) -> Result<Self, DomainError>
    where
        Self: DeserializeOwned,
    {
        let mut aggregate: Self = serde_json::from_value(snapshot.data).map_err(|e| {
            DomainError::Serialization(format!("snapshot deserialization failed: {e}"))
        })?;
        *aggregate.core_mut() = AggregateCore::restored(
            snapshot.aggregate_id,
            SnapshotMark {
                version: snapshot.version,
                taken_at: snapshot.taken_at,
            },
        );
        Ok(aggregate)
    }
}
