//! Aggregate repository.
//!
//! Loads aggregates from the latest snapshot plus the event tail after it, and
//! saves them by appending their uncommitted events under an optimistic
//! version check. The repository owns no data of its own.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregate::{AggregateRoot, SnapshotMark, UnhandledEventPolicy};
use crate::cancel::{CancellationToken, run_cancellable};
use crate::clock::{Clock, SystemClock};
use crate::error::{DomainError, RegistryError};
use crate::event::{DomainEvent, EventEnvelope};
use crate::policy::{SnapshotContext, SnapshotPolicy};
use crate::publisher::{EventPublisher, NoopPublisher};
use crate::registry::EventTypeRegistry;
use crate::snapshot::{NoSnapshots, Snapshot, SnapshotStore};
use crate::store::{EventRecord, EventStore, NewEvent, StreamKey};
use crate::upcast::UpcasterRegistry;

/// Converts an uncommitted envelope into an append request.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the payload cannot be encoded.
pub fn to_new_event<E: DomainEvent>(envelope: &EventEnvelope<E>) -> Result<NewEvent, DomainError> {
    let meta = &envelope.metadata;
    Ok(NewEvent {
        event_id: meta.event_id,
        event_type: meta.event_type.clone(),
        kind: meta.kind.clone(),
        payload: envelope.payload.to_payload()?,
        correlation_id: meta.correlation_id,
        causation_id: meta.causation_id,
        occurred_at: meta.occurred_at,
    })
}

/// Repository for one aggregate type.
pub struct AggregateRepository<A: AggregateRoot> {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    snapshot_policy: SnapshotPolicy,
    event_types: Arc<EventTypeRegistry<A::Event>>,
    upcasters: Arc<UpcasterRegistry>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    unhandled_events: UnhandledEventPolicy,
}

impl<A> AggregateRepository<A>
where
    A: AggregateRoot + Serialize + DeserializeOwned,
{
    /// Creates a repository without snapshots, upcasters or publishing.
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, event_types: Arc<EventTypeRegistry<A::Event>>) -> Self {
        Self {
            events,
            snapshots: Arc::new(NoSnapshots),
            snapshot_policy: SnapshotPolicy::Never,
            event_types,
            upcasters: Arc::new(UpcasterRegistry::new()),
            publisher: Arc::new(NoopPublisher),
            clock: Arc::new(SystemClock),
            unhandled_events: UnhandledEventPolicy::default(),
        }
    }

    /// Enables snapshots, written whenever `policy` says so.
    #[must_use]
    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>, policy: SnapshotPolicy) -> Self {
        self.snapshots = store;
        self.snapshot_policy = policy;
        self
    }

    /// Upcasts every loaded record through `upcasters` before decoding.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::CyclicUpcasterChain` if the registry's
    /// transitions contain a cycle.
    pub fn with_upcasters(
        mut self,
        upcasters: Arc<UpcasterRegistry>,
    ) -> Result<Self, RegistryError> {
        upcasters.validate()?;
        self.upcasters = upcasters;
        Ok(self)
    }

    /// Hands committed events to `publisher` after each save.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Overrides the clock used for snapshot timestamps and interval checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Chooses how replay treats events the aggregate has no transition for.
    #[must_use]
    pub fn with_unhandled_event_policy(mut self, policy: UnhandledEventPolicy) -> Self {
        self.unhandled_events = policy;
        self
    }

    /// Loads an aggregate.
    ///
    /// # Errors
    ///
    /// `DomainError::AggregateNotFound` if neither a snapshot nor any event
    /// exists, otherwise any store, upcasting or decoding error.
    pub async fn get_by_id(&self, id: Uuid) -> Result<A, DomainError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: A::AGGREGATE_TYPE.to_owned(),
                aggregate_id: id,
            })
    }

    /// Like [`AggregateRepository::get_by_id`], honouring `token`.
    ///
    /// # Errors
    ///
    /// `DomainError::Cancelled` if the token fires first.
    pub async fn get_by_id_cancellable(
        &self,
        id: Uuid,
        token: &CancellationToken,
    ) -> Result<A, DomainError> {
        run_cancellable(token, self.get_by_id(id)).await
    }

    /// Loads an aggregate, returning `None` when it has never been saved.
    ///
    /// # Errors
    ///
    /// Any store, upcasting or decoding error.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<A>, DomainError> {
        let (mut aggregate, from_version) = match self.load_snapshot(id).await {
            Some(aggregate) => {
                let version = aggregate.version();
                (aggregate, Some(version))
            }
            None => (A::new(id), None),
        };

        let records = self
            .events
            .load_events(id, A::AGGREGATE_TYPE, from_version.unwrap_or(0))
            .await?;

        if from_version.is_none() && records.is_empty() {
            return Ok(None);
        }

        let envelopes = records
            .into_iter()
            .map(|record| {
                let record = self.upcasters.upcast_to_latest(record)?;
                self.event_types.decode(record)
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let replayed = aggregate.load_from_history(envelopes, self.unhandled_events)?;
        debug!(
            snapshot_version = from_version,
            replayed,
            version = aggregate.version(),
            "aggregate loaded"
        );
        Ok(Some(aggregate))
    }

    /// Appends the aggregate's uncommitted events.
    ///
    /// Does nothing if there are none. On success the uncommitted queue is
    /// cleared, the version advanced, a snapshot taken if the policy asks for
    /// one, and the committed events handed to the publisher.
    ///
    /// # Errors
    ///
    /// `DomainError::ConcurrencyConflict` if another writer got there first;
    /// the aggregate is left untouched so the caller can reload and retry.
    pub async fn save(&self, aggregate: &mut A) -> Result<(), DomainError> {
        self.save_inner(aggregate, None).await
    }

    /// Like [`AggregateRepository::save`], honouring `token` until the append
    /// completes. A cancelled append writes nothing.
    ///
    /// # Errors
    ///
    /// `DomainError::Cancelled` if the token fires before the append finished.
    pub async fn save_cancellable(
        &self,
        aggregate: &mut A,
        token: &CancellationToken,
    ) -> Result<(), DomainError> {
        self.save_inner(aggregate, Some(token)).await
    }

    #[tracing::instrument(
        skip(self, aggregate, cancel),
        fields(aggregate_type = A::AGGREGATE_TYPE, aggregate_id = %aggregate.aggregate_id())
    )]
    async fn save_inner(
        &self,
        aggregate: &mut A,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), DomainError> {
        if aggregate.uncommitted_events().is_empty() {
            return Ok(());
        }

        let id = aggregate.aggregate_id();
        let expected_version = aggregate.core().committed_version();
        let new_events = aggregate
            .uncommitted_events()
            .iter()
            .map(to_new_event)
            .collect::<Result<Vec<_>, DomainError>>()?;

        let append = self
            .events
            .append(id, A::AGGREGATE_TYPE, expected_version, &new_events);
        let final_version = match cancel {
            Some(token) => run_cancellable(token, append).await?,
            None => append.await?,
        };

        let key = StreamKey::new(A::AGGREGATE_TYPE, id);
        let committed: Vec<EventRecord> = new_events
            .into_iter()
            .zip(expected_version + 1..)
            .map(|(event, version)| event.into_record(&key, version))
            .collect();
        aggregate.core_mut().mark_committed(final_version);
        debug!(
            expected_version,
            final_version,
            count = committed.len(),
            "events appended"
        );

        self.maybe_snapshot(aggregate).await;

        if let Err(e) = self.publisher.publish(&committed).await {
            warn!(error = %e, "publishing committed events failed");
        }
        Ok(())
    }

    async fn load_snapshot(&self, id: Uuid) -> Option<A> {
        let snapshot = match self.snapshots.latest_snapshot(id, A::AGGREGATE_TYPE).await {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                warn!(
                    aggregate_id = %id,
                    error = %e,
                    "snapshot read failed; replaying full stream"
                );
                return None;
            }
        };
        let version = snapshot.version;
        match A::restore(snapshot) {
            Ok(aggregate) => Some(aggregate),
            Err(e) => {
                warn!(
                    aggregate_id = %id,
                    snapshot_version = version,
                    error = %e,
                    "snapshot unreadable; replaying full stream"
                );
                None
            }
        }
    }

    async fn maybe_snapshot(&self, aggregate: &mut A) {
        let mark = aggregate.core().last_snapshot();
        let since = aggregate.version() - mark.map_or(0, |m| m.version);
        let now = self.clock.now();
        let ctx = SnapshotContext {
            events_since_last_snapshot: u64::try_from(since).unwrap_or(0),
            last_snapshot_at: mark.map(|m| m.taken_at),
            now,
        };
        if !self.snapshot_policy.should_snapshot(&ctx) {
            return;
        }

        let data = match aggregate.to_snapshot_data() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "snapshot serialization failed");
                return;
            }
        };
        let snapshot = Snapshot {
            aggregate_id: aggregate.aggregate_id(),
            aggregate_type: A::AGGREGATE_TYPE.to_owned(),
            version: aggregate.version(),
            taken_at: now,
            data,
        };

        match self.snapshots.save_snapshot(&snapshot).await {
            Ok(()) => {
                debug!(version = snapshot.version, "snapshot stored");
                aggregate.core_mut().mark_snapshot(SnapshotMark {
                    version: snapshot.version,
                    taken_at: now,
                });
            }
            Err(e) => warn!(version = snapshot.version, error = %e, "snapshot write failed"),
        }
    }
}

impl<A: AggregateRoot> std::fmt::Debug for AggregateRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("aggregate_type", &A::AGGREGATE_TYPE)
            .field("snapshot_policy", &self.snapshot_policy)
            .field("event_types", &self.event_types)
            .field("upcasters", &self.upcasters)
            .field("unhandled_events", &self.unhandled_events)
            .finish_non_exhaustive()
    }
}
