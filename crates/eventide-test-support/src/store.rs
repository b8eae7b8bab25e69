//! Test event and snapshot stores.

use std::sync::Mutex;

use async_trait::async_trait;
use eventide_core::error::DomainError;
use eventide_core::snapshot::{Snapshot, SnapshotStore};
use eventide_core::store::{EventRecord, EventStore, NewEvent};
use uuid::Uuid;

/// One call to `EventStore::append`, as seen by [`RecordingEventStore`].
#[derive(Debug, Clone)]
pub struct AppendCall {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub expected_version: i64,
    pub events: Vec<NewEvent>,
}

/// Wraps another store and records every append and every `from_version`
/// passed to `load_events`.
#[derive(Debug)]
pub struct RecordingEventStore<S> {
    inner: S,
    appends: Mutex<Vec<AppendCall>>,
    loads: Mutex<Vec<i64>>,
}

impl<S: EventStore> RecordingEventStore<S> {
    /// Records calls before forwarding them to `inner`.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            appends: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
        }
    }

    /// All appends seen so far, including rejected ones.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appends(&self) -> Vec<AppendCall> {
        self.appends.lock().unwrap().clone()
    }

    /// The `from_version` of every `load_events` call so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn loads(&self) -> Vec<i64> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl<S: EventStore> EventStore for RecordingEventStore<S> {
    async fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<i64, DomainError> {
        self.appends.lock().unwrap().push(AppendCall {
            aggregate_id,
            aggregate_type: aggregate_type.to_owned(),
            expected_version,
            events: events.to_vec(),
        });
        self.inner
            .append(aggregate_id, aggregate_type, expected_version, events)
            .await
    }

    async fn load_events(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        from_version: i64,
    ) -> Result<Vec<EventRecord>, DomainError> {
        self.loads.lock().unwrap().push(from_version);
        self.inner
            .load_events(aggregate_id, aggregate_type, from_version)
            .await
    }
}

/// An event store with no events that accepts every append. Useful for
/// "aggregate not found" scenarios.
#[derive(Debug)]
pub struct EmptyEventStore;

#[async_trait]
impl EventStore for EmptyEventStore {
    async fn append(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
        expected_version: i64,
        events: &[NewEvent],
    ) -> Result<i64, DomainError> {
        Ok(expected_version + i64::try_from(events.len()).unwrap_or(i64::MAX))
    }

    async fn load_events(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
        _from_version: i64,
    ) -> Result<Vec<EventRecord>, DomainError> {
        Ok(vec![])
    }
}

/// An event store whose backend is always unreachable.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
        _expected_version: i64,
        _events: &[NewEvent],
    ) -> Result<i64, DomainError> {
        Err(DomainError::StorageUnavailable("connection refused".into()))
    }

    async fn load_events(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
        _from_version: i64,
    ) -> Result<Vec<EventRecord>, DomainError> {
        Err(DomainError::StorageUnavailable("connection refused".into()))
    }
}

/// An event store whose appends never complete. Loads return nothing.
#[derive(Debug)]
pub struct PendingEventStore;

#[async_trait]
impl EventStore for PendingEventStore {
    async fn append(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
        _expected_version: i64,
        _events: &[NewEvent],
    ) -> Result<i64, DomainError> {
        std::future::pending().await
    }

    async fn load_events(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
        _from_version: i64,
    ) -> Result<Vec<EventRecord>, DomainError> {
        Ok(vec![])
    }
}

/// A snapshot store that fails every read and write, counting the writes.
#[derive(Debug, Default)]
pub struct FailingSnapshotStore {
    writes: Mutex<usize>,
}

impl FailingSnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_snapshot` calls attempted.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempted_writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn save_snapshot(&self, _snapshot: &Snapshot) -> Result<(), DomainError> {
        *self.writes.lock().unwrap() += 1;
        Err(DomainError::SnapshotWriteFailure("disk full".into()))
    }

    async fn latest_snapshot(
        &self,
        _aggregate_id: Uuid,
        _aggregate_type: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        Err(DomainError::StorageUnavailable("connection refused".into()))
    }
}
