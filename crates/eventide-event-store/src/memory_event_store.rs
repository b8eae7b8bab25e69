//! In-memory implementation of the `EventStore` trait.
//!
//! Each stream has its own async mutex; the version check and the write
//! happen inside one critical section with no await point between them, so
//! appends are atomic and dropping an append future never leaves a partial
//! write. Different streams never contend on the same lock.
//!
//! Event ids are unique across the whole store, matching the primary key of
//! the `PostgreSQL` table.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use eventide_core::error::DomainError;
use eventide_core::store::{EventRecord, EventStore, NewEvent, StreamKey};

type Stream = Arc<Mutex<Vec<EventRecord>>>;

/// Event store held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Stream>>,
    event_ids: std::sync::Mutex<HashSet<Uuid>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn stream(&self, key: &StreamKey) -> Option<Stream> {
        self.streams.read().await.get(key).cloned()
    }

    async fn stream_or_create(&self, key: &StreamKey) -> Stream {
        if let Some(stream) = self.stream(key).await {
            return stream;
        }
        let mut streams = self.streams.write().await;
        Arc::clone(streams.entry(key.clone()).or_default())
    }

    /// Number of streams that have at least been touched by an append.
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Claims every event id in `events`, or none of them if any id is
    /// already stored or repeated within the batch.
    fn claim_event_ids(&self, events: &[NewEvent]) -> Result<(), DomainError> {
        let mut known = self.event_ids.lock().unwrap_or_else(PoisonError::into_inner);
        let mut batch = HashSet::with_capacity(events.len());
        for event in events {
            if known.contains(&event.event_id) || !batch.insert(event.event_id) {
                return Err(DomainError::Validation(format!(
                    "duplicate event id {}",
                    event.event_id
                )));
            }
        }
        known.extend(batch);
        Ok(())
    }
}

fn stream_version(events: &[EventRecord]) -> i64 {
    events.last().map_or(0, |record| record.version)
}

#[async_trait]
impl EventStore for InMemoryEventStore {
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

        let key = StreamKey::new(aggregate_type, aggregate_id);
        let stream = self.stream_or_create(&key).await;
        let mut stored = stream.lock().await;

        let actual = stream_version(&stored);
        if actual != expected_version {
            tracing::debug!(expected_version, actual, "append rejected");
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        self.claim_event_ids(events)?;

        stored.extend(
            events
                .iter()
                .cloned()
                .zip(expected_version + 1..)
                .map(|(event, version)| event.into_record(&key, version)),
        );
        Ok(stream_version(&stored))
    }

    async fn load_events(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        from_version: i64,
    ) -> Result<Vec<EventRecord>, DomainError> {
        let key = StreamKey::new(aggregate_type, aggregate_id);
        let Some(stream) = self.stream(&key).await else {
            return Ok(Vec::new());
        };
        let stored = stream.lock().await;
        Ok(stored
            .iter()
            .filter(|record| record.version > from_version)
            .cloned()
            .collect())
    }

    async fn current_version(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<i64, DomainError> {
        let key = StreamKey::new(aggregate_type, aggregate_id);
        match self.stream(&key).await {
            Some(stream) => Ok(stream_version(&stream.lock().await)),
            None => Ok(0),
        }
    }
}
