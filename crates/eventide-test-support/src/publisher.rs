//! Test publishers.

use std::sync::Mutex;

use async_trait::async_trait;
use eventide_core::error::DomainError;
use eventide_core::publisher::EventPublisher;
use eventide_core::store::EventRecord;

/// Keeps every published batch.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    batches: Mutex<Vec<Vec<EventRecord>>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Published batches in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn batches(&self) -> Vec<Vec<EventRecord>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, events: &[EventRecord]) -> Result<(), DomainError> {
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}

/// A publisher whose broker is always down.
#[derive(Debug)]
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _events: &[EventRecord]) -> Result<(), DomainError> {
        Err(DomainError::StorageUnavailable("broker unreachable".into()))
    }
}
