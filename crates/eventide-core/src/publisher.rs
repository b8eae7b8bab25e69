//! Hand-off of committed events to downstream consumers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DomainError;
use crate::store::EventRecord;

/// Receives events after they are durably appended.
///
/// Called at least once per committed batch and never before the append
/// succeeded. Failures are logged by the repository and do not fail the save.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one committed batch, in stream order.
    ///
    /// # Errors
    ///
    /// Returns an error if the downstream transport rejects the batch.
    async fn publish(&self, events: &[EventRecord]) -> Result<(), DomainError>;
}

/// Publisher that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _events: &[EventRecord]) -> Result<(), DomainError> {
        Ok(())
    }
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, events: &[EventRecord]) -> Result<(), DomainError> {
        (**self).publish(events).await
    }
}
