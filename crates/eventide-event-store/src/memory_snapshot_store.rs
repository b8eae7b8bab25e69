//! In-memory snapshot store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use eventide_core::error::DomainError;
use eventide_core::snapshot::{Snapshot, SnapshotStore};
use eventide_core::store::StreamKey;

/// Keeps the highest-version snapshot per stream in memory.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<StreamKey, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams with a stored snapshot.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Returns whether no snapshot is stored.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let key = StreamKey::new(snapshot.aggregate_type.clone(), snapshot.aggregate_id);
        let mut snapshots = self.snapshots.write().await;
        let newer_exists = snapshots
            .get(&key)
            .is_some_and(|existing| existing.version > snapshot.version);
        if newer_exists {
            tracing::trace!(offered = snapshot.version, "keeping newer snapshot");
        } else {
            snapshots.insert(key, snapshot.clone());
        }
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        let key = StreamKey::new(aggregate_type, aggregate_id);
        Ok(self.snapshots.read().await.get(&key).cloned())
    }
}
