//! Eventide event store: storage adapters.
//!
//! PostgreSQL implementations of the core `EventStore` and `SnapshotStore`
//! contracts, plus in-memory implementations for tests and embedded use.

pub mod config;
pub mod error;
pub mod memory_event_store;
pub mod memory_snapshot_store;
pub mod pg_event_store;
pub mod pg_snapshot_store;
pub mod schema;

pub use config::StoreConfig;
pub use error::StoreError;
pub use memory_event_store::InMemoryEventStore;
pub use memory_snapshot_store::InMemorySnapshotStore;
pub use pg_event_store::PgEventStore;
pub use pg_snapshot_store::PgSnapshotStore;
