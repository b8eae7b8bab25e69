//! Eventide core: event-sourced aggregate persistence engine.
//!
//! This crate defines the event and snapshot records, the replay engine,
//! the event-type and upcaster registries, snapshot policies, the store
//! contracts and the repository that orchestrates them. It contains no
//! database code; adapters live in `eventide-event-store`.

pub mod aggregate;
pub mod cancel;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod policy;
pub mod publisher;
pub mod registry;
pub mod repository;
pub mod snapshot;
pub mod store;
pub mod upcast;
