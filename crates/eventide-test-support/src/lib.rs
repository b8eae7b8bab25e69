//! Shared test doubles and fixture aggregates for Eventide.

mod clock;
mod person;
mod publisher;
mod store;

pub use clock::{FixedClock, ManualClock};
pub use person::{
    Person, PersonAudited, PersonCreated, PersonEvent, PersonRenamed, person_registry,
    person_upcasters, raw_event,
};
pub use publisher::{FailingPublisher, RecordingPublisher};
pub use store::{
    AppendCall, EmptyEventStore, FailingEventStore, FailingSnapshotStore, PendingEventStore,
    RecordingEventStore,
};
