//! `Person`: a small aggregate used across the integration tests.

use std::sync::Arc;

use chrono::Utc;
use eventide_core::aggregate::{AggregateCore, AggregateRoot, Lifecycle, Transition};
use eventide_core::command::CommandContext;
use eventide_core::error::DomainError;
use eventide_core::event::{DomainEvent, payload_to_value};
use eventide_core::registry::EventTypeRegistry;
use eventide_core::store::NewEvent;
use eventide_core::upcast::UpcasterRegistry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonCreated {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRenamed {
    pub name: String,
}

/// Recorded for audit only; `Person` has no transition for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonAudited {
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonEvent {
    Created(PersonCreated),
    Renamed(PersonRenamed),
    Audited(PersonAudited),
}

impl From<PersonCreated> for PersonEvent {
    fn from(value: PersonCreated) -> Self {
        Self::Created(value)
    }
}

impl From<PersonRenamed> for PersonEvent {
    fn from(value: PersonRenamed) -> Self {
        Self::Renamed(value)
    }
}

impl From<PersonAudited> for PersonEvent {
    fn from(value: PersonAudited) -> Self {
        Self::Audited(value)
    }
}

impl DomainEvent for PersonEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => "person.created",
            Self::Renamed(_) => "person.renamed",
            Self::Audited(_) => "person.audited",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Audited(_) => "audit",
            _ => "domain",
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        match self {
            Self::Created(p) => payload_to_value(p),
            Self::Renamed(p) => payload_to_value(p),
            Self::Audited(p) => payload_to_value(p),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Person {
    #[serde(skip)]
    core: AggregateCore<PersonEvent>,
    pub name: String,
    pub renames: u32,
}

impl Person {
    /// Starts a new person stream with a `person.created` event.
    #[must_use]
    pub fn create(id: Uuid, name: &str, ctx: &CommandContext<'_>) -> Self {
        let mut person = Self::new(id);
        person.raise(
            PersonCreated {
                name: name.to_owned(),
            }
            .into(),
            ctx,
        );
        person
    }

    /// Changes the name.
    ///
    /// # Errors
    ///
    /// `DomainError::Validation` if the person was never created or already
    /// has `name`.
    pub fn rename(&mut self, name: &str, ctx: &CommandContext<'_>) -> Result<(), DomainError> {
        if self.lifecycle() == Lifecycle::Uninitialized {
            return Err(DomainError::Validation("person does not exist".into()));
        }
        if self.name == name {
            return Err(DomainError::Validation(format!("already named {name}")));
        }
        self.raise(
            PersonRenamed {
                name: name.to_owned(),
            }
            .into(),
            ctx,
        );
        Ok(())
    }

    pub fn audit(&mut self, note: &str, ctx: &CommandContext<'_>) {
        self.raise(
            PersonAudited {
                note: note.to_owned(),
            }
            .into(),
            ctx,
        );
    }
}

impl AggregateRoot for Person {
    type Event = PersonEvent;
    const AGGREGATE_TYPE: &'static str = "person";

    fn new(id: Uuid) -> Self {
        Self {
            core: AggregateCore::new(id),
            name: String::new(),
            renames: 0,
        }
    }

    fn core(&self) -> &AggregateCore<PersonEvent> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AggregateCore<PersonEvent> {
        &mut self.core
    }

    fn apply(&mut self, event: &PersonEvent) -> Transition {
        match event {
            PersonEvent::Created(e) => e.name.clone_into(&mut self.name),
            PersonEvent::Renamed(e) => {
                e.name.clone_into(&mut self.name);
                self.renames += 1;
            }
            PersonEvent::Audited(_) => return Transition::Unhandled,
        }
        Transition::Applied
    }
}

/// Event-type registry for every `PersonEvent` payload.
///
/// # Panics
///
/// Never in practice; the tags are distinct.
#[must_use]
pub fn person_registry() -> Arc<EventTypeRegistry<PersonEvent>> {
    let mut registry = EventTypeRegistry::new();
    registry
        .register::<PersonCreated>("person.created")
        .and_then(|r| r.register::<PersonRenamed>("person.renamed"))
        .and_then(|r| r.register::<PersonAudited>("person.audited"))
        .expect("person event tags are distinct");
    Arc::new(registry)
}

/// Upcasts the legacy `person.renamed.v1` schema, which stored the name
/// under `new_name`, to `person.renamed`.
///
/// # Panics
///
/// Never in practice; a single upcaster is registered.
#[must_use]
pub fn person_upcasters() -> Arc<UpcasterRegistry> {
    let mut upcasters = UpcasterRegistry::new();
    upcasters
        .register_fn("person.renamed.v1", "person.renamed", |mut payload| {
            let name = payload
                .as_object_mut()
                .and_then(|obj| obj.remove("new_name"))
                .ok_or_else(|| "missing new_name".to_owned())?;
            Ok(serde_json::json!({ "name": name }))
        })
        .expect("single upcaster registers");
    Arc::new(upcasters)
}

/// Builds an append request by hand, bypassing the aggregate. Useful for
/// writing legacy schemas straight into a store.
#[must_use]
pub fn raw_event(event_type: &str, payload: serde_json::Value) -> NewEvent {
    NewEvent {
        event_id: Uuid::new_v4(),
        event_type: event_type.to_owned(),
        kind: "domain".to_owned(),
        payload,
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        occurred_at: Utc::now(),
    }
}
