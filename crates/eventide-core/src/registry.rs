//! Event type registry.
//!
//! Maps stable schema tags to the payload types that decode them. Populated
//! once at startup and shared read-only afterward (usually behind an `Arc`),
//! so lookups need no synchronization.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::{DomainError, RegistryError};
use crate::event::{DomainEvent, EventEnvelope, EventMetadata};
use crate::store::EventRecord;

type Decoder<E> = Box<dyn Fn(serde_json::Value) -> Result<E, serde_json::Error> + Send + Sync>;

/// Registry of the payload types an aggregate's event enum is built from.
pub struct EventTypeRegistry<E> {
    decoders: HashMap<String, Decoder<E>>,
}

impl<E: DomainEvent> EventTypeRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers payload type `P` under `event_type`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateEventType` if the tag is taken.
    pub fn register<P>(&mut self, event_type: &str) -> Result<&mut Self, RegistryError>
    where
        P: DeserializeOwned + Into<E> + 'static,
    {
        if self.decoders.contains_key(event_type) {
            return Err(RegistryError::DuplicateEventType(event_type.to_owned()));
        }
        self.decoders.insert(
            event_type.to_owned(),
            Box::new(|value| serde_json::from_value::<P>(value).map(Into::into)),
        );
        Ok(self)
    }

    /// Returns whether a decoder exists for `event_type`.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Registered schema tags, in no particular order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    /// Decodes a persisted record into a typed envelope.
    ///
    /// # Errors
    ///
    /// `DomainError::UnregisteredEventType` if the tag is unknown,
    /// `DomainError::Serialization` if the payload does not match the type,
    /// `DomainError::Configuration` if the decoded variant reports a
    /// different tag than the one it was registered under.
    pub fn decode(&self, record: EventRecord) -> Result<EventEnvelope<E>, DomainError> {
        let decoder =
            self.decoders
                .get(&record.event_type)
                .ok_or_else(|| DomainError::UnregisteredEventType {
                    event_type: record.event_type.clone(),
                })?;

        let payload = decoder(record.payload).map_err(|e| {
            DomainError::Serialization(format!(
                "event deserialization failed for {} v{}: {e}",
                record.event_type, record.version
            ))
        })?;

        if payload.event_type() != record.event_type {
            return Err(DomainError::Configuration(format!(
                "payload registered as {} decodes to {}",
                record.event_type,
                payload.event_type()
            )));
        }

        Ok(EventEnvelope {
            metadata: EventMetadata {
                event_id: record.event_id,
                event_type: record.event_type,
                kind: record.kind,
                aggregate_id: record.aggregate_id,
                aggregate_type: record.aggregate_type,
                version: record.version,
                correlation_id: record.correlation_id,
                causation_id: record.causation_id,
                occurred_at: record.occurred_at,
            },
            payload,
        })
    }
}

impl<E: DomainEvent> Default for EventTypeRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventTypeRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&String> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("EventTypeRegistry")
            .field("event_types", &tags)
            .finish()
    }
}
