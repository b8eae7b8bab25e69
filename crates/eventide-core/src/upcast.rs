//! Event upcasting.
//!
//! Historical records are migrated to the current schema at read time, one
//! step at a time, so the stored log never has to be rewritten. Each upcaster
//! maps exactly one source schema tag to its immediate successor. The
//! registry only sequences the steps; whether a step preserves information is
//! the upcaster author's business.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{DomainError, RegistryError};
use crate::store::EventRecord;

/// Default ceiling on the number of steps `upcast_to_latest` will take.
pub const DEFAULT_MAX_UPCAST_DEPTH: usize = 100;

/// A pure transformation from one event schema to the next.
pub trait Upcaster: Send + Sync {
    /// The schema tag this upcaster reads.
    fn source_schema(&self) -> &str;

    /// The schema tag this upcaster produces.
    fn target_schema(&self) -> &str;

    /// Rewrites a payload in the source shape into the target shape.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason if the payload cannot be migrated.
    fn upcast(&self, payload: serde_json::Value) -> Result<serde_json::Value, String>;
}

type UpcastFn = Box<dyn Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync>;

/// Closure-backed [`Upcaster`].
pub struct FnUpcaster {
    source: String,
    target: String,
    transform: UpcastFn,
}

impl FnUpcaster {
    /// Wraps `transform` as an upcaster from `source` to `target`.
    pub fn new<F>(source: impl Into<String>, target: impl Into<String>, transform: F) -> Self
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            target: target.into(),
            transform: Box::new(transform),
        }
    }
}

impl Upcaster for FnUpcaster {
    fn source_schema(&self) -> &str {
        &self.source
    }

    fn target_schema(&self) -> &str {
        &self.target
    }

    fn upcast(&self, payload: serde_json::Value) -> Result<serde_json::Value, String> {
        (self.transform)(payload)
    }
}

/// Result of a single upcasting step.
#[derive(Debug, Clone, PartialEq)]
pub enum UpcastOutcome {
    /// An upcaster matched and produced a record in the next schema.
    Upcasted(EventRecord),
    /// No upcaster is registered for the record's schema.
    Unchanged(EventRecord),
}

impl UpcastOutcome {
    /// Returns whether an upcaster matched.
    #[must_use]
    pub fn is_upcasted(&self) -> bool {
        matches!(self, Self::Upcasted(_))
    }

    /// Returns the (possibly new) record.
    #[must_use]
    pub fn into_record(self) -> EventRecord {
        match self {
            Self::Upcasted(record) | Self::Unchanged(record) => record,
        }
    }
}

/// Process-wide registry of upcasters keyed by source schema.
///
/// Built at startup, then shared immutably.
pub struct UpcasterRegistry {
    upcasters: HashMap<String, Arc<dyn Upcaster>>,
    max_depth: usize,
}

impl UpcasterRegistry {
    /// Creates an empty registry with the default iteration ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            upcasters: HashMap::new(),
            max_depth: DEFAULT_MAX_UPCAST_DEPTH,
        }
    }

    /// Overrides the iteration ceiling.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the iteration ceiling.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns whether no upcasters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upcasters.is_empty()
    }

    /// Registers an upcaster.
    ///
    /// # Errors
    ///
    /// `RegistryError::DuplicateUpcaster` if the source schema already has
    /// one, `RegistryError::SelfReferencingUpcaster` if source equals target.
    pub fn register(
        &mut self,
        upcaster: impl Upcaster + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let source = upcaster.source_schema().to_owned();
        if source == upcaster.target_schema() {
            return Err(RegistryError::SelfReferencingUpcaster(source));
        }
        if self.upcasters.contains_key(&source) {
            return Err(RegistryError::DuplicateUpcaster(source));
        }
        self.upcasters.insert(source, Arc::new(upcaster));
        Ok(self)
    }

    /// Registers a closure as the upcaster from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Same as [`UpcasterRegistry::register`].
    pub fn register_fn<F>(
        &mut self,
        source: &str,
        target: &str,
        transform: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        self.register(FnUpcaster::new(source, target, transform))
    }

    /// Checks the registered chains for cycles.
    ///
    /// The iteration ceiling in [`UpcasterRegistry::upcast_to_latest`] only
    /// catches a cycle when an event actually hits it; this finds them at
    /// startup.
    ///
    /// # Errors
    ///
    /// `RegistryError::CyclicUpcasterChain` naming a schema on the cycle.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut acyclic: HashSet<&str> = HashSet::new();
        let mut sources: Vec<&str> = self.upcasters.keys().map(String::as_str).collect();
        sources.sort_unstable();

        for start in sources {
            let mut path: HashSet<&str> = HashSet::new();
            let mut current = start;
            loop {
                if acyclic.contains(current) {
                    break;
                }
                if !path.insert(current) {
                    return Err(RegistryError::CyclicUpcasterChain(current.to_owned()));
                }
                match self.upcasters.get(current) {
                    Some(upcaster) => current = upcaster.target_schema(),
                    None => break,
                }
            }
            acyclic.extend(path);
        }
        Ok(())
    }

    /// Follows the registered chain from `event_type` to its final schema.
    ///
    /// Returns `None` if the chain does not terminate within the ceiling.
    #[must_use]
    pub fn latest_schema<'a>(&'a self, event_type: &'a str) -> Option<&'a str> {
        let mut current = event_type;
        for _ in 0..=self.max_depth {
            match self.upcasters.get(current) {
                Some(upcaster) => current = upcaster.target_schema(),
                None => return Some(current),
            }
        }
        None
    }

    /// Applies at most one upcaster to `record`.
    ///
    /// # Errors
    ///
    /// `DomainError::UpcastFailed` if the matching upcaster rejects the payload.
    pub fn upcast_once(&self, mut record: EventRecord) -> Result<UpcastOutcome, DomainError> {
        let Some(upcaster) = self.upcasters.get(&record.event_type) else {
            return Ok(UpcastOutcome::Unchanged(record));
        };

        record.payload =
            upcaster
                .upcast(record.payload)
                .map_err(|reason| DomainError::UpcastFailed {
                    source_schema: upcaster.source_schema().to_owned(),
                    target_schema: upcaster.target_schema().to_owned(),
                    reason,
                })?;
        upcaster.target_schema().clone_into(&mut record.event_type);
        Ok(UpcastOutcome::Upcasted(record))
    }

    /// Applies upcasters until none matches.
    ///
    /// # Errors
    ///
    /// `DomainError::UpcastingChainExceeded` when the ceiling is hit, or any
    /// error from [`UpcasterRegistry::upcast_once`].
    pub fn upcast_to_latest(&self, record: EventRecord) -> Result<EventRecord, DomainError> {
        if self.upcasters.is_empty() {
            return Ok(record);
        }

        let origin = record.event_type.clone();
        let mut current = record;
        for _ in 0..self.max_depth {
            match self.upcast_once(current)? {
                UpcastOutcome::Upcasted(next) => current = next,
                UpcastOutcome::Unchanged(done) => {
                    if done.event_type != origin {
                        tracing::trace!(from = %origin, to = %done.event_type, "upcasted event");
                    }
                    return Ok(done);
                }
            }
        }

        if self.upcasters.contains_key(&current.event_type) {
            return Err(DomainError::UpcastingChainExceeded {
                event_type: origin,
                limit: self.max_depth,
            });
        }
        Ok(current)
    }
}

impl Default for UpcasterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UpcasterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut edges: Vec<(&str, &str)> = self
            .upcasters
            .values()
            .map(|u| (u.source_schema(), u.target_schema()))
            .collect();
        edges.sort_unstable();
        f.debug_struct("UpcasterRegistry")
            .field("upcasters", &edges)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
