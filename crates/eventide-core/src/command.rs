//! Per-command context threaded into `raise`.

use uuid::Uuid;

use crate::clock::Clock;

/// Value-type context describing the command currently being executed.
///
/// Built once by the command handler and passed by reference to every
/// business operation, which copies the identifiers into the metadata of the
/// events it raises.
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    /// Correlation ID to trace this command through the system.
    pub correlation_id: Uuid,
    /// The event or command that caused this one.
    pub causation_id: Uuid,
    /// Source of event timestamps.
    pub clock: &'a dyn Clock,
}

impl<'a> CommandContext<'a> {
    /// Creates a context whose causation is the command itself.
    #[must_use]
    pub fn new(correlation_id: Uuid, clock: &'a dyn Clock) -> Self {
        Self {
            correlation_id,
            causation_id: correlation_id,
            clock,
        }
    }

    /// Overrides the causation ID.
    #[must_use]
    pub fn caused_by(mut self, causation_id: Uuid) -> Self {
        self.causation_id = causation_id;
        self
    }
}

impl std::fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("correlation_id", &self.correlation_id)
            .field("causation_id", &self.causation_id)
            .finish_non_exhaustive()
    }
}
