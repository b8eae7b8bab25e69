//! Snapshot policies.
//!
//! A policy is a pure predicate evaluated by the repository right after a
//! successful append. It is advisory: whatever it answers, correctness is
//! unaffected, only the cost of future replays.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// Inputs to a snapshot decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotContext {
    /// Events committed since the last snapshot (or since the stream began).
    pub events_since_last_snapshot: u64,
    /// When the last snapshot was taken, if one exists.
    pub last_snapshot_at: Option<DateTime<Utc>>,
    /// The current time.
    pub now: DateTime<Utc>,
}

/// Caller-supplied snapshot predicate.
pub type SnapshotPredicate = Arc<dyn Fn(&SnapshotContext) -> bool + Send + Sync>;

/// When the repository should persist a snapshot.
#[derive(Clone, Default)]
pub enum SnapshotPolicy {
    /// Never snapshot.
    #[default]
    Never,
    /// Snapshot once at least N events have accumulated since the last one.
    Frequency(u64),
    /// Snapshot when pending events exist and either no snapshot exists yet
    /// or the last one is at least this old.
    TimeInterval(Duration),
    /// Caller-defined composite logic.
    Custom(SnapshotPredicate),
}

impl SnapshotPolicy {
    /// Builds a `Custom` policy from a closure.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&SnapshotContext) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Returns whether a snapshot should be taken now.
    #[must_use]
    pub fn should_snapshot(&self, ctx: &SnapshotContext) -> bool {
        match self {
            Self::Never => false,
            Self::Frequency(threshold) => ctx.events_since_last_snapshot >= *threshold,
            Self::TimeInterval(interval) => {
                if ctx.events_since_last_snapshot == 0 {
                    return false;
                }
                match ctx.last_snapshot_at {
                    None => true,
                    Some(last) => ctx.now.signed_duration_since(last) >= *interval,
                }
            }
            Self::Custom(predicate) => predicate(ctx),
        }
    }
}

impl std::fmt::Debug for SnapshotPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Frequency(n) => f.debug_tuple("Frequency").field(n).finish(),
            Self::TimeInterval(d) => f.debug_tuple("TimeInterval").field(d).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
