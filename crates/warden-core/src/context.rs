//! Per-run context.
//!
//! One [`RunContext`] is created at the top of every run, threaded through
//! every component that wants to tag its output, and discarded when the run
//! ends. There is no process-global run state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identity and timing for a single orchestrator run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Unique identifier for this run.
    pub run_id: Uuid,

    /// When the run started (UTC).
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Creates a fresh context with a new run id and the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Wall-clock time elapsed since the run started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
