//! Backend service readiness probe.
//!
//! The orchestrator only ever *consumes* the service: a boolean readiness
//! probe, polled through the shared bounded-retry helper. Exhausting the
//! polling budget is a hard startup failure for the caller.

use std::process::{Command, Stdio};

use tracing::debug;

use crate::retry::{bounded, RetryPolicy};

/// A readiness probe for the live backend service.
pub trait ServiceProbe {
    /// One probe attempt; `true` when the service is ready.
    fn is_ready(&self) -> bool;
}

/// Probe that runs a configured command and treats exit 0 as ready.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: Vec<String>,
}

impl CommandProbe {
    /// Creates a probe from an argv-style command. An empty command never
    /// reports ready.
    #[must_use]
    pub const fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl ServiceProbe for CommandProbe {
    fn is_ready(&self) -> bool {
        let Some((program, args)) = self.command.split_first() else {
            return false;
        };
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Polls `probe` under `policy`; `true` once the service reported ready.
pub fn await_ready(probe: &dyn ServiceProbe, policy: RetryPolicy) -> bool {
    bounded(policy, |attempt| {
        debug!(attempt, "probing service readiness");
        probe.is_ready()
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::*;

    struct ReadyAfter {
        remaining: Cell<u32>,
    }

    impl ServiceProbe for ReadyAfter {
        fn is_ready(&self) -> bool {
            if self.remaining.get() == 0 {
                true
            } else {
                self.remaining.set(self.remaining.get() - 1);
                false
            }
        }
    }

    #[test]
    fn becomes_ready_within_budget() {
        let probe = ReadyAfter {
            remaining: Cell::new(2),
        };
        assert!(await_ready(&probe, RetryPolicy::new(5, Duration::ZERO)));
    }

    #[test]
    fn budget_exhaustion_reports_unready() {
        let probe = ReadyAfter {
            remaining: Cell::new(10),
        };
        assert!(!await_ready(&probe, RetryPolicy::new(3, Duration::ZERO)));
    }

    #[test]
    fn empty_command_is_never_ready() {
        let probe = CommandProbe::new(Vec::new());
        assert!(!probe.is_ready());
    }

    #[test]
    #[cfg(unix)]
    fn command_exit_status_drives_readiness() {
        let ready = CommandProbe::new(vec!["true".to_string()]);
        assert!(ready.is_ready());

        let unready = CommandProbe::new(vec!["false".to_string()]);
        assert!(!unready.is_ready());
    }
}
