//! Operator-facing output: numbered action plans and the run summary.
//!
//! The action plans are contractual output, not a log nicety: operator
//! tooling greps for their numbered steps. Renderings must stay stable.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A literal, numbered plan of manual steps for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    /// One-line statement of the situation.
    pub title: String,

    /// Ordered manual steps, rendered 1-based.
    pub steps: Vec<String>,
}

impl fmt::Display for ActionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "  {}. {step}", i + 1)?;
        }
        Ok(())
    }
}

/// Plan emitted when the orchestrator's own script was repaired into (or
/// found ready in) its backup slot and must be promoted by hand.
#[must_use]
pub fn self_repair_plan(primary: &Path, backup: &Path, marker: &Path) -> ActionPlan {
    ActionPlan {
        title: format!(
            "orchestrator script {} is corrupt; a corrected copy is waiting in {}",
            primary.display(),
            backup.display()
        ),
        steps: vec![
            format!("retrieve the corrected file from {}", backup.display()),
            "verify it with `warden check` before promoting it".to_string(),
            format!("copy it over {} once this run has finished", primary.display()),
            format!("restart the service (readiness marker: {})", marker.display()),
        ],
    }
}

/// Plan emitted after the integrity manager restored a primary script from
/// its healthy backup. Informational: the restoration itself already
/// happened in-process.
#[must_use]
pub fn restore_plan(primary: &Path, backup: &Path) -> ActionPlan {
    ActionPlan {
        title: format!(
            "{} was unhealthy and has been restored from {}",
            primary.display(),
            backup.display()
        ),
        steps: vec![
            format!("review {} for the source of the corruption", primary.display()),
            "verify the restored script with `warden check`".to_string(),
            "restart the service if it was already running".to_string(),
        ],
    }
}

/// Guidance emitted after a successful bootstrap: no configuration was
/// applied, the operator has to seed the durable tree and restart.
#[must_use]
pub fn bootstrap_guidance(template_archive: &Path, durable_tree: &Path) -> ActionPlan {
    ActionPlan {
        title: "fresh metadata tree scaffolded; nothing was applied to the live service"
            .to_string(),
        steps: vec![
            format!(
                "a read-only template copy lives in {}",
                template_archive.display()
            ),
            format!(
                "place the real configuration under {}",
                durable_tree.display()
            ),
            "restart the service to validate and apply it".to_string(),
        ],
    }
}

/// Machine-readable summary of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identity.
    pub run_id: Uuid,

    /// When the run started (UTC).
    pub started_at: DateTime<Utc>,

    /// When the run finished (UTC).
    pub finished_at: DateTime<Utc>,

    /// Terminal outcome name (`bootstrapped`, `applied`, `up-to-date`,
    /// `failed`).
    pub outcome: String,

    /// Stable result code; zero on success.
    pub result_code: u16,

    /// Free-form notes accumulated along the way (restorations, deferred
    /// self-repair, revision ids).
    pub notes: Vec<String>,
}

impl RunReport {
    /// Stamps a finished report for the given run.
    #[must_use]
    pub fn finish(
        ctx: &crate::context::RunContext,
        outcome: impl Into<String>,
        result_code: u16,
        notes: Vec<String>,
    ) -> Self {
        Self {
            run_id: ctx.run_id,
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            outcome: outcome.into(),
            result_code,
            notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_render_numbered_steps() {
        let plan = self_repair_plan(
            Path::new("/opt/svc/run.sh"),
            Path::new("/opt/svc/run.sh.bak"),
            Path::new("/opt/svc/.repair-ready"),
        );
        let text = plan.to_string();
        assert!(text.contains("1. retrieve the corrected file from /opt/svc/run.sh.bak"));
        assert!(text.contains("4. restart the service"));
    }

    #[test]
    fn restore_plan_mentions_both_slots() {
        let plan = restore_plan(Path::new("/a/p.sh"), Path::new("/a/p.sh.bak"));
        assert!(plan.title.contains("/a/p.sh"));
        assert!(plan.title.contains("/a/p.sh.bak"));
        assert_eq!(plan.steps.len(), 3);
    }
}
