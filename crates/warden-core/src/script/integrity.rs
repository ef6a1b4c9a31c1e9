//! Integrity state machine for (primary, backup) script pairs.
//!
//! Evaluated fresh from the filesystem on every run; there is no persisted
//! state. Transitions are linear, and every path ends in either terminal
//! success or a fatal, uniquely coded failure that the caller must treat as
//! non-retryable within the same run:
//!
//! - **Primary healthy** — nothing to do.
//! - **Backup healthy** — restore the primary from the backup slot and
//!   re-validate; the backup itself is left untouched.
//! - **Dual corrupt** — repair the primary's content into the backup slot
//!   through the isolated pipeline, then copy the now-healthy backup over
//!   the primary and re-validate.
//!
//! [`SelfRepair`] is the specialization for the orchestrator's *own*
//! script, which cannot be overwritten while it is executing: it only ever
//! writes the backup slot and the readiness marker, emits an operator
//! action plan, and defers the actual promotion to the next cold start.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use super::repair::{repair, RepairError};
use super::validator::{validate, ValidationReport};
use super::{ScriptPair, ScriptPolicy};
use crate::codes;
use crate::report::{self, ActionPlan};

/// Terminal success states of one integrity pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityOutcome {
    /// The primary passed validation; neither slot was touched.
    PrimaryHealthy,

    /// The primary was restored from its healthy backup.
    RestoredFromBackup {
        /// Informational plan for the operator.
        plan: ActionPlan,
    },

    /// Both slots were corrupt; the repair pipeline rebuilt them.
    RepairedBothSlots,
}

impl std::fmt::Display for IntegrityOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryHealthy => write!(f, "primary healthy"),
            Self::RestoredFromBackup { .. } => write!(f, "restored from backup"),
            Self::RepairedBothSlots => write!(f, "repaired both slots"),
        }
    }
}

/// Fatal failures of the integrity state machine.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Copying the healthy backup over the primary failed.
    #[error("restoring {} from backup failed: {source}", primary.display())]
    RestoreCopy {
        /// The primary path.
        primary: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Restoration completed but the primary is still unhealthy.
    #[error("primary still unhealthy after restoration from backup: {0}")]
    RestoreRevalidation(#[source] ValidationReport),

    /// The repair pipeline failed; the inner code propagates unchanged.
    #[error(transparent)]
    Repair(#[from] RepairError),

    /// Copying the freshly repaired backup over the primary failed.
    #[error("copying repaired backup over {} failed: {source}", primary.display())]
    PromoteToPrimary {
        /// The primary path.
        primary: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The full repair chain completed but the primary is still unhealthy.
    #[error("primary still unhealthy after repair chain: {0}")]
    FinalRevalidation(#[source] ValidationReport),
}

impl IntegrityError {
    /// Stable result code for this failure.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::RestoreCopy { .. } => codes::RESTORE_COPY_FAILED,
            Self::RestoreRevalidation(_) => codes::RESTORE_REVALIDATION_FAILED,
            Self::Repair(e) => e.code(),
            Self::PromoteToPrimary { .. } => codes::PROMOTE_TO_PRIMARY_FAILED,
            Self::FinalRevalidation(_) => codes::FINAL_REVALIDATION_FAILED,
        }
    }
}

/// Drives the integrity state machine for operator-facing script pairs.
#[derive(Debug)]
pub struct IntegrityManager<'a> {
    policy: &'a ScriptPolicy,
}

impl<'a> IntegrityManager<'a> {
    /// Creates a manager sharing one validation policy.
    #[must_use]
    pub const fn new(policy: &'a ScriptPolicy) -> Self {
        Self { policy }
    }

    /// Runs one integrity pass over `pair`.
    ///
    /// # Errors
    ///
    /// Returns a distinct [`IntegrityError`] per failing step; callers must
    /// treat any error as non-retryable within the same run.
    pub fn ensure(&self, pair: &ScriptPair) -> Result<IntegrityOutcome, IntegrityError> {
        if validate(&pair.primary, self.policy).is_ok() {
            info!(primary = %pair.primary.display(), "primary healthy");
            return Ok(IntegrityOutcome::PrimaryHealthy);
        }

        if pair.backup.is_file() && validate(&pair.backup, self.policy).is_ok() {
            return self.restore_from_backup(pair);
        }

        self.repair_both_slots(pair)
    }

    fn restore_from_backup(
        &self,
        pair: &ScriptPair,
    ) -> Result<IntegrityOutcome, IntegrityError> {
        warn!(
            primary = %pair.primary.display(),
            backup = %pair.backup.display(),
            "primary unhealthy, restoring from backup"
        );
        copy_over(&pair.backup, &pair.primary).map_err(|e| IntegrityError::RestoreCopy {
            primary: pair.primary.clone(),
            source: e,
        })?;

        validate(&pair.primary, self.policy).map_err(IntegrityError::RestoreRevalidation)?;

        let plan = report::restore_plan(&pair.primary, &pair.backup);
        info!(primary = %pair.primary.display(), "primary restored from backup");
        Ok(IntegrityOutcome::RestoredFromBackup { plan })
    }

    fn repair_both_slots(&self, pair: &ScriptPair) -> Result<IntegrityOutcome, IntegrityError> {
        warn!(
            primary = %pair.primary.display(),
            backup = %pair.backup.display(),
            "both slots unhealthy or backup absent, entering repair"
        );
        repair(&pair.primary, &pair.backup, self.policy)?;

        copy_over(&pair.backup, &pair.primary).map_err(|e| IntegrityError::PromoteToPrimary {
            primary: pair.primary.clone(),
            source: e,
        })?;

        validate(&pair.primary, self.policy).map_err(IntegrityError::FinalRevalidation)?;

        info!(
            primary = %pair.primary.display(),
            backup = %pair.backup.display(),
            "both slots repaired"
        );
        Ok(IntegrityOutcome::RepairedBothSlots)
    }
}

/// Copies `from` over `to`, refreshes `to`'s checksum sidecar, and marks it
/// executable.
fn copy_over(from: &Path, to: &Path) -> io::Result<()> {
    let content = std::fs::read(from)?;
    std::fs::write(to, &content)?;
    set_executable(to)?;
    if let Err(e) = super::checksum::write_record(to, &content) {
        warn!(path = %to.display(), error = %e, "checksum sidecar write failed after copy");
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Self-repair
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal states of a self-repair pass. None of them stop the run: the
/// currently executing instance always continues to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfRepairOutcome {
    /// The orchestrator's own script is healthy.
    Healthy,

    /// The primary is corrupt but the backup slot already holds a healthy
    /// copy; promotion is deferred to the operator.
    BackupReady {
        /// The manual promotion plan.
        plan: ActionPlan,
    },

    /// Both slots were corrupt; a corrected copy now sits in the backup
    /// slot awaiting manual promotion.
    RepairedIntoBackup {
        /// The manual promotion plan.
        plan: ActionPlan,
    },
}

/// Failures of the self-repair protocol. Reported with their 6xx codes and
/// then *deferred*: the caller records them and the run continues on the
/// already-loaded instance.
#[derive(Debug, Error)]
pub enum SelfRepairError {
    /// The repair pipeline could not produce a healthy backup copy.
    #[error("self-repair of {} into its backup slot failed", primary.display())]
    RepairFailed {
        /// The currently executing script.
        primary: PathBuf,
        /// The pipeline failure.
        #[source]
        source: RepairError,
    },

    /// The readiness marker could not be written.
    #[error("writing readiness marker {} failed: {source}", marker.display())]
    MarkerWrite {
        /// The marker path.
        marker: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl SelfRepairError {
    /// Stable result code for this failure.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::RepairFailed { .. } => codes::SELF_REPAIR_FAILED,
            Self::MarkerWrite { .. } => codes::READINESS_MARKER_FAILED,
        }
    }
}

/// Self-repair protocol for the orchestrator's own script pair.
#[derive(Debug)]
pub struct SelfRepair<'a> {
    policy: &'a ScriptPolicy,
    marker: &'a Path,
}

impl<'a> SelfRepair<'a> {
    /// Creates the protocol with the shared policy and the readiness marker
    /// path.
    #[must_use]
    pub const fn new(policy: &'a ScriptPolicy, marker: &'a Path) -> Self {
        Self { policy, marker }
    }

    /// Runs one self-repair pass over the orchestrator's own pair.
    ///
    /// Never writes `pair.primary`. On any corruption the corrected (or
    /// already-healthy) copy ends up in the backup slot, the readiness
    /// marker is written, and the returned plan tells the operator how to
    /// promote it. The repair takes effect on the next cold start.
    ///
    /// # Errors
    ///
    /// Returns a [`SelfRepairError`]; callers log it and continue — the
    /// failure class is "deferred with operator instructions", never fatal.
    pub fn ensure(&self, pair: &ScriptPair) -> Result<SelfRepairOutcome, SelfRepairError> {
        if validate(&pair.primary, self.policy).is_ok() {
            return Ok(SelfRepairOutcome::Healthy);
        }

        let plan = report::self_repair_plan(&pair.primary, &pair.backup, self.marker);

        if pair.backup.is_file() && validate(&pair.backup, self.policy).is_ok() {
            warn!(
                primary = %pair.primary.display(),
                backup = %pair.backup.display(),
                "running script is corrupt; healthy backup is ready for manual promotion"
            );
            self.write_marker()?;
            return Ok(SelfRepairOutcome::BackupReady { plan });
        }

        warn!(
            primary = %pair.primary.display(),
            "running script and its backup are corrupt; repairing into the backup slot"
        );
        repair(&pair.primary, &pair.backup, self.policy).map_err(|e| {
            SelfRepairError::RepairFailed {
                primary: pair.primary.clone(),
                source: e,
            }
        })?;

        self.write_marker()?;
        info!(
            backup = %pair.backup.display(),
            marker = %self.marker.display(),
            "corrected copy staged in backup slot, awaiting operator promotion"
        );
        Ok(SelfRepairOutcome::RepairedIntoBackup { plan })
    }

    fn write_marker(&self) -> Result<(), SelfRepairError> {
        std::fs::write(self.marker, b"repaired backup ready for promotion\n").map_err(|e| {
            SelfRepairError::MarkerWrite {
                marker: self.marker.to_path_buf(),
                source: e,
            }
        })
    }
}
