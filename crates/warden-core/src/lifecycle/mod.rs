//! Configuration lifecycle controller.
//!
//! Entered only once the scripts are confirmed sound. One run routes the
//! durable metadata tree down exactly one branch:
//!
//! - **Bootstrap** — the durable tree is empty: verify tooling, scaffold a
//!   fresh tree at the runtime root, verify its version descriptor, archive
//!   a read-only template copy, and hand the operator a seeding plan.
//!   Nothing is applied to the live service.
//! - **Reconcile** — the durable tree has content: stage it, validate the
//!   staging copy in five ordered stages, and only then deploy — purge and
//!   refill the live workspace, invoke the external apply, record an
//!   immutable deployment revision, and converge the durable tree onto the
//!   applied content.
//!
//! A "no changes" diff verdict is a distinct success (`NoChangesNeeded`)
//! that short-circuits the remaining stages. Failures never roll back:
//! partial progress (a prepared staging copy, a half-filled workspace) is
//! left in place for operator inspection, and re-running the orchestrator
//! is the documented recovery path. The durable tree is only ever mutated
//! *after* the live apply has succeeded.

pub mod revision;
pub mod staging;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::codes;
use crate::context::RunContext;
use crate::metadata::cli::{ConsistencyStatus, DiffStatus, LintStatus, MetadataCli, MetadataCliError};
use crate::metadata::{MetadataTree, SyntaxFailure, TreeError};
use crate::report::{self, ActionPlan};
use crate::retry::{bounded, RetryPolicy};
use crate::service::{await_ready, ServiceProbe};
use self::revision::{RevisionError, RevisionId, RevisionLog};
use self::staging::{copy_tree, prepare_staging, purge_dir_contents, StagingError};

/// Filesystem layout of one managed service instance.
#[derive(Debug, Clone)]
pub struct LifecyclePaths {
    /// The durable metadata tree.
    pub durable_tree: PathBuf,

    /// The ephemeral staging directory.
    pub staging_dir: PathBuf,

    /// The live runtime root the external CLI applies against.
    pub runtime_root: PathBuf,

    /// Name of the externally managed workspace subdirectory under the
    /// runtime root.
    pub workspace_subdir: String,

    /// The read-only template archive.
    pub template_archive: PathBuf,

    /// The deployment revision log directory.
    pub revisions_dir: PathBuf,
}

impl LifecyclePaths {
    /// The live workspace directory.
    #[must_use]
    pub fn workspace_dir(&self) -> PathBuf {
        self.runtime_root.join(&self.workspace_subdir)
    }
}

/// Behavioral knobs for one lifecycle run.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Identity of the live service, handed verbatim to the external CLI.
    pub live_target: String,

    /// Whether the consistency stage still runs when the diff stage already
    /// reported "unchanged" (no apply will occur either way).
    pub consistency_check_when_unchanged: bool,

    /// Bounded wait for the externally created workspace directory.
    pub workspace_wait: RetryPolicy,

    /// Bounded wait for service readiness before change detection.
    pub readiness_wait: RetryPolicy,
}

/// Terminal success states of one lifecycle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// First-time initialization: template scaffolded and archived, nothing
    /// applied.
    Bootstrapped {
        /// Seeding instructions for the operator.
        guidance: ActionPlan,
    },

    /// Changes were validated and applied; a new revision was recorded.
    AppliedWithChanges(RevisionId),

    /// The live service already matches the tree; nothing was applied and
    /// no revision was recorded.
    NoChangesNeeded,
}

impl RunOutcome {
    /// Short stable name for reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bootstrapped { .. } => "bootstrapped",
            Self::AppliedWithChanges(_) => "applied",
            Self::NoChangesNeeded => "up-to-date",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppliedWithChanges(id) => write!(f, "applied (revision {id})"),
            _ => f.write_str(self.name()),
        }
    }
}

/// Fatal failures of the lifecycle run, one stable code per condition.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The external metadata CLI is not available.
    #[error("metadata CLI unavailable: {0}")]
    ToolUnavailable(#[source] MetadataCliError),

    /// Scaffolding the fresh tree failed.
    #[error("scaffolding fresh tree failed: {0}")]
    ScaffoldFailed(#[source] MetadataCliError),

    /// The scaffolded tree carries no usable version descriptor.
    #[error("scaffolded tree has no usable version descriptor: {0}")]
    TemplateDescriptor(#[source] TreeError),

    /// The scaffolded tree names an unsupported version.
    #[error("scaffolded tree version unsupported: {0}")]
    TemplateVersion(#[source] TreeError),

    /// Copying the scaffolded tree into the template archive failed.
    #[error("archiving template copy failed: {0}")]
    ArchiveCopy(#[source] StagingError),

    /// Preparing the staging copy failed.
    #[error("preparing staging copy failed: {0}")]
    StagingPrep(#[source] StagingError),

    /// Stage 1: version check failed.
    #[error("staged tree version check failed: {0}")]
    VersionStage(#[source] TreeError),

    /// Stage 2: one or more metadata files are syntactically invalid.
    #[error("{} metadata file(s) failed the syntax scan", failures.len())]
    SyntaxStage {
        /// Every failing file with its diagnostic.
        failures: Vec<SyntaxFailure>,
    },

    /// Stage 2: the scan itself could not run.
    #[error("syntax scan could not run: {0}")]
    SyntaxScan(#[source] io::Error),

    /// Stage 3: the structural lint rejected the tree.
    #[error("structural lint rejected the tree: {diagnostics}")]
    LintStage {
        /// Diagnostics verbatim from the tool.
        diagnostics: String,
    },

    /// Stage 3: the lint invocation itself failed.
    #[error("structural lint could not run: {0}")]
    LintInvocation(#[source] MetadataCliError),

    /// Stage 4: the change-detection invocation failed.
    #[error("change detection failed: {0}")]
    DiffStage(#[source] MetadataCliError),

    /// Stage 5: the live service reports an inconsistent state.
    #[error("live service inconsistent: {detail}")]
    ConsistencyStage {
        /// Detail verbatim from the tool.
        detail: String,
    },

    /// Stage 5: the consistency invocation itself failed.
    #[error("consistency check could not run: {0}")]
    ConsistencyInvocation(#[source] MetadataCliError),

    /// The backend service never became ready within the polling budget.
    #[error("service not ready after {attempts} probe attempts")]
    ServiceUnready {
        /// Attempts made.
        attempts: u32,
    },

    /// The live workspace directory never appeared and force-creation
    /// failed.
    #[error("live workspace {} unavailable: {source}", path.display())]
    WorkspaceUnavailable {
        /// The workspace directory.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Purging the live workspace failed.
    #[error("purging live workspace failed: {0}")]
    WorkspacePurge(#[source] StagingError),

    /// Filling the live workspace from staging failed.
    #[error("copying staged tree into live workspace failed: {0}")]
    WorkspaceCopy(#[source] StagingError),

    /// The external apply failed. The durable tree is untouched.
    #[error("apply failed: {0}")]
    ApplyFailed(#[source] MetadataCliError),

    /// Digesting the applied tree for the revision record failed.
    #[error("digesting applied tree at {} failed: {source}", path.display())]
    DigestFailed {
        /// The tree that could not be digested.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing the deployment revision record failed.
    #[error("recording deployment revision failed: {0}")]
    RevisionWrite(#[source] RevisionError),

    /// Converging the durable tree onto the applied content failed.
    #[error("replacing durable tree failed: {0}")]
    DurableReplace(#[source] StagingError),

    /// The version descriptor vanished during the durable replace.
    #[error("version descriptor {} missing after durable replace", path.display())]
    DescriptorLost {
        /// The expected descriptor path.
        path: PathBuf,
    },

    /// Reading the durable tree for the route decision failed.
    #[error("inspecting durable tree failed: {0}")]
    RouteInspection(#[source] io::Error),
}

impl LifecycleError {
    /// Stable result code for this failure.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::ToolUnavailable(_) => codes::TOOL_UNAVAILABLE,
            Self::ScaffoldFailed(_) => codes::SCAFFOLD_FAILED,
            Self::TemplateDescriptor(_) => codes::TEMPLATE_DESCRIPTOR_MISSING,
            Self::TemplateVersion(_) => codes::TEMPLATE_VERSION_MISMATCH,
            Self::ArchiveCopy(_) => codes::ARCHIVE_COPY_FAILED,
            Self::StagingPrep(_) | Self::RouteInspection(_) => codes::STAGING_PREP_FAILED,
            Self::VersionStage(_) => codes::VERSION_STAGE_FAILED,
            Self::SyntaxStage { .. } | Self::SyntaxScan(_) => codes::SYNTAX_STAGE_FAILED,
            Self::LintStage { .. } | Self::LintInvocation(_) => codes::LINT_STAGE_FAILED,
            Self::DiffStage(_) => codes::DIFF_STAGE_FAILED,
            Self::ConsistencyStage { .. } | Self::ConsistencyInvocation(_) => {
                codes::CONSISTENCY_STAGE_FAILED
            },
            Self::ServiceUnready { .. } => codes::SERVICE_UNREADY,
            Self::WorkspaceUnavailable { .. } => codes::WORKSPACE_UNAVAILABLE,
            Self::WorkspacePurge(_) => codes::WORKSPACE_PURGE_FAILED,
            Self::WorkspaceCopy(_) => codes::WORKSPACE_COPY_FAILED,
            Self::ApplyFailed(_) => codes::APPLY_FAILED,
            Self::DigestFailed { .. } | Self::RevisionWrite(_) => codes::REVISION_WRITE_FAILED,
            Self::DurableReplace(_) => codes::DURABLE_REPLACE_FAILED,
            Self::DescriptorLost { .. } => codes::DESCRIPTOR_LOST,
        }
    }
}

/// Drives one lifecycle run against a metadata CLI and a service probe.
#[derive(Debug)]
pub struct LifecycleController<'a, M, P> {
    cli: &'a M,
    probe: &'a P,
    paths: &'a LifecyclePaths,
    options: &'a LifecycleOptions,
}

impl<'a, M: MetadataCli, P: ServiceProbe> LifecycleController<'a, M, P> {
    /// Assembles a controller over its collaborators.
    #[must_use]
    pub const fn new(
        cli: &'a M,
        probe: &'a P,
        paths: &'a LifecyclePaths,
        options: &'a LifecycleOptions,
    ) -> Self {
        Self {
            cli,
            probe,
            paths,
            options,
        }
    }

    /// Runs the route decision and the chosen branch to a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] with its stable code; partial progress
    /// is left in place for inspection, never rolled back.
    pub fn run(&self, ctx: &RunContext) -> Result<RunOutcome, LifecycleError> {
        let durable = MetadataTree::new(&self.paths.durable_tree);
        let empty = durable.is_empty().map_err(LifecycleError::RouteInspection)?;

        info!(
            run_id = %ctx.run_id,
            durable = %self.paths.durable_tree.display(),
            branch = if empty { "bootstrap" } else { "reconcile" },
            "lifecycle route decided"
        );

        if empty {
            self.bootstrap()
        } else {
            self.reconcile()
        }
    }

    // ── Bootstrap ────────────────────────────────────────────────────────

    fn bootstrap(&self) -> Result<RunOutcome, LifecycleError> {
        self.cli
            .ensure_available()
            .map_err(LifecycleError::ToolUnavailable)?;

        self.cli
            .scaffold(&self.paths.runtime_root)
            .map_err(LifecycleError::ScaffoldFailed)?;

        let scaffolded = MetadataTree::new(&self.paths.runtime_root);
        scaffolded.read_version().map_err(|e| match e {
            TreeError::VersionMismatch { .. } => LifecycleError::TemplateVersion(e),
            _ => LifecycleError::TemplateDescriptor(e),
        })?;

        self.archive_template()?;

        let guidance =
            report::bootstrap_guidance(&self.paths.template_archive, &self.paths.durable_tree);
        info!("bootstrap complete, live service untouched");
        Ok(RunOutcome::Bootstrapped { guidance })
    }

    /// Writes the template archive once. An already-populated archive is
    /// never overwritten.
    fn archive_template(&self) -> Result<(), LifecycleError> {
        let archive = MetadataTree::new(&self.paths.template_archive);
        match archive.is_empty() {
            Ok(false) => {
                info!(
                    archive = %self.paths.template_archive.display(),
                    "template archive already populated, leaving it untouched"
                );
                return Ok(());
            },
            Ok(true) => {},
            Err(e) => {
                return Err(LifecycleError::ArchiveCopy(StagingError::Io {
                    context: format!("inspecting {}", self.paths.template_archive.display()),
                    source: e,
                }));
            },
        }

        copy_tree(&self.paths.runtime_root, &self.paths.template_archive)
            .map_err(LifecycleError::ArchiveCopy)?;
        set_tree_read_only(&self.paths.template_archive);
        info!(
            archive = %self.paths.template_archive.display(),
            "template archive written"
        );
        Ok(())
    }

    // ── Reconcile ────────────────────────────────────────────────────────

    fn reconcile(&self) -> Result<RunOutcome, LifecycleError> {
        // Tool availability gates the branch before anything is mutated,
        // staging included.
        self.cli
            .ensure_available()
            .map_err(LifecycleError::ToolUnavailable)?;

        prepare_staging(&self.paths.durable_tree, &self.paths.staging_dir)
            .map_err(LifecycleError::StagingPrep)?;
        let staged = MetadataTree::new(&self.paths.staging_dir);

        // Stage 1: version.
        staged.read_version().map_err(LifecycleError::VersionStage)?;

        // Stage 2: per-file syntax scan, all failures aggregated.
        let failures = staged.scan_syntax().map_err(LifecycleError::SyntaxScan)?;
        if !failures.is_empty() {
            return Err(LifecycleError::SyntaxStage { failures });
        }

        // Stage 3: structural lint via the external CLI.
        match self
            .cli
            .lint(staged.root())
            .map_err(LifecycleError::LintInvocation)?
        {
            LintStatus::Clean => {},
            LintStatus::Findings(diagnostics) => {
                return Err(LifecycleError::LintStage { diagnostics });
            },
        }

        // Change detection and consistency need a live service.
        if !await_ready(self.probe, self.options.readiness_wait) {
            return Err(LifecycleError::ServiceUnready {
                attempts: self.options.readiness_wait.attempts,
            });
        }

        // Stage 4: change detection. "Unchanged" is a distinct success.
        let diff = self
            .cli
            .diff(&self.options.live_target, staged.root())
            .map_err(LifecycleError::DiffStage)?;
        if diff == DiffStatus::Unchanged {
            if self.options.consistency_check_when_unchanged {
                self.check_consistency()?;
            }
            info!("live service already matches the tree");
            return Ok(RunOutcome::NoChangesNeeded);
        }

        // Stage 5: consistency gate before anything is applied.
        self.check_consistency()?;

        self.deploy(&staged)
    }

    fn check_consistency(&self) -> Result<(), LifecycleError> {
        match self
            .cli
            .consistency(&self.options.live_target)
            .map_err(LifecycleError::ConsistencyInvocation)?
        {
            ConsistencyStatus::Consistent => Ok(()),
            ConsistencyStatus::Inconsistent { detail } => {
                Err(LifecycleError::ConsistencyStage { detail })
            },
        }
    }

    fn deploy(&self, staged: &MetadataTree) -> Result<RunOutcome, LifecycleError> {
        let workspace = self.ensure_workspace()?;
        purge_dir_contents(&workspace).map_err(LifecycleError::WorkspacePurge)?;
        copy_tree(staged.root(), &workspace).map_err(LifecycleError::WorkspaceCopy)?;

        self.cli
            .apply(&self.paths.runtime_root, &self.options.live_target)
            .map_err(LifecycleError::ApplyFailed)?;

        // Snapshot trail and durable convergence, only after a successful
        // apply.
        let digest = staged.digest().map_err(|e| LifecycleError::DigestFailed {
            path: staged.root().to_path_buf(),
            source: e,
        })?;
        let revision = RevisionLog::new(&self.paths.revisions_dir)
            .append(digest)
            .map_err(LifecycleError::RevisionWrite)?;

        purge_dir_contents(&self.paths.durable_tree).map_err(LifecycleError::DurableReplace)?;
        copy_tree(staged.root(), &self.paths.durable_tree)
            .map_err(LifecycleError::DurableReplace)?;

        let descriptor = MetadataTree::new(&self.paths.durable_tree).descriptor_path();
        if !descriptor.is_file() {
            return Err(LifecycleError::DescriptorLost { path: descriptor });
        }

        info!(revision = %revision, "changes applied and recorded");
        Ok(RunOutcome::AppliedWithChanges(revision))
    }

    /// Waits briefly for the externally owned workspace directory, then
    /// force-creates it if it still has not appeared.
    fn ensure_workspace(&self) -> Result<PathBuf, LifecycleError> {
        let workspace = self.paths.workspace_dir();
        let appeared = bounded(self.options.workspace_wait, |_| workspace.is_dir());
        if !appeared {
            warn!(
                workspace = %workspace.display(),
                "workspace directory never appeared, force-creating it"
            );
            std::fs::create_dir_all(&workspace).map_err(|e| {
                LifecycleError::WorkspaceUnavailable {
                    path: workspace.clone(),
                    source: e,
                }
            })?;
        }
        Ok(workspace)
    }
}

/// Best-effort: marks every file in the archive read-only. Failures are
/// logged, not fatal — the archive content is already in place.
fn set_tree_read_only(root: &Path) {
    fn walk(dir: &Path) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path)?;
            } else {
                let mut perms = std::fs::metadata(&path)?.permissions();
                perms.set_readonly(true);
                std::fs::set_permissions(&path, perms)?;
            }
        }
        Ok(())
    }
    if let Err(e) = walk(root) {
        warn!(root = %root.display(), error = %e, "could not mark archive read-only");
    }
}
