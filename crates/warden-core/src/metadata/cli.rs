//! External metadata CLI adapter.
//!
//! The lifecycle controller consumes the external tool through the
//! [`MetadataCli`] trait so the whole reconcile flow is testable without
//! the real binary. [`MetadataCliProcess`] is the production
//! implementation: every operation is one synchronous, blocking subprocess
//! call treated as a black box.
//!
//! Contract with the real tool:
//!
//! - `scaffold`, `lint`, `apply`: exit 0 is success, anything else carries
//!   the diagnostics on stderr/stdout.
//! - `diff`: exit 0 means *unchanged*, exit 1 means *changed*, any other
//!   exit is an invocation failure.
//! - `consistency`: exit 0 means the live state is fully consistent, exit 1
//!   means inconsistent (detail on stdout), anything else is an invocation
//!   failure.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use thiserror::Error;
use tracing::debug;

/// Change-detection verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    /// The live service already matches the tree.
    Unchanged,
    /// The tree differs from the live service.
    Changed,
}

/// Structural lint verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintStatus {
    /// No findings.
    Clean,
    /// The tree was rejected; diagnostics verbatim from the tool.
    Findings(String),
}

/// Live-state consistency verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyStatus {
    /// The live service reports a fully consistent state.
    Consistent,
    /// The live service reports an inconsistency.
    Inconsistent {
        /// Detail verbatim from the tool.
        detail: String,
    },
}

/// Failures invoking the external tool.
#[derive(Debug, Error)]
pub enum MetadataCliError {
    /// The tool could not be spawned at all.
    #[error("could not run {tool}: {source}")]
    Spawn {
        /// The binary that failed to start.
        tool: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The tool ran and reported failure.
    #[error("{tool} {operation} failed (exit {exit}): {detail}")]
    Failed {
        /// The binary.
        tool: String,
        /// The operation that failed.
        operation: &'static str,
        /// Exit code, or -1 when terminated by signal.
        exit: i32,
        /// Trimmed stderr/stdout diagnostic.
        detail: String,
    },
}

/// The metadata CLI operations the orchestrator consumes.
pub trait MetadataCli {
    /// Verifies the tool is present and runnable.
    fn ensure_available(&self) -> Result<(), MetadataCliError>;

    /// Scaffolds a fresh tree at `root`.
    fn scaffold(&self, root: &Path) -> Result<(), MetadataCliError>;

    /// Structural lint of the tree at `root`.
    fn lint(&self, root: &Path) -> Result<LintStatus, MetadataCliError>;

    /// Change detection between the live service and the tree at `root`.
    fn diff(&self, live_target: &str, root: &Path) -> Result<DiffStatus, MetadataCliError>;

    /// Consistency status of the live service.
    fn consistency(&self, live_target: &str) -> Result<ConsistencyStatus, MetadataCliError>;

    /// Applies the tree at `root` to the live service.
    fn apply(&self, root: &Path, live_target: &str) -> Result<(), MetadataCliError>;
}

/// Production adapter driving the configured binary.
#[derive(Debug, Clone)]
pub struct MetadataCliProcess {
    bin: PathBuf,
}

impl MetadataCliProcess {
    /// Creates an adapter for the given binary path.
    #[must_use]
    pub const fn new(bin: PathBuf) -> Self {
        Self { bin }
    }

    fn tool(&self) -> String {
        self.bin.display().to_string()
    }

    fn run(&self, operation: &'static str, args: &[&std::ffi::OsStr]) -> Result<Output, MetadataCliError> {
        debug!(tool = %self.tool(), operation, "invoking metadata CLI");
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.env_clear();
        cmd.env("PATH", std::env::var("PATH").unwrap_or_default());
        cmd.env("LANG", "C.UTF-8");

        cmd.output().map_err(|e| MetadataCliError::Spawn {
            tool: self.tool(),
            source: e,
        })
    }

    fn expect_success(
        &self,
        operation: &'static str,
        output: &Output,
    ) -> Result<(), MetadataCliError> {
        if output.status.success() {
            Ok(())
        } else {
            Err(MetadataCliError::Failed {
                tool: self.tool(),
                operation,
                exit: output.status.code().unwrap_or(-1),
                detail: diagnostic(output),
            })
        }
    }
}

/// Trimmed diagnostic text: stderr when present, stdout otherwise.
fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    text.trim().to_string()
}

impl MetadataCli for MetadataCliProcess {
    fn ensure_available(&self) -> Result<(), MetadataCliError> {
        let output = self.run("version", &["--version".as_ref()])?;
        self.expect_success("version", &output)
    }

    fn scaffold(&self, root: &Path) -> Result<(), MetadataCliError> {
        let output = self.run("scaffold", &["scaffold".as_ref(), root.as_os_str()])?;
        self.expect_success("scaffold", &output)
    }

    fn lint(&self, root: &Path) -> Result<LintStatus, MetadataCliError> {
        let output = self.run("lint", &["lint".as_ref(), root.as_os_str()])?;
        if output.status.success() {
            Ok(LintStatus::Clean)
        } else {
            Ok(LintStatus::Findings(diagnostic(&output)))
        }
    }

    fn diff(&self, live_target: &str, root: &Path) -> Result<DiffStatus, MetadataCliError> {
        let output = self.run(
            "diff",
            &["diff".as_ref(), live_target.as_ref(), root.as_os_str()],
        )?;
        match output.status.code() {
            Some(0) => Ok(DiffStatus::Unchanged),
            Some(1) => Ok(DiffStatus::Changed),
            code => Err(MetadataCliError::Failed {
                tool: self.tool(),
                operation: "diff",
                exit: code.unwrap_or(-1),
                detail: diagnostic(&output),
            }),
        }
    }

    fn consistency(&self, live_target: &str) -> Result<ConsistencyStatus, MetadataCliError> {
        let output = self.run("status", &["status".as_ref(), live_target.as_ref()])?;
        match output.status.code() {
            Some(0) => Ok(ConsistencyStatus::Consistent),
            Some(1) => Ok(ConsistencyStatus::Inconsistent {
                detail: diagnostic(&output),
            }),
            code => Err(MetadataCliError::Failed {
                tool: self.tool(),
                operation: "status",
                exit: code.unwrap_or(-1),
                detail: diagnostic(&output),
            }),
        }
    }

    fn apply(&self, root: &Path, live_target: &str) -> Result<(), MetadataCliError> {
        let output = self.run(
            "apply",
            &["apply".as_ref(), root.as_os_str(), live_target.as_ref()],
        )?;
        self.expect_success("apply", &output)
    }
}
