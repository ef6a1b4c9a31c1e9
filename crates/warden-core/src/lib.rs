//! Script integrity and configuration lifecycle orchestration.
//!
//! `warden-core` keeps a long-running backend service bootable and healthy
//! along two axes:
//!
//! 1. **Script integrity** — the executable scripts that drive the service's
//!    lifecycle are validated against a fixed seven-layer battery before they
//!    are trusted to run, restored from their backup slot when the backup is
//!    still sound, and mechanically repaired in an isolated workspace when
//!    both slots are corrupt. The orchestrator's own script gets a deferred
//!    variant that never overwrites the currently executing file.
//! 2. **Configuration lifecycle** — a versioned metadata tree is routed
//!    through bootstrap (first-time scaffolding into a template archive) or
//!    reconcile (stage, validate in five ordered stages, apply, snapshot),
//!    with an immutable revision record written per successful apply.
//!
//! Execution is strictly sequential and synchronous: every external tool is
//! a blocking subprocess call, the only bounded waits go through
//! [`retry::bounded`], and mutual exclusion over the filesystem is
//! structural (isolated repair workspaces, staging copies, apply-then-
//! converge ordering) rather than lock-based. Re-running the whole pipeline
//! after any failure is the documented recovery path.
//!
//! Every terminal failure carries a stable numeric result code from
//! [`codes`]; see that module for the band layout.

pub mod codes;
pub mod config;
pub mod context;
pub mod lifecycle;
pub mod metadata;
pub mod report;
pub mod retry;
pub mod script;
pub mod service;

pub use config::{ConfigError, WardenConfig};
pub use context::RunContext;
pub use lifecycle::{LifecycleController, LifecycleError, RunOutcome};
pub use script::integrity::{IntegrityError, IntegrityManager, IntegrityOutcome, SelfRepair};
pub use script::validator::{validate, ValidationReport};
