//! Stable external result codes.
//!
//! Every terminal failure in the pipeline carries exactly one of these
//! numeric codes, grouped into bands by phase:
//!
//! | band | phase                                   |
//! |------|-----------------------------------------|
//! | 1xx  | script validation layers                |
//! | 2xx  | dependency checks and bootstrap branch  |
//! | 3xx  | repair pipeline and integrity manager   |
//! | 4xx  | reconcile validation stages             |
//! | 5xx  | deployment and snapshot                 |
//! | 6xx  | self-repair (deferred, never fatal)     |
//!
//! These values are a contract with operator scripting: they propagate
//! unchanged through the call chain and must never be renumbered. New
//! conditions get new codes inside their band.

/// Successful run.
pub const OK: u16 = 0;

// Script validation layers (one per validator layer, in layer order).

/// Layer 1: path does not resolve to a regular file.
pub const SCRIPT_MISSING: u16 = 101;
/// Layer 2: content shorter than the minimum size threshold.
pub const SCRIPT_TOO_SMALL: u16 = 102;
/// Layer 3: first line is not an interpreter entry marker.
pub const ENTRY_MARKER_MISSING: u16 = 103;
/// Layer 4: carriage-return characters present.
pub const CARRIAGE_RETURNS_PRESENT: u16 = 104;
/// Layer 5: interpreter syntax check rejected the content.
pub const SYNTAX_INVALID: u16 = 105;
/// Layer 6: a required fail-fast directive is absent.
pub const DIRECTIVE_MISSING: u16 = 106;
/// Layer 7: checksum sidecar present but does not match the content.
pub const CHECKSUM_MISMATCH: u16 = 107;

// Dependency checks and the bootstrap branch.

/// The external metadata CLI is not available.
pub const TOOL_UNAVAILABLE: u16 = 201;
/// Scaffolding a fresh tree failed.
pub const SCAFFOLD_FAILED: u16 = 202;
/// The scaffolded tree has no version descriptor.
pub const TEMPLATE_DESCRIPTOR_MISSING: u16 = 203;
/// The scaffolded tree's version is not the supported version.
pub const TEMPLATE_VERSION_MISMATCH: u16 = 204;
/// Copying the scaffolded tree into the template archive failed.
pub const ARCHIVE_COPY_FAILED: u16 = 205;

// Repair pipeline.

/// Allocating or populating the isolated repair workspace failed.
pub const REPAIR_WORKSPACE_FAILED: u16 = 301;
/// The repaired copy still fails validation.
pub const POST_REPAIR_VALIDATION_FAILED: u16 = 302;
/// Promoting the repaired copy to its destination failed.
pub const PROMOTE_FAILED: u16 = 303;
/// Marking the promoted copy executable failed.
pub const EXEC_BIT_FAILED: u16 = 304;

// Integrity manager.

/// Copying the healthy backup over the primary failed.
pub const RESTORE_COPY_FAILED: u16 = 311;
/// The primary is still unhealthy after restoration from backup.
pub const RESTORE_REVALIDATION_FAILED: u16 = 312;
/// Copying the freshly repaired backup over the primary failed.
pub const PROMOTE_TO_PRIMARY_FAILED: u16 = 313;
/// The primary is still unhealthy after the full repair chain.
pub const FINAL_REVALIDATION_FAILED: u16 = 314;

// Reconcile validation stages.

/// Stage 1: the staged tree's version is missing or unsupported.
pub const VERSION_STAGE_FAILED: u16 = 401;
/// Stage 2: one or more metadata files fail the per-file syntax scan.
pub const SYNTAX_STAGE_FAILED: u16 = 402;
/// Stage 3: the external CLI's structural lint rejected the tree.
pub const LINT_STAGE_FAILED: u16 = 403;
/// Stage 4: the change-detection call failed outright.
pub const DIFF_STAGE_FAILED: u16 = 404;
/// Stage 5: the live service reports an inconsistent state.
pub const CONSISTENCY_STAGE_FAILED: u16 = 405;
/// Preparing the staging copy failed before any stage ran.
pub const STAGING_PREP_FAILED: u16 = 406;

// Deployment and snapshot.

/// The live workspace directory never appeared and could not be created.
pub const WORKSPACE_UNAVAILABLE: u16 = 501;
/// Purging the live workspace contents failed.
pub const WORKSPACE_PURGE_FAILED: u16 = 502;
/// Copying the staged tree into the live workspace failed.
pub const WORKSPACE_COPY_FAILED: u16 = 503;
/// The external CLI's apply operation failed.
pub const APPLY_FAILED: u16 = 504;
/// Writing the deployment revision record failed.
pub const REVISION_WRITE_FAILED: u16 = 505;
/// Replacing the durable tree with the applied content failed.
pub const DURABLE_REPLACE_FAILED: u16 = 506;
/// The version descriptor is missing after the durable replace.
pub const DESCRIPTOR_LOST: u16 = 507;
/// The backend service never became ready within the polling budget.
pub const SERVICE_UNREADY: u16 = 508;

// Self-repair. Reported, never fatal: the running instance continues.

/// Repairing the orchestrator's own script into its backup slot failed.
pub const SELF_REPAIR_FAILED: u16 = 601;
/// Writing the readiness marker for the repaired backup failed.
pub const READINESS_MARKER_FAILED: u16 = 602;
