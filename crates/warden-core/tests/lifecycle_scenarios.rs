//! End-to-end lifecycle scenarios driven against an in-test metadata CLI
//! double and temp-directory state.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden_core::codes;
use warden_core::context::RunContext;
use warden_core::lifecycle::revision::RevisionId;
use warden_core::lifecycle::{LifecycleController, LifecycleError, LifecycleOptions, LifecyclePaths, RunOutcome};
use warden_core::metadata::cli::{ConsistencyStatus, DiffStatus, LintStatus, MetadataCli, MetadataCliError};
use warden_core::metadata::MetadataTree;
use warden_core::retry::RetryPolicy;
use warden_core::service::ServiceProbe;

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

struct StubCli {
    available: bool,
    scaffold_version: &'static str,
    lint: LintStatus,
    diff: DiffStatus,
    consistency: ConsistencyStatus,
    apply_ok: bool,
    scaffold_calls: Cell<u32>,
    apply_calls: Cell<u32>,
    consistency_calls: Cell<u32>,
}

impl Default for StubCli {
    fn default() -> Self {
        Self {
            available: true,
            scaffold_version: "1",
            lint: LintStatus::Clean,
            diff: DiffStatus::Changed,
            consistency: ConsistencyStatus::Consistent,
            apply_ok: true,
            scaffold_calls: Cell::new(0),
            apply_calls: Cell::new(0),
            consistency_calls: Cell::new(0),
        }
    }
}

fn stub_failure(operation: &'static str) -> MetadataCliError {
    MetadataCliError::Failed {
        tool: "stub".to_string(),
        operation,
        exit: 2,
        detail: format!("{operation} rejected by stub"),
    }
}

impl MetadataCli for StubCli {
    fn ensure_available(&self) -> Result<(), MetadataCliError> {
        if self.available {
            Ok(())
        } else {
            Err(stub_failure("version"))
        }
    }

    fn scaffold(&self, root: &Path) -> Result<(), MetadataCliError> {
        self.scaffold_calls.set(self.scaffold_calls.get() + 1);
        std::fs::create_dir_all(root.join("tables")).expect("scaffold mkdir");
        std::fs::write(root.join(".treeversion"), format!("{}\n", self.scaffold_version))
            .expect("scaffold descriptor");
        std::fs::write(root.join("tables/example.toml"), "name = \"example\"\n")
            .expect("scaffold sample");
        Ok(())
    }

    fn lint(&self, _root: &Path) -> Result<LintStatus, MetadataCliError> {
        Ok(self.lint.clone())
    }

    fn diff(&self, _live_target: &str, _root: &Path) -> Result<DiffStatus, MetadataCliError> {
        Ok(self.diff)
    }

    fn consistency(&self, _live_target: &str) -> Result<ConsistencyStatus, MetadataCliError> {
        self.consistency_calls.set(self.consistency_calls.get() + 1);
        Ok(self.consistency.clone())
    }

    fn apply(&self, _root: &Path, _live_target: &str) -> Result<(), MetadataCliError> {
        self.apply_calls.set(self.apply_calls.get() + 1);
        if self.apply_ok {
            Ok(())
        } else {
            Err(stub_failure("apply"))
        }
    }
}

struct AlwaysReady;

impl ServiceProbe for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }
}

struct NeverReady;

impl ServiceProbe for NeverReady {
    fn is_ready(&self) -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// World setup
// ─────────────────────────────────────────────────────────────────────────────

struct World {
    _dir: tempfile::TempDir,
    paths: LifecyclePaths,
    options: LifecycleOptions,
}

impl World {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let paths = LifecyclePaths {
            durable_tree: root.join("metadata"),
            staging_dir: root.join("staging"),
            runtime_root: root.join("runtime"),
            workspace_subdir: "workspace".to_string(),
            template_archive: root.join("template"),
            revisions_dir: root.join("revisions"),
        };
        std::fs::create_dir_all(&paths.runtime_root).expect("runtime root");

        let options = LifecycleOptions {
            live_target: "svc-main".to_string(),
            consistency_check_when_unchanged: false,
            workspace_wait: RetryPolicy::new(2, Duration::ZERO),
            readiness_wait: RetryPolicy::new(3, Duration::ZERO),
        };
        Self {
            _dir: dir,
            paths,
            options,
        }
    }

    fn seed_durable(&self) {
        let durable = &self.paths.durable_tree;
        std::fs::create_dir_all(durable.join("tables")).expect("mkdir");
        std::fs::write(durable.join(".treeversion"), "1\n").expect("descriptor");
        std::fs::write(durable.join("tables/users.toml"), "name = \"users\"\n")
            .expect("table file");
        std::fs::write(durable.join("tables/orders.toml"), "name = \"orders\"\n")
            .expect("table file");
    }

    fn run_with<P: ServiceProbe>(
        &self,
        cli: &StubCli,
        probe: &P,
    ) -> Result<RunOutcome, LifecycleError> {
        let ctx = RunContext::new();
        LifecycleController::new(cli, probe, &self.paths, &self.options).run(&ctx)
    }
}

fn digest_of(path: &Path) -> String {
    MetadataTree::new(path).digest().expect("digest")
}

fn revision_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut files: Vec<PathBuf> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
            files.sort();
            files
        },
        Err(_) => Vec::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario A: bootstrap
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_tree_bootstraps_and_archives_a_template() {
    let world = World::new();
    let cli = StubCli::default();

    let outcome = world.run_with(&cli, &AlwaysReady).expect("bootstrap");
    let RunOutcome::Bootstrapped { guidance } = outcome else {
        panic!("expected Bootstrapped");
    };

    assert_eq!(cli.scaffold_calls.get(), 1);
    assert_eq!(cli.apply_calls.get(), 0, "bootstrap never applies");

    // The archive holds a tree with the supported version descriptor.
    let archive = MetadataTree::new(&world.paths.template_archive);
    assert_eq!(archive.read_version().expect("archive version"), 1);
    assert!(world
        .paths
        .template_archive
        .join("tables/example.toml")
        .is_file());

    // Operator guidance is a numbered plan naming the key locations.
    let text = guidance.to_string();
    assert!(text.contains("1. "));
    assert!(text.contains(&world.paths.template_archive.display().to_string()));
    assert!(text.contains(&world.paths.durable_tree.display().to_string()));
}

#[test]
fn bootstrap_requires_the_external_tool() {
    let world = World::new();
    let cli = StubCli {
        available: false,
        ..StubCli::default()
    };

    let err = world.run_with(&cli, &AlwaysReady).expect_err("tool missing");
    assert_eq!(err.code(), codes::TOOL_UNAVAILABLE);
    assert_eq!(cli.scaffold_calls.get(), 0, "nothing mutates before the check");
}

#[test]
fn bootstrap_rejects_an_unsupported_template_version() {
    let world = World::new();
    let cli = StubCli {
        scaffold_version: "9",
        ..StubCli::default()
    };

    let err = world.run_with(&cli, &AlwaysReady).expect_err("bad version");
    assert_eq!(err.code(), codes::TEMPLATE_VERSION_MISMATCH);
}

#[test]
fn template_archive_is_written_only_once() {
    let world = World::new();
    std::fs::create_dir_all(&world.paths.template_archive).expect("mkdir");
    std::fs::write(
        world.paths.template_archive.join("sentinel.toml"),
        "keep = true\n",
    )
    .expect("sentinel");

    let cli = StubCli::default();
    world.run_with(&cli, &AlwaysReady).expect("bootstrap");

    // The pre-existing archive content survived untouched.
    assert!(world.paths.template_archive.join("sentinel.toml").is_file());
    assert!(!world.paths.template_archive.join(".treeversion").exists());
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario B: reconcile with changes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn changed_tree_is_applied_and_recorded() {
    let world = World::new();
    world.seed_durable();
    let cli = StubCli::default();

    let outcome = world.run_with(&cli, &AlwaysReady).expect("reconcile");
    assert_eq!(outcome, RunOutcome::AppliedWithChanges(RevisionId(1)));
    assert_eq!(cli.apply_calls.get(), 1);

    // Exactly one revision record, and the durable tree converged onto the
    // staged content.
    let revisions = revision_files(&world.paths.revisions_dir);
    assert_eq!(revisions.len(), 1);
    assert_eq!(
        digest_of(&world.paths.durable_tree),
        digest_of(&world.paths.staging_dir)
    );

    // The live workspace was filled from staging.
    let workspace = world.paths.workspace_dir();
    assert!(workspace.join(".treeversion").is_file());
    assert!(workspace.join("tables/users.toml").is_file());
}

#[test]
fn revision_identifiers_increase_across_runs() {
    let world = World::new();
    world.seed_durable();
    let cli = StubCli::default();

    let first = world.run_with(&cli, &AlwaysReady).expect("first run");
    assert_eq!(first, RunOutcome::AppliedWithChanges(RevisionId(1)));

    // Mutate the durable tree so the next run has something new to stage.
    std::fs::write(
        world.paths.durable_tree.join("tables/users.toml"),
        "name = \"users\"\nowner = \"ops\"\n",
    )
    .expect("mutate");

    let second = world.run_with(&cli, &AlwaysReady).expect("second run");
    assert_eq!(second, RunOutcome::AppliedWithChanges(RevisionId(2)));
    assert_eq!(revision_files(&world.paths.revisions_dir).len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario C: reconcile validation failures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reconcile_requires_the_external_tool_before_staging() {
    let world = World::new();
    world.seed_durable();
    let cli = StubCli {
        available: false,
        ..StubCli::default()
    };

    let err = world.run_with(&cli, &AlwaysReady).expect_err("tool missing");
    assert_eq!(err.code(), codes::TOOL_UNAVAILABLE);
    assert!(
        !world.paths.staging_dir.exists(),
        "staging is never touched when the tool is absent"
    );
}

#[test]
fn wrong_version_fails_the_version_stage_without_touching_anything() {
    let world = World::new();
    world.seed_durable();
    std::fs::write(world.paths.durable_tree.join(".treeversion"), "2\n").expect("descriptor");
    let before = digest_of(&world.paths.durable_tree);

    let cli = StubCli::default();
    let err = world.run_with(&cli, &AlwaysReady).expect_err("wrong version");

    assert_eq!(err.code(), codes::VERSION_STAGE_FAILED);
    assert_eq!(cli.apply_calls.get(), 0);
    assert_eq!(digest_of(&world.paths.durable_tree), before);
    assert!(revision_files(&world.paths.revisions_dir).is_empty());
}

#[test]
fn syntax_stage_names_every_broken_file() {
    let world = World::new();
    world.seed_durable();
    std::fs::write(
        world.paths.durable_tree.join("tables/users.toml"),
        "name = [broken\n",
    )
    .expect("break file");
    std::fs::write(
        world.paths.durable_tree.join("tables/orders.toml"),
        "= broken too\n",
    )
    .expect("break file");

    let cli = StubCli::default();
    let err = world.run_with(&cli, &AlwaysReady).expect_err("syntax");

    assert_eq!(err.code(), codes::SYNTAX_STAGE_FAILED);
    let LifecycleError::SyntaxStage { failures } = err else {
        panic!("expected SyntaxStage");
    };
    assert_eq!(failures.len(), 2, "all broken files aggregated");
}

#[test]
fn lint_findings_fail_the_lint_stage() {
    let world = World::new();
    world.seed_durable();
    let cli = StubCli {
        lint: LintStatus::Findings("tables/users.toml: unknown key".to_string()),
        ..StubCli::default()
    };

    let err = world.run_with(&cli, &AlwaysReady).expect_err("lint");
    assert_eq!(err.code(), codes::LINT_STAGE_FAILED);
    assert_eq!(cli.apply_calls.get(), 0);
}

#[test]
fn inconsistent_live_state_blocks_the_apply() {
    let world = World::new();
    world.seed_durable();
    let cli = StubCli {
        consistency: ConsistencyStatus::Inconsistent {
            detail: "drifted index".to_string(),
        },
        ..StubCli::default()
    };

    let err = world.run_with(&cli, &AlwaysReady).expect_err("inconsistent");
    assert_eq!(err.code(), codes::CONSISTENCY_STAGE_FAILED);
    assert_eq!(cli.apply_calls.get(), 0);
}

#[test]
fn unready_service_is_a_hard_startup_failure() {
    let world = World::new();
    world.seed_durable();
    let cli = StubCli::default();

    let err = world.run_with(&cli, &NeverReady).expect_err("unready");
    assert_eq!(err.code(), codes::SERVICE_UNREADY);
    assert_eq!(cli.apply_calls.get(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Short-circuit and the consistency flag
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unchanged_diff_short_circuits_without_a_revision() {
    let world = World::new();
    world.seed_durable();
    let cli = StubCli {
        diff: DiffStatus::Unchanged,
        ..StubCli::default()
    };

    let outcome = world.run_with(&cli, &AlwaysReady).expect("up to date");
    assert_eq!(outcome, RunOutcome::NoChangesNeeded);
    assert_eq!(cli.apply_calls.get(), 0);
    assert!(revision_files(&world.paths.revisions_dir).is_empty());
    assert_eq!(
        cli.consistency_calls.get(),
        0,
        "consistency is skipped by default when nothing will be applied"
    );
}

#[test]
fn consistency_flag_keeps_the_check_on_unchanged_trees() {
    let mut world = World::new();
    world.options.consistency_check_when_unchanged = true;
    world.seed_durable();

    let clean = StubCli {
        diff: DiffStatus::Unchanged,
        ..StubCli::default()
    };
    let outcome = world.run_with(&clean, &AlwaysReady).expect("up to date");
    assert_eq!(outcome, RunOutcome::NoChangesNeeded);
    assert_eq!(clean.consistency_calls.get(), 1);

    let drifted = StubCli {
        diff: DiffStatus::Unchanged,
        consistency: ConsistencyStatus::Inconsistent {
            detail: "drift".to_string(),
        },
        ..StubCli::default()
    };
    let err = world.run_with(&drifted, &AlwaysReady).expect_err("drift");
    assert_eq!(err.code(), codes::CONSISTENCY_STAGE_FAILED);
}

// ─────────────────────────────────────────────────────────────────────────────
// Apply atomicity
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn failed_apply_leaves_the_durable_tree_at_its_pre_run_content() {
    let world = World::new();
    world.seed_durable();
    let before = digest_of(&world.paths.durable_tree);

    let cli = StubCli {
        apply_ok: false,
        ..StubCli::default()
    };
    let err = world.run_with(&cli, &AlwaysReady).expect_err("apply fails");

    assert_eq!(err.code(), codes::APPLY_FAILED);
    assert_eq!(cli.apply_calls.get(), 1);
    assert_eq!(
        digest_of(&world.paths.durable_tree),
        before,
        "no partial overwrite of the durable tree"
    );
    assert!(revision_files(&world.paths.revisions_dir).is_empty());

    // Partial progress is left for inspection, not rolled back.
    assert!(world.paths.staging_dir.join(".treeversion").is_file());
    assert!(world.paths.workspace_dir().join(".treeversion").is_file());
}
