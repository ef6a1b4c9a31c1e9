//! Isolated script repair pipeline.
//!
//! [`repair`] never touches `source` or `destination` until the final
//! promotion step: the candidate is copied into a uniquely named temporary
//! workspace, rewritten there by an ordered list of pure text transforms,
//! and re-validated in place. Only a candidate that passes the full battery
//! is promoted. The workspace is discarded unconditionally, including on
//! every early failure path, so no partially repaired state is ever visible
//! at a stable path.
//!
//! `source` and `destination` may be the same path (repair into place) or
//! different (repair into the backup slot); the algorithm is identical
//! either way.
//!
//! Repair is not guaranteed to succeed: the transforms fix entry markers,
//! fail-fast directives, and line endings, nothing else. A genuine syntax
//! error survives them and surfaces as
//! [`RepairError::PostRepairValidation`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::validator::{validate, ValidationReport};
use super::{checksum, ScriptPolicy};
use crate::codes;

/// Errors from the repair pipeline, one per fallible step.
#[derive(Debug, Error)]
pub enum RepairError {
    /// Allocating the workspace or staging the candidate into it failed.
    #[error("repair workspace setup for {} failed: {source}", path.display())]
    Workspace {
        /// The script being repaired.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The candidate still fails validation after all transforms ran.
    #[error("repaired candidate still unhealthy: {0}")]
    PostRepairValidation(#[source] ValidationReport),

    /// Copying the validated candidate to the destination failed.
    #[error("promoting repaired script to {} failed: {source}", path.display())]
    Promote {
        /// The destination path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Marking the promoted script executable failed.
    #[error("marking {} executable failed: {source}", path.display())]
    ExecBit {
        /// The destination path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl RepairError {
    /// Stable result code for this failure.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Workspace { .. } => codes::REPAIR_WORKSPACE_FAILED,
            Self::PostRepairValidation(_) => codes::POST_REPAIR_VALIDATION_FAILED,
            Self::Promote { .. } => codes::PROMOTE_FAILED,
            Self::ExecBit { .. } => codes::EXEC_BIT_FAILED,
        }
    }
}

/// One pure text transform of the repair sequence.
///
/// Transforms take the full script text and return the corrected text; they
/// never touch the filesystem, which makes each independently testable
/// against fixture strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRule {
    /// Strip every carriage-return character.
    StripCarriageReturns,
    /// Prepend the default entry marker when the first line is not one.
    EnsureEntryMarker,
    /// Insert the n-th required directive when absent. Directive 0 goes
    /// immediately after the entry marker; each later directive goes
    /// immediately after its predecessor.
    EnsureDirective(usize),
}

/// The fixed repair sequence, applied in order.
pub const TRANSFORMS: &[TransformRule] = &[
    TransformRule::StripCarriageReturns,
    TransformRule::EnsureEntryMarker,
    TransformRule::EnsureDirective(0),
    TransformRule::EnsureDirective(1),
];

impl TransformRule {
    /// Applies this rule to `text` under `policy`.
    #[must_use]
    pub fn apply(self, text: &str, policy: &ScriptPolicy) -> String {
        match self {
            Self::StripCarriageReturns => text.replace('\r', ""),
            Self::EnsureEntryMarker => {
                let first_line = text.lines().next().unwrap_or_default();
                if super::validator::is_entry_marker(first_line) {
                    text.to_string()
                } else {
                    format!("{}\n{text}", policy.default_entry_marker)
                }
            },
            Self::EnsureDirective(index) => {
                let Some(directive) = policy.required_directives.get(index) else {
                    return text.to_string();
                };
                if text.contains(directive.as_str()) {
                    return text.to_string();
                }
                insert_after_line(text, index, directive)
            },
        }
    }
}

/// Inserts `line` after line `position` (0-based), i.e. directive 0 lands
/// on line 1 right after the marker.
fn insert_after_line(text: &str, position: usize, line: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    let at = (position + 1).min(lines.len());
    lines.insert(at, line);
    let mut out = lines.join("\n");
    if text.ends_with('\n') || !text.contains('\n') {
        out.push('\n');
    }
    out
}

/// Applies the full transform sequence to `text`.
#[must_use]
pub fn apply_transforms(text: &str, policy: &ScriptPolicy) -> String {
    TRANSFORMS
        .iter()
        .fold(text.to_string(), |acc, rule| rule.apply(&acc, policy))
}

/// Repairs `source` into `destination` through an isolated workspace.
///
/// On success the destination holds validated content, is executable, and
/// carries a fresh checksum sidecar. A sidecar write failure after
/// successful promotion is logged as a warning, not returned as an error:
/// the repaired script is already usable.
///
/// # Errors
///
/// Returns a distinct [`RepairError`] per failing step; see the module
/// documentation for the non-goals of repair.
pub fn repair(
    source: &Path,
    destination: &Path,
    policy: &ScriptPolicy,
) -> Result<(), RepairError> {
    let workspace = tempfile::Builder::new()
        .prefix("warden-repair-")
        .tempdir()
        .map_err(|e| RepairError::Workspace {
            path: source.to_path_buf(),
            source: e,
        })?;

    let candidate = workspace
        .path()
        .join(source.file_name().unwrap_or_else(|| "script".as_ref()));

    let original = std::fs::read(source).map_err(|e| RepairError::Workspace {
        path: source.to_path_buf(),
        source: e,
    })?;

    let repaired = apply_transforms(&String::from_utf8_lossy(&original), policy);
    std::fs::write(&candidate, &repaired).map_err(|e| RepairError::Workspace {
        path: source.to_path_buf(),
        source: e,
    })?;
    debug!(
        source = %source.display(),
        workspace = %candidate.display(),
        "repair candidate staged"
    );

    validate(&candidate, policy).map_err(RepairError::PostRepairValidation)?;

    std::fs::write(destination, &repaired).map_err(|e| RepairError::Promote {
        path: destination.to_path_buf(),
        source: e,
    })?;
    set_executable(destination).map_err(|e| RepairError::ExecBit {
        path: destination.to_path_buf(),
        source: e,
    })?;

    if let Err(e) = checksum::write_record(destination, repaired.as_bytes()) {
        warn!(
            path = %destination.display(),
            error = %e,
            "checksum sidecar write failed after successful repair"
        );
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        "script repaired and promoted"
    );
    Ok(())
}

/// Sets the owner/group/other executable bits.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_body() -> String {
        let mut s = String::from("#!/usr/bin/env bash\nset -e\nset -o pipefail\n\n");
        s.push_str("# Entry point for the managed backend service.\n");
        s.push_str("# Applies pending configuration and then launches the server\n");
        s.push_str("# in the foreground so the supervisor owns its lifetime.\n");
        s.push_str("echo \"starting service\"\n");
        s.push_str("exec sleep 300\n");
        s
    }

    mod transforms {
        use super::*;

        #[test]
        fn strips_carriage_returns() {
            let policy = ScriptPolicy::default();
            let out = TransformRule::StripCarriageReturns.apply("a\r\nb\r\n", &policy);
            assert_eq!(out, "a\nb\n");
        }

        #[test]
        fn inserts_marker_only_when_absent() {
            let policy = ScriptPolicy::default();
            let out = TransformRule::EnsureEntryMarker.apply("echo hi\n", &policy);
            assert!(out.starts_with("#!/usr/bin/env bash\necho hi"));

            let untouched = TransformRule::EnsureEntryMarker.apply("#!/bin/sh\necho hi\n", &policy);
            assert_eq!(untouched, "#!/bin/sh\necho hi\n");
        }

        #[test]
        fn first_directive_lands_after_marker() {
            let policy = ScriptPolicy::default();
            let out = TransformRule::EnsureDirective(0).apply("#!/bin/bash\necho hi\n", &policy);
            let lines: Vec<&str> = out.lines().collect();
            assert_eq!(lines[0], "#!/bin/bash");
            assert_eq!(lines[1], "set -e");
            assert_eq!(lines[2], "echo hi");
        }

        #[test]
        fn second_directive_lands_after_first() {
            let policy = ScriptPolicy::default();
            let out =
                TransformRule::EnsureDirective(1).apply("#!/bin/bash\nset -e\necho hi\n", &policy);
            let lines: Vec<&str> = out.lines().collect();
            assert_eq!(lines[1], "set -e");
            assert_eq!(lines[2], "set -o pipefail");
        }

        #[test]
        fn present_directive_is_left_alone() {
            let policy = ScriptPolicy::default();
            let text = "#!/bin/bash\nset -e\necho hi\n";
            assert_eq!(TransformRule::EnsureDirective(0).apply(text, &policy), text);
        }

        #[test]
        fn full_sequence_is_deterministic() {
            let policy = ScriptPolicy::default();
            let input = "echo hi\r\n";
            let once = apply_transforms(input, &policy);
            let twice = apply_transforms(&once, &policy);
            assert_eq!(once, twice);
            let lines: Vec<&str> = once.lines().collect();
            assert_eq!(lines[0], "#!/usr/bin/env bash");
            assert_eq!(lines[1], "set -e");
            assert_eq!(lines[2], "set -o pipefail");
            assert_eq!(lines[3], "echo hi");
        }
    }

    mod pipeline {
        use super::*;

        #[test]
        fn repair_closure_over_mechanical_corruption() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = dir.path().join("entry.sh");
            // Marker missing, directives missing, CRLF endings.
            let corrupted = healthy_body()
                .replace("#!/usr/bin/env bash\n", "")
                .replace("set -e\n", "")
                .replace("set -o pipefail\n", "")
                .replace('\n', "\r\n");
            std::fs::write(&source, corrupted).expect("write source");

            let policy = ScriptPolicy::default();
            let destination = dir.path().join("entry.sh.bak");
            repair(&source, &destination, &policy).expect("mechanical corruption repairs");

            validate(&destination, &policy).expect("repaired script is healthy");
        }

        #[test]
        fn repair_into_place_is_supported() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = dir.path().join("entry.sh");
            std::fs::write(&source, healthy_body().replace("set -e\n", "")).expect("write");

            let policy = ScriptPolicy::default();
            repair(&source, &source, &policy).expect("repair into place");
            validate(&source, &policy).expect("healthy in place");
        }

        #[test]
        fn repair_does_not_fix_genuine_syntax_errors() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = dir.path().join("entry.sh");
            let mut broken = healthy_body();
            broken.push_str("if true; then\n");
            std::fs::write(&source, &broken).expect("write source");

            let destination = dir.path().join("entry.sh.bak");
            let err = repair(&source, &destination, &ScriptPolicy::default())
                .expect_err("syntax errors are not repaired");

            assert_eq!(err.code(), codes::POST_REPAIR_VALIDATION_FAILED);
            assert!(!destination.exists(), "failed repair must not promote");
        }

        #[test]
        fn promotion_refreshes_the_checksum_sidecar() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = dir.path().join("entry.sh");
            std::fs::write(&source, healthy_body().replace("set -o pipefail\n", ""))
                .expect("write");

            let policy = ScriptPolicy::default();
            repair(&source, &source, &policy).expect("repair");

            let content = std::fs::read(&source).expect("read repaired");
            let stored = checksum::stored_digest(&source)
                .expect("sidecar readable")
                .expect("sidecar present");
            assert_eq!(stored, checksum::digest_hex(&content));
        }

        #[test]
        #[cfg(unix)]
        fn promotion_sets_the_executable_bit() {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().expect("tempdir");
            let source = dir.path().join("entry.sh");
            std::fs::write(&source, healthy_body().replace("set -e\n", "")).expect("write");

            repair(&source, &source, &ScriptPolicy::default()).expect("repair");
            let mode = std::fs::metadata(&source).expect("stat").permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        #[test]
        fn missing_source_fails_workspace_setup() {
            let dir = tempfile::tempdir().expect("tempdir");
            let source = dir.path().join("absent.sh");
            let err = repair(&source, &source, &ScriptPolicy::default())
                .expect_err("missing source");
            assert_eq!(err.code(), codes::REPAIR_WORKSPACE_FAILED);
        }
    }
}
