//! Seven-layer script validation battery.
//!
//! [`validate`] inspects a script file against a fixed, ordered battery of
//! structural checks. Every layer runs even when an earlier layer has
//! already failed, so one pass produces an exhaustive report. The function
//! is read-only, deterministic, and idempotent: repeated calls over
//! unchanged input return the same verdict.
//!
//! Layer order and their stable result codes:
//!
//! 1. Existence ([`codes::SCRIPT_MISSING`])
//! 2. Minimum size ([`codes::SCRIPT_TOO_SMALL`])
//! 3. Entry marker ([`codes::ENTRY_MARKER_MISSING`])
//! 4. Line-ending purity ([`codes::CARRIAGE_RETURNS_PRESENT`])
//! 5. Interpreter syntax, parse-only ([`codes::SYNTAX_INVALID`])
//! 6. Required fail-fast directives ([`codes::DIRECTIVE_MISSING`])
//! 7. Checksum sidecar match ([`codes::CHECKSUM_MISMATCH`])

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::{checksum, ScriptPolicy};
use crate::codes;

/// Matches an executable-interpreter entry marker: `#!` followed by an
/// absolute interpreter path, e.g. `#!/bin/bash` or `#!/usr/bin/env bash`.
static ENTRY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#!\s*/\S+").expect("entry marker regex is valid"));

/// Whether `line` is an acceptable interpreter entry marker.
///
/// Shared with the repairer so the repair transforms and the validation
/// battery agree on what counts as a marker.
#[must_use]
pub fn is_entry_marker(line: &str) -> bool {
    ENTRY_MARKER.is_match(line)
}

/// One validation layer of the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Path resolves to a regular file.
    Existence,
    /// Content length meets the minimum size threshold.
    MinimumSize,
    /// First line is an interpreter entry marker.
    EntryMarker,
    /// No carriage-return characters anywhere in the content.
    LineEndings,
    /// Content parses under the interpreter without executing.
    Syntax,
    /// Required fail-fast directives appear literally.
    Directives,
    /// Checksum sidecar, when present, matches the content.
    Checksum,
}

impl Layer {
    /// Stable result code for a failure of this layer.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Existence => codes::SCRIPT_MISSING,
            Self::MinimumSize => codes::SCRIPT_TOO_SMALL,
            Self::EntryMarker => codes::ENTRY_MARKER_MISSING,
            Self::LineEndings => codes::CARRIAGE_RETURNS_PRESENT,
            Self::Syntax => codes::SYNTAX_INVALID,
            Self::Directives => codes::DIRECTIVE_MISSING,
            Self::Checksum => codes::CHECKSUM_MISMATCH,
        }
    }

    /// Short layer name used in findings and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Existence => "existence",
            Self::MinimumSize => "minimum-size",
            Self::EntryMarker => "entry-marker",
            Self::LineEndings => "line-endings",
            Self::Syntax => "syntax",
            Self::Directives => "directives",
            Self::Checksum => "checksum",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed check, in battery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// The layer that failed.
    pub layer: Layer,

    /// What was observed.
    pub message: String,
}

impl Finding {
    fn new(layer: Layer, message: impl Into<String>) -> Self {
        Self {
            layer,
            message: message.into(),
        }
    }

    /// Stable result code of the failing layer.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.layer.code()
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code(), self.layer, self.message)
    }
}

/// Exhaustive failure report for one script.
///
/// Carries every finding the battery produced, in layer order. The report's
/// own [`code`](Self::code) is the code of the first (lowest-layer) finding.
#[derive(Debug, Clone, Error)]
pub struct ValidationReport {
    /// The script that was validated.
    pub path: PathBuf,

    /// Ordered findings. Never empty.
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    /// Stable result code: the first finding's layer code.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.findings.first().map_or(codes::OK, Finding::code)
    }

    /// Whether a specific layer is among the findings.
    #[must_use]
    pub fn failed_layer(&self, layer: Layer) -> bool {
        self.findings.iter().any(|f| f.layer == layer)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "script {} failed {} validation layer(s):",
            self.path.display(),
            self.findings.len()
        )?;
        for finding in &self.findings {
            write!(f, " {finding};")?;
        }
        Ok(())
    }
}

/// Runs the full battery against `path`.
///
/// # Errors
///
/// Returns a [`ValidationReport`] listing every failed layer. Success means
/// the report would have been empty.
pub fn validate(path: &Path, policy: &ScriptPolicy) -> Result<(), ValidationReport> {
    let mut findings = Vec::new();

    // Layer 1: existence. Later layers still run against whatever content
    // is readable (empty when nothing is), keeping the report exhaustive.
    let is_file = path.is_file();
    if !is_file {
        findings.push(Finding::new(
            Layer::Existence,
            "not a regular file".to_string(),
        ));
    }
    let content = std::fs::read(path).unwrap_or_default();

    // Layer 2: minimum size.
    if (content.len() as u64) < policy.min_size {
        findings.push(Finding::new(
            Layer::MinimumSize,
            format!("{} bytes, minimum is {}", content.len(), policy.min_size),
        ));
    }

    let text = String::from_utf8_lossy(&content);

    // Layer 3: entry marker on the first line.
    let first_line = text.lines().next().unwrap_or_default();
    if !ENTRY_MARKER.is_match(first_line) {
        findings.push(Finding::new(
            Layer::EntryMarker,
            format!("first line {first_line:?} is not an interpreter marker"),
        ));
    }

    // Layer 4: line-ending purity.
    if content.contains(&b'\r') {
        findings.push(Finding::new(
            Layer::LineEndings,
            "carriage-return characters present".to_string(),
        ));
    }

    // Layer 5: parse-only syntax check. Skipped (as a reported finding)
    // when there is no file for the interpreter to read.
    if is_file {
        match syntax_check(&policy.interpreter, path) {
            Ok(()) => {},
            Err(detail) => findings.push(Finding::new(Layer::Syntax, detail)),
        }
    } else {
        findings.push(Finding::new(
            Layer::Syntax,
            "no file to hand to the interpreter".to_string(),
        ));
    }

    // Layer 6: required directives, one finding per absent directive.
    for directive in &policy.required_directives {
        if !text.contains(directive.as_str()) {
            findings.push(Finding::new(
                Layer::Directives,
                format!("missing directive {directive:?}"),
            ));
        }
    }

    // Layer 7: checksum sidecar. Absent sidecar passes; unreadable or
    // mismatching sidecar is reported, never auto-corrected here.
    match checksum::stored_digest(path) {
        Ok(None) => {},
        Ok(Some(stored)) => {
            let actual = checksum::digest_hex(&content);
            if stored != actual {
                findings.push(Finding::new(
                    Layer::Checksum,
                    format!("sidecar records {stored}, content hashes to {actual}"),
                ));
            }
        },
        Err(e) => {
            findings.push(Finding::new(Layer::Checksum, format!("sidecar unreadable: {e}")));
        },
    }

    if findings.is_empty() {
        debug!(path = %path.display(), "script passed all validation layers");
        Ok(())
    } else {
        debug!(
            path = %path.display(),
            failed = findings.len(),
            "script failed validation"
        );
        Err(ValidationReport {
            path: path.to_path_buf(),
            findings,
        })
    }
}

/// Invokes `<interpreter> -n <path>`: parse the script, execute nothing.
fn syntax_check(interpreter: &Path, path: &Path) -> Result<(), String> {
    let output = Command::new(interpreter)
        .arg("-n")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("interpreter {} could not run: {e}", interpreter.display()))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "interpreter rejected the script: {}",
            stderr.trim().lines().next().unwrap_or("no diagnostic")
        ))
    }
}
