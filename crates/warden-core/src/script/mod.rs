//! Script health: validation, repair, and the integrity state machine.
//!
//! A *script* is an executable file whose structural health must be
//! established before it is trusted to run. Health is defined entirely by
//! the seven-layer battery in [`validator`]; the pieces that can change a
//! script on disk ([`repair`], [`integrity`]) always re-establish health
//! through that same battery after every mutation.

pub mod checksum;
pub mod integrity;
pub mod repair;
pub mod validator;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default minimum script size in bytes. Guards against truncated writes.
pub const DEFAULT_MIN_SIZE: u64 = 200;

const fn default_min_size() -> u64 {
    DEFAULT_MIN_SIZE
}

fn default_interpreter() -> PathBuf {
    PathBuf::from("bash")
}

fn default_directives() -> Vec<String> {
    vec!["set -e".to_string(), "set -o pipefail".to_string()]
}

fn default_entry_marker() -> String {
    "#!/usr/bin/env bash".to_string()
}

/// Parameters of the validation battery and the repair transforms.
///
/// One policy is shared by every script the orchestrator manages; it is
/// configuration, not per-script state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPolicy {
    /// Minimum content length in bytes.
    #[serde(default = "default_min_size")]
    pub min_size: u64,

    /// Interpreter used for the no-execute syntax check (`<interpreter> -n`).
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,

    /// Fail-fast directives that must appear literally in the content, in
    /// the order the repairer inserts them.
    #[serde(default = "default_directives")]
    pub required_directives: Vec<String>,

    /// Entry marker line the repairer inserts when none is present.
    #[serde(default = "default_entry_marker")]
    pub default_entry_marker: String,
}

impl Default for ScriptPolicy {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            interpreter: default_interpreter(),
            required_directives: default_directives(),
            default_entry_marker: default_entry_marker(),
        }
    }
}

/// A primary script path and its backup slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPair {
    /// The live path the service actually executes.
    pub primary: PathBuf,

    /// The fallback copy consulted (and written) by the integrity manager.
    pub backup: PathBuf,
}

impl ScriptPair {
    /// Creates a pair from explicit paths.
    #[must_use]
    pub const fn new(primary: PathBuf, backup: PathBuf) -> Self {
        Self { primary, backup }
    }

    /// Creates a pair whose backup is `<primary>.bak`.
    #[must_use]
    pub fn with_default_backup(primary: &Path) -> Self {
        let mut name = primary.file_name().unwrap_or_default().to_os_string();
        name.push(".bak");
        let backup = primary.with_file_name(name);
        Self {
            primary: primary.to_path_buf(),
            backup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_carries_both_directives() {
        let policy = ScriptPolicy::default();
        assert_eq!(policy.min_size, DEFAULT_MIN_SIZE);
        assert_eq!(policy.required_directives.len(), 2);
        assert_eq!(policy.required_directives[0], "set -e");
        assert_eq!(policy.required_directives[1], "set -o pipefail");
    }

    #[test]
    fn default_backup_sits_beside_primary() {
        let pair = ScriptPair::with_default_backup(Path::new("/opt/svc/entry.sh"));
        assert_eq!(pair.backup, PathBuf::from("/opt/svc/entry.sh.bak"));
    }
}
