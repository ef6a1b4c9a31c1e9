//! Run configuration.
//!
//! One TOML file describes everything path- or policy-shaped about a
//! managed service instance. Nothing in the design hard-codes paths; this
//! module is where they all live.
//!
//! ```toml
//! [scripts]
//! operator = [
//!     { primary = "/opt/svc/bin/start.sh" },
//!     { primary = "/opt/svc/bin/stop.sh", backup = "/opt/svc/backup/stop.sh" },
//! ]
//! orchestrator = { primary = "/opt/svc/bin/entry.sh" }
//!
//! [metadata]
//! durable_tree = "/var/lib/svc/metadata"
//! staging_dir = "/var/lib/svc/staging"
//! runtime_root = "/run/svc"
//! template_archive = "/var/lib/svc/template"
//! revisions_dir = "/var/lib/svc/revisions"
//! cli_bin = "/usr/local/bin/metacli"
//! live_target = "svc-main"
//!
//! [service]
//! probe_command = ["curl", "-sf", "http://127.0.0.1:8080/healthz"]
//! readiness_attempts = 30
//! readiness_interval = "2s"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::{LifecyclePaths, LifecycleOptions};
use crate::retry::RetryPolicy;
use crate::script::{ScriptPair, ScriptPolicy};

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("serializing configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration parsed but describes a broken layout.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// One script pair in configuration; the backup slot defaults to
/// `<primary>.bak`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPairConfig {
    /// The live script path.
    pub primary: PathBuf,

    /// Optional explicit backup slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

impl ScriptPairConfig {
    /// Resolves the configured pair.
    #[must_use]
    pub fn pair(&self) -> ScriptPair {
        match &self.backup {
            Some(backup) => ScriptPair::new(self.primary.clone(), backup.clone()),
            None => ScriptPair::with_default_backup(&self.primary),
        }
    }
}

/// Script integrity section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptsConfig {
    /// Shared validation/repair policy.
    #[serde(default)]
    pub policy: ScriptPolicy,

    /// Operator-facing script pairs, checked before anything else runs.
    #[serde(default)]
    pub operator: Vec<ScriptPairConfig>,

    /// The orchestrator's own script pair, handled by the self-repair
    /// protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator: Option<ScriptPairConfig>,

    /// Readiness marker written when a repaired backup awaits promotion.
    /// Defaults to `<orchestrator primary>.repair-ready`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_marker: Option<PathBuf>,
}

impl ScriptsConfig {
    /// The effective readiness marker path, if an orchestrator pair is
    /// configured.
    #[must_use]
    pub fn marker_path(&self) -> Option<PathBuf> {
        if let Some(marker) = &self.readiness_marker {
            return Some(marker.clone());
        }
        self.orchestrator.as_ref().map(|pair| {
            let mut name = pair
                .primary
                .file_name()
                .unwrap_or_default()
                .to_os_string();
            name.push(".repair-ready");
            pair.primary.with_file_name(name)
        })
    }
}

/// Metadata lifecycle section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// The durable metadata tree directory.
    pub durable_tree: PathBuf,

    /// The ephemeral staging directory.
    pub staging_dir: PathBuf,

    /// The live runtime root.
    pub runtime_root: PathBuf,

    /// Workspace subdirectory name under the runtime root. The external
    /// CLI owns its creation timing.
    #[serde(default = "default_workspace_subdir")]
    pub workspace_subdir: String,

    /// The read-only template archive directory.
    pub template_archive: PathBuf,

    /// The deployment revision log directory.
    pub revisions_dir: PathBuf,

    /// The external metadata CLI binary.
    pub cli_bin: PathBuf,

    /// Live service identity handed to the CLI.
    pub live_target: String,
}

fn default_workspace_subdir() -> String {
    "workspace".to_string()
}

/// Backend service probe section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Argv-style readiness probe command; exit 0 means ready.
    #[serde(default)]
    pub probe_command: Vec<String>,

    /// Readiness polling attempts.
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,

    /// Interval between readiness probes.
    #[serde(default = "default_readiness_interval")]
    #[serde(with = "humantime_serde")]
    pub readiness_interval: Duration,
}

const fn default_readiness_attempts() -> u32 {
    30
}

const fn default_readiness_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            probe_command: Vec::new(),
            readiness_attempts: default_readiness_attempts(),
            readiness_interval: default_readiness_interval(),
        }
    }
}

impl ServiceConfig {
    /// The bounded readiness polling policy.
    #[must_use]
    pub const fn readiness_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.readiness_attempts, self.readiness_interval)
    }
}

/// Reconcile branch knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Whether consistency is still checked when the diff stage already
    /// reported "unchanged".
    #[serde(default)]
    pub consistency_check_when_unchanged: bool,

    /// Attempts waiting for the externally created workspace directory.
    #[serde(default = "default_workspace_attempts")]
    pub workspace_wait_attempts: u32,

    /// Interval between workspace-appearance checks.
    #[serde(default = "default_workspace_interval")]
    #[serde(with = "humantime_serde")]
    pub workspace_wait_interval: Duration,
}

const fn default_workspace_attempts() -> u32 {
    5
}

const fn default_workspace_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            consistency_check_when_unchanged: false,
            workspace_wait_attempts: default_workspace_attempts(),
            workspace_wait_interval: default_workspace_interval(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Script integrity section.
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Metadata lifecycle section.
    pub metadata: MetadataConfig,

    /// Backend service probe section.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Reconcile branch knobs.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl WardenConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rejects obviously broken layouts before the pipeline touches
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pair_config in self
            .scripts
            .operator
            .iter()
            .chain(self.scripts.orchestrator.as_ref())
        {
            let pair = pair_config.pair();
            if pair.primary == pair.backup {
                return Err(ConfigError::Validation(format!(
                    "script {} uses itself as its backup slot",
                    pair.primary.display()
                )));
            }
        }

        let durable = &self.metadata.durable_tree;
        let staging = &self.metadata.staging_dir;
        if durable == staging || durable.starts_with(staging) || staging.starts_with(durable) {
            return Err(ConfigError::Validation(format!(
                "staging directory {} must be disjoint from the durable tree {}",
                staging.display(),
                durable.display()
            )));
        }

        if self.service.probe_command.is_empty() {
            return Err(ConfigError::Validation(
                "service.probe_command must not be empty".to_string(),
            ));
        }
        if self.service.readiness_attempts == 0 {
            return Err(ConfigError::Validation(
                "service.readiness_attempts must be at least 1".to_string(),
            ));
        }
        if self.reconcile.workspace_wait_attempts == 0 {
            return Err(ConfigError::Validation(
                "reconcile.workspace_wait_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The lifecycle filesystem layout.
    #[must_use]
    pub fn lifecycle_paths(&self) -> LifecyclePaths {
        LifecyclePaths {
            durable_tree: self.metadata.durable_tree.clone(),
            staging_dir: self.metadata.staging_dir.clone(),
            runtime_root: self.metadata.runtime_root.clone(),
            workspace_subdir: self.metadata.workspace_subdir.clone(),
            template_archive: self.metadata.template_archive.clone(),
            revisions_dir: self.metadata.revisions_dir.clone(),
        }
    }

    /// The lifecycle behavioral knobs.
    #[must_use]
    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            live_target: self.metadata.live_target.clone(),
            consistency_check_when_unchanged: self.reconcile.consistency_check_when_unchanged,
            workspace_wait: RetryPolicy::new(
                self.reconcile.workspace_wait_attempts,
                self.reconcile.workspace_wait_interval,
            ),
            readiness_wait: self.service.readiness_policy(),
        }
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
