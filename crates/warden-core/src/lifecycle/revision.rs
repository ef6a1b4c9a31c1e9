//! Deployment revision log.
//!
//! One immutable JSON record per successful apply, one file per record,
//! named by a zero-padded strictly increasing identifier. Records are
//! written with `create_new` and never rewritten; the log directory *is*
//! the log.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Identifier of one deployment revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevisionId(pub u64);

impl std::fmt::Display for RevisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

/// The durable record of one successful apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Strictly increasing identifier.
    pub id: u64,

    /// When the apply succeeded (UTC).
    pub applied_at: DateTime<Utc>,

    /// Digest of the tree content that was applied.
    pub tree_digest: String,
}

/// Failures of the revision log.
#[derive(Debug, Error)]
pub enum RevisionError {
    /// An I/O failure reading or writing the log directory.
    #[error("revision log I/O at {}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A record could not be serialized.
    #[error("serializing revision record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only revision log over a directory.
#[derive(Debug, Clone)]
pub struct RevisionLog {
    dir: PathBuf,
}

impl RevisionLog {
    const PREFIX: &'static str = "revision-";
    const SUFFIX: &'static str = ".json";

    /// Wraps the log directory. Created lazily on first append.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record file for `id`.
    #[must_use]
    pub fn record_path(&self, id: RevisionId) -> PathBuf {
        self.dir.join(format!("{}{id}{}", Self::PREFIX, Self::SUFFIX))
    }

    /// Highest identifier currently in the log, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`RevisionError`] when the directory exists but cannot be
    /// read.
    pub fn latest_id(&self) -> Result<Option<RevisionId>, RevisionError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RevisionError::Io {
                    path: self.dir.clone(),
                    source: e,
                });
            },
        };

        let mut latest = None;
        for entry in entries {
            let entry = entry.map_err(|e| RevisionError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix(Self::PREFIX))
                .and_then(|n| n.strip_suffix(Self::SUFFIX))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            latest = latest.max(Some(id));
        }
        Ok(latest.map(RevisionId))
    }

    /// Appends a new record with the next identifier and returns it.
    ///
    /// # Errors
    ///
    /// Returns a [`RevisionError`] when the record cannot be written. The
    /// record file is created with `create_new`, so an identifier is never
    /// reused even across racing invocations.
    pub fn append(&self, tree_digest: String) -> Result<RevisionId, RevisionError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RevisionError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let id = RevisionId(self.latest_id()?.map_or(1, |RevisionId(n)| n + 1));
        let record = RevisionRecord {
            id: id.0,
            applied_at: Utc::now(),
            tree_digest,
        };

        let path = self.record_path(id);
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| RevisionError::Io {
                path: path.clone(),
                source: e,
            })?;
        serde_json::to_writer_pretty(file, &record)?;

        info!(revision = %id, path = %path.display(), "deployment revision recorded");
        Ok(id)
    }

    /// Number of records in the log.
    ///
    /// # Errors
    ///
    /// Returns a [`RevisionError`] when the directory exists but cannot be
    /// read.
    pub fn len(&self) -> Result<usize, RevisionError> {
        match std::fs::read_dir(&self.dir) {
            Ok(entries) => Ok(entries
                .filter_map(Result::ok)
                .filter(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|n| n.starts_with(Self::PREFIX) && n.ends_with(Self::SUFFIX))
                })
                .count()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(RevisionError::Io {
                path: self.dir.clone(),
                source: e,
            }),
        }
    }

    /// Whether the log holds no records.
    ///
    /// # Errors
    ///
    /// Returns a [`RevisionError`] when the directory exists but cannot be
    /// read.
    pub fn is_empty(&self) -> Result<bool, RevisionError> {
        Ok(self.len()? == 0)
    }
}
