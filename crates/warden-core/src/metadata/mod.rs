//! Metadata tree model.
//!
//! A metadata tree is a directory of TOML configuration files plus a
//! plain-text version descriptor holding a single integer. The descriptor
//! gates every lifecycle branch: an internally inconsistent tree or one
//! with the wrong version must never be applied.

pub mod cli;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The single supported tree protocol version.
pub const SUPPORTED_TREE_VERSION: u32 = 1;

/// File name of the version descriptor inside a tree root.
pub const VERSION_DESCRIPTOR: &str = ".treeversion";

/// Extension of the structured configuration files the syntax scan covers.
pub const METADATA_FILE_EXTENSION: &str = "toml";

/// Problems with a tree's version descriptor.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The descriptor file does not exist.
    #[error("version descriptor {} is missing", path.display())]
    DescriptorMissing {
        /// The expected descriptor path.
        path: PathBuf,
    },

    /// The descriptor exists but cannot be read or parsed as an integer.
    #[error("version descriptor {} is malformed: {detail}", path.display())]
    DescriptorMalformed {
        /// The descriptor path.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },

    /// The descriptor parses but names an unsupported version.
    #[error("tree version {found} is not the supported version {supported}")]
    VersionMismatch {
        /// Version found in the descriptor.
        found: u32,
        /// The supported version.
        supported: u32,
    },
}

/// One syntactically invalid metadata file found by the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxFailure {
    /// Path relative to the scanned tree root.
    pub path: PathBuf,

    /// Parser diagnostic.
    pub detail: String,
}

/// A metadata tree rooted at a directory.
#[derive(Debug, Clone)]
pub struct MetadataTree {
    root: PathBuf,
}

impl MetadataTree {
    /// Wraps a tree root. The directory need not exist yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The tree's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the version descriptor.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join(VERSION_DESCRIPTOR)
    }

    /// Whether the tree is empty: the root is missing or contains no
    /// entries. This is the lifecycle route decision.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the root exists but cannot be
    /// read.
    pub fn is_empty(&self) -> io::Result<bool> {
        match std::fs::read_dir(&self.root) {
            Ok(mut entries) => Ok(entries.next().is_none()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Reads and checks the version descriptor against
    /// [`SUPPORTED_TREE_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] when the descriptor is missing, malformed,
    /// or names another version.
    pub fn read_version(&self) -> Result<u32, TreeError> {
        let path = self.descriptor_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TreeError::DescriptorMissing { path });
            },
            Err(e) => {
                return Err(TreeError::DescriptorMalformed {
                    path,
                    detail: e.to_string(),
                });
            },
        };

        let version: u32 = text
            .trim()
            .parse()
            .map_err(|e| TreeError::DescriptorMalformed {
                path,
                detail: format!("{e}"),
            })?;

        if version == SUPPORTED_TREE_VERSION {
            Ok(version)
        } else {
            Err(TreeError::VersionMismatch {
                found: version,
                supported: SUPPORTED_TREE_VERSION,
            })
        }
    }

    /// Scans every metadata file in the tree for TOML well-formedness,
    /// aggregating all failures before reporting, so one pass names every
    /// broken file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the walk itself fails; parse
    /// failures come back in the `Ok` vector.
    pub fn scan_syntax(&self) -> io::Result<Vec<SyntaxFailure>> {
        let mut failures = Vec::new();
        scan_dir(&self.root, &self.root, &mut failures)?;
        failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(failures)
    }

    /// BLAKE3 digest over the tree's sorted relative paths and contents.
    /// Recorded in deployment revisions to identify what was applied.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when a file cannot be read.
    pub fn digest(&self) -> io::Result<String> {
        let mut files = Vec::new();
        collect_files(&self.root, &self.root, &mut files)?;
        files.sort();

        let mut hasher = blake3::Hasher::new();
        for relative in &files {
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            hasher.update(&std::fs::read(self.root.join(relative))?);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

fn scan_dir(root: &Path, dir: &Path, failures: &mut Vec<SyntaxFailure>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan_dir(root, &path, failures)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext == METADATA_FILE_EXTENSION)
        {
            let text = std::fs::read_to_string(&path)?;
            if let Err(e) = text.parse::<toml::Table>() {
                failures.push(SyntaxFailure {
                    path: path.strip_prefix(root).unwrap_or(&path).to_path_buf(),
                    detail: e.message().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else {
            files.push(path.strip_prefix(root).unwrap_or(&path).to_path_buf());
        }
    }
    Ok(())
}
