//! Staging-copy and tree-copy primitives.
//!
//! These are the only routines that bulk-mutate tree directories, and they
//! are deliberately conservative: source symlinks are refused rather than
//! followed, purges remove a directory's contents but never the directory
//! itself, and every error names the path it happened on.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Failures of the copy/purge primitives.
#[derive(Debug, Error)]
pub enum StagingError {
    /// A symlink was found where a regular file or directory was expected.
    #[error("refusing to copy symlink at {}", path.display())]
    SymlinkRefused {
        /// The offending path.
        path: PathBuf,
    },

    /// An I/O error with the operation that produced it.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl StagingError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Removes everything inside `dir` without removing `dir` itself.
///
/// Symlinked entries are unlinked, never followed. A missing `dir` is a
/// no-op.
///
/// # Errors
///
/// Returns a [`StagingError`] on the first entry that cannot be removed.
pub fn purge_dir_contents(dir: &Path) -> Result<(), StagingError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StagingError::io(format!("reading {}", dir.display()), e)),
    };

    for entry in entries {
        let path = entry
            .map_err(|e| StagingError::io(format!("reading entry in {}", dir.display()), e))?
            .path();
        let meta = std::fs::symlink_metadata(&path)
            .map_err(|e| StagingError::io(format!("stat {}", path.display()), e))?;

        if meta.is_dir() {
            std::fs::remove_dir_all(&path)
                .map_err(|e| StagingError::io(format!("removing {}", path.display()), e))?;
        } else {
            // Regular files and symlinks alike: unlink, never follow.
            std::fs::remove_file(&path)
                .map_err(|e| StagingError::io(format!("removing {}", path.display()), e))?;
        }
    }
    debug!(dir = %dir.display(), "directory contents purged");
    Ok(())
}

/// Recursively copies the contents of `src` into `dst`, creating `dst` as
/// needed. Fails closed on symlinks in the source tree.
///
/// # Errors
///
/// Returns a [`StagingError`] on the first entry that cannot be copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), StagingError> {
    std::fs::create_dir_all(dst)
        .map_err(|e| StagingError::io(format!("creating {}", dst.display()), e))?;

    for entry in std::fs::read_dir(src)
        .map_err(|e| StagingError::io(format!("reading {}", src.display()), e))?
    {
        let path = entry
            .map_err(|e| StagingError::io(format!("reading entry in {}", src.display()), e))?
            .path();
        let meta = std::fs::symlink_metadata(&path)
            .map_err(|e| StagingError::io(format!("stat {}", path.display()), e))?;
        let target = dst.join(path.file_name().unwrap_or_default());

        if meta.file_type().is_symlink() {
            return Err(StagingError::SymlinkRefused { path });
        }
        if meta.is_dir() {
            copy_tree(&path, &target)?;
        } else {
            std::fs::copy(&path, &target).map_err(|e| {
                StagingError::io(
                    format!("copying {} to {}", path.display(), target.display()),
                    e,
                )
            })?;
        }
    }
    Ok(())
}

/// Prepares a clean staging copy of `durable` at `staging`: create, purge,
/// copy.
///
/// # Errors
///
/// Returns the first [`StagingError`] from the underlying steps.
pub fn prepare_staging(durable: &Path, staging: &Path) -> Result<(), StagingError> {
    std::fs::create_dir_all(staging)
        .map_err(|e| StagingError::io(format!("creating {}", staging.display()), e))?;
    purge_dir_contents(staging)?;
    copy_tree(durable, staging)?;
    debug!(
        durable = %durable.display(),
        staging = %staging.display(),
        "staging copy prepared"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path) {
        std::fs::create_dir_all(root.join("tables")).expect("mkdir");
        std::fs::write(root.join(".treeversion"), "1\n").expect("write");
        std::fs::write(root.join("tables/users.toml"), "name = \"users\"\n").expect("write");
    }

    #[test]
    fn purge_empties_but_keeps_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        populate(dir.path());

        purge_dir_contents(dir.path()).expect("purge");
        assert!(dir.path().is_dir());
        assert_eq!(
            std::fs::read_dir(dir.path()).expect("read").count(),
            0,
            "no entries left"
        );
    }

    #[test]
    fn purge_of_missing_directory_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        purge_dir_contents(&dir.path().join("absent")).expect("noop");
    }

    #[test]
    fn copy_tree_preserves_layout() {
        let src = tempfile::tempdir().expect("tempdir");
        let dst = tempfile::tempdir().expect("tempdir");
        populate(src.path());

        copy_tree(src.path(), &dst.path().join("copy")).expect("copy");
        let copied = dst.path().join("copy");
        assert!(copied.join(".treeversion").is_file());
        assert_eq!(
            std::fs::read_to_string(copied.join("tables/users.toml")).expect("read"),
            "name = \"users\"\n"
        );
    }

    #[test]
    #[cfg(unix)]
    fn copy_tree_refuses_source_symlinks() {
        let src = tempfile::tempdir().expect("tempdir");
        let dst = tempfile::tempdir().expect("tempdir");
        populate(src.path());
        std::os::unix::fs::symlink("/etc/passwd", src.path().join("evil")).expect("symlink");

        let err = copy_tree(src.path(), &dst.path().join("copy")).expect_err("refused");
        assert!(matches!(err, StagingError::SymlinkRefused { .. }));
    }

    #[test]
    fn staging_is_rebuilt_from_scratch() {
        let durable = tempfile::tempdir().expect("tempdir");
        let staging = tempfile::tempdir().expect("tempdir");
        populate(durable.path());
        std::fs::write(staging.path().join("stale.toml"), "old = true\n").expect("write");

        prepare_staging(durable.path(), staging.path()).expect("prepare");
        assert!(!staging.path().join("stale.toml").exists());
        assert!(staging.path().join(".treeversion").is_file());
        assert!(staging.path().join("tables/users.toml").is_file());
    }
}
