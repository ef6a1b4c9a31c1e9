//! Checksum sidecar records.
//!
//! Every script may carry a detached BLAKE3 record in `<script>.b3sum`.
//! The validator consumes it (layer 7) and the repairer regenerates it on
//! every successful promotion. A missing sidecar is not an error; a
//! mismatching one is reported, never auto-corrected.

use std::io;
use std::path::{Path, PathBuf};

/// Sidecar file suffix appended to the script's file name.
pub const SIDECAR_SUFFIX: &str = ".b3sum";

/// Returns the sidecar path for a script path.
#[must_use]
pub fn sidecar_path(script: &Path) -> PathBuf {
    let mut name = script.file_name().unwrap_or_default().to_os_string();
    name.push(SIDECAR_SUFFIX);
    script.with_file_name(name)
}

/// BLAKE3 digest of `content` as lowercase hex.
#[must_use]
pub fn digest_hex(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Reads the stored digest for `script`, if a sidecar exists.
///
/// # Errors
///
/// Returns the underlying I/O error when the sidecar exists but cannot be
/// read.
pub fn stored_digest(script: &Path) -> io::Result<Option<String>> {
    match std::fs::read_to_string(sidecar_path(script)) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Writes (or rewrites) the sidecar record for `script` from `content`.
///
/// # Errors
///
/// Returns the underlying I/O error on write failure.
pub fn write_record(script: &Path, content: &[u8]) -> io::Result<()> {
    std::fs::write(sidecar_path(script), format!("{}\n", digest_hex(content)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/opt/svc/entry.sh")),
            PathBuf::from("/opt/svc/entry.sh.b3sum")
        );
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest_hex(b"content"), digest_hex(b"content"));
        assert_ne!(digest_hex(b"content"), digest_hex(b"other"));
    }

    #[test]
    fn record_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("entry.sh");
        std::fs::write(&script, b"#!/bin/sh\n").expect("write script");

        assert_eq!(stored_digest(&script).expect("read"), None);

        write_record(&script, b"#!/bin/sh\n").expect("write record");
        let stored = stored_digest(&script).expect("read").expect("present");
        assert_eq!(stored, digest_hex(b"#!/bin/sh\n"));
    }
}
