//! Read-only version manifest shipped alongside the installed software.
//!
//! The manifest pins the catalog schema version the installed binaries expect.
//! Lifecycle commands compare it with the version recorded in the catalog and
//! refuse to run when the catalog is ahead.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Versions declared by the installed software.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VersionManifest {
    /// Human-readable release string.
    pub software_version: String,
    /// Catalog schema version the release expects.
    pub catalog_schema_version: u32,
}

impl VersionManifest {
    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Read`] when the file cannot be read and
    /// [`ManifestError::Parse`] when it is not a valid manifest.
    pub fn read(path: &Utf8Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Utf8Path, content: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Errors raised while loading the version manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read version manifest '{path}': {source}")]
    Read {
        /// Manifest location.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The manifest file was not valid JSON or lacked required keys.
    #[error("failed to parse version manifest '{path}': {source}")]
    Parse {
        /// Manifest location.
        path: Utf8PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest_path(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("VERSION.json")).expect("utf-8 temp path")
    }

    #[test]
    fn reads_schema_version() {
        let dir = TempDir::new().expect("temp dir");
        let path = manifest_path(&dir);
        fs::write(
            &path,
            r#"{"software_version": "4.3.1", "catalog_schema_version": 7}"#,
        )
        .expect("write manifest");

        let manifest = VersionManifest::read(&path).expect("read manifest");
        assert_eq!(manifest.catalog_schema_version, 7);
        assert_eq!(manifest.software_version, "4.3.1");
    }

    #[test]
    fn missing_manifest_is_a_read_error() {
        let dir = TempDir::new().expect("temp dir");
        let error = VersionManifest::read(&manifest_path(&dir)).expect_err("missing file");
        assert!(matches!(error, ManifestError::Read { .. }));
    }

    #[test]
    fn negative_schema_version_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = manifest_path(&dir);
        fs::write(
            &path,
            r#"{"software_version": "4.3.1", "catalog_schema_version": -1}"#,
        )
        .expect("write manifest");
        let error = VersionManifest::read(&path).expect_err("negative version");
        assert!(matches!(error, ManifestError::Parse { .. }));
    }
}
