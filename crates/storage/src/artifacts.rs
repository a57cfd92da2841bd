//! Filesystem record of generated domain extracts.
//!
//! The extract file itself is the only record that a site has been
//! processed: if `{output_dir}/{lid}.{extension}` exists, the site is done.
//! The check is advisory. Two processes may both see the file missing and
//! extract the same site; the output name is the same, so the result is too.

use std::path::{Path, PathBuf};

use hydro_common::{HydroError, HydroResult};

/// Default extension of extraction artifacts (GeoPackage).
pub const DEFAULT_EXTENSION: &str = "gpkg";

/// Locates extraction artifacts on disk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    extension: String,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        Self {
            output_dir: output_dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the artifact for a site.
    ///
    /// The LID becomes a file name, so anything that could escape the output
    /// directory is rejected.
    pub fn artifact_path(&self, lid: &str) -> HydroResult<PathBuf> {
        let valid = !lid.is_empty()
            && lid != "."
            && lid != ".."
            && !lid.contains(['/', '\\', '\0']);

        if !valid {
            return Err(HydroError::InvalidLid(lid.to_string()));
        }

        Ok(self.output_dir.join(format!("{}.{}", lid, self.extension)))
    }

    /// Whether an artifact already exists for a site.
    pub async fn exists(&self, lid: &str) -> HydroResult<bool> {
        let path = self.artifact_path(lid)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Create the output directory if it is missing.
    pub async fn ensure_output_dir(&self) -> HydroResult<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path() {
        let store = ArtifactStore::new("/data/domains", ".gpkg");
        assert_eq!(
            store.artifact_path("BRRW3").unwrap(),
            PathBuf::from("/data/domains/BRRW3.gpkg")
        );
    }

    #[test]
    fn test_artifact_path_rejects_traversal() {
        let store = ArtifactStore::new("/data/domains", DEFAULT_EXTENSION);

        for lid in ["", ".", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                matches!(store.artifact_path(lid), Err(HydroError::InvalidLid(_))),
                "accepted {:?}",
                lid
            );
        }
    }

    #[tokio::test]
    async fn test_exists_tracks_file() {
        let dir = test_utils::artifact_dir();
        let store = ArtifactStore::new(dir.path(), DEFAULT_EXTENSION);

        assert!(!store.exists("BRRW3").await.unwrap());

        std::fs::write(dir.path().join("BRRW3.gpkg"), b"extract").unwrap();
        assert!(store.exists("BRRW3").await.unwrap());
        assert!(!store.exists("OTHER").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_output_dir() {
        let dir = test_utils::artifact_dir();
        let store = ArtifactStore::new(dir.path().join("nested/domains"), DEFAULT_EXTENSION);

        store.ensure_output_dir().await.unwrap();
        assert!(store.output_dir().is_dir());
    }
}
