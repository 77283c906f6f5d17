//! Filesystem artifact store.
//!
//! Finished documents live at `<root>/<job-id>.pdf` and are referenced
//! externally as `/download/<job-id>.pdf`. Writes are atomic (temp file +
//! rename) so a reader never sees a half-written PDF.

use crate::error::SopError;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// URL path prefix of download references.
pub const DOWNLOAD_PREFIX: &str = "/download/";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_name(job_id: Uuid) -> String {
        format!("{job_id}.pdf")
    }

    pub fn path_for(&self, job_id: Uuid) -> PathBuf {
        self.root.join(Self::file_name(job_id))
    }

    /// External reference handed to callers, e.g. `/download/<id>.pdf`.
    pub fn download_ref(job_id: Uuid) -> String {
        format!("{DOWNLOAD_PREFIX}{}", Self::file_name(job_id))
    }

    /// Write the document for `job_id` atomically; returns its final path.
    pub async fn write(&self, job_id: Uuid, bytes: &[u8]) -> Result<PathBuf, SopError> {
        let path = self.path_for(job_id);
        write_atomic(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Look up a stored artifact by file name (e.g. `"<id>.pdf"`).
    ///
    /// Anything that is not a plain file name inside the root is rejected,
    /// so `../secret` or `/etc/passwd` can never escape the store.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, SopError> {
        let not_found = || SopError::ArtifactNotFound {
            name: name.to_string(),
        };
        let plain = Path::new(name)
            .file_name()
            .is_some_and(|f| f == name)
            && !name.is_empty()
            && !name.contains(['/', '\\']);
        if !plain {
            return Err(not_found());
        }
        let path = self.root.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(not_found())
        }
    }
}

/// Write `bytes` to `path` via a sibling `.tmp` file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SopError> {
    let fail = |source: std::io::Error| SopError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await.map_err(fail)?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(fail(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_ref_format() {
        let id = Uuid::nil();
        assert_eq!(
            ArtifactStore::download_ref(id),
            "/download/00000000-0000-0000-0000-000000000000.pdf"
        );
    }

    #[tokio::test]
    async fn write_is_atomic_and_resolvable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("out"));
        let id = Uuid::new_v4();
        let path = store.write(id, b"%PDF-1.3 test").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.3 test");
        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());

        assert_eq!(store.resolve(&ArtifactStore::file_name(id)).unwrap(), path);
    }

    #[test]
    fn resolve_rejects_traversal_and_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        let store = ArtifactStore::new(dir.path().join("store"));
        std::fs::create_dir(store.root()).unwrap();

        for name in ["../a.pdf", "/etc/passwd", "..", "", "sub/a.pdf", "missing.pdf"] {
            assert!(
                matches!(store.resolve(name), Err(SopError::ArtifactNotFound { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn unwritable_root_is_output_write_failed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // A regular file where a directory is expected.
        let store = ArtifactStore::new(blocker.join("nested"));
        let err = store.write(Uuid::new_v4(), b"x").await.unwrap_err();
        assert!(matches!(err, SopError::OutputWriteFailed { .. }));
    }
}
