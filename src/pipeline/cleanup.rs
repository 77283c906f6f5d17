//! Temp-resource tracking for one job.
//!
//! Every file a job creates in its work directory (audio, frames, the QR
//! artifact) is registered here as soon as its path is chosen. Release is
//! idempotent: a path is deleted at most once, already-missing files are
//! fine, and failures are reported as [`StageWarning::Cleanup`] rather than
//! errors. Dropping an un-released tracker releases it.

use crate::error::StageWarning;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct TempResources {
    paths: Vec<PathBuf>,
}

impl TempResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` for deletion; returns it for convenient chaining.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path.clone());
        }
        path
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every tracked path. Never fails; returns one warning per path
    /// that exists but could not be removed.
    pub fn release_all(&mut self) -> Vec<StageWarning> {
        let mut warnings = Vec::new();
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Could not delete {}: {}", path.display(), e);
                    warnings.push(StageWarning::Cleanup {
                        path,
                        detail: e.to_string(),
                    });
                }
            }
        }
        warnings
    }
}

impl Drop for TempResources {
    fn drop(&mut self) {
        if !self.paths.is_empty() {
            let _ = self.release_all();
        }
    }
}
