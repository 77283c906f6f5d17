//! Input resolution: normalise a user-supplied path or URL to a local video.
//!
//! ffmpeg needs a file-system path, so URLs are downloaded into a `TempDir`
//! owned by the returned [`ResolvedInput`]; it lives exactly as long as the
//! job holds it and is removed on drop, on success and failure alike.

use crate::error::SopError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: a caller-owned local file or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    /// Whether the file belongs to the caller (and may be removed on request).
    pub fn is_local(&self) -> bool {
        matches!(self, ResolvedInput::Local(_))
    }

    /// File name used for titles and the job record.
    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a readable local file, downloading URLs.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, SopError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn acquisition(input: &str, reason: impl Into<String>) -> SopError {
    SopError::MediaAcquisition {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, SopError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(acquisition(path_str, "file not found"));
    }
    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(acquisition(path_str, "permission denied"));
        }
        Err(e) => return Err(acquisition(path_str, e.to_string())),
    }

    debug!("Resolved local video: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, SopError> {
    info!("Downloading video from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| acquisition(url, e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            acquisition(url, format!("download timed out after {timeout_secs}s"))
        } else {
            acquisition(url, e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(acquisition(url, format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| SopError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| acquisition(url, e.to_string()))?;
    if bytes.is_empty() {
        return Err(acquisition(url, "empty response body"));
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| SopError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
pub(crate) fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.mp4".to_string()
}
