//! Error types for the video2sop library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SopError`] is **fatal**: the job cannot produce a document at all
//!   (unreadable video, no audio track, transcription unavailable). Returned
//!   as `Err(SopError)` from [`crate::convert::Pipeline::run`]; the job is
//!   marked `failed` in the ledger.
//!
//! * [`StageWarning`] is **non-fatal**: a degradable stage fell back (a frame
//!   could not be captured, the generator was unreachable, the audit
//!   rejected the draft). Collected into [`crate::output::JobOutput::warnings`]
//!   so callers can assert on degradation without scraping logs.

use crate::audit::Severity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the video2sop library.
#[derive(Debug, Error)]
pub enum SopError {
    // ── Stage 1: acquisition ──────────────────────────────────────────────
    /// The video could not be located, downloaded, or opened for decoding.
    #[error("Could not acquire media '{input}': {reason}")]
    MediaAcquisition { input: String, reason: String },

    // ── Stage 2: extraction ───────────────────────────────────────────────
    /// Audio track or duration could not be extracted from the video.
    #[error("Audio extraction failed: {reason}")]
    Extraction { reason: String },

    // ── Stage 3: transcription ────────────────────────────────────────────
    /// The transcription service failed or returned no text.
    #[error("Transcription failed: {reason}")]
    Transcription { reason: String },

    // ── Stage 8: rendering ────────────────────────────────────────────────
    /// The PDF could not be composed at all.
    #[error("Rendering failed: {detail}")]
    Render { detail: String },

    /// Could not create or write the output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// Builder validation failed, or a request carried invalid arguments.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Unknown artifact requested from the store.
    #[error("Artifact '{name}' not found")]
    ArtifactNotFound { name: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SopError {
    /// Whether this error came from one of the fatal pipeline stages (1–3).
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            SopError::MediaAcquisition { .. }
                | SopError::Extraction { .. }
                | SopError::Transcription { .. }
        )
    }
}

/// A non-fatal degradation recorded while a job ran.
///
/// The job still completes; each warning documents what the delivered
/// artifact is missing or why it is annotated.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageWarning {
    /// The generator failed or answered too briefly; the transcript was used.
    #[error("Generation fell back to the raw transcript: {detail}")]
    Generation { detail: String },

    /// The audit rejected the draft; the document carries a rejection banner.
    #[error("Audit failed ({severity}): {reason}")]
    AuditFailed { reason: String, severity: Severity },

    /// One screenshot could not be captured; its instant was dropped.
    #[error("Screenshot at {at:.1}s skipped: {detail}")]
    Capture { at: f64, detail: String },

    /// No section marker was found in a multi-label schema; the whole
    /// document went to `label`.
    #[error("No section markers found; whole document assigned to '{label}'")]
    ParseFallback { label: String },

    /// An image could not be embedded; its grid cell was left empty.
    #[error("Image '{path}' skipped: {detail}")]
    LayoutImage { path: PathBuf, detail: String },

    /// The Unicode font could not be loaded; built-in fonts were used.
    #[error("Unicode font '{path}' unavailable, using built-in fonts: {detail}")]
    FontFallback { path: PathBuf, detail: String },

    /// The scannable download code could not be produced.
    #[error("QR code skipped: {detail}")]
    QrCode { detail: String },

    /// A temp resource could not be deleted.
    #[error("Could not delete '{path}': {detail}")]
    Cleanup { path: PathBuf, detail: String },
}
