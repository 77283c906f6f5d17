//! Result types returned by [`crate::convert::Pipeline::run`].

use crate::audit::AuditVerdict;
use crate::error::StageWarning;
use crate::render::LayoutSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Everything a caller gets back for a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    pub job_id: Uuid,
    /// External reference to the PDF, e.g. `/download/<id>.pdf`.
    pub download_ref: String,
    /// Where the PDF was written.
    pub artifact_path: PathBuf,
    pub transcript_text: String,
    pub audit: AuditVerdict,
    pub language: String,
    /// Final text the document was built from (banner included on FAIL).
    pub document_body: String,
    /// Section bodies keyed by marker label.
    pub sections: BTreeMap<String, String>,
    /// Non-fatal degradations, in the order they happened.
    pub warnings: Vec<StageWarning>,
    pub layout: LayoutSummary,
    pub stats: JobStats,
}

impl JobOutput {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Timing and volume figures for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStats {
    pub duration_secs: f64,
    /// Instants scheduled by the cue policy.
    pub cues_scheduled: usize,
    /// Frames that made it into the document.
    pub screenshots_captured: usize,
    pub transcript_chars: usize,
    pub generation_fallback: bool,
    pub transcription_ms: u64,
    pub generation_ms: u64,
    pub render_ms: u64,
    pub total_ms: u64,
}
