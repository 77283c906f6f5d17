//! Progress-callback trait for per-stage job events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::JobConfigBuilder::progress_callback`] to receive events
//! as a job moves through its stages. The CLI drives a spinner with it; a
//! server would forward events to a websocket or a job table.
//!
//! # Example
//!
//! ```rust
//! use video2sop::{JobConfig, JobProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl JobProgressCallback for Log {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("[{}/{}] {}", stage.number(), Stage::COUNT, stage);
//!     }
//! }
//!
//! let config = JobConfig::builder()
//!     .progress_callback(Arc::new(Log))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::StageWarning;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The nine stages of a job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Acquire,
    Extract,
    Transcribe,
    Capture,
    Generate,
    Audit,
    Parse,
    Render,
    Cleanup,
}

impl Stage {
    pub const COUNT: usize = 9;

    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Acquire,
        Stage::Extract,
        Stage::Transcribe,
        Stage::Capture,
        Stage::Generate,
        Stage::Audit,
        Stage::Parse,
        Stage::Render,
        Stage::Cleanup,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Acquire => "acquiring media",
            Stage::Extract => "extracting audio",
            Stage::Transcribe => "transcribing",
            Stage::Capture => "capturing screenshots",
            Stage::Generate => "generating SOP",
            Stage::Audit => "auditing",
            Stage::Parse => "parsing sections",
            Stage::Render => "rendering PDF",
            Stage::Cleanup => "cleaning up",
        })
    }
}

/// Called by the pipeline as a job progresses.
///
/// All methods default to no-ops so implementors override only what they
/// need. Jobs may run concurrently, so implementations must be `Send + Sync`
/// and guard shared state themselves.
pub trait JobProgressCallback: Send + Sync {
    /// A job was accepted and recorded as `processing`.
    fn on_job_start(&self, job_id: Uuid, source: &str) {
        let _ = (job_id, source);
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// A non-fatal degradation was recorded.
    fn on_warning(&self, warning: &StageWarning) {
        let _ = warning;
    }

    /// The job finished; `success` is false when it ended `failed`.
    fn on_job_complete(&self, job_id: Uuid, success: bool) {
        let _ = (job_id, success);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn JobProgressCallback>;
