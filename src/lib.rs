//! # video2sop
//!
//! Turn a screen-recorded or camera video into an audited Standard Operating
//! Procedure, delivered as a paginated PDF with screenshots.
//!
//! ## Why this crate?
//!
//! Procedure videos are easy to record and hard to follow. This crate
//! transcribes the narration, asks an LLM to restate it as numbered steps,
//! checks the result against a configurable compliance rule set and lays it
//! out next to frames captured from the video. A draft that fails the audit
//! is still delivered, but clearly marked as rejected.
//!
//! ## Pipeline Overview
//!
//! ```text
//! video (path or URL)
//!  │
//!  ├─ 1. Acquire     resolve local file or download from URL, open with ffprobe
//!  ├─ 2. Extract     16 kHz mono WAV + authoritative duration
//!  ├─ 3. Transcribe  OpenAI-compatible /audio/transcriptions
//!  ├─ 4. Capture     one JPEG per scheduled instant
//!  ├─ 5. Generate    one LLM call; transcript fallback on failure
//!  ├─ 6. Audit       ordered rule set, first failure wins
//!  ├─ 7. Parse       split into labelled sections
//!  ├─ 8. Render      cover, sections, screenshot grid → PDF (spawn_blocking)
//!  └─ 9. Cleanup     temp files removed on every path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use video2sop::{JobConfig, JobRequest, Pipeline, RuleSet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = JobConfig::builder()
//!         .rule_set(RuleSet::structure())
//!         .build()?;
//!     let pipeline = Pipeline::from_config(config)?;
//!     let output = pipeline.run(&JobRequest::new("reset_router.mp4")).await?;
//!     println!("{} ({})", output.download_ref, output.audit.status);
//!     for w in &output.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `video2sop` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! `ffmpeg` and `ffprobe` must be on `PATH` (or configured explicitly) for
//! the default media backend.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audit;
pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod qa;
pub mod render;
pub mod schedule;
pub mod sections;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audit::{audit, AuditStatus, AuditVerdict, Auditor, Check, RuleSet, SectionSpec, Severity};
pub use config::{JobConfig, JobConfigBuilder, JobRequest};
pub use convert::{document_title, rejection_banner, Pipeline, PipelineBuilder};
pub use error::{SopError, StageWarning};
pub use job::{Job, JobLedger, JobStatus, MemoryLedger};
pub use output::{JobOutput, JobStats};
pub use pipeline::generate::{Generator, LlmGenerator};
pub use pipeline::media::{FfmpegMedia, MediaHandle, MediaSource};
pub use pipeline::transcribe::{HttpTranscriber, Transcriber, Transcript};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use qa::answer_question;
pub use render::{GridConfig, LayoutConfig, LayoutSummary};
pub use schedule::{schedule, CuePolicy};
pub use storage::ArtifactStore;
