//! Pipeline stages and the collaborators they drive.
//!
//! Each submodule owns one concern; [`crate::convert::Pipeline`] sequences
//! them. Collaborators sit behind traits so tests can swap in fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ media ──▶ transcribe ──▶ (schedule + capture) ──▶ generate ──▶ postprocess
//! (URL/path) (ffmpeg)  (HTTP STT)                               (LLM)       (cleanup)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`media`]: open the video, extract audio, capture frames
//! 3. [`transcribe`]: speech to text; the only fatal network stage
//! 4. [`generate`]: single-attempt SOP generation with transcript fallback
//! 5. [`postprocess`]: deterministic cleanup of the generated text
//! 6. [`cleanup`]: per-job temp file tracking

pub mod cleanup;
pub mod generate;
pub mod input;
pub mod media;
pub mod postprocess;
pub mod transcribe;
