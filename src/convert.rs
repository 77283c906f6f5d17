//! The job orchestrator.
//!
//! A [`Pipeline`] holds the collaborators (media, transcription, generation,
//! ledger, artifact store) and the shared [`JobConfig`]. Each call to
//! [`Pipeline::run`] is one job: a linear sequence of nine stages.
//!
//! ```text
//!  acquire ─▶ extract ─▶ transcribe ─▶ capture ─▶ generate ─▶ audit ─▶ parse ─▶ render ─▶ cleanup
//!  └────────── fatal ──────────────┘  └──────────── degrade with StageWarning ──────────┘
//! ```
//!
//! Stages 1–3 and the final write are fatal. Everything else degrades: the
//! job still delivers a PDF and the degradation is recorded in
//! [`JobOutput::warnings`]. Cleanup runs on every path.

use crate::audit::{AuditVerdict, Auditor};
use crate::config::{JobConfig, JobRequest};
use crate::error::{SopError, StageWarning};
use crate::job::{Job, JobLedger, JobStatus, MemoryLedger};
use crate::output::{JobOutput, JobStats};
use crate::pipeline::cleanup::TempResources;
use crate::pipeline::generate::{generate_or_fallback, GenerationRequest, Generator, LlmGenerator};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::media::{capture_point, FfmpegMedia, MediaHandle, MediaSource};
use crate::pipeline::transcribe::{HttpTranscriber, Transcriber};
use crate::progress::{NoopProgressCallback, ProgressCallback, Stage};
use crate::render::{self, qr, DocumentModel, LayoutSummary, Screenshot, SectionBlock};
use crate::schedule::schedule;
use crate::sections;
use crate::storage::ArtifactStore;
use chrono::Local;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Width of the `=` rules framing the rejection banner.
const BANNER_RULE_WIDTH: usize = 50;

/// Collaborators plus configuration; build once, run many jobs.
#[derive(Clone)]
pub struct Pipeline {
    media: Arc<dyn MediaSource>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
    ledger: Arc<dyn JobLedger>,
    store: ArtifactStore,
    config: JobConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`]. Collaborators left unset get the production
/// implementation derived from the config.
pub struct PipelineBuilder {
    config: JobConfig,
    media: Option<Arc<dyn MediaSource>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    generator: Option<Arc<dyn Generator>>,
    ledger: Option<Arc<dyn JobLedger>>,
}

impl PipelineBuilder {
    pub fn media(mut self, media: Arc<dyn MediaSource>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn JobLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> Result<Pipeline, SopError> {
        let config = self.config;
        let media = match self.media {
            Some(m) => m,
            None => {
                let ffmpeg = FfmpegMedia::locate(config.ffmpeg_path.clone(), config.ffprobe_path.clone())
                    .map_err(|e| SopError::InvalidConfig(e.to_string()))?;
                Arc::new(ffmpeg)
            }
        };
        let transcriber = match self.transcriber {
            Some(t) => t,
            None => Arc::new(
                HttpTranscriber::from_env(
                    config.transcription_url.clone(),
                    config.transcription_model.clone(),
                    Duration::from_secs(config.transcription_timeout_secs),
                )
                .map_err(|e| SopError::InvalidConfig(format!("transcription client: {e}")))?,
            ),
        };
        let generator = match self.generator {
            Some(g) => g,
            None => Arc::new(LlmGenerator::from_config(&config)?),
        };
        let ledger = self.ledger.unwrap_or_else(|| Arc::new(MemoryLedger::new()));

        Ok(Pipeline {
            media,
            transcriber,
            generator,
            ledger,
            store: ArtifactStore::new(config.output_dir.clone()),
            config,
        })
    }
}

/// Per-job mutable state threaded through the stages.
struct JobContext {
    job_id: Uuid,
    temps: TempResources,
    warnings: Vec<StageWarning>,
    stats: JobStats,
    progress: ProgressCallback,
}

impl JobContext {
    fn warn(&mut self, warning: StageWarning) {
        warn!(job = %self.job_id, "{}", warning);
        self.progress.on_warning(&warning);
        self.warnings.push(warning);
    }

    fn begin(&self, stage: Stage) -> Instant {
        info!(job = %self.job_id, "Stage {}/{}: {}", stage.number(), Stage::COUNT, stage);
        self.progress.on_stage_start(stage);
        Instant::now()
    }

    fn end(&self, stage: Stage, started: Instant) -> u64 {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(job = %self.job_id, "{} took {}ms", stage, elapsed_ms);
        self.progress.on_stage_complete(stage, elapsed_ms);
        elapsed_ms
    }
}

/// What the stages produce before cleanup.
struct Delivered {
    download_ref: String,
    artifact_path: PathBuf,
    transcript_text: String,
    audit: AuditVerdict,
    document_body: String,
    sections: BTreeMap<String, String>,
    layout: LayoutSummary,
}

impl Pipeline {
    pub fn builder(config: JobConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            media: None,
            transcriber: None,
            generator: None,
            ledger: None,
        }
    }

    /// Production pipeline: ffmpeg, HTTP transcription, the configured LLM
    /// provider and an in-memory ledger.
    pub fn from_config(config: JobConfig) -> Result<Self, SopError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Turn one video into an audited SOP PDF.
    ///
    /// # Errors
    /// Returns `Err(SopError)` only for fatal failures: the media cannot be
    /// acquired, audio cannot be extracted, transcription fails or is
    /// empty, or the PDF cannot be produced or stored. The ledger then
    /// records `failed` and every temp file is still removed.
    pub async fn run(&self, request: &JobRequest) -> Result<JobOutput, SopError> {
        let total_start = Instant::now();
        let job = Job::new(source_name(&request.source));
        let progress = self
            .config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));

        info!(job = %job.id, "Starting job for {}", request.source);
        if let Err(e) = self.ledger.create(&job).await {
            warn!(job = %job.id, "Ledger create failed: {}", e);
        }
        progress.on_job_start(job.id, &request.source);

        let mut ctx = JobContext {
            job_id: job.id,
            temps: TempResources::new(),
            warnings: Vec::new(),
            stats: JobStats::default(),
            progress,
        };

        let outcome = self.execute(&mut ctx, request).await;

        // ── Stage 9: cleanup ─────────────────────────────────────────────
        let started = ctx.begin(Stage::Cleanup);
        let cleanup_warnings = ctx.temps.release_all();
        let result = match outcome {
            Ok((delivered, resolved)) => {
                for w in cleanup_warnings {
                    ctx.warn(w);
                }
                if self.config.remove_source && resolved.is_local() {
                    self.remove_source(&mut ctx, resolved.path()).await;
                }
                Ok(delivered)
            }
            Err(e) => {
                for w in &cleanup_warnings {
                    warn!(job = %job.id, "{}", w);
                }
                Err(e)
            }
        };
        ctx.end(Stage::Cleanup, started);

        let status = if result.is_ok() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        if let Err(e) = self.ledger.update(job.id, status).await {
            warn!(job = %job.id, "Ledger update to {} failed: {}", status, e);
        }
        ctx.progress.on_job_complete(job.id, result.is_ok());

        let delivered = match result {
            Ok(d) => d,
            Err(e) => {
                error!(job = %job.id, "Job failed: {}", e);
                return Err(e);
            }
        };

        ctx.stats.total_ms = total_start.elapsed().as_millis() as u64;
        info!(
            job = %job.id,
            "Job completed in {}ms with {} warning(s)",
            ctx.stats.total_ms,
            ctx.warnings.len()
        );

        Ok(JobOutput {
            job_id: job.id,
            download_ref: delivered.download_ref,
            artifact_path: delivered.artifact_path,
            transcript_text: delivered.transcript_text,
            audit: delivered.audit,
            language: request.language.clone(),
            document_body: delivered.document_body,
            sections: delivered.sections,
            warnings: ctx.warnings,
            layout: delivered.layout,
            stats: ctx.stats,
        })
    }

    /// Blocking wrapper around [`Pipeline::run`] for non-async callers.
    ///
    /// Creates a fresh tokio runtime; do not call from inside one.
    pub fn run_sync(&self, request: &JobRequest) -> Result<JobOutput, SopError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| SopError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.run(request))
    }

    /// Stage 1, then the media-bound stages with the handle closed on
    /// every path.
    async fn execute(
        &self,
        ctx: &mut JobContext,
        request: &JobRequest,
    ) -> Result<(Delivered, ResolvedInput), SopError> {
        // ── Stage 1: acquire ─────────────────────────────────────────────
        let started = ctx.begin(Stage::Acquire);
        let resolved = input::resolve_input(&request.source, self.config.download_timeout_secs).await?;
        let mut handle = self
            .media
            .open(resolved.path())
            .await
            .map_err(|e| SopError::MediaAcquisition {
                input: request.source.clone(),
                reason: e.to_string(),
            })?;
        ctx.end(Stage::Acquire, started);

        let result = self.process(ctx, request, &resolved, handle.as_mut()).await;
        handle.close().await;
        result.map(|delivered| (delivered, resolved))
    }

    async fn process(
        &self,
        ctx: &mut JobContext,
        request: &JobRequest,
        resolved: &ResolvedInput,
        media: &mut dyn MediaHandle,
    ) -> Result<Delivered, SopError> {
        let job_id = ctx.job_id;
        let work = &self.config.work_dir;
        tokio::fs::create_dir_all(work)
            .await
            .map_err(|source| SopError::OutputWriteFailed {
                path: work.clone(),
                source,
            })?;

        // ── Stage 2: extract ─────────────────────────────────────────────
        let started = ctx.begin(Stage::Extract);
        let audio = ctx.temps.track(work.join(format!("{job_id}.wav")));
        let duration = media
            .extract_audio(&audio)
            .await
            .map_err(|e| SopError::Extraction {
                reason: e.to_string(),
            })?;
        ctx.stats.duration_secs = duration;
        ctx.end(Stage::Extract, started);
        info!(job = %job_id, "Video duration {:.1}s", duration);

        // ── Stage 3: transcribe ──────────────────────────────────────────
        let started = ctx.begin(Stage::Transcribe);
        let transcript = self
            .transcriber
            .transcribe(&audio, duration)
            .await
            .map_err(|e| SopError::Transcription {
                reason: e.to_string(),
            })?;
        if transcript.is_blank() {
            return Err(SopError::Transcription {
                reason: "transcription returned no text".into(),
            });
        }
        ctx.stats.transcript_chars = transcript.text.chars().count();
        ctx.stats.transcription_ms = ctx.end(Stage::Transcribe, started);

        // ── Stage 4: capture ─────────────────────────────────────────────
        let started = ctx.begin(Stage::Capture);
        let cues = schedule(duration, &self.config.cue_policy);
        ctx.stats.cues_scheduled = cues.len();
        let mut screenshots = Vec::with_capacity(cues.len());
        for (i, &at) in cues.iter().enumerate() {
            let dest = ctx.temps.track(work.join(format!("{job_id}_shot_{}.jpg", i + 1)));
            let point = capture_point(at, duration);
            match media.capture_frame(point, &dest).await {
                Ok(()) => screenshots.push(Screenshot {
                    path: dest,
                    at: point,
                }),
                Err(e) => ctx.warn(StageWarning::Capture {
                    at,
                    detail: e.to_string(),
                }),
            }
        }
        ctx.stats.screenshots_captured = screenshots.len();
        ctx.end(Stage::Capture, started);

        // ── Stage 5: generate ────────────────────────────────────────────
        let started = ctx.begin(Stage::Generate);
        let rules = &self.config.rule_set;
        let generation = GenerationRequest {
            transcript: transcript.text.clone(),
            language: request.language.clone(),
            style: request.style.clone(),
            cues,
            duration_secs: duration,
        };
        let generated = generate_or_fallback(
            self.generator.as_ref(),
            &generation,
            &rules.prompt_template,
            self.config.min_generation_chars,
        )
        .await;
        if let Some(ref reason) = generated.fallback {
            ctx.warn(StageWarning::Generation {
                detail: reason.clone(),
            });
        }
        ctx.stats.generation_fallback = generated.is_fallback();
        ctx.stats.generation_ms = ctx.end(Stage::Generate, started);

        // ── Stage 6: audit ───────────────────────────────────────────────
        let started = ctx.begin(Stage::Audit);
        let verdict = rules.audit(&generated.text);
        let body = if verdict.passed() {
            generated.text
        } else {
            ctx.warn(StageWarning::AuditFailed {
                reason: verdict.reason.clone(),
                severity: verdict.severity,
            });
            rejection_banner(&verdict.reason, &generated.text)
        };
        ctx.end(Stage::Audit, started);

        // ── Stage 7: parse ───────────────────────────────────────────────
        let started = ctx.begin(Stage::Parse);
        let labels = rules.labels();
        let parsed = sections::parse(&body, &labels);
        // With a single label the whole body is that section; nothing is lost.
        if parsed.fallback_used() && labels.len() > 1 {
            if let Some(first) = labels.first() {
                ctx.warn(StageWarning::ParseFallback {
                    label: first.clone(),
                });
            }
        }
        ctx.end(Stage::Parse, started);

        // ── Stage 8: render ──────────────────────────────────────────────
        let started = ctx.begin(Stage::Render);
        let download_ref = ArtifactStore::download_ref(job_id);
        let qr_code = match self.config.public_url(&download_ref) {
            Some(url) => {
                let dest = ctx.temps.track(work.join(format!("{job_id}_qr.png")));
                match qr::write_qr_png(&url, &dest) {
                    Ok(()) => Some(dest),
                    Err(e) => {
                        ctx.warn(StageWarning::QrCode {
                            detail: e.to_string(),
                        });
                        None
                    }
                }
            }
            None => None,
        };

        let block = |spec: &crate::audit::SectionSpec| SectionBlock {
            title: spec.title.clone(),
            body: parsed.get(&spec.label).unwrap_or_default().to_string(),
        };
        let model = DocumentModel {
            title: request
                .title
                .clone()
                .unwrap_or_else(|| document_title(&resolved.file_name())),
            subtitle: format!("Standard Operating Procedure ({})", request.language),
            verdict: verdict.clone(),
            generated_on: Local::now().format("%B %d, %Y").to_string(),
            qr_code,
            sections: rules.sections.iter().filter(|s| !s.trailing).map(block).collect(),
            screenshots,
            trailing: rules.sections.iter().filter(|s| s.trailing).map(block).collect(),
        };

        let rendered = render::render(
            model,
            self.config.layout.clone(),
            self.config.font_paths(),
        )
        .await?;
        for w in rendered.warnings {
            ctx.warn(w);
        }
        let artifact_path = self.store.write(job_id, &rendered.bytes).await?;
        ctx.stats.render_ms = ctx.end(Stage::Render, started);
        info!(
            job = %job_id,
            "Wrote {} ({} pages, {} bytes)",
            artifact_path.display(),
            rendered.summary.page_count,
            rendered.bytes.len()
        );

        Ok(Delivered {
            download_ref,
            artifact_path,
            transcript_text: transcript.text,
            audit: verdict,
            document_body: body,
            sections: parsed
                .iter()
                .map(|(label, text)| (label.to_string(), text.to_string()))
                .collect(),
            layout: rendered.summary,
        })
    }

    async fn remove_source(&self, ctx: &mut JobContext, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(job = %ctx.job_id, "Removed source {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => ctx.warn(StageWarning::Cleanup {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
        }
    }
}

/// Prefix `text` with the rejection banner shown on failed drafts.
pub fn rejection_banner(reason: &str, text: &str) -> String {
    let rule = "=".repeat(BANNER_RULE_WIDTH);
    format!("DRAFT REJECTED: {reason}\n\n{rule}\nUNVALIDATED DRAFT (Review Required)\n{rule}\n\n{text}")
}

/// Human title from a video file name: stem, `_`/`-` as spaces, title case.
///
/// `reset_the-ROUTER.mp4` becomes `Reset The Router`.
pub fn document_title(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let words: Vec<String> = stem
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        "Standard Operating Procedure".to_string()
    } else {
        words.join(" ")
    }
}

/// Name recorded in the ledger before the source is resolved.
fn source_name(source: &str) -> String {
    if input::is_url(source) {
        input::filename_from_url(source)
    } else {
        Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_layout() {
        let out = rejection_banner("Missing numbered steps", "body");
        let rule = "=".repeat(50);
        assert_eq!(
            out,
            format!(
                "DRAFT REJECTED: Missing numbered steps\n\n{rule}\nUNVALIDATED DRAFT (Review Required)\n{rule}\n\nbody"
            )
        );
    }

    #[test]
    fn title_from_file_name() {
        assert_eq!(document_title("reset_the-ROUTER.mp4"), "Reset The Router");
        assert_eq!(document_title("/videos/forklift  check.mov"), "Forklift Check");
        assert_eq!(document_title(""), "Standard Operating Procedure");
    }

    #[test]
    fn source_name_for_paths_and_urls() {
        assert_eq!(source_name("/tmp/a/clip.mp4"), "clip.mp4");
        assert_eq!(source_name("https://host/v/demo.webm?x=1"), "demo.webm");
        assert_eq!(source_name("https://host/"), "downloaded.mp4");
    }
}
