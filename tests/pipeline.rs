//! Pipeline integration tests with in-process collaborators.
//!
//! Media, transcription and generation are faked; layout, PDF rendering,
//! storage, auditing and cleanup are real. No network or ffmpeg needed.
//!
//! Run with: `cargo test --test pipeline`

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;
use video2sop::pipeline::generate::GenerateError;
use video2sop::pipeline::media::MediaError;
use video2sop::pipeline::transcribe::TranscribeError;
use video2sop::{
    rejection_banner, AuditStatus, Generator, JobConfig, JobProgressCallback, JobRequest,
    JobStatus, MediaHandle, MediaSource, MemoryLedger, Pipeline, RuleSet, SopError, Stage,
    StageWarning, Transcriber, Transcript,
};

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeMedia {
    duration: f64,
    failing_captures: HashSet<usize>,
    closed: Arc<AtomicBool>,
}

impl FakeMedia {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            failing_captures: HashSet::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn failing(mut self, index: usize) -> Self {
        self.failing_captures.insert(index);
        self
    }
}

struct FakeHandle {
    duration: f64,
    failing_captures: HashSet<usize>,
    captures: usize,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn open(&self, path: &Path) -> Result<Box<dyn MediaHandle>, MediaError> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        Ok(Box::new(FakeHandle {
            duration: self.duration,
            failing_captures: self.failing_captures.clone(),
            captures: 0,
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[async_trait]
impl MediaHandle for FakeHandle {
    fn duration(&self) -> f64 {
        self.duration
    }

    async fn extract_audio(&mut self, dest: &Path) -> Result<f64, MediaError> {
        std::fs::write(dest, b"RIFF....WAVE")?;
        Ok(self.duration)
    }

    async fn capture_frame(&mut self, at: f64, dest: &Path) -> Result<(), MediaError> {
        let index = self.captures;
        self.captures += 1;
        assert!(at < self.duration, "capture at {at} past end {}", self.duration);
        if self.failing_captures.contains(&index) {
            return Err(MediaError::FfmpegFailed {
                message: format!("no frame at {at}"),
                stderr: None,
                exit_code: Some(1),
            });
        }
        let shade = (index * 60 % 255) as u8;
        image::RgbImage::from_pixel(64, 36, image::Rgb([shade, 120, 200]))
            .save(dest)
            .map_err(|e| MediaError::InvalidVideo(e.to_string()))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

enum Scripted<T> {
    Ok(T),
    Fail,
}

struct FakeTranscriber(Scripted<String>);

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: &Path, duration_secs: f64) -> Result<Transcript, TranscribeError> {
        assert!(audio.exists(), "audio should be extracted before transcription");
        match &self.0 {
            Scripted::Ok(text) => Ok(Transcript {
                text: text.clone(),
                duration_secs,
            }),
            Scripted::Fail => Err(TranscribeError::Status {
                status: 503,
                body: "unavailable".into(),
            }),
        }
    }
}

struct FakeGenerator(Scripted<String>);

#[async_trait]
impl Generator for FakeGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, GenerateError> {
        match &self.0 {
            Scripted::Ok(text) => Ok(text.clone()),
            Scripted::Fail => Err(GenerateError::Provider("connection refused".into())),
        }
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl JobProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("start {}", stage.number()));
    }

    fn on_job_complete(&self, _job_id: Uuid, success: bool) {
        self.events.lock().unwrap().push(format!("done {success}"));
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

const GOOD_SOP: &str = "SOP:\n\
    TITLE: Reset the office router\n\
    Step 1: Locate the recessed reset button on the back panel.\n\
    Step 2: Hold it with a paper clip for ten seconds until the LED flashes amber.\n\
    Step 3: Wait two minutes for the reboot and confirm the status light is green.\n";

/// Shaped like the example in the safety prompt: no marker line.
const PROMPT_FORMAT_SOP: &str = "---\n\
    **DOCUMENT METADATA**\n\
    - SOP-ID: SOP-2026-0101-V1\n\
    - Date: January 01, 2026\n\
    \n\
    **TITLE:** How to Reset the Network Router\n\
    \n\
    **PROCEDURE:**\n\
    \n\
    Step 1: Locate the small black reset button on the back panel of the router.\n\
    \n\
    Step 2: Using a paperclip or pin, press and hold the button for 10 seconds.\n\
    \n\
    Step 5: Verify connectivity by checking the status lights.\n\
    \n\
    **COMPLIANCE NOTES:**\n\
    - Always document the reset in the maintenance log.\n\
    ---\n";

const STRUCTURED_SOP: &str = "SECTION 1: Overview\n\
    Resetting the office router restores factory settings.\n\
    SECTION 2: Procedure\n\
    Step 1: Locate the reset button.\n\
    Step 2: Hold it for ten seconds.\n\
    SECTION 3: Process Flow\n\
    [Start] --> [Hold reset] --> [End]\n\
    SECTION 4: Compliance Notes\n\
    Only IT staff may reset network equipment.\n";

struct Harness {
    dir: TempDir,
    source: PathBuf,
    ledger: Arc<MemoryLedger>,
    closed: Arc<AtomicBool>,
}

impl Harness {
    fn new() -> Self {
        // RUST_LOG=video2sop=debug shows the stage log under --nocapture.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("reset_office-router.mp4");
        std::fs::write(&source, b"not really a video").unwrap();
        Self {
            dir,
            source,
            ledger: Arc::new(MemoryLedger::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    fn config(&self) -> video2sop::JobConfigBuilder {
        JobConfig::builder()
            .work_dir(self.work_dir())
            .output_dir(self.dir.path().join("out"))
    }

    fn pipeline(
        &self,
        config: JobConfig,
        media: FakeMedia,
        transcript: Scripted<String>,
        generation: Scripted<String>,
    ) -> Pipeline {
        let media = FakeMedia {
            closed: Arc::clone(&self.closed),
            ..media
        };
        Pipeline::builder(config)
            .media(Arc::new(media))
            .transcriber(Arc::new(FakeTranscriber(transcript)))
            .generator(Arc::new(FakeGenerator(generation)))
            .ledger(self.ledger.clone())
            .build()
            .unwrap()
    }

    fn request(&self) -> JobRequest {
        JobRequest::new(self.source.to_string_lossy())
    }

    fn work_dir_is_empty(&self) -> bool {
        match std::fs::read_dir(self.work_dir()) {
            Ok(entries) => entries.count() == 0,
            Err(_) => true,
        }
    }

    fn only_job_status(&self) -> JobStatus {
        let jobs = self.ledger.jobs();
        assert_eq!(jobs.len(), 1, "expected exactly one job");
        jobs[0].status
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hello_world_is_rejected_for_missing_steps() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(5.0),
        Scripted::Ok("hello world".into()),
        Scripted::Ok("hello world".into()),
    );

    let out = p.run(&h.request()).await.unwrap();

    assert_eq!(out.stats.duration_secs, 5.0);
    assert_eq!(out.stats.cues_scheduled, 3);
    assert_eq!(out.stats.screenshots_captured, 3);

    assert_eq!(out.audit.status, AuditStatus::Fail);
    assert!(
        out.audit.reason.starts_with("Missing numbered steps"),
        "got: {}",
        out.audit.reason
    );
    assert_eq!(out.layout.cover_badge, "AUDIT STATUS: DRAFT REJECTED");
    assert_eq!(out.transcript_text, "hello world");
    assert_eq!(out.language, "English");
    assert!(out.stats.generation_fallback);
    assert!(out
        .warnings
        .iter()
        .any(|w| matches!(w, StageWarning::Generation { .. })));
    assert!(out
        .warnings
        .iter()
        .any(|w| matches!(w, StageWarning::AuditFailed { .. })));

    let bytes = std::fs::read(&out.artifact_path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(out.download_ref, format!("/download/{}.pdf", out.job_id));
    assert!(h.work_dir_is_empty());
    assert_eq!(h.only_job_status(), JobStatus::Completed);
}

#[tokio::test]
async fn generation_failure_uses_banner_and_literal_transcript() {
    let h = Harness::new();
    let transcript = "First unplug the router. Then wait. Then plug it back in.";
    let p = h.pipeline(
        h.config().rule_set(RuleSet::structure()).build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok(transcript.into()),
        Scripted::Fail,
    );

    let out = p.run(&h.request()).await.unwrap();

    assert_eq!(out.audit.status, AuditStatus::Fail);
    assert_eq!(out.audit.reason, "Missing required section: SECTION 1");
    assert_eq!(
        out.document_body,
        rejection_banner("Missing required section: SECTION 1", transcript)
    );
    assert!(matches!(
        out.warnings.first(),
        Some(StageWarning::Generation { .. })
    ));
    assert!(out
        .warnings
        .iter()
        .any(|w| matches!(w, StageWarning::ParseFallback { label } if label == "SECTION 1")));
    assert!(out.sections["SECTION 1"].contains(transcript));
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn good_sop_passes_and_is_laid_out() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(60.0),
        Scripted::Ok("narration about resetting the router".into()),
        Scripted::Ok(format!("```\n{GOOD_SOP}```\n")),
    );

    let out = p.run(&h.request()).await.unwrap();

    assert_eq!(out.audit.status, AuditStatus::Pass, "{}", out.audit.reason);
    assert_eq!(out.layout.cover_badge, "AUDIT STATUS: APPROVED");
    assert!(!out.stats.generation_fallback);
    assert!(!out.document_body.contains("```"));
    assert!(out.sections["SOP"].contains("Step 2: Hold it with a paper clip"));
    assert!(!out.has_warnings(), "unexpected warnings: {:?}", out.warnings);

    assert_eq!(out.stats.cues_scheduled, 3);
    assert_eq!(out.stats.screenshots_captured, 3);
    assert_eq!(
        out.layout.headings,
        vec![
            "Standard Operating Procedure".to_string(),
            "Video Screenshots".to_string()
        ]
    );
    assert!(out.layout.page_count >= 3);
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn safety_output_without_marker_line_records_no_warnings() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok("narration".into()),
        Scripted::Ok(PROMPT_FORMAT_SOP.into()),
    );

    let out = p.run(&h.request()).await.unwrap();

    assert_eq!(out.audit.status, AuditStatus::Pass, "{}", out.audit.reason);
    assert!(out.warnings.is_empty(), "unexpected warnings: {:?}", out.warnings);
    assert!(out.sections["SOP"].starts_with("---\n**DOCUMENT METADATA**"));
    assert!(out.sections["SOP"].contains("Step 5: Verify connectivity"));
    assert_eq!(
        out.layout.headings,
        vec!["Standard Operating Procedure", "Video Screenshots"]
    );
}

#[tokio::test]
async fn structured_sop_places_trailing_section_after_grid() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().rule_set(RuleSet::structure()).build().unwrap(),
        FakeMedia::new(45.0),
        Scripted::Ok("narration".into()),
        Scripted::Ok(STRUCTURED_SOP.into()),
    );

    let out = p.run(&h.request().language("German")).await.unwrap();

    assert_eq!(out.audit.status, AuditStatus::Pass);
    assert_eq!(out.language, "German");
    assert_eq!(out.sections.len(), 4);
    assert!(out.sections["SECTION 3"].contains("[Start] --> [Hold reset]"));
    assert_eq!(
        out.layout.headings,
        vec!["Overview", "Procedure", "Process Flow", "Video Screenshots", "Compliance Notes"]
    );
}

#[tokio::test]
async fn transcription_failure_is_fatal_and_cleans_up() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Fail,
        Scripted::Ok(GOOD_SOP.into()),
    );

    let err = p.run(&h.request()).await.unwrap_err();

    assert!(matches!(err, SopError::Transcription { .. }), "got: {err}");
    assert!(err.is_stage_failure());
    assert_eq!(h.only_job_status(), JobStatus::Failed);
    assert!(h.closed.load(Ordering::SeqCst), "media handle must be closed");
    assert!(h.work_dir_is_empty(), "audio must be removed on failure");
    assert!(!h.dir.path().join("out").exists(), "no artifact for a failed job");
}

#[tokio::test]
async fn blank_transcript_is_fatal() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok("  \n\t ".into()),
        Scripted::Ok(GOOD_SOP.into()),
    );

    let err = p.run(&h.request()).await.unwrap_err();
    assert!(matches!(err, SopError::Transcription { .. }));
    assert_eq!(h.only_job_status(), JobStatus::Failed);
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn missing_source_is_acquisition_failure() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok("text".into()),
        Scripted::Ok(GOOD_SOP.into()),
    );

    let err = p
        .run(&JobRequest::new(h.dir.path().join("nope.mp4").to_string_lossy()))
        .await
        .unwrap_err();
    assert!(matches!(err, SopError::MediaAcquisition { .. }), "got: {err}");
    assert_eq!(h.only_job_status(), JobStatus::Failed);
}

#[tokio::test]
async fn capture_failures_are_tolerated() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(30.0).failing(1),
        Scripted::Ok("narration".into()),
        Scripted::Ok(GOOD_SOP.into()),
    );

    let out = p.run(&h.request()).await.unwrap();

    assert_eq!(out.stats.cues_scheduled, 3);
    assert_eq!(out.stats.screenshots_captured, 2);
    let captures: Vec<f64> = out
        .warnings
        .iter()
        .filter_map(|w| match w {
            StageWarning::Capture { at, .. } => Some(*at),
            _ => None,
        })
        .collect();
    assert_eq!(captures.len(), 1);
    assert!((captures[0] - 15.0).abs() < 1e-9);
    assert_eq!(h.only_job_status(), JobStatus::Completed);
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn progress_reports_every_stage_in_order() {
    let h = Harness::new();
    let recorder = Arc::new(Recorder::default());
    let p = h.pipeline(
        h.config().progress_callback(recorder.clone()).build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok("narration".into()),
        Scripted::Ok(GOOD_SOP.into()),
    );

    p.run(&h.request()).await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    let mut expected: Vec<String> = (1..=Stage::COUNT).map(|n| format!("start {n}")).collect();
    expected.push("done true".to_string());
    assert_eq!(events, expected);
}

#[tokio::test]
async fn remove_source_deletes_local_video_on_success() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().remove_source(true).build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok("narration".into()),
        Scripted::Ok(GOOD_SOP.into()),
    );

    p.run(&h.request()).await.unwrap();
    assert!(!h.source.exists());
}

#[tokio::test]
async fn source_is_kept_when_job_fails() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().remove_source(true).build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Fail,
        Scripted::Ok(GOOD_SOP.into()),
    );

    assert!(p.run(&h.request()).await.is_err());
    assert!(h.source.exists());
}

#[tokio::test]
async fn qr_code_is_rendered_and_removed() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config()
            .qr_base_url("https://sop.example.com")
            .build()
            .unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok("narration".into()),
        Scripted::Ok(GOOD_SOP.into()),
    );

    let out = p.run(&h.request()).await.unwrap();
    assert!(!out
        .warnings
        .iter()
        .any(|w| matches!(w, StageWarning::QrCode { .. })));
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn artifact_is_resolvable_by_name() {
    let h = Harness::new();
    let p = h.pipeline(
        h.config().build().unwrap(),
        FakeMedia::new(30.0),
        Scripted::Ok("narration".into()),
        Scripted::Ok(GOOD_SOP.into()),
    );

    let out = p.run(&h.request()).await.unwrap();
    let name = out.download_ref.trim_start_matches("/download/");
    assert_eq!(p.store().resolve(name).unwrap(), out.artifact_path);
}
