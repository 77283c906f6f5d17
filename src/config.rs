//! Configuration types for video-to-SOP jobs.
//!
//! Everything a [`crate::convert::Pipeline`] needs beyond its collaborators
//! lives in [`JobConfig`], built via [`JobConfigBuilder`]. Per-request values
//! (the source, language, style) travel separately in [`JobRequest`] so one
//! config can serve many concurrent jobs.

use crate::audit::RuleSet;
use crate::error::SopError;
use crate::pipeline::generate::MIN_GENERATION_CHARS;
use crate::pipeline::transcribe::{DEFAULT_TRANSCRIPTION_MODEL, DEFAULT_TRANSCRIPTION_URL};
use crate::progress::ProgressCallback;
use crate::render::{FontPaths, GridConfig, LayoutConfig};
use crate::schedule::CuePolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Pipeline configuration, shared read-only by every job.
///
/// # Example
/// ```rust
/// use video2sop::{CuePolicy, JobConfig, RuleSet};
///
/// let config = JobConfig::builder()
///     .output_dir("out")
///     .cue_policy(CuePolicy::count(6))
///     .rule_set(RuleSet::structure())
///     .build()
///     .unwrap();
/// assert_eq!(config.rule_set.name, "structure");
/// ```
#[derive(Clone)]
pub struct JobConfig {
    /// Scratch directory for audio, frames and QR artifacts.
    /// Default: `<system temp>/video2sop`.
    pub work_dir: PathBuf,

    /// Where finished PDFs are stored. Default: `output`.
    pub output_dir: PathBuf,

    /// How screenshot instants are chosen. Default: 10 % / 50 % / 90 %.
    pub cue_policy: CuePolicy,

    /// Audit rules, section schema and prompt. Default: [`RuleSet::safety`].
    pub rule_set: RuleSet,

    /// Page geometry, typography and the screenshot grid.
    pub layout: LayoutConfig,

    /// TTF used for body text; when absent or unloadable text is sanitised
    /// to Latin-1 and set in Helvetica.
    pub unicode_font: Option<PathBuf>,

    /// TTF used for flowcharts; Courier otherwise.
    pub mono_font: Option<PathBuf>,

    /// Public base URL; when set the cover carries a QR code pointing at
    /// `<base>/download/<job>.pdf`.
    pub qr_base_url: Option<String>,

    /// LLM model identifier. If None, the provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens per generation. Default: 4096.
    pub max_tokens: usize,

    /// OpenAI-compatible transcription base URL. Default: `https://api.openai.com/v1`.
    pub transcription_url: String,

    /// Transcription model. Default: `whisper-1`.
    pub transcription_model: String,

    /// Transcription request timeout in seconds. Default: 300.
    pub transcription_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Generations of this many characters or fewer fall back to the
    /// transcript. Default: 100.
    pub min_generation_chars: usize,

    /// Delete a local source video after a successful job. Default: false.
    pub remove_source: bool,

    /// ffmpeg / ffprobe binaries; looked up on `PATH` when None.
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("video2sop"),
            output_dir: PathBuf::from("output"),
            cue_policy: CuePolicy::default(),
            rule_set: RuleSet::safety(),
            layout: LayoutConfig::default(),
            unicode_font: None,
            mono_font: None,
            qr_base_url: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 4096,
            transcription_url: DEFAULT_TRANSCRIPTION_URL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            transcription_timeout_secs: 300,
            download_timeout_secs: 120,
            min_generation_chars: MIN_GENERATION_CHARS,
            remove_source: false,
            ffmpeg_path: None,
            ffprobe_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("work_dir", &self.work_dir)
            .field("output_dir", &self.output_dir)
            .field("cue_policy", &self.cue_policy)
            .field("rule_set", &self.rule_set.name)
            .field("grid", &self.layout.grid)
            .field("unicode_font", &self.unicode_font)
            .field("mono_font", &self.mono_font)
            .field("qr_base_url", &self.qr_base_url)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("transcription_url", &self.transcription_url)
            .field("min_generation_chars", &self.min_generation_chars)
            .field("remove_source", &self.remove_source)
            .finish()
    }
}

impl JobConfig {
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn font_paths(&self) -> FontPaths {
        FontPaths {
            unicode: self.unicode_font.clone(),
            mono: self.mono_font.clone(),
        }
    }

    /// Public URL of a download reference, when a QR base URL is configured.
    pub fn public_url(&self, download_ref: &str) -> Option<String> {
        self.qr_base_url
            .as_ref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), download_ref))
    }
}

/// Builder for [`JobConfig`].
#[derive(Debug)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn cue_policy(mut self, policy: CuePolicy) -> Self {
        self.config.cue_policy = policy;
        self
    }

    pub fn rule_set(mut self, rules: RuleSet) -> Self {
        self.config.rule_set = rules;
        self
    }

    pub fn layout(mut self, layout: LayoutConfig) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn grid(mut self, grid: GridConfig) -> Self {
        self.config.layout.grid = grid;
        self
    }

    pub fn unicode_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.unicode_font = Some(path.into());
        self
    }

    pub fn mono_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.mono_font = Some(path.into());
        self
    }

    pub fn qr_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.qr_base_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn transcription_url(mut self, url: impl Into<String>) -> Self {
        self.config.transcription_url = url.into();
        self
    }

    pub fn transcription_model(mut self, model: impl Into<String>) -> Self {
        self.config.transcription_model = model.into();
        self
    }

    pub fn transcription_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transcription_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn min_generation_chars(mut self, n: usize) -> Self {
        self.config.min_generation_chars = n;
        self
    }

    pub fn remove_source(mut self, v: bool) -> Self {
        self.config.remove_source = v;
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = Some(path.into());
        self
    }

    pub fn ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffprobe_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<JobConfig, SopError> {
        let c = &self.config;
        c.layout.validate().map_err(SopError::InvalidConfig)?;
        if c.rule_set.sections.is_empty() {
            return Err(SopError::InvalidConfig(format!(
                "rule set '{}' declares no sections",
                c.rule_set.name
            )));
        }
        if let Some(ref url) = c.qr_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(SopError::InvalidConfig(format!(
                    "QR base URL must be http(s), got '{url}'"
                )));
            }
        }
        if c.transcription_url.trim().is_empty() {
            return Err(SopError::InvalidConfig(
                "transcription URL must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(SopError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// One job's per-request inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Local path or http(s) URL of the video.
    pub source: String,
    /// Target language of the SOP. Default: `English`.
    pub language: String,
    /// Writing style. Default: `professional`.
    pub style: String,
    /// Document title; derived from the file name when None.
    pub title: Option<String>,
}

impl JobRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: "English".to_string(),
            style: "professional".to_string(),
            title: None,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = JobConfig::default();
        assert_eq!(c.rule_set.name, "safety");
        assert_eq!(c.cue_policy, CuePolicy::default());
        assert_eq!(c.min_generation_chars, 100);
        assert_eq!(c.layout.grid.columns, 3);
        assert_eq!(c.layout.grid.max_rows, 5);
        assert!(!c.remove_source);
    }

    #[test]
    fn temperature_is_clamped() {
        let c = JobConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn oversized_grid_is_invalid() {
        let grid = GridConfig {
            max_rows: 12,
            ..GridConfig::default()
        };
        let err = JobConfig::builder().grid(grid).build().unwrap_err();
        assert!(matches!(err, SopError::InvalidConfig(_)));
    }

    #[test]
    fn bad_qr_base_is_invalid() {
        let err = JobConfig::builder()
            .qr_base_url("ftp://files")
            .build()
            .unwrap_err();
        assert!(matches!(err, SopError::InvalidConfig(_)));
    }

    #[test]
    fn public_url_joins_base_and_ref() {
        let c = JobConfig::builder()
            .qr_base_url("https://sop.example.com/")
            .build()
            .unwrap();
        assert_eq!(
            c.public_url("/download/x.pdf").as_deref(),
            Some("https://sop.example.com/download/x.pdf")
        );
        assert_eq!(JobConfig::default().public_url("/download/x.pdf"), None);
    }

    #[test]
    fn request_defaults() {
        let r = JobRequest::new("clip.mp4").language("German");
        assert_eq!(r.language, "German");
        assert_eq!(r.style, "professional");
        assert!(r.title.is_none());
    }
}
