//! CLI binary for video2sop.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `JobConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use video2sop::{
    answer_question, AuditStatus, CuePolicy, GridConfig, JobConfig, JobProgressCallback, JobRequest,
    Pipeline, ProgressCallback, RuleSet, Stage, StageWarning,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner line for the running stage, one log line
/// per finished stage and per warning.
struct CliProgressCallback {
    bar: ProgressBar,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            warnings: AtomicUsize::new(0),
        })
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: Uuid, source: &str) {
        self.bar
            .println(format!("{} {} {}", bold("◆"), bold(source), dim(&job_id.to_string())));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar
            .set_prefix(format!("[{}/{}]", stage.number(), Stage::COUNT));
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_warning(&self, warning: &StageWarning) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        let msg = warning.to_string();
        // Truncate very long messages to keep output tidy.
        let msg = match msg.char_indices().nth(100) {
            Some((idx, _)) => format!("{}\u{2026}", &msg[..idx]),
            None => msg,
        };
        self.bar.println(format!("  {} {}", yellow("⚠"), msg));
    }

    fn on_job_complete(&self, _job_id: Uuid, success: bool) {
        self.bar.finish_and_clear();
        let warnings = self.warnings.load(Ordering::SeqCst);
        if !success {
            eprintln!("{} job failed", red("✘"));
        } else if warnings == 0 {
            eprintln!("{} job completed", green("✔"));
        } else {
            eprintln!("{} job completed with {} warning(s)", yellow("⚠"), warnings);
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local video, default safety rule set
  video2sop reset_router.mp4

  # Four-section structured SOP in German, six screenshots
  video2sop --rule-set structure --language German --cues 6 demo.mp4

  # One screenshot every 20 seconds, custom output directory
  video2sop --interval 20 -o ./sops https://example.com/training.mp4

  # Custom rule set from JSON
  video2sop --rule-set-file rules.json demo.mp4

  # Ask a question about the generated SOP
  video2sop --ask "How long do I hold the reset button?" reset_router.mp4

  # JSON output (JobOutput)
  video2sop --json demo.mp4 > job.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (generation and transcription)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  FFMPEG_BINARY           Path to ffmpeg (default: looked up on PATH)
  FFPROBE_BINARY          Path to ffprobe (default: looked up on PATH)

SETUP:
  1. Install ffmpeg:  apt install ffmpeg   (or brew install ffmpeg)
  2. Set API key:     export OPENAI_API_KEY=sk-...
  3. Run:             video2sop demo.mp4
"#;

/// Turn procedure videos into audited SOP PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "video2sop",
    version,
    about = "Turn procedure videos into audited SOP PDFs",
    long_about = "Transcribe a video, restate it as a Standard Operating Procedure with an LLM, \
audit the draft against a rule set and render it as a PDF with screenshots. Supports OpenAI, \
Anthropic, Google Gemini and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local video file path or HTTP/HTTPS URL.
    input: String,

    /// Directory the PDF is written to.
    #[arg(short, long, env = "VIDEO2SOP_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Scratch directory for audio, frames and QR codes.
    #[arg(long, env = "VIDEO2SOP_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Target language of the SOP.
    #[arg(short, long, env = "VIDEO2SOP_LANGUAGE", default_value = "English")]
    language: String,

    /// Writing style passed to the model.
    #[arg(long, env = "VIDEO2SOP_STYLE", default_value = "professional")]
    style: String,

    /// Document title (default: derived from the file name).
    #[arg(long)]
    title: Option<String>,

    /// Built-in rule set: safety or structure.
    #[arg(long, env = "VIDEO2SOP_RULE_SET", default_value = "safety")]
    rule_set: String,

    /// JSON file with a custom rule set (overrides --rule-set).
    #[arg(long, env = "VIDEO2SOP_RULE_SET_FILE")]
    rule_set_file: Option<PathBuf>,

    /// Capture N evenly spaced screenshots between 10 % and 90 %.
    #[arg(long, conflicts_with = "interval")]
    cues: Option<usize>,

    /// Capture one screenshot every SECS seconds.
    #[arg(long, value_name = "SECS")]
    interval: Option<f64>,

    /// Screenshot grid columns.
    #[arg(long, default_value_t = 3)]
    grid_columns: usize,

    /// Screenshot grid rows per page.
    #[arg(long, default_value_t = 5)]
    grid_rows: usize,

    /// TTF font for Unicode text (built-in Helvetica otherwise).
    #[arg(long, env = "VIDEO2SOP_FONT")]
    font: Option<PathBuf>,

    /// TTF font for flowcharts (built-in Courier otherwise).
    #[arg(long, env = "VIDEO2SOP_MONO_FONT")]
    mono_font: Option<PathBuf>,

    /// Public base URL; adds a QR code linking to the download.
    #[arg(long, env = "VIDEO2SOP_QR_BASE_URL")]
    qr_base_url: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "VIDEO2SOP_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "VIDEO2SOP_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// OpenAI-compatible transcription base URL.
    #[arg(long, env = "VIDEO2SOP_TRANSCRIPTION_URL")]
    transcription_url: Option<String>,

    /// Transcription model.
    #[arg(long, env = "VIDEO2SOP_TRANSCRIPTION_MODEL")]
    transcription_model: Option<String>,

    /// Path to ffmpeg.
    #[arg(long, env = "FFMPEG_BINARY")]
    ffmpeg: Option<PathBuf>,

    /// Path to ffprobe.
    #[arg(long, env = "FFPROBE_BINARY")]
    ffprobe: Option<PathBuf>,

    /// Delete the local source video after a successful job.
    #[arg(long, env = "VIDEO2SOP_REMOVE_SOURCE")]
    remove_source: bool,

    /// After the job, answer this question from the generated SOP.
    #[arg(long)]
    ask: Option<String>,

    /// Output structured JSON (JobOutput) instead of a summary.
    #[arg(long, env = "VIDEO2SOP_JSON")]
    json: bool,

    /// Disable progress output.
    #[arg(long, env = "VIDEO2SOP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "VIDEO2SOP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "VIDEO2SOP_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "VIDEO2SOP_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO-level library logs unless --verbose.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn JobProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let pipeline = Pipeline::from_config(config).context("Failed to set up pipeline")?;

    let mut request = JobRequest::new(&cli.input)
        .language(&cli.language)
        .style(&cli.style);
    if let Some(ref title) = cli.title {
        request = request.title(title);
    }

    let output = pipeline.run(&request).await.context("Job failed")?;

    let answer = match cli.ask {
        Some(ref question) => Some(
            answer_question(pipeline.generator(), question, &output.document_body)
                .await
                .context("Question answering failed")?,
        ),
        None => None,
    };

    if cli.json {
        let mut value = serde_json::to_value(&output).context("Failed to serialise output")?;
        if let (Some(answer), Some(map)) = (answer, value.as_object_mut()) {
            map.insert("answer".to_string(), serde_json::Value::String(answer));
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialise output")?
        );
        return Ok(());
    }

    if !cli.quiet {
        let status = match output.audit.status {
            AuditStatus::Pass => green("APPROVED"),
            AuditStatus::Fail => red("DRAFT REJECTED"),
        };
        eprintln!(
            "{}  {}  {} pages  {}ms",
            status,
            bold(&output.artifact_path.display().to_string()),
            output.layout.page_count,
            output.stats.total_ms,
        );
        if output.audit.status == AuditStatus::Fail {
            eprintln!("   {}", dim(&output.audit.reason));
        }
        if !show_progress {
            for w in &output.warnings {
                eprintln!("   {} {}", yellow("⚠"), w);
            }
        }
    }
    println!("{}", output.download_ref);
    if let Some(answer) = answer {
        println!("\n{answer}");
    }

    Ok(())
}

/// Map CLI args to `JobConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<JobConfig> {
    let rule_set = match cli.rule_set_file {
        Some(ref path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read rule set from {:?}", path))?;
            RuleSet::from_json(&json).with_context(|| format!("Invalid rule set in {:?}", path))?
        }
        None => RuleSet::named(&cli.rule_set)
            .with_context(|| format!("Unknown rule set '{}' (expected safety or structure)", cli.rule_set))?,
    };

    let cue_policy = match (cli.cues, cli.interval) {
        (Some(n), _) => CuePolicy::count(n),
        (None, Some(secs)) => CuePolicy::interval(secs),
        (None, None) => CuePolicy::default(),
    };

    let grid = GridConfig {
        columns: cli.grid_columns,
        max_rows: cli.grid_rows,
        ..GridConfig::default()
    };

    let mut builder = JobConfig::builder()
        .output_dir(&cli.output_dir)
        .rule_set(rule_set)
        .cue_policy(cue_policy)
        .grid(grid)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .download_timeout_secs(cli.download_timeout)
        .remove_source(cli.remove_source);

    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref font) = cli.font {
        builder = builder.unicode_font(font);
    }
    if let Some(ref font) = cli.mono_font {
        builder = builder.mono_font(font);
    }
    if let Some(ref url) = cli.qr_base_url {
        builder = builder.qr_base_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref url) = cli.transcription_url {
        builder = builder.transcription_url(url);
    }
    if let Some(ref model) = cli.transcription_model {
        builder = builder.transcription_model(model);
    }
    if let Some(ref path) = cli.ffmpeg {
        builder = builder.ffmpeg_path(path);
    }
    if let Some(ref path) = cli.ffprobe {
        builder = builder.ffprobe_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
