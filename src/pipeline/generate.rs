//! Text generation: turn a transcript into an SOP draft.
//!
//! The orchestrator depends on the [`Generator`] trait only. [`LlmGenerator`]
//! adapts any `edgequake_llm::LLMProvider`; tests substitute in-process
//! fakes. Generation is a single attempt: on error, or when the answer is too
//! short to be a document, [`generate_or_fallback`] substitutes the literal
//! transcript and says why.

use crate::config::JobConfig;
use crate::error::SopError;
use crate::pipeline::postprocess::clean_generation;
use crate::prompts::{render_prompt, PromptVars};
use async_trait::async_trait;
use chrono::Local;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Answers shorter than this (after cleanup) are treated as failures.
pub const MIN_GENERATION_CHARS: usize = 100;

/// Everything the generator needs about one job. Passed by value.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub transcript: String,
    pub language: String,
    pub style: String,
    /// Capture instants in seconds, ascending.
    pub cues: Vec<f64>,
    pub duration_secs: f64,
}

impl GenerationRequest {
    fn prompt_vars(&self) -> PromptVars<'_> {
        PromptVars {
            language: &self.language,
            style: &self.style,
            transcript: &self.transcript,
            duration_secs: self.duration_secs,
            cues: &self.cues,
        }
    }
}

/// The text that goes into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub text: String,
    /// Why the transcript was used instead of a generation, if it was.
    pub fallback: Option<String>,
}

impl GeneratedDocument {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("provider call failed: {0}")]
    Provider(String),

    #[error("provider returned an empty answer")]
    Empty,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Send one prompt, get one answer.
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError>;

    /// Fill `template` from `request` and complete it.
    async fn generate(
        &self,
        request: &GenerationRequest,
        template: &str,
    ) -> Result<String, GenerateError> {
        let prompt = render_prompt(template, &request.prompt_vars(), &Local::now());
        self.complete(&prompt).await
    }
}

/// [`Generator`] over an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    /// Build from the job configuration's provider settings.
    pub fn from_config(config: &JobConfig) -> Result<Self, SopError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.temperature, config.max_tokens))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for LlmGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGenerator")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| GenerateError::Provider(e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        if response.content.trim().is_empty() {
            return Err(GenerateError::Empty);
        }
        Ok(response.content)
    }
}

/// Run one generation attempt and fall back to the transcript if it fails
/// or is not longer than `min_chars` characters.
pub async fn generate_or_fallback(
    generator: &dyn Generator,
    request: &GenerationRequest,
    template: &str,
    min_chars: usize,
) -> GeneratedDocument {
    let fallback = |reason: String| {
        warn!("Generation fell back to transcript: {}", reason);
        GeneratedDocument {
            text: request.transcript.clone(),
            fallback: Some(reason),
        }
    };

    match generator.generate(request, template).await {
        Ok(raw) => {
            let text = clean_generation(&raw);
            let len = text.trim().chars().count();
            if len <= min_chars {
                fallback(format!(
                    "answer too short ({len} chars, need more than {min_chars})"
                ))
            } else {
                info!("Generated {} chars", len);
                GeneratedDocument {
                    text,
                    fallback: None,
                }
            }
        }
        Err(e) => fallback(e.to_string()),
    }
}

// ── Provider resolution ─────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SopError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SopError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, most specific source first:
///
/// 1. a pre-built provider on the config
/// 2. `provider_name` (+ `model`, default [`DEFAULT_MODEL`])
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, both set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. `ProviderFactory::from_env()` auto-detection
pub fn resolve_provider(config: &JobConfig) -> Result<Arc<dyn LLMProvider>, SopError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm, _embedding) =
        ProviderFactory::from_env().map_err(|e| SopError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;
    Ok(llm)
}
