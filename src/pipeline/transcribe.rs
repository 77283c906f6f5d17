//! Speech-to-text collaborator.
//!
//! [`HttpTranscriber`] speaks the OpenAI-compatible
//! `POST <base>/audio/transcriptions` multipart API, which hosted Whisper,
//! most self-hosted Whisper servers and several gateways implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Raw transcript of a video's audio track. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Duration of the source audio in seconds.
    pub duration_secs: f64,
}

impl Transcript {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("could not read audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transcription service returned no text")]
    Empty,

    #[error("no API key for the transcription service (set OPENAI_API_KEY)")]
    MissingApiKey,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path, duration_secs: f64) -> Result<Transcript, TranscribeError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// OpenAI-compatible transcription endpoint client.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TranscribeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        })
    }

    /// Client for `base_url` authenticated with `OPENAI_API_KEY` when set.
    pub fn from_env(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TranscribeError> {
        let key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(base_url, model, key, timeout)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }

    fn is_local(&self) -> bool {
        self.base_url.contains("://localhost") || self.base_url.contains("://127.0.0.1")
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &Path, duration_secs: f64) -> Result<Transcript, TranscribeError> {
        if self.api_key.is_none() && !self.is_local() {
            return Err(TranscribeError::MissingApiKey);
        }

        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());
        debug!("Uploading {} bytes of audio to {}", bytes.len(), self.endpoint());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let mut request = self.client.post(self.endpoint()).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: TranscriptionResponse = response.json().await?;
        if parsed.text.trim().is_empty() {
            return Err(TranscribeError::Empty);
        }
        info!("Transcribed {:.1}s of audio ({} chars)", duration_secs, parsed.text.len());
        Ok(Transcript {
            text: parsed.text,
            duration_secs,
        })
    }
}
