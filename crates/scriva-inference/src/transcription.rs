//! Transcription backend trait and the Whisper-compatible implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use scriva_core::{defaults, Error, Result};

/// A segment of transcribed audio with timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Result of transcribing one media file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionResult {
    /// Full transcribed text.
    pub full_text: String,
    /// Timestamped segments, when the backend provides them.
    pub segments: Vec<TranscriptionSegment>,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    /// Total audio duration in seconds.
    pub duration_secs: Option<f64>,
}

impl TranscriptionResult {
    /// A result carrying only text, no segment metadata.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            full_text: text.into(),
            segments: Vec::new(),
            language: None,
            duration_secs: None,
        }
    }
}

/// Backend for transcribing media files.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe media bytes. Failures are retryable from the caller's
    /// point of view; this trait makes no transient/permanent distinction.
    async fn transcribe(
        &self,
        media_data: &[u8],
        media_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// The model name being used.
    fn model_name(&self) -> &str;
}

/// Build the configured backend from the environment.
///
/// `TRANSCRIPTION_BACKEND=mock` yields a deterministic mock (every call
/// succeeds with a canned text); anything else yields a [`WhisperBackend`].
pub fn backend_from_env() -> Arc<dyn TranscriptionBackend> {
    let selection = std::env::var(defaults::ENV_TRANSCRIPTION_BACKEND)
        .unwrap_or_else(|_| "whisper".to_string());

    if selection == "mock" {
        debug!("transcription: using mock backend");
        Arc::new(crate::mock::MockTranscriptionBackend::always_succeeding(
            "mock transcript",
        ))
    } else {
        Arc::new(WhisperBackend::from_env())
    }
}

/// OpenAI-compatible Whisper backend (works with Speaches/faster-whisper-server).
pub struct WhisperBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhisperBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
            timeout_secs: defaults::TRANSCRIBE_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let base_url = std::env::var(defaults::ENV_WHISPER_BASE_URL)
            .unwrap_or_else(|_| defaults::DEFAULT_WHISPER_BASE_URL.to_string());
        let model = std::env::var(defaults::ENV_WHISPER_MODEL)
            .unwrap_or_else(|_| defaults::DEFAULT_WHISPER_MODEL.to_string());
        Self::new(base_url, model)
    }

    /// Map a media MIME type to the file extension the API expects.
    fn extension_for(media_type: &str) -> &'static str {
        match media_type {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/ogg" => "ogg",
            "audio/flac" => "flac",
            "audio/aac" => "aac",
            "audio/webm" | "video/webm" => "webm",
            "video/mp4" => "mp4",
            _ => "wav",
        }
    }
}

/// Whisper API response format (`verbose_json`).
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(
        &self,
        media_data: &[u8],
        media_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let ext = Self::extension_for(media_type);

        let file_part = reqwest::multipart::Part::bytes(media_data.to_vec())
            .file_name(format!("audio.{}", ext))
            .mime_str(media_type)
            .map_err(|e| Error::Transcription(format!("failed to create multipart: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("transcription request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "whisper API returned {}: {}",
                status, body
            )));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse whisper response: {}", e)))?;

        let segments = result
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptionSegment {
                start_secs: s.start,
                end_secs: s.end,
                text: s.text,
            })
            .collect();

        Ok(TranscriptionResult {
            full_text: result.text,
            segments,
            language: result.language,
            duration_secs: result.duration,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
