//! Whisper-compatible transcription backend (works with Speaches /
//! faster-whisper-server and the OpenAI audio API shape).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use consulta_core::defaults::{
    ASR_TIMEOUT_SECS, DEFAULT_WHISPER_BASE_URL, DEFAULT_WHISPER_MODEL, ENV_WHISPER_BASE_URL,
    ENV_WHISPER_MODEL,
};
use consulta_core::{AsrBackend, AsrSegment, Error, Result, Transcription};

/// ASR backend speaking the OpenAI `/v1/audio/transcriptions` protocol.
pub struct WhisperBackend {
    base_url: String,
    model: String,
    client: Client,
    timeout: Duration,
}

impl WhisperBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: Client::new(),
            timeout: Duration::from_secs(ASR_TIMEOUT_SECS),
        }
    }

    /// Create from environment variables. Returns None if WHISPER_BASE_URL is
    /// unset or empty.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(ENV_WHISPER_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let model = std::env::var(ENV_WHISPER_MODEL)
            .unwrap_or_else(|_| DEFAULT_WHISPER_MODEL.to_string());
        info!(base_url = %base_url, model = %model, "Initializing Whisper backend");
        Some(Self::new(base_url, model))
    }

    /// File extension the multipart part should carry for a MIME type.
    fn extension_for(mime: &str) -> &'static str {
        match mime {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" => "wav",
            _ => "wav",
        }
    }
}

impl Default for WhisperBackend {
    fn default() -> Self {
        Self::new(
            DEFAULT_WHISPER_BASE_URL.to_string(),
            DEFAULT_WHISPER_MODEL.to_string(),
        )
    }
}

/// OpenAI Whisper API response (verbose_json).
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
    #[serde(default)]
    avg_logprob: Option<f64>,
}

#[async_trait]
impl AsrBackend for WhisperBackend {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime: &str,
        language: Option<&str>,
    ) -> Result<Transcription> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let ext = Self::extension_for(mime);

        debug!(
            bytes = audio.len(),
            mime,
            language = language.unwrap_or("auto"),
            "Sending audio for transcription"
        );

        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("audio.{}", ext))
            .mime_str(mime)
            .map_err(|e| Error::Internal(format!("Failed to create multipart: {}", e)))?;

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
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Transcription exceeded {:?}", self.timeout))
                } else {
                    Error::ProviderUnavailable(format!("Transcription request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return if status.is_client_error() {
                Err(Error::InvalidMedia(format!(
                    "ASR rejected audio ({}): {}",
                    status, body
                )))
            } else {
                Err(Error::ProviderUnavailable(format!(
                    "ASR returned {}: {}",
                    status, body
                )))
            };
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("Bad ASR response body: {}", e)))?;

        // Mean exp(avg_logprob) over segments approximates a [0,1] confidence.
        let confidence = result.segments.as_ref().and_then(|segs| {
            let probs: Vec<f64> = segs
                .iter()
                .filter_map(|s| s.avg_logprob.map(|lp| lp.exp().min(1.0)))
                .collect();
            if probs.is_empty() {
                None
            } else {
                Some(probs.iter().sum::<f64>() / probs.len() as f64)
            }
        });

        let segments = result
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| AsrSegment {
                t_start: s.start,
                t_end: s.end,
                text: s.text,
            })
            .collect();

        Ok(Transcription {
            text: result.text,
            language: result.language,
            duration_s: result.duration,
            confidence,
            segments,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
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
