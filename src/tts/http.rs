//! Speech synthesis over an OpenAI-compatible `/audio/speech` endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::SpeechSynthesizer;
use crate::config::TtsConfig;
use crate::error::{Result, SpeechError};

/// Connection settings for an `/audio/speech` service.
#[derive(Debug, Clone)]
pub struct HttpTtsConfig {
    /// Base URL without the trailing `/audio/speech`.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: String,
    /// Model id sent with each request.
    pub model: String,
    /// Audio container requested (`mp3`, `wav`, ...).
    pub format: String,
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

impl From<&TtsConfig> for HttpTtsConfig {
    fn from(config: &TtsConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.effective_api_key(),
            model: config.model.clone(),
            format: config.format.clone(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Synthesizer backed by an OpenAI-compatible speech API.
pub struct HttpSpeechSynthesizer {
    config: HttpTtsConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSpeechSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSpeechSynthesizer")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("format", &self.config.format)
            .finish()
    }
}

impl HttpSpeechSynthesizer {
    /// Create a synthesizer.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`] if the HTTP client cannot be built.
    pub fn new(config: HttpTtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SpeechError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    fn name(&self) -> &str {
        "http"
    }

    fn file_extension(&self) -> &str {
        &self.config.format
    }

    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
            "voice": voice,
            "response_format": self.config.format,
        });

        let mut request = self.client.post(self.speech_url()).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SpeechError::Tts(format!("speech request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SpeechError::Tts(format!(
                "speech HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Tts(format!("speech body read failed: {e}")))?;
        if audio.is_empty() {
            return Err(SpeechError::Tts("speech response was empty".into()));
        }
        tokio::fs::write(output, &audio).await?;
        tracing::debug!(bytes = audio.len(), path = %output.display(), "speech written");
        Ok(())
    }
}
