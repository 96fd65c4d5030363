//! Configuration types for the conversational-turn pipeline.

use crate::llm::fallback::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when `llm.api_key` is empty.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable consulted when `tts.api_key` is empty.
pub const TTS_API_KEY_ENV: &str = "SAIYAARA_TTS_API_KEY";

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Reply-generation settings (endpoint chain, retries, sampling).
    pub llm: LlmConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Paced on-screen display settings.
    pub display: DisplayConfig,
    /// Persona and system prompt settings.
    pub persona: PersonaConfig,
    /// Transcript archival settings.
    pub transcripts: TranscriptConfig,
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    /// API key. Leave empty to read [`API_KEY_ENV`] from the environment.
    pub api_key: String,
    /// Endpoint chain, tried in ascending priority order.
    pub endpoints: Vec<Endpoint>,
    /// Attempts per endpoint before the chain advances.
    pub max_retries: u32,
    /// Backoff in seconds slept between rate-limited attempts.
    ///
    /// Entry `i` is used after attempt `i` fails. A schedule shorter than
    /// `max_retries - 1` repeats its last entry.
    pub backoff_secs: Vec<u64>,
    /// Maximum tokens to generate per reply.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum number of turns retained in the history window.
    pub max_history: usize,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_owned(),
            api_key: String::new(),
            endpoints: vec![
                Endpoint::new("gemini-2.5-flash-lite", 0),
                Endpoint::new("gemini-2.5-flash", 1),
                Endpoint::new("gemini-2.5-pro", 2),
            ],
            max_retries: 3,
            backoff_secs: vec![15, 30, 60],
            max_tokens: 400,
            temperature: 0.8,
            max_history: 20,
            request_timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// The API key to send, falling back to the environment.
    pub fn effective_api_key(&self) -> String {
        if self.api_key.is_empty() {
            std::env::var(API_KEY_ENV).unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }

    /// Backoff schedule as durations.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.backoff_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Whether replies are spoken at all. When false only text is shown.
    pub enabled: bool,
    /// Base URL of the OpenAI-compatible speech API (without `/audio/speech`).
    pub base_url: String,
    /// API key. Leave empty to read [`TTS_API_KEY_ENV`] from the environment.
    pub api_key: String,
    /// Speech model name sent with each request.
    pub model: String,
    /// Voice identifier.
    pub voice: String,
    /// Audio container requested from the engine (`mp3` or `wav`).
    pub format: String,
    /// Seconds delivery waits for the speech artifact before showing text alone.
    pub ready_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // Local OpenAI-compatible speech server (Kokoro-FastAPI, izwi, ...).
            base_url: "http://localhost:8880/v1".to_owned(),
            api_key: String::new(),
            model: "tts-1".to_owned(),
            voice: "en-US-JennyNeural".to_owned(),
            format: "mp3".to_owned(),
            ready_timeout_secs: 10,
        }
    }
}

impl TtsConfig {
    /// The API key to send, falling back to the environment.
    pub fn effective_api_key(&self) -> String {
        if self.api_key.is_empty() {
            std::env::var(TTS_API_KEY_ENV).unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }

    /// Readiness timeout as a duration.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

/// Paced display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Per-word delay used when the audio duration is unknown.
    pub nominal_word_ms: u64,
    /// Column at which displayed lines wrap.
    pub line_width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            nominal_word_ms: 350,
            line_width: 150,
        }
    }
}

/// Persona configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Name the assistant answers to and uses in transcripts.
    pub assistant_name: String,
    /// Optional free-text appended after the built-in persona prompt.
    pub system_prompt: String,
    /// Optional JSON file of remembered facts (`{"facts": [...]}`).
    pub facts_file: Option<PathBuf>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Saiyaara".to_owned(),
            system_prompt: String::new(),
            facts_file: Some(PathBuf::from("data/memory.json")),
        }
    }
}

/// Transcript archival configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Directory receiving one JSON file per finished session.
    pub dir: PathBuf,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/chat_history"),
        }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::SpeechError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A copy safe to print: API keys that are set read `[REDACTED]`.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.llm.api_key = redact(&copy.llm.api_key).to_owned();
        copy.tts.api_key = redact(&copy.tts.api_key).to_owned();
        copy
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Config`](crate::error::SpeechError::Config) naming the bad field.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SpeechError;

        if self.llm.endpoints.is_empty() {
            return Err(SpeechError::Config("llm.endpoints must not be empty".into()));
        }
        if self.llm.max_retries == 0 {
            return Err(SpeechError::Config("llm.max_retries must be at least 1".into()));
        }
        if self.llm.max_retries > 1 && self.llm.backoff_secs.is_empty() {
            return Err(SpeechError::Config(
                "llm.backoff_secs must not be empty when retries are enabled".into(),
            ));
        }
        if self.llm.max_history == 0 {
            return Err(SpeechError::Config("llm.max_history must be at least 1".into()));
        }
        if self.display.line_width == 0 {
            return Err(SpeechError::Config("display.line_width must be at least 1".into()));
        }
        Ok(())
    }

    /// Returns the default config file path: `~/.config/saiyaara/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("saiyaara").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("saiyaara")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/saiyaara-config/config.toml")
        }
    }
}

fn redact(s: &str) -> &str {
    if s.is_empty() { "" } else { "[REDACTED]" }
}
