//! Text-to-speech.
//!
//! A [`SpeechSynthesizer`] renders text to an audio file. A [`SpeechJob`]
//! runs one synthesis in the background and reports readiness once, so the
//! caller can start displaying text without waiting on the engine.

mod http;
pub mod job;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

pub use http::{HttpSpeechSynthesizer, HttpTtsConfig};
pub use job::{SpeechArtifact, SpeechJob};

/// An engine that renders text to an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// File extension of the audio this engine writes (without the dot).
    fn file_extension(&self) -> &str {
        "mp3"
    }

    /// Render `text` with `voice` and write the audio to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Tts`](crate::error::SpeechError::Tts) if the
    /// engine fails, or an I/O error if the file cannot be written.
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()>;
}
