//! Error types for the saiyaara pipeline.

/// Top-level error type for the conversational-turn pipeline.
///
/// Generation failures are translated into a [`Reply`](crate::llm::Reply)
/// inside the pipeline and never surface here. What remains are setup
/// problems (config, I/O), collaborator failures that callers may choose to
/// log, and cooperative cancellation.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Language model provider error that escaped classification.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio decode or device error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Transcript archival error.
    #[error("transcript error: {0}")]
    Transcript(String),

    /// Pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The turn was interrupted at a suspension point.
    #[error("turn cancelled")]
    Cancelled,
}

impl SpeechError {
    /// Whether this error is a cooperative cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<crate::llm::LlmError> for SpeechError {
    fn from(err: crate::llm::LlmError) -> Self {
        Self::Llm(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;
