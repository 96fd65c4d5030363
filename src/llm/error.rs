//! Error types for reply-generation providers.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`LlmError::code()`].
//!
//! The retry scheduler never inspects these variants directly. It asks
//! [`classify`] which of the two failure classes an error belongs to, so
//! provider-specific error shapes stay behind that one function.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Provider signalled rate limiting or quota exhaustion.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Request to the provider failed before a response arrived.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Streaming response broke off or carried an error event.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// Request or stream timed out.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// Provider-specific error not covered by other variants.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Errors produced by reply-generation providers.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// Provider signalled rate limiting or quota exhaustion (HTTP 429).
    #[error("[{}] {}", error_codes::RATE_LIMITED, .0)]
    RateLimited(String),

    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// Authentication failed (invalid/missing API key).
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    AuthError(String),

    /// Request to the provider failed before a response arrived.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Streaming response broke off or carried an error event.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    StreamError(String),

    /// Request or stream timed out.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    TimeoutError(String),

    /// Provider-specific error not covered by other variants.
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    ProviderError(String),
}

impl LlmError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::AuthError(_) => error_codes::AUTH_FAILED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::StreamError(_) => error_codes::STREAM_FAILED,
            Self::TimeoutError(_) => error_codes::TIMEOUT_ERROR,
            Self::ProviderError(_) => error_codes::PROVIDER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::RateLimited(m)
            | Self::ConfigError(m)
            | Self::AuthError(m)
            | Self::RequestError(m)
            | Self::StreamError(m)
            | Self::TimeoutError(m)
            | Self::ProviderError(m) => m,
        }
    }
}

/// The two failure classes the retry scheduler distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected, endpoint-local and recoverable: back off and retry.
    RateLimited,
    /// Anything else: give up on this turn without touching the chain.
    Other,
}

/// Message markers that identify quota exhaustion when a provider reports
/// it through a generic error (for example an error event mid-stream).
const RATE_LIMIT_MARKERS: &[&str] = &["429", "RESOURCE_EXHAUSTED", "rate limit", "quota"];

/// Map a provider error onto the scheduler's failure classes.
pub fn classify(error: &LlmError) -> FailureClass {
    if matches!(error, LlmError::RateLimited(_)) {
        return FailureClass::RateLimited;
    }
    if matches!(error, LlmError::AuthError(_) | LlmError::ConfigError(_)) {
        return FailureClass::Other;
    }
    let message = error.message().to_ascii_lowercase();
    if RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| message.contains(&marker.to_ascii_lowercase()))
    {
        FailureClass::RateLimited
    } else {
        FailureClass::Other
    }
}

/// Convenience alias for provider results.
pub type Result<T> = std::result::Result<T, LlmError>;
