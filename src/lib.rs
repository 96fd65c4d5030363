//! Saiyaara: a conversational companion that answers out loud.
//!
//! Each turn flows through a small pipeline:
//! history → reply generation over a chain of endpoints → sanitization →
//! background speech synthesis alongside paced on-screen text.
//!
//! # Architecture
//!
//! - **Reply acquisition** ([`llm`]): an endpoint chain with a monotonic
//!   cursor, retried with backoff on rate limits, streaming replies from an
//!   OpenAI-compatible API
//! - **Sanitizer** ([`sanitize`]): strips markup and emoji before speaking
//! - **Speech** ([`tts`]): synthesis runs in the background and signals once
//!   when ready
//! - **Delivery** ([`pipeline`]): words are paced to the audio length while
//!   playback runs, and the turn ends when both are done
//! - **Transcripts** ([`transcript`]): the session is archived as JSON when
//!   it ends

pub mod audio;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod runtime;
pub mod sanitize;
pub mod transcript;
pub mod tts;

#[cfg(test)]
mod test_utils;

pub use config::AssistantConfig;
pub use error::{Result, SpeechError};
pub use llm::{Reply, ReplyKind, ReplySession};
pub use pipeline::{TurnOutcome, TurnPipeline};
pub use runtime::RuntimeEvent;
