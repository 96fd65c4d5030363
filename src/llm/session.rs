//! Reply acquisition: the retry scheduler over the endpoint chain.
//!
//! A [`ReplySession`] owns the conversation history and the chain cursor.
//! Each call to [`ReplySession::acquire_reply`] records the utterance, asks
//! endpoints for a reply in priority order, and always hands back a
//! [`Reply`]: generated text, a short apology for an unexpected failure, or
//! an apology for an exhausted chain. Failures never escape as errors; the
//! only error is cancellation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::assembler;
use super::error::{FailureClass, classify};
use super::fallback::{BackoffSchedule, EndpointChain};
use super::provider::ReplyProvider;
use super::types::RequestOptions;
use crate::config::LlmConfig;
use crate::error::{Result, SpeechError};
use crate::history::{HistoryWindow, Turn};
use crate::prompt::{Persona, build_messages};
use crate::runtime::{RuntimeEvent, RuntimeSender, emit};
use crate::sanitize::sanitize;

/// Reply used when generation fails for a reason other than rate limiting.
pub const TROUBLE_REPLY: &str = "Sorry, I'm having some trouble right now. Can you try again?";

/// Reply used once every endpoint in the chain is exhausted.
pub const EXHAUSTED_REPLY: &str = "I've used up all available models for today. \
     Quota resets at midnight Pacific Time, so let's continue then!";

/// How a reply came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Produced by an endpoint and recorded in history.
    Generated,
    /// Local apology after an unexpected generation failure.
    Trouble,
    /// Local apology after every endpoint was exhausted.
    ChainExhausted,
}

/// The user-visible result of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Sanitized text to display and speak.
    pub text: String,
    /// Where the text came from.
    pub kind: ReplyKind,
}

impl Reply {
    /// A generated reply.
    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: ReplyKind::Generated,
        }
    }

    /// The trouble apology.
    pub fn trouble() -> Self {
        Self {
            text: TROUBLE_REPLY.to_owned(),
            kind: ReplyKind::Trouble,
        }
    }

    /// The exhausted-chain apology.
    pub fn exhausted() -> Self {
        Self {
            text: EXHAUSTED_REPLY.to_owned(),
            kind: ReplyKind::ChainExhausted,
        }
    }

    /// Whether the reply was produced by an endpoint.
    pub fn is_generated(&self) -> bool {
        self.kind == ReplyKind::Generated
    }
}

/// Outcome of one generation attempt, after cancellation is accounted for.
enum Attempt {
    Done(std::result::Result<String, super::error::LlmError>),
    Cancelled,
}

/// Conversation state plus the retry policy used to fill it.
pub struct ReplySession {
    provider: Arc<dyn ReplyProvider>,
    chain: EndpointChain,
    backoff: BackoffSchedule,
    max_retries: usize,
    options: RequestOptions,
    persona: Persona,
    history: HistoryWindow,
    runtime_tx: Option<RuntimeSender>,
}

impl std::fmt::Debug for ReplySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySession")
            .field("provider", &self.provider.name())
            .field("chain", &self.chain)
            .field("max_retries", &self.max_retries)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl ReplySession {
    /// Create a session with the default retry policy.
    pub fn new(provider: Arc<dyn ReplyProvider>, chain: EndpointChain, persona: Persona) -> Self {
        Self {
            provider,
            chain,
            backoff: BackoffSchedule::default(),
            max_retries: 3,
            options: RequestOptions::new(),
            persona,
            history: HistoryWindow::default(),
            runtime_tx: None,
        }
    }

    /// Create a session from the `[llm]` config section.
    pub fn from_config(provider: Arc<dyn ReplyProvider>, config: &LlmConfig, persona: Persona) -> Self {
        let options = RequestOptions::new()
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature);
        Self::new(provider, EndpointChain::new(config.endpoints.clone()), persona)
            .with_backoff(BackoffSchedule::new(config.backoff_schedule()))
            .with_max_retries(config.max_retries as usize)
            .with_options(options)
            .with_history_bound(config.max_history)
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the number of attempts per endpoint (at least one).
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set generation options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the history bound, keeping the most recent turns.
    pub fn with_history_bound(mut self, max_turns: usize) -> Self {
        let turns = self.history.to_vec();
        self.history = HistoryWindow::new(max_turns);
        self.history.replace(turns);
        self
    }

    /// Attach a runtime event broadcaster for UI/observability.
    pub fn with_runtime_events(mut self, tx: RuntimeSender) -> Self {
        self.runtime_tx = Some(tx);
        self
    }

    /// Current conversation history.
    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    /// The endpoint chain and its cursor.
    pub fn chain(&self) -> &EndpointChain {
        &self.chain
    }

    /// The persona used to build prompts.
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Return every turn and empty the history.
    ///
    /// The chain cursor is left where it is.
    pub fn take_history(&mut self) -> Vec<Turn> {
        let turns = self.history.to_vec();
        self.history.clear();
        turns
    }

    /// Replace the history, e.g. with turns from a stored transcript.
    ///
    /// Only the most recent turns that fit the window are kept.
    pub fn restore_history(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.history.replace(turns);
    }

    /// Record `utterance` and obtain a reply for it.
    ///
    /// # Errors
    ///
    /// Returns [`SpeechError::Cancelled`] if `cancel` fires during generation
    /// or a backoff sleep. The unanswered utterance is removed from history
    /// first.
    pub async fn acquire_reply(&mut self, utterance: &str, cancel: &CancellationToken) -> Result<Reply> {
        self.history.push(Turn::user(utterance));

        while let Some(endpoint) = self.chain.current().cloned() {
            for attempt in 0..self.max_retries {
                debug!(endpoint = %endpoint.name, attempt, "requesting reply");
                emit(
                    self.runtime_tx.as_ref(),
                    RuntimeEvent::Thinking {
                        endpoint: endpoint.name.clone(),
                        attempt,
                    },
                );

                let messages = build_messages(&self.persona, &self.history);
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Attempt::Cancelled,
                    result = assembler::generate(
                        self.provider.as_ref(),
                        &endpoint,
                        &messages,
                        &self.options,
                    ) => Attempt::Done(result),
                };

                let error = match outcome {
                    Attempt::Cancelled => return Err(self.cancel_turn()),
                    Attempt::Done(Ok(text)) => return Ok(self.accept(&endpoint.name, &text)),
                    Attempt::Done(Err(error)) => error,
                };

                match classify(&error) {
                    FailureClass::RateLimited if attempt + 1 < self.max_retries => {
                        let backoff = self.backoff.delay(attempt);
                        warn!(
                            endpoint = %endpoint.name,
                            attempt,
                            backoff_secs = backoff.as_secs_f64(),
                            error = %error,
                            "rate limited, backing off"
                        );
                        emit(
                            self.runtime_tx.as_ref(),
                            RuntimeEvent::RateLimited {
                                endpoint: endpoint.name.clone(),
                                attempt,
                                backoff,
                            },
                        );
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => return Err(self.cancel_turn()),
                            () = tokio::time::sleep(backoff) => {}
                        }
                    }
                    FailureClass::RateLimited => {
                        let next = self.chain.advance().map(|e| e.name.clone());
                        warn!(
                            endpoint = %endpoint.name,
                            next = next.as_deref().unwrap_or("none"),
                            "endpoint exhausted"
                        );
                        emit(
                            self.runtime_tx.as_ref(),
                            RuntimeEvent::EndpointExhausted {
                                endpoint: endpoint.name.clone(),
                                next,
                            },
                        );
                        break;
                    }
                    FailureClass::Other => {
                        warn!(endpoint = %endpoint.name, error = %error, "reply generation failed");
                        self.history.retract_last_user();
                        emit(
                            self.runtime_tx.as_ref(),
                            RuntimeEvent::GenerationFailed {
                                endpoint: endpoint.name.clone(),
                            },
                        );
                        return Ok(self.finish(Reply::trouble()));
                    }
                }
            }
        }

        warn!("all endpoints exhausted");
        self.history.retract_last_user();
        emit(self.runtime_tx.as_ref(), RuntimeEvent::ChainExhausted);
        Ok(self.finish(Reply::exhausted()))
    }

    /// Sanitize a generated reply and record it.
    ///
    /// A reply with nothing left after sanitization is treated as an
    /// unexpected failure.
    fn accept(&mut self, endpoint: &str, text: &str) -> Reply {
        let clean = sanitize(text);
        if clean.is_empty() {
            warn!(endpoint, "reply was empty after sanitization");
            self.history.retract_last_user();
            emit(
                self.runtime_tx.as_ref(),
                RuntimeEvent::GenerationFailed {
                    endpoint: endpoint.to_owned(),
                },
            );
            return self.finish(Reply::trouble());
        }
        info!(endpoint, chars = clean.len(), "reply generated");
        self.history.push(Turn::assistant(clean.clone()));
        self.finish(Reply::generated(clean))
    }

    fn finish(&self, reply: Reply) -> Reply {
        emit(
            self.runtime_tx.as_ref(),
            RuntimeEvent::ReplyReady { kind: reply.kind },
        );
        reply
    }

    fn cancel_turn(&mut self) -> SpeechError {
        debug!("reply cancelled");
        self.history.retract_last_user();
        SpeechError::Cancelled
    }
}
