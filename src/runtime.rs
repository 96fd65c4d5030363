//! Runtime events emitted by the pipeline for UI and observability.
//!
//! Events are small and cloned into a tokio `broadcast` channel. Sending
//! never blocks and having no subscribers is fine.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::llm::session::ReplyKind;

/// Events that describe what the pipeline is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A generation attempt started.
    Thinking {
        /// Endpoint being asked.
        endpoint: String,
        /// Zero-based attempt on this endpoint.
        attempt: usize,
    },
    /// The endpoint is rate limited; the scheduler is backing off.
    RateLimited {
        endpoint: String,
        attempt: usize,
        /// Delay before the next attempt.
        backoff: Duration,
    },
    /// Retries on an endpoint ran out and the cursor moved on.
    EndpointExhausted {
        endpoint: String,
        /// The endpoint now at the cursor, if any remain.
        next: Option<String>,
    },
    /// Every endpoint in the chain is exhausted.
    ChainExhausted,
    /// A non rate-limit failure ended the turn.
    GenerationFailed { endpoint: String },
    /// The turn produced its user-visible reply.
    ReplyReady { kind: ReplyKind },
    /// Speech readiness resolved (`ready` is false on timeout or failure).
    SpeechReady { ready: bool },
    /// Display and playback have both finished.
    DeliveryFinished { audio_played: bool },
}

/// Broadcast sender for runtime events.
pub type RuntimeSender = broadcast::Sender<RuntimeEvent>;

/// Send `event` if a broadcaster is attached.
pub(crate) fn emit(tx: Option<&RuntimeSender>, event: RuntimeEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
