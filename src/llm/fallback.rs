//! Endpoint chain and retry backoff.
//!
//! The chain is an ordered list of endpoints (model identifiers on one
//! provider). A cursor names the endpoint currently in use. The cursor only
//! ever moves forward: once an endpoint has been given up on it is not tried
//! again for the lifetime of the chain, even across turns.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One model identifier in the chain, ranked by priority (lower is tried first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Model identifier sent to the provider.
    pub name: String,
    /// Rank in the chain. Lower values are tried first.
    pub priority: u32,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
        }
    }
}

/// Ordered endpoints with a monotonic cursor.
///
/// # Examples
///
/// ```
/// use saiyaara::llm::fallback::{Endpoint, EndpointChain};
///
/// let mut chain = EndpointChain::new(vec![
///     Endpoint::new("slow", 2),
///     Endpoint::new("fast", 0),
/// ]);
/// assert_eq!(chain.current().map(|e| e.name.as_str()), Some("fast"));
/// chain.advance();
/// assert_eq!(chain.current().map(|e| e.name.as_str()), Some("slow"));
/// chain.advance();
/// assert!(chain.is_exhausted());
/// ```
#[derive(Debug, Clone)]
pub struct EndpointChain {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

impl EndpointChain {
    /// Build a chain, ordering endpoints by ascending priority.
    ///
    /// Endpoints sharing a priority keep their configured order.
    pub fn new(mut endpoints: Vec<Endpoint>) -> Self {
        endpoints.sort_by_key(|e| e.priority);
        Self {
            endpoints,
            cursor: 0,
        }
    }

    /// The endpoint at the cursor, or `None` once the chain is exhausted.
    pub fn current(&self) -> Option<&Endpoint> {
        self.endpoints.get(self.cursor)
    }

    /// Give up on the current endpoint and move to the next one.
    ///
    /// Returns the new current endpoint. Advancing an exhausted chain is a
    /// no-op.
    pub fn advance(&mut self) -> Option<&Endpoint> {
        if self.cursor < self.endpoints.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Whether every endpoint has been given up on.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.endpoints.len()
    }

    /// Position of the cursor (equal to `len()` once exhausted).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of endpoints in the chain.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the chain was built without any endpoints.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// All endpoints in priority order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Delays applied between retries of a rate-limited endpoint.
///
/// Attempts past the end of the configured steps reuse the last step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
}

impl BackoffSchedule {
    /// Create a schedule from explicit steps.
    pub fn new(steps: Vec<Duration>) -> Self {
        Self { steps }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: usize) -> Duration {
        self.steps
            .get(attempt)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// The configured steps.
    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(15),
            Duration::from_secs(30),
            Duration::from_secs(60),
        ])
    }
}
