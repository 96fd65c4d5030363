//! Reply generation.
//!
//! A [`ReplySession`] walks an [`EndpointChain`] of models on one
//! [`ReplyProvider`], backing off on rate limits and falling through to the
//! next endpoint when retries run out. Replies are assembled from streamed
//! fragments and sanitized before they reach history or the user.

pub mod assembler;
pub mod error;
pub mod fallback;
pub mod openai;
pub mod provider;
pub mod session;
pub mod sse;
pub mod types;

pub use error::{FailureClass, LlmError, classify};
pub use fallback::{BackoffSchedule, Endpoint, EndpointChain};
pub use openai::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use provider::{ReplyProvider, TokenStream};
pub use session::{Reply, ReplyKind, ReplySession};
pub use types::{Message, MessageRole, RequestOptions};
