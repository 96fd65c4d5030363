//! Provider trait for reply-generation backends.
//!
//! A provider turns a message list into a stream of text fragments. The
//! stream ending without an error item is the success condition; any error
//! item (or an error before the stream opens) is a failure to be classified
//! with [`classify`](super::error::classify).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::error::LlmError;
use super::types::{Message, RequestOptions};

/// A boxed stream of reply fragments in arrival order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Trait for reply-generation backends.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    /// Returns the provider name (e.g. `"openai-compat"`).
    fn name(&self) -> &str;

    /// Start generating a reply from `model` for `messages`.
    async fn stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<TokenStream, LlmError>;
}
