//! Response assembly from streamed fragments.

use futures_util::StreamExt;

use super::error::LlmError;
use super::fallback::Endpoint;
use super::provider::ReplyProvider;
use super::types::{Message, RequestOptions};

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Generate one complete reply from `endpoint`.
///
/// Fragments are concatenated in arrival order. The reply only exists once
/// the stream completes: an error at any point discards what was received
/// and is returned as the failure. A reply that is empty once reasoning
/// spans are removed is reported as a [`LlmError::ProviderError`].
pub async fn generate(
    provider: &dyn ReplyProvider,
    endpoint: &Endpoint,
    messages: &[Message],
    options: &RequestOptions,
) -> Result<String, LlmError> {
    let mut stream = provider.stream(&endpoint.name, messages, options).await?;

    let mut text = String::new();
    let mut fragments = 0usize;
    while let Some(item) = stream.next().await {
        let fragment = item?;
        fragments += 1;
        text.push_str(&fragment);
    }

    let reply = strip_think_blocks(&text);
    let reply = reply.trim();
    tracing::debug!(
        endpoint = %endpoint.name,
        fragments,
        chars = reply.len(),
        "reply assembled"
    );
    if reply.is_empty() {
        return Err(LlmError::ProviderError(format!(
            "{} returned an empty reply",
            endpoint.name
        )));
    }
    Ok(reply.to_owned())
}

/// Strip `<think>...</think>` blocks. An unclosed block swallows the rest.
fn strip_think_blocks(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut remaining = text;
    while let Some(start) = remaining.find(THINK_OPEN) {
        result.push_str(&remaining[..start]);
        match remaining[start..].find(THINK_CLOSE) {
            Some(end) => remaining = &remaining[start + end + THINK_CLOSE.len()..],
            None => return result,
        }
    }
    result.push_str(remaining);
    result
}
