//! OpenAI-compatible Chat Completions provider.
//!
//! Talks to any service exposing `POST {base_url}/chat/completions` with
//! `stream: true` SSE responses, which includes Gemini's OpenAI-compatible
//! endpoint. The model is chosen per request so one provider serves every
//! endpoint in the chain.
//!
//! # Examples
//!
//! ```rust,no_run
//! use saiyaara::llm::openai::{OpenAiCompatConfig, OpenAiCompatProvider};
//! use saiyaara::llm::provider::ReplyProvider;
//! use saiyaara::llm::types::{Message, RequestOptions};
//!
//! # async fn example() -> Result<(), saiyaara::llm::error::LlmError> {
//! let provider = OpenAiCompatProvider::new(OpenAiCompatConfig::new("key"))?;
//! let stream = provider
//!     .stream("gemini-2.5-flash", &[Message::user("Hello")], &RequestOptions::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::error::LlmError;
use super::provider::{ReplyProvider, TokenStream};
use super::sse::SseLineParser;
use super::types::{Message, RequestOptions};

/// Default base URL: Gemini's OpenAI-compatible surface.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Connection settings for an OpenAI-compatible service.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL without a trailing `/chat/completions`.
    pub base_url: String,
    /// Whole-request timeout, including the streamed body.
    pub request_timeout: Duration,
}

impl OpenAiCompatConfig {
    /// Create a config for the default base URL.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Build the JSON request body for the Chat Completions API.
pub fn build_completions_request(
    model: &str,
    messages: &[Message],
    options: &RequestOptions,
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
        .collect();
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": options.stream,
    });
    if let Some(obj) = body.as_object_mut() {
        if let Some(max_tokens) = options.max_tokens {
            obj.insert("max_tokens".into(), serde_json::json!(max_tokens));
        }
        if let Some(temp) = options.temperature {
            obj.insert("temperature".into(), serde_json::json!(temp));
        }
    }
    body
}

/// Outcome of parsing one SSE data payload.
#[derive(Debug, Clone, PartialEq)]
enum Chunk {
    /// Text fragments carried by the payload (possibly none), and whether
    /// any choice reported a `finish_reason`.
    Text { parts: Vec<String>, finished: bool },
    /// The payload reported an error.
    Failed(String),
}

/// Parse a streamed Chat Completions payload.
///
/// Unparseable payloads are skipped rather than failing the stream.
fn parse_completions_chunk(data: &str) -> Chunk {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) else {
        return Chunk::Text {
            parts: Vec::new(),
            finished: false,
        };
    };
    if let Some(error) = parsed.get("error") {
        return Chunk::Failed(describe_error(error));
    }
    let choices: &[serde_json::Value] = parsed
        .get("choices")
        .and_then(|c| c.as_array())
        .map_or(&[], Vec::as_slice);
    let finished = choices
        .iter()
        .any(|choice| choice.get("finish_reason").is_some_and(|r| !r.is_null()));
    let parts = choices
        .iter()
        .filter_map(|choice| {
            choice
                .get("delta")
                .or_else(|| choice.get("message"))
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
        })
        .filter(|text| !text.is_empty())
        .map(String::from)
        .collect();
    Chunk::Text { parts, finished }
}

/// Render an `{"code", "status", "message"}` error object as one line.
fn describe_error(error: &serde_json::Value) -> String {
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error");
    let status = error.get("status").and_then(|s| s.as_str());
    let code = error.get("code").map(|c| match c.as_str() {
        Some(s) => s.to_string(),
        None => c.to_string(),
    });
    match (code, status) {
        (Some(code), Some(status)) => format!("{code} {status}: {message}"),
        (Some(code), None) => format!("{code}: {message}"),
        (None, Some(status)) => format!("{status}: {message}"),
        (None, None) => message.to_string(),
    }
}

/// Extract an error description from an error response body.
///
/// Gemini wraps the error object in a one-element array; plain OpenAI
/// services do not.
fn extract_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let error = parsed.as_ref().and_then(|v| {
        v.get("error")
            .or_else(|| v.get(0).and_then(|first| first.get("error")))
    });
    match error {
        Some(error) => describe_error(error),
        None => body.trim().to_string(),
    }
}

/// Map an HTTP error status to the matching [`LlmError`].
fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => LlmError::AuthError(format!("authentication failed: {message}")),
        429 => LlmError::RateLimited(format!("HTTP 429: {message}")),
        code if message.contains("RESOURCE_EXHAUSTED") => {
            LlmError::RateLimited(format!("HTTP {code}: {message}"))
        }
        code => LlmError::ProviderError(format!("HTTP {code}: {message}")),
    }
}

fn map_transport_error(error: &reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::TimeoutError(format!("request timed out: {error}"))
    } else {
        LlmError::RequestError(format!("request failed: {error}"))
    }
}

/// Provider for OpenAI-compatible Chat Completions services.
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("base_url", &self.config.base_url)
            .field("request_timeout", &self.config.request_timeout)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a provider.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the API key is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::ConfigError("API key is not set".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ReplyProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<TokenStream, LlmError> {
        let body = build_completions_request(model, messages, options);
        tracing::debug!(model, messages = messages.len(), "sending completion request");

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        if options.stream {
            Ok(Box::pin(token_stream(response.bytes_stream())))
        } else {
            let text = response.text().await.map_err(|e| map_transport_error(&e))?;
            let item = match parse_completions_chunk(&text) {
                Chunk::Text { parts, .. } => Ok(parts.concat()),
                Chunk::Failed(message) => Err(LlmError::StreamError(message)),
            };
            Ok(Box::pin(futures_util::stream::iter(vec![item])))
        }
    }
}

struct StreamState {
    byte_stream: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    parser: SseLineParser,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
    /// Set by `[DONE]` or a `finish_reason`; a body that closes without it
    /// was cut short.
    completed: bool,
}

impl StreamState {
    /// Queue the items for one SSE payload. Returns `false` once the stream
    /// should stop reading.
    fn accept(&mut self, data: &str) -> bool {
        match parse_completions_chunk(data) {
            Chunk::Text { parts, finished } => {
                self.pending.extend(parts.into_iter().map(Ok));
                self.completed |= finished;
                true
            }
            Chunk::Failed(message) => {
                self.pending.push_back(Err(LlmError::StreamError(message)));
                false
            }
        }
    }
}

/// Turn an SSE byte stream into reply fragments.
///
/// The stream ends after `[DONE]`, after the body closes, or after the first
/// error item. A body that closes before `[DONE]` or a `finish_reason` ends
/// with a [`LlmError::StreamError`].
fn token_stream(
    byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    futures_util::stream::unfold(
        StreamState {
            byte_stream: Box::pin(byte_stream),
            parser: SseLineParser::new(),
            pending: VecDeque::new(),
            finished: false,
            completed: false,
        },
        |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }
                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        for event in state.parser.push(&chunk) {
                            if event.is_done() {
                                state.completed = true;
                                state.finished = true;
                                break;
                            }
                            if !state.accept(&event.data) {
                                state.finished = true;
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        let err = if e.is_timeout() {
                            LlmError::TimeoutError(format!("stream timed out: {e}"))
                        } else {
                            LlmError::StreamError(format!("stream read error: {e}"))
                        };
                        state.pending.push_back(Err(err));
                    }
                    None => {
                        state.finished = true;
                        let mut failed = false;
                        if let Some(event) = state.parser.flush() {
                            if event.is_done() {
                                state.completed = true;
                            } else {
                                failed = !state.accept(&event.data);
                            }
                        }
                        if !failed && !state.completed {
                            tracing::warn!("reply stream closed before completion");
                            state.pending.push_back(Err(LlmError::StreamError(
                                "stream ended before completion".into(),
                            )));
                        }
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn config_builders() {
        let config = OpenAiCompatConfig::new("k")
            .with_base_url("http://localhost:9/v1")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "http://localhost:9/v1");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn empty_api_key_is_config_error() {
        let err = OpenAiCompatProvider::new(OpenAiCompatConfig::new("  ")).unwrap_err();
        assert!(matches!(err, LlmError::ConfigError(_)));
    }

    #[test]
    fn url_ignores_trailing_slash() {
        let provider =
            OpenAiCompatProvider::new(OpenAiCompatConfig::new("k").with_base_url("http://h/v1/"))
                .unwrap();
        assert_eq!(provider.completions_url(), "http://h/v1/chat/completions");
    }

    #[test]
    fn request_body_includes_options() {
        let options = RequestOptions::new().with_max_tokens(400).with_temperature(0.8);
        let body = build_completions_request(
            "gemini-2.5-flash",
            &[Message::system("be kind"), Message::user("Hello")],
            &options,
        );
        assert_eq!(body["model"], "gemini-2.5-flash");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 400);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
    }

    #[test]
    fn request_body_omits_unset_options() {
        let body = build_completions_request("m", &[], &RequestOptions::new());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn parse_text_delta() {
        let chunk = parse_completions_chunk(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#);
        assert_eq!(
            chunk,
            Chunk::Text {
                parts: vec!["Hi".into()],
                finished: false
            }
        );
    }

    #[test]
    fn parse_skips_empty_and_role_only_deltas() {
        let chunk = parse_completions_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#);
        assert_eq!(
            chunk,
            Chunk::Text {
                parts: Vec::new(),
                finished: false
            }
        );
        let chunk = parse_completions_chunk(
            r#"{"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(
            chunk,
            Chunk::Text {
                parts: Vec::new(),
                finished: true
            }
        );
    }

    #[test]
    fn parse_invalid_json_is_skipped() {
        assert_eq!(
            parse_completions_chunk("not json"),
            Chunk::Text {
                parts: Vec::new(),
                finished: false
            }
        );
    }

    #[test]
    fn parse_error_payload() {
        let chunk = parse_completions_chunk(
            r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","message":"quota"}}"#,
        );
        assert_eq!(chunk, Chunk::Failed("429 RESOURCE_EXHAUSTED: quota".into()));
    }

    #[test]
    fn parse_non_streamed_message() {
        let chunk = parse_completions_chunk(
            r#"{"choices":[{"message":{"content":"whole reply"},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(
            chunk,
            Chunk::Text {
                parts: vec!["whole reply".into()],
                finished: true
            }
        );
    }

    #[test]
    fn parse_null_finish_reason_is_not_finished() {
        let chunk = parse_completions_chunk(
            r#"{"choices":[{"delta":{"content":"a"},"finish_reason":null}]}"#,
        );
        assert!(matches!(chunk, Chunk::Text { finished: false, .. }));
    }

    #[test]
    fn error_message_from_object_and_array_bodies() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(
            extract_error_message(r#"[{"error":{"code":429,"message":"slow"}}]"#),
            "429: slow"
        );
        assert_eq!(extract_error_message("plain text\n"), "plain text");
    }

    #[test]
    fn http_status_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            map_http_error(StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::UNAUTHORIZED, ""),
            LlmError::AuthError(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::FORBIDDEN, ""),
            LlmError::AuthError(_)
        ));
        assert!(matches!(
            map_http_error(
                StatusCode::SERVICE_UNAVAILABLE,
                r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"x"}}"#
            ),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            LlmError::ProviderError(_)
        ));
    }

    fn bytes_of(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
        let items: Vec<Result<Bytes, reqwest::Error>> =
            chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        futures_util::stream::iter(items)
    }

    #[tokio::test]
    async fn token_stream_yields_fragments_until_done() {
        let stream = token_stream(bytes_of(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]));
        let items: Vec<_> = stream.collect().await;
        let texts: Vec<String> = items.into_iter().map(|i| i.unwrap()).collect();
        assert_eq!(texts, vec!["Hi", " there"]);
    }

    #[tokio::test]
    async fn token_stream_stops_after_error_event() {
        let stream = token_stream(bytes_of(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"part\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"more\"}}]}\n\n",
        ]));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(LlmError::StreamError(_))));
    }

    #[tokio::test]
    async fn token_stream_flushes_unterminated_event() {
        let stream = token_stream(bytes_of(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"end\"},\"finish_reason\":\"stop\"}]}",
        ]));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "end");
    }

    #[tokio::test]
    async fn token_stream_accepts_finish_reason_without_done() {
        let stream = token_stream(bytes_of(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"All\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" set\"},\"finish_reason\":\"stop\"}]}\n\n",
        ]));
        let items: Vec<_> = stream.collect().await;
        let texts: Vec<String> = items.into_iter().map(|i| i.unwrap()).collect();
        assert_eq!(texts, vec!["All", " set"]);
    }

    #[tokio::test]
    async fn token_stream_cut_short_ends_with_error() {
        let stream = token_stream(bytes_of(&[
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"The answer is\"}}]}\n\n",
        ]));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "The answer is");
        match &items[1] {
            Err(LlmError::StreamError(message)) => {
                assert!(message.contains("before completion"));
            }
            other => panic!("expected stream error, got {other:?}"),
        }
    }
}
