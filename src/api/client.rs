use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::stream::ChatStreamParser;
use super::{CompletionSource, IncrementStream};
use crate::config::Config;
use crate::error::StreamError;
use crate::types::{ApiMessage, CompletionRequest, Increment};
use crate::util::is_local_endpoint_url;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};

/// Streaming client for OpenAI-compatible chat completion endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    request_url: String,
    max_tokens: Option<u32>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            request_url: adapt_to_chat_completions_url(&config.api_url),
            max_tokens: config.max_tokens,
        }
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "stream": true,
            "stream_options": { "include_usage": true },
            "messages": [
                ApiMessage::system(request.system_prompt.as_str()),
                ApiMessage::user(request.user_text.as_str()),
            ],
        });
        if let (Some(max_tokens), Some(object)) = (self.max_tokens, payload.as_object_mut()) {
            object.insert("max_tokens".to_string(), json!(max_tokens));
        }
        payload
    }
}

#[async_trait]
impl CompletionSource for ApiClient {
    async fn open_stream(&self, request: &CompletionRequest) -> Result<IncrementStream, StreamError> {
        let payload = self.payload(request);
        if debug_payload_enabled() {
            emit_debug_payload(&self.request_url, &payload);
        }

        let mut builder = self
            .http
            .post(&self.request_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {api_key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|error| StreamError::UpstreamOpen(describe_request_error(&error, &self.request_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::UpstreamOpen(format!(
                "API endpoint '{}' returned HTTP {}: {}",
                self.request_url,
                status,
                body.trim()
            )));
        }

        let request_url = self.request_url.clone();
        let bytes = response.bytes_stream().map(move |item| {
            item.map_err(|error| {
                StreamError::UpstreamRead(describe_request_error(&error, &request_url))
            })
        });
        Ok(increments_from_bytes(bytes))
    }
}

/// Feed a byte stream through the SSE parser, yielding one item per frame.
/// Reading stops after `[DONE]` or the first error; a trailing frame without
/// its blank line is parsed when the bytes run out.
pub fn increments_from_bytes<S>(bytes: S) -> IncrementStream
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
{
    let state = (Box::pin(bytes), ChatStreamParser::new(), false);
    let batches = stream::unfold(state, |(mut bytes, mut parser, ended)| async move {
        if ended || parser.is_finished() {
            return None;
        }
        let (batch, ended) = match bytes.next().await {
            Some(Ok(chunk)) => {
                let batch = parser.process(&chunk);
                let failed = batch.is_err();
                (batch, failed)
            }
            Some(Err(error)) => (Err(error), true),
            None => (parser.finish(), true),
        };
        Some((batch_items(batch), (bytes, parser, ended)))
    });
    Box::pin(batches.flat_map(stream::iter))
}

fn batch_items(batch: Result<Vec<Increment>, StreamError>) -> Vec<Result<Increment, StreamError>> {
    match batch {
        Ok(increments) => increments.into_iter().map(Ok).collect(),
        Err(error) => vec![Err(error)],
    }
}

fn describe_request_error(error: &reqwest::Error, request_url: &str) -> String {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return format!(
            "cannot reach local API endpoint '{request_url}': {error}. Start your local server or update DEEPSEEK_BASE_URL."
        );
    }
    if error.is_connect() {
        return format!("cannot reach API endpoint '{request_url}': {error}");
    }
    if error.is_timeout() {
        return format!("API request to '{request_url}' timed out: {error}");
    }
    if let Some(status) = error.status() {
        return format!("API endpoint '{request_url}' returned HTTP {status}: {error}");
    }
    format!("API request to '{request_url}' failed: {error}")
}

fn adapt_to_chat_completions_url(api_url: &str) -> String {
    let normalized = api_url.trim().trim_end_matches('/');
    if normalized.ends_with("/chat/completions") {
        normalized.to_string()
    } else {
        format!("{normalized}/chat/completions")
    }
}
