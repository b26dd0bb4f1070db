//! OpenAI-Compatible Backend
//!
//! Streams chat completions from any server speaking the OpenAI
//! `/chat/completions` protocol.
//!
//! # Wire format
//!
//! With `"stream": true` the response body is an event stream:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Bytes are split into lines before UTF-8 decoding, so multi-byte
//! characters spanning two network chunks decode correctly.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::traits::{GenerationSource, PromptMessage, TokenStream};
use crate::error::GenerationError;

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest error body kept from a rejected request
const MAX_ERROR_BODY: usize = 512;

/// OpenAI-compatible streaming client
#[derive(Clone)]
pub struct OpenAiBackend {
    /// API root, without trailing slash
    base_url: String,
    /// Bearer token, if the server needs one
    api_key: Option<String>,
    /// Model identifier sent with each request
    model: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a backend
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            model: model.into(),
            http_client,
        })
    }

    /// Model identifier in use
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl GenerationSource for OpenAiBackend {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn health_check(&self) -> bool {
        self.authorized(self.http_client.get(self.models_url()))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<TokenStream, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .authorized(self.http_client.post(self.completions_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(GenerationError::Status { status, body });
        }

        let mut stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let mut decoder = ChunkDecoder::default();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(GenerationError::Stream(e.to_string()))).await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    let item = match event {
                        Ok(ChunkEvent::Delta(text)) => Ok(text),
                        Ok(ChunkEvent::Done) => return,
                        Err(e) => Err(e),
                    };
                    let failed = item.is_err();
                    // Receiver dropped, stop streaming
                    if tx.send(item).await.is_err() || failed {
                        return;
                    }
                }
            }

            // Body ended without the [DONE] marker; treat what arrived as complete
            if let Some(Ok(ChunkEvent::Delta(text))) = decoder.finish() {
                let _ = tx.send(Ok(text)).await;
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// One decoded line of a streaming response
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChunkEvent {
    Delta(String),
    Done,
}

/// Splits a streaming body into lines and decodes each `data:` line
#[derive(Debug, Default)]
pub(crate) struct ChunkDecoder {
    buffer: Vec<u8>,
}

impl ChunkDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<Result<ChunkEvent, GenerationError>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }

        events
    }

    /// Decode whatever is left once the body has ended
    pub(crate) fn finish(&mut self) -> Option<Result<ChunkEvent, GenerationError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&rest))
    }
}

fn decode_line(line: &str) -> Option<Result<ChunkEvent, GenerationError>> {
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim_start();

    if data == "[DONE]" {
        return Some(Ok(ChunkEvent::Done));
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => return Some(Err(GenerationError::Decode(e.to_string()))),
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Some(Err(GenerationError::Stream(message)));
    }

    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(|text| Ok(ChunkEvent::Delta(text.to_string())))
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}
