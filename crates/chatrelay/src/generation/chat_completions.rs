//! Streaming generator for OpenAI-compatible chat-completions APIs
//!
//! Works with any endpoint that accepts `POST {api_url}/chat/completions`
//! with `stream: true` and answers with SSE chunks, such as the Hugging Face
//! router or a local inference server.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::sse::{SseDecoder, SseEvent};
use super::{FragmentStream, GenerationError, GenerationParams, Generator, StreamFragment};
use crate::chat::Conversation;
use crate::config::GeneratorConfig;
use crate::error::{RelayError, Result};

/// Chat-completions client producing a fragment stream
#[derive(Debug)]
pub struct ChatCompletionsGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

/// OpenAI-compatible streaming chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a Conversation,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

impl ChatCompletionsGenerator {
    /// Create a generator, reading the API key from `config.api_key_env`.
    ///
    /// A missing key is not fatal: requests go out unauthenticated and the
    /// upstream rejection is reported per request.
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                "API key env var '{}' not set, generation requests will be unauthenticated",
                config.api_key_env
            );
        }
        Self::with_api_key(config, api_key)
    }

    /// Create a generator with an explicit API key
    pub fn with_api_key(config: &GeneratorConfig, api_key: Option<String>) -> Result<Self> {
        // Only the connection is time-limited; the stream may run as long as
        // max_tokens allows.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Generator(format!("Failed to create HTTP client: {e}")))?;

        let endpoint = format!("{}/chat/completions", config.api_url.trim_end_matches('/'));

        info!(
            "ChatCompletionsGenerator initialized with model: {}, endpoint: {}",
            config.model, endpoint
        );

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(
        &self,
        conversation: &Conversation,
        params: &GenerationParams,
    ) -> std::result::Result<FragmentStream, GenerationError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: conversation,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: true,
        };

        debug!(
            "Calling chat completions at: {} ({} turns)",
            self.endpoint,
            conversation.len()
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Accept", "text/event-stream")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Request(format!("Request timed out: {e}"))
            } else if e.is_connect() {
                GenerationError::Request(format!("Failed to connect to model API: {e}"))
            } else {
                GenerationError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let mut body = Box::pin(response.bytes_stream());
        let fragments = async_stream::stream! {
            let mut decoder = SseDecoder::new();

            loop {
                let chunk = match body.next().await {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        yield Err(GenerationError::Stream(e.to_string()));
                        return;
                    }
                    None => break,
                };

                for event in decoder.push(&chunk) {
                    match event {
                        SseEvent::Done => return,
                        SseEvent::Data(data) => {
                            let fragment = parse_chunk(&data);
                            let failed = fragment.is_err();
                            yield fragment;
                            if failed {
                                return;
                            }
                        }
                    }
                }
            }

            debug!("Model stream ended without [DONE]");
            for event in decoder.finish() {
                if let SseEvent::Data(data) = event {
                    let fragment = parse_chunk(&data);
                    let failed = fragment.is_err();
                    yield fragment;
                    if failed {
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }

    fn name(&self) -> &'static str {
        "chat-completions"
    }
}

/// Decode one SSE data payload into a fragment.
///
/// Chunks without `choices[0].delta.content` (role announcements, finish
/// markers) become empty fragments. An `error` payload fails the stream.
fn parse_chunk(data: &str) -> std::result::Result<StreamFragment, GenerationError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| GenerationError::Malformed(format!("{e}: {data}")))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(GenerationError::Upstream(message));
    }

    let content = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(StreamFragment::new(content))
}
