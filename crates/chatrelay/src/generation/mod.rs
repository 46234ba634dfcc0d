//! Text generation collaborators
//!
//! A [`Generator`] turns a conversation into a live, finite stream of text
//! fragments. Starting the stream and reading from it fail separately so the
//! relay can report both in-band once response headers are committed.

mod chat_completions;
mod sse;

pub use chat_completions::ChatCompletionsGenerator;
pub use sse::{SseDecoder, SseEvent};

use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;
use thiserror::Error;

use crate::chat::Conversation;
use crate::config::GeneratorConfig;

/// One incremental unit of generated text; may be empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFragment {
    pub content: String,
}

impl StreamFragment {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Fixed sampling parameters applied to every request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from_config(&GeneratorConfig::default())
    }
}

/// Generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request never reached the model (connect, TLS, timeout)
    #[error("Request failed: {0}")]
    Request(String),

    /// The model API refused the request
    #[error("API returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The stream broke after it started
    #[error("Stream error: {0}")]
    Stream(String),

    /// The model API sent an error payload inside the stream
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A stream chunk could not be decoded
    #[error("Malformed chunk: {0}")]
    Malformed(String),
}

/// Live fragment sequence; finite and not restartable
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<StreamFragment, GenerationError>> + Send + 'static>>;

/// Source of streamed model output
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start generating a reply to `conversation`.
    ///
    /// An `Err` here means the stream never started. Errors yielded by the
    /// returned stream mean it broke part-way.
    async fn generate(
        &self,
        conversation: &Conversation,
        params: &GenerationParams,
    ) -> Result<FragmentStream, GenerationError>;

    /// Generator name for logging
    fn name(&self) -> &'static str;
}
