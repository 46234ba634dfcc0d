//! Stream composition: one request, one ordered event stream
//!
//! The composer merges the enrichment result (ready before streaming) with
//! the generator's fragments (arriving over time) into `data:` frames:
//!
//! ```text
//! data: {"content":"It","scrapedData":[...]}
//!
//! data: {"content":" is sunny"}
//!
//! data: [DONE]
//! ```
//!
//! Headers are committed before the generator is called, so any generator
//! failure is reported as an inline `{"error": ...}` frame. Every stream ends
//! with exactly one `[DONE]` frame unless the client goes away first.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tracing::{Instrument, Span, debug, error, info};

use super::error::ApiError;
use crate::chat::Conversation;
use crate::enrichment::{Enrichment, EnrichmentRecord};
use crate::generation::{FragmentStream, GenerationParams, Generator};

/// Terminal frame closing every stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Message carried by inline error frames
pub const GENERATION_FAILED_MESSAGE: &str = "Chat completion failed";

const FALLBACK_ERROR_FRAME: &str = "data: {\"error\":\"Chat completion failed\"}\n\n";

/// One event written to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Generated text, with the enrichment payload on the first one only
    Content {
        content: String,
        scraped_data: Option<Vec<EnrichmentRecord>>,
    },
    /// In-band failure report
    Error { error: String },
    /// Terminal marker
    Done,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePayload<'a> {
    Content {
        content: &'a str,
        #[serde(rename = "scrapedData", skip_serializing_if = "Option::is_none")]
        scraped_data: Option<&'a [EnrichmentRecord]>,
    },
    Error {
        error: &'a str,
    },
}

impl OutboundEvent {
    fn generation_failed() -> Self {
        OutboundEvent::Error {
            error: GENERATION_FAILED_MESSAGE.to_string(),
        }
    }

    /// Encode as a complete SSE frame
    pub fn to_frame(&self) -> Bytes {
        let payload = match self {
            OutboundEvent::Done => return Bytes::from_static(DONE_FRAME.as_bytes()),
            OutboundEvent::Content {
                content,
                scraped_data,
            } => WirePayload::Content {
                content,
                scraped_data: scraped_data.as_deref(),
            },
            OutboundEvent::Error { error } => WirePayload::Error { error },
        };

        match serde_json::to_string(&payload) {
            Ok(json) => Bytes::from(format!("data: {json}\n\n")),
            Err(e) => {
                error!("Failed to encode outbound event: {e}");
                Bytes::from_static(FALLBACK_ERROR_FRAME.as_bytes())
            }
        }
    }
}

/// Builds the streaming response for a validated, enriched conversation
#[derive(Clone)]
pub struct StreamComposer {
    generator: Arc<dyn Generator>,
    params: GenerationParams,
}

impl StreamComposer {
    pub fn new(generator: Arc<dyn Generator>, params: GenerationParams) -> Self {
        Self { generator, params }
    }

    /// Commit the event-stream headers and hand the body to the composer.
    ///
    /// This is the last point where a plain error response is possible.
    pub fn respond(
        self,
        conversation: Conversation,
        enrichment: Enrichment,
        span: Span,
    ) -> Result<Response, ApiError> {
        let frames = self
            .into_events(conversation, enrichment, span)
            .map(|event| Ok::<_, Infallible>(event.to_frame()));

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(frames))
            .map_err(|e| ApiError::Internal(format!("Failed to build stream response: {e}")))
    }

    /// The ordered event sequence for one request.
    ///
    /// Nothing happens until the stream is first polled; dropping it releases
    /// the generator stream.
    pub fn into_events(
        self,
        conversation: Conversation,
        enrichment: Enrichment,
        span: Span,
    ) -> impl Stream<Item = OutboundEvent> + Send + 'static {
        let composition = Composition {
            phase: Phase::AwaitingGenerator { conversation },
            generator: self.generator,
            params: self.params,
            pending_enrichment: enrichment.into_payload(),
            forwarded: 0,
            finished: false,
            span,
        };

        stream::unfold(composition, |mut composition| {
            let span = composition.span.clone();
            async move {
                let event = composition.next_event().await?;
                Some((event, composition))
            }
            .instrument(span)
        })
    }
}

enum Phase {
    AwaitingGenerator { conversation: Conversation },
    Streaming { fragments: FragmentStream },
    /// An error frame went out; only the terminal marker remains
    Terminating,
    Closed,
}

/// Per-request composer state
struct Composition {
    phase: Phase,
    generator: Arc<dyn Generator>,
    params: GenerationParams,
    /// Taken by the first content event
    pending_enrichment: Option<Vec<EnrichmentRecord>>,
    forwarded: usize,
    finished: bool,
    span: Span,
}

impl Composition {
    async fn next_event(&mut self) -> Option<OutboundEvent> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Closed) {
                Phase::AwaitingGenerator { conversation } => {
                    match self.generator.generate(&conversation, &self.params).await {
                        Ok(fragments) => {
                            debug!(generator = self.generator.name(), "Generation started");
                            self.phase = Phase::Streaming { fragments };
                        }
                        Err(e) => {
                            error!(
                                error_type = "generation_start",
                                error_message = %e,
                                "Chat completion failed to start"
                            );
                            self.phase = Phase::Terminating;
                            return Some(OutboundEvent::generation_failed());
                        }
                    }
                }
                Phase::Streaming { mut fragments } => {
                    let next = fragments.next().await;
                    match next {
                        Some(Ok(fragment)) => {
                            self.phase = Phase::Streaming { fragments };
                            if fragment.is_empty() {
                                continue;
                            }
                            self.forwarded += 1;
                            return Some(OutboundEvent::Content {
                                content: fragment.content,
                                scraped_data: self.pending_enrichment.take(),
                            });
                        }
                        Some(Err(e)) => {
                            error!(
                                error_type = "generation_stream",
                                error_message = %e,
                                forwarded = self.forwarded,
                                "Chat completion failed mid-stream"
                            );
                            drop(fragments);
                            self.phase = Phase::Terminating;
                            return Some(OutboundEvent::generation_failed());
                        }
                        None => {
                            if self.pending_enrichment.is_some() {
                                debug!("Generator produced no text, enrichment not delivered");
                            }
                            return Some(self.finish());
                        }
                    }
                }
                Phase::Terminating => return Some(self.finish()),
                Phase::Closed => return None,
            }
        }
    }

    fn finish(&mut self) -> OutboundEvent {
        self.phase = Phase::Closed;
        self.finished = true;
        debug!(forwarded = self.forwarded, "Stream complete");
        OutboundEvent::Done
    }
}

impl Drop for Composition {
    fn drop(&mut self) {
        if !self.finished {
            let _enter = self.span.enter();
            info!(
                forwarded = self.forwarded,
                "Client disconnected before end of stream, generation abandoned"
            );
        }
    }
}
