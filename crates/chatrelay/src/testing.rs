//! Test utilities for chatrelay - scripted collaborators
//!
//! Deterministic stand-ins for the fetcher and the generator so the relay can
//! be exercised without network access:
//! - [`StaticFetcher`] / [`FailingFetcher`] count calls and record queries
//! - [`ScriptedGenerator`] replays fragments and failures, and reports when
//!   its stream has been released

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::chat::Conversation;
use crate::enrichment::{EnrichmentRecord, FetchError, Fetcher};
use crate::generation::{
    FragmentStream, GenerationError, GenerationParams, Generator, StreamFragment,
};

/// Fetcher returning a fixed list of records
#[derive(Debug, Default)]
pub struct StaticFetcher {
    records: Vec<EnrichmentRecord>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new(records: Vec<EnrichmentRecord>) -> Self {
        Self {
            records,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Number of fetches performed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries received, in call order
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, query: &str) -> Result<Vec<EnrichmentRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        Ok(self.records.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Fetcher that always fails
#[derive(Debug)]
pub struct FailingFetcher {
    message: String,
    calls: AtomicUsize,
}

impl FailingFetcher {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(&self, _query: &str) -> Result<Vec<EnrichmentRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Request(self.message.clone()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// One step of a scripted generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Yield a fragment with this text (may be empty)
    Fragment(String),
    /// Fail the stream with this message
    Fail(String),
}

/// Generator replaying a fixed script
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    steps: Vec<ScriptStep>,
    reject: Option<String>,
    hold_open: bool,
    calls: AtomicUsize,
    released: Arc<AtomicBool>,
    conversations: Mutex<Vec<Conversation>>,
}

impl ScriptedGenerator {
    /// Generator yielding each text as a fragment, then ending
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_steps(
            fragments
                .into_iter()
                .map(|f| ScriptStep::Fragment(f.into()))
                .collect(),
        )
    }

    pub fn from_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Generator whose stream never starts
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject: Some(message.into()),
            ..Self::default()
        }
    }

    /// Keep the stream pending after the script instead of ending it
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Number of generate calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether the last started stream has been dropped or ran to completion
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Conversation passed to the most recent generate call
    pub fn last_conversation(&self) -> Option<Conversation> {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        conversation: &Conversation,
        _params: &GenerationParams,
    ) -> Result<FragmentStream, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(conversation.clone());

        if let Some(message) = &self.reject {
            return Err(GenerationError::Rejected {
                status: 503,
                body: message.clone(),
            });
        }

        self.released.store(false, Ordering::SeqCst);
        let guard = ReleaseGuard(Arc::clone(&self.released));
        let steps = self.steps.clone();
        let hold_open = self.hold_open;

        let stream = async_stream::stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    ScriptStep::Fragment(text) => yield Ok(StreamFragment::new(text)),
                    ScriptStep::Fail(message) => yield Err(GenerationError::Stream(message)),
                }
            }
            if hold_open {
                futures::future::pending::<()>().await;
            }
        };

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn scripted_generator_replays_steps() {
        let generator = ScriptedGenerator::from_steps(vec![
            ScriptStep::Fragment("a".to_string()),
            ScriptStep::Fail("boom".to_string()),
        ]);
        let conversation = Conversation::default();

        let mut stream = generator
            .generate(&conversation, &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().content, "a");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(generator.released());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn scripted_generator_release_on_drop() {
        let generator = ScriptedGenerator::new(["a"]).hold_open();
        let conversation = Conversation::default();

        let mut stream = generator
            .generate(&conversation, &GenerationParams::default())
            .await
            .unwrap();
        assert!(stream.next().await.is_some());
        assert!(!generator.released());

        drop(stream);
        assert!(generator.released());
    }

    #[tokio::test]
    async fn rejecting_generator_never_streams() {
        let generator = ScriptedGenerator::rejecting("overloaded");
        let result = generator
            .generate(&Conversation::default(), &GenerationParams::default())
            .await;
        assert!(matches!(result, Err(GenerationError::Rejected { status: 503, .. })));
    }

    #[tokio::test]
    async fn static_fetcher_records_queries() {
        let fetcher = StaticFetcher::new(vec![EnrichmentRecord::default()]);
        let records = fetcher.fetch("news").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(fetcher.queries(), vec!["news".to_string()]);
    }
}
