//! Trigger-term matching and the fail-open enrichment step

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{EmptyReason, Enrichment, Fetcher, MAX_ENRICHMENT_RECORDS};
use crate::chat::Conversation;
use crate::config::EnrichmentConfig;

/// Fixed set of lowercase terms that cause a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerVocabulary {
    terms: Vec<String>,
}

impl TriggerVocabulary {
    /// Build a vocabulary; blank terms are dropped since they would match everything
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    /// First term found in `subject`, compared case-insensitively as a substring
    pub fn find_match(&self, subject: &str) -> Option<&str> {
        if subject.is_empty() {
            return None;
        }
        let subject = subject.to_lowercase();
        self.terms
            .iter()
            .find(|term| subject.contains(term.as_str()))
            .map(String::as_str)
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl Default for TriggerVocabulary {
    fn default() -> Self {
        Self::new(EnrichmentConfig::default().trigger_terms)
    }
}

/// Decides whether a conversation gets enriched and runs the fetch
#[derive(Clone)]
pub struct EnrichmentTrigger {
    fetcher: Arc<dyn Fetcher>,
    vocabulary: TriggerVocabulary,
    limit: usize,
    enabled: bool,
}

impl EnrichmentTrigger {
    pub fn new(fetcher: Arc<dyn Fetcher>, vocabulary: TriggerVocabulary) -> Self {
        Self {
            fetcher,
            vocabulary,
            limit: MAX_ENRICHMENT_RECORDS,
            enabled: true,
        }
    }

    pub fn from_config(fetcher: Arc<dyn Fetcher>, config: &EnrichmentConfig) -> Self {
        Self {
            fetcher,
            vocabulary: TriggerVocabulary::new(&config.trigger_terms),
            limit: config.result_limit(),
            enabled: config.enabled,
        }
    }

    /// Cap on returned records (never above [`MAX_ENRICHMENT_RECORDS`])
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_ENRICHMENT_RECORDS);
        self
    }

    pub fn vocabulary(&self) -> &TriggerVocabulary {
        &self.vocabulary
    }

    /// Enrich the conversation if its latest user turn mentions a trigger term.
    ///
    /// Makes at most one fetch and never fails: fetch errors are logged and
    /// reported as [`EmptyReason::FetchFailed`].
    pub async fn maybe_enrich(&self, conversation: &Conversation) -> Enrichment {
        let subject = conversation
            .latest_user_turn()
            .map(|turn| turn.content.as_str())
            .unwrap_or("");

        if !self.enabled {
            return Enrichment::Empty(EmptyReason::NotTriggered);
        }

        let Some(term) = self.vocabulary.find_match(subject) else {
            debug!("No trigger term in latest user turn, skipping enrichment");
            return Enrichment::Empty(EmptyReason::NotTriggered);
        };

        info!(
            trigger = term,
            fetcher = self.fetcher.name(),
            "Trigger term matched, fetching web results"
        );

        match self.fetcher.fetch(subject).await {
            Ok(mut records) => {
                records.truncate(self.limit);
                if records.is_empty() {
                    debug!("Fetcher returned no records");
                    Enrichment::Empty(EmptyReason::NoResults)
                } else {
                    debug!("Fetched {} enrichment records", records.len());
                    Enrichment::Found(records)
                }
            }
            Err(e) => {
                warn!(
                    error_type = "enrichment",
                    error_message = %e,
                    "Enrichment fetch failed, continuing without web results"
                );
                Enrichment::Empty(EmptyReason::FetchFailed)
            }
        }
    }
}
