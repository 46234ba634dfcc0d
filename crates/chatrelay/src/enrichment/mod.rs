//! Best-effort web enrichment
//!
//! The trigger inspects the latest user turn for configured terms and, on a
//! match, asks a [`Fetcher`] for search results. Fetch failures never leave
//! this module: they are logged and turned into an empty result so the chat
//! reply proceeds unaffected.

mod search;
mod trigger;

pub use search::{SearchPageFetcher, parse_search_results};
pub use trigger::{EnrichmentTrigger, TriggerVocabulary};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard upper bound on records attached to one reply
pub const MAX_ENRICHMENT_RECORDS: usize = 5;

/// One search result attached to a reply
///
/// Every field is present; elements missing from the source page are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
}

impl EnrichmentRecord {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            link: link.into(),
        }
    }
}

/// Why an enrichment came back empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Enrichment disabled or no trigger term matched
    NotTriggered,
    /// The fetcher succeeded but found nothing
    NoResults,
    /// The fetcher failed; the failure was logged and swallowed
    FetchFailed,
}

/// Outcome of the enrichment step; there is no failure variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// At least one record, capped at [`MAX_ENRICHMENT_RECORDS`], fetcher order
    Found(Vec<EnrichmentRecord>),
    Empty(EmptyReason),
}

impl Enrichment {
    pub fn records(&self) -> &[EnrichmentRecord] {
        match self {
            Enrichment::Found(records) => records,
            Enrichment::Empty(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Take the records, `None` when there is nothing to attach
    pub fn into_payload(self) -> Option<Vec<EnrichmentRecord>> {
        match self {
            Enrichment::Found(records) if !records.is_empty() => Some(records),
            _ => None,
        }
    }
}

/// Fetcher-specific errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure (connect, timeout, body read)
    #[error("Request failed: {0}")]
    Request(String),

    /// Search page answered with a non-success status
    #[error("Search page returned {0}")]
    Status(u16),

    /// Page could not be parsed into records
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Source of enrichment records for a free-text query
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch records relevant to `query`, most relevant first
    async fn fetch(&self, query: &str) -> Result<Vec<EnrichmentRecord>, FetchError>;

    /// Fetcher name for logging
    fn name(&self) -> &'static str;
}
