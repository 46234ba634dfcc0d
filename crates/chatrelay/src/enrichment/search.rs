//! Search-page fetcher
//!
//! Loads a results page for the query and extracts the top result blocks
//! with CSS selectors. Missing elements become empty fields.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use super::{EnrichmentRecord, FetchError, Fetcher, MAX_ENRICHMENT_RECORDS};
use crate::config::EnrichmentConfig;
use crate::error::{RelayError, Result};

const RESULT_SELECTOR: &str = ".g";
const TITLE_SELECTOR: &str = "h3";
const DESCRIPTION_SELECTOR: &str = ".VwiC3b";
const LINK_SELECTOR: &str = "a[href]";

/// Fetches records by scraping a search results page
#[derive(Debug)]
pub struct SearchPageFetcher {
    client: Client,
    search_url: String,
    limit: usize,
}

impl SearchPageFetcher {
    /// Create a fetcher with its own HTTP client and timeout
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        Url::parse(&config.search_url).map_err(|e| {
            RelayError::Config(format!("Invalid search_url '{}': {e}", config.search_url))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RelayError::Fetcher(format!("Failed to create HTTP client: {e}")))?;

        info!(
            "SearchPageFetcher initialized with search_url: {}",
            config.search_url
        );

        Ok(Self {
            client,
            search_url: config.search_url.clone(),
            limit: config.result_limit(),
        })
    }

    fn query_url(&self, query: &str) -> String {
        let separator = if self.search_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}q={}",
            self.search_url,
            separator,
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl Fetcher for SearchPageFetcher {
    async fn fetch(&self, query: &str) -> std::result::Result<Vec<EnrichmentRecord>, FetchError> {
        let url = self.query_url(query);
        debug!("Fetching search page: {url}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Request(format!("Search page timed out: {e}"))
            } else {
                FetchError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // Relative links resolve against the final URL after redirects.
        let page_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Request(format!("Failed to read search page: {e}")))?;

        parse_search_results(&html, Some(&page_url), self.limit)
    }

    fn name(&self) -> &'static str {
        "search-page"
    }
}

/// Extract up to `limit` records from a results page, in page order.
///
/// Each `.g` block yields its `h3` text as title, its `.VwiC3b` text as
/// description and its first link, resolved against `base_url`.
pub fn parse_search_results(
    html: &str,
    base_url: Option<&Url>,
    limit: usize,
) -> std::result::Result<Vec<EnrichmentRecord>, FetchError> {
    let limit = limit.min(MAX_ENRICHMENT_RECORDS);
    if limit == 0 {
        return Ok(Vec::new());
    }

    let result_sel = selector(RESULT_SELECTOR)?;
    let title_sel = selector(TITLE_SELECTOR)?;
    let description_sel = selector(DESCRIPTION_SELECTOR)?;
    let link_sel = selector(LINK_SELECTOR)?;

    let doc = Html::parse_document(html);
    let records = doc
        .select(&result_sel)
        .take(limit)
        .map(|block| EnrichmentRecord {
            title: first_text(&block, &title_sel),
            description: first_text(&block, &description_sel),
            link: first_link(&block, &link_sel, base_url),
        })
        .collect();

    Ok(records)
}

fn selector(css: &str) -> std::result::Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("Bad selector '{css}': {e}")))
}

fn first_text(block: &ElementRef<'_>, sel: &Selector) -> String {
    block
        .select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn first_link(block: &ElementRef<'_>, sel: &Selector, base_url: Option<&Url>) -> String {
    let Some(href) = block
        .select(sel)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::trim)
    else {
        return String::new();
    };

    match (Url::parse(href), base_url) {
        (Ok(abs), _) => abs.to_string(),
        (Err(_), Some(base)) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        (Err(_), None) => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="g">
            <a href="https://weather.example.com/today"><h3>Today's forecast</h3></a>
            <div class="VwiC3b">Sunny with a high of 24.</div>
          </div>
          <div class="g">
            <a href="/url?q=https://news.example.org/"><h3>Local news</h3></a>
          </div>
          <div class="g">
            <div class="VwiC3b">No title or link here</div>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_extracts_fields_in_page_order() {
        let base = Url::parse("https://www.google.com/search?q=weather").unwrap();
        let records = parse_search_results(PAGE, Some(&base), 5).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].title, "Today's forecast");
        assert_eq!(records[0].description, "Sunny with a high of 24.");
        assert_eq!(records[0].link, "https://weather.example.com/today");
        assert_eq!(records[1].title, "Local news");
        assert_eq!(records[1].description, "");
        assert_eq!(
            records[1].link,
            "https://www.google.com/url?q=https://news.example.org/"
        );
    }

    #[test]
    fn test_missing_elements_are_empty_strings() {
        let records = parse_search_results(PAGE, None, 5).unwrap();
        assert_eq!(records[2].title, "");
        assert_eq!(records[2].link, "");
        assert_eq!(records[2].description, "No title or link here");
    }

    #[test]
    fn test_relative_link_without_base_is_kept_verbatim() {
        let records = parse_search_results(PAGE, None, 5).unwrap();
        assert_eq!(records[1].link, "/url?q=https://news.example.org/");
    }

    #[test]
    fn test_limit_is_respected() {
        let block = r#"<div class="g"><h3>t</h3></div>"#;
        let html = block.repeat(12);
        assert_eq!(parse_search_results(&html, None, 2).unwrap().len(), 2);
        assert_eq!(
            parse_search_results(&html, None, 50).unwrap().len(),
            MAX_ENRICHMENT_RECORDS
        );
        assert!(parse_search_results(&html, None, 0).unwrap().is_empty());
    }

    #[test]
    fn test_page_without_results() {
        let records = parse_search_results("<html><p>captcha</p></html>", None, 5).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_query_url_encodes_query() {
        let fetcher = SearchPageFetcher::new(&EnrichmentConfig {
            search_url: "https://search.example.com/find".to_string(),
            ..EnrichmentConfig::default()
        })
        .unwrap();

        assert_eq!(
            fetcher.query_url("weather & news"),
            "https://search.example.com/find?q=weather%20%26%20news"
        );
    }

    #[test]
    fn test_invalid_search_url_rejected() {
        let result = SearchPageFetcher::new(&EnrichmentConfig {
            search_url: "not a url".to_string(),
            ..EnrichmentConfig::default()
        });
        assert!(result.is_err());
    }
}
