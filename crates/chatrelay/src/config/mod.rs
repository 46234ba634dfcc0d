use std::path::Path;

use serde::Deserialize;

use crate::enrichment::MAX_ENRICHMENT_RECORDS;
use crate::error::{RelayError, Result};

/// Main configuration structure for chatrelay
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote text-generation model configuration
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Web enrichment configuration
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

impl Config {
    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply environment overrides on top of the file configuration.
    ///
    /// `PORT` replaces the port of `server.listen_addr`, keeping its host.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            self.server.set_port(&port);
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:3000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Replace the port portion of `listen_addr`
    ///
    /// Values that are not a valid port number are ignored with a warning.
    pub fn set_port(&mut self, port: &str) {
        let port = match port.trim().parse::<u16>() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Ignoring invalid PORT value '{port}': {e}");
                return;
            }
        };

        let host = match self.listen_addr.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => self.listen_addr.clone(),
        };
        self.listen_addr = format!("{host}:{port}");
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    100 * 1024
}

/// Remote chat-completions model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_generator_api_url")]
    pub api_url: String,
    /// Model identifier sent with every request
    #[serde(default = "default_generator_model")]
    pub model: String,
    /// Environment variable name for the API key
    #[serde(default = "default_generator_api_key_env")]
    pub api_key_env: String,
    /// Sampling temperature
    #[serde(default = "default_generator_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate per reply
    #[serde(default = "default_generator_max_tokens")]
    pub max_tokens: u32,
    /// Connect timeout in seconds (the stream itself is not time-limited)
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: default_generator_api_url(),
            model: default_generator_model(),
            api_key_env: default_generator_api_key_env(),
            temperature: default_generator_temperature(),
            max_tokens: default_generator_max_tokens(),
            timeout_secs: default_generator_timeout_secs(),
        }
    }
}

fn default_generator_api_url() -> String {
    "https://router.huggingface.co/v1".to_string()
}

fn default_generator_model() -> String {
    "mistralai/Mistral-Nemo-Instruct-2407".to_string()
}

fn default_generator_api_key_env() -> String {
    "HUGGINGFACE_TOKEN".to_string()
}

fn default_generator_temperature() -> f32 {
    0.7
}

fn default_generator_max_tokens() -> u32 {
    500
}

fn default_generator_timeout_secs() -> u64 {
    30
}

/// Web enrichment configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    /// Enable web enrichment
    #[serde(default = "default_enrichment_enabled")]
    pub enabled: bool,
    /// Terms that trigger a web lookup when found in the latest user turn
    #[serde(default = "default_trigger_terms")]
    pub trigger_terms: Vec<String>,
    /// Search page queried with `?q=<query>`
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Maximum records attached to a reply (clamped to 5)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Fetch timeout in seconds
    #[serde(default = "default_enrichment_timeout_secs")]
    pub timeout_secs: u64,
    /// User agent sent with search page requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl EnrichmentConfig {
    /// Record limit after clamping to the hard upper bound
    pub fn result_limit(&self) -> usize {
        self.max_results.min(MAX_ENRICHMENT_RECORDS)
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enrichment_enabled(),
            trigger_terms: default_trigger_terms(),
            search_url: default_search_url(),
            max_results: default_max_results(),
            timeout_secs: default_enrichment_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_enrichment_enabled() -> bool {
    true
}

fn default_trigger_terms() -> Vec<String> {
    ["news", "weather", "review", "price", "comparison"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

fn default_search_url() -> String {
    "https://www.google.com/search".to_string()
}

fn default_max_results() -> usize {
    MAX_ENRICHMENT_RECORDS
}

fn default_enrichment_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .to_string()
}
