//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.article-lens.toml` files.

use crate::cli::{Args, Command};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".article-lens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Fan-out settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Providers to query.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Ids passed to `--providers` that match no configured provider.
    #[serde(skip)]
    unknown_providers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            analysis: AnalysisConfig::default(),
            providers: default_providers(),
            unknown_providers: Vec::new(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_min_article_chars() -> usize {
    50
}

/// Per-request fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Timeout for each provider call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Retries on rate limiting or transport errors.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay between retries, doubled on each attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Minimum article length, in characters after trimming.
    #[serde(default = "default_min_article_chars")]
    pub min_article_chars: usize,

    /// Provider id asked to merge the successful analyses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            min_article_chars: default_min_article_chars(),
            synthesizer: None,
        }
    }
}

impl AnalysisConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Perplexity,
    Anthropic,
}

impl ProviderKind {
    /// Base URL used when the config does not set one.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Perplexity => "https://api.perplexity.ai",
            ProviderKind::Anthropic => "https://api.anthropic.com",
        }
    }
}

/// One hosted LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique identifier used as the report key.
    pub id: String,

    /// API flavour.
    pub kind: ProviderKind,

    /// Model name sent with each request.
    pub model: String,

    /// Overrides the default API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Temperature for generation.
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Disabled providers are never queried.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
            .trim_end_matches('/')
    }
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_true() -> bool {
    true
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "openai".to_string(),
            kind: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            enabled: true,
        },
        ProviderConfig {
            id: "perplexity".to_string(),
            kind: ProviderKind::Perplexity,
            model: "sonar".to_string(),
            base_url: None,
            api_key_env: "PERPLEXITY_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            enabled: true,
        },
        ProviderConfig {
            id: "anthropic".to_string(),
            kind: ProviderKind::Anthropic,
            model: "claude-3-5-sonnet-latest".to_string(),
            base_url: None,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            enabled: false,
        },
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        match &args.command {
            Command::Analyze(analyze) => {
                if let Some(timeout) = analyze.timeout {
                    self.analysis.timeout_seconds = timeout;
                }

                // Restrict to the requested providers, keeping config order
                if let Some(ref wanted) = analyze.providers {
                    let wanted: Vec<&str> = wanted
                        .iter()
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty())
                        .collect();
                    for provider in &mut self.providers {
                        provider.enabled = wanted.contains(&provider.id.as_str());
                    }

                    // Rejected later by validate()
                    let unknown: Vec<String> = wanted
                        .iter()
                        .filter(|id| self.provider(id).is_none())
                        .map(|id| id.to_string())
                        .collect();
                    self.unknown_providers = unknown;
                }

                if analyze.no_synthesis {
                    self.analysis.synthesizer = None;
                } else if let Some(ref synthesizer) = analyze.synthesizer {
                    self.analysis.synthesizer = Some(synthesizer.clone());
                }
            }
            Command::Serve(serve) => {
                if let Some(ref bind) = serve.bind {
                    self.server.bind = bind.clone();
                }
                if let Some(timeout) = serve.timeout {
                    self.analysis.timeout_seconds = timeout;
                }
            }
            Command::InitConfig => {}
        }
    }

    /// Providers that will be queried for each request.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Find a provider by id, enabled or not.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Check the configuration for mistakes that would only surface mid-request.
    pub fn validate(&self) -> Result<()> {
        if self.analysis.timeout_seconds == 0 {
            bail!("analysis.timeout_seconds must be at least 1");
        }

        if !self.unknown_providers.is_empty() {
            bail!(
                "Unknown provider id(s): {}. Configured providers: {}",
                self.unknown_providers.join(", "),
                self.providers
                    .iter()
                    .map(|p| p.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                bail!("Provider ids must not be empty");
            }
            if !seen.insert(provider.id.as_str()) {
                bail!("Duplicate provider id: {}", provider.id);
            }
            if !(0.0..=2.0).contains(&provider.temperature) {
                bail!(
                    "Temperature for provider '{}' must be between 0.0 and 2.0",
                    provider.id
                );
            }
            let base_url = provider.base_url();
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                bail!(
                    "Base URL for provider '{}' must start with 'http://' or 'https://'",
                    provider.id
                );
            }
        }

        if self.enabled_providers().next().is_none() {
            bail!("No providers enabled. Enable at least one in {}", CONFIG_FILE_NAME);
        }

        if let Some(ref synthesizer) = self.analysis.synthesizer {
            if self.provider(synthesizer).is_none() {
                bail!("Synthesizer '{}' is not a configured provider", synthesizer);
            }
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
