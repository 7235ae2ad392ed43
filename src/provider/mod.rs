//! Hosted LLM provider clients.
//!
//! Every provider is reached through the [`ProviderClient`] trait so the
//! aggregator never sees wire formats, only normalized payloads and typed
//! errors.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiCompatibleClient;

use crate::config::{ProviderConfig, ProviderKind};
use crate::models::{ErrorKind, FailureKind, SuggestionPayload};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Error raised by a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Timeout => ErrorKind::Timeout,
            ProviderError::RateLimited(_) => ErrorKind::RateLimited,
            ProviderError::Auth(_) => ErrorKind::AuthError,
            ProviderError::Transport(_) => ErrorKind::TransportError,
            ProviderError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Failure kind for errors that end a call as `Failed`.
    ///
    /// `None` for timeouts, which become `TimedOut` outcomes instead.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ProviderError::Timeout => None,
            ProviderError::RateLimited(_) => Some(FailureKind::RateLimited),
            ProviderError::Auth(_) => Some(FailureKind::AuthError),
            ProviderError::Transport(_) => Some(FailureKind::TransportError),
            ProviderError::InvalidResponse(_) => Some(FailureKind::InvalidResponse),
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Transport(_)
        )
    }
}

/// An external language-model service that can analyze text.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Unique identifier, used as the report key.
    fn id(&self) -> &str;

    /// Send `text` to the provider and return its normalized response.
    async fn suggest(&self, text: &str) -> Result<SuggestionPayload, ProviderError>;
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout,
        s if s.is_server_error() => ProviderError::Transport(message),
        _ => ProviderError::InvalidResponse(message),
    }
}

/// Map a reqwest error onto the error taxonomy.
pub fn classify_reqwest_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::InvalidResponse(format!("Failed to decode response: {}", err))
    } else if err.is_connect() {
        ProviderError::Transport(format!("Cannot connect: {}", err))
    } else {
        ProviderError::Transport(format!("Failed to send request: {}", err))
    }
}

/// Shorten a response body for error messages, on a char boundary.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Build the HTTP client shared by all providers.
///
/// The per-call timeout is enforced by the aggregator; this one only bounds
/// connection setup.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("article-lens/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Construct one client per enabled provider.
///
/// API keys are read from the environment variable each provider names.
pub fn build_providers<'a>(
    configs: impl IntoIterator<Item = &'a ProviderConfig>,
    http: &reqwest::Client,
) -> Result<Vec<Arc<dyn ProviderClient>>> {
    let mut providers: Vec<Arc<dyn ProviderClient>> = Vec::new();

    for config in configs {
        let client = build_provider(config, http)?;
        info!(
            provider = config.id.as_str(),
            model = config.model.as_str(),
            "Provider configured"
        );
        providers.push(client);
    }

    Ok(providers)
}

/// Construct the client for a single provider configuration.
pub fn build_provider(
    config: &ProviderConfig,
    http: &reqwest::Client,
) -> Result<Arc<dyn ProviderClient>> {
    let api_key = std::env::var(&config.api_key_env).with_context(|| {
        format!(
            "Missing API key for provider '{}'. Set {} in the environment or .env file",
            config.id, config.api_key_env
        )
    })?;
    debug!(provider = config.id.as_str(), base_url = config.base_url(), "Building client");

    let client: Arc<dyn ProviderClient> = match config.kind {
        ProviderKind::OpenAi | ProviderKind::Perplexity => Arc::new(
            OpenAiCompatibleClient::new(config, api_key, http.clone()),
        ),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(config, api_key, http.clone())),
    };

    Ok(client)
}
