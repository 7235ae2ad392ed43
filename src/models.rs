//! Data models for article analysis.
//!
//! This module contains the core data structures shared by the aggregator,
//! the provider clients, the HTTP server and the report generator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A single analysis run over one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Identifier of this run.
    pub id: Uuid,
    /// The article text to analyze.
    pub text: String,
    /// Optional target topic / search term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl AnalysisRequest {
    /// Creates a request with a fresh identifier.
    pub fn new(text: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            topic: topic.filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Successful response from one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionPayload {
    /// Raw response text.
    pub text: String,
    /// Model name as reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token usage, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// JSON document found in the response text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
}

impl SuggestionPayload {
    /// Creates a payload holding only text.
    #[cfg(test)]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            usage: None,
            structured: None,
        }
    }
}

/// Full error taxonomy for a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    AuthError,
    TransportError,
    InvalidResponse,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::RateLimited => write!(f, "RateLimited"),
            ErrorKind::AuthError => write!(f, "AuthError"),
            ErrorKind::TransportError => write!(f, "TransportError"),
            ErrorKind::InvalidResponse => write!(f, "InvalidResponse"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Kinds a provider can fail with on its own.
///
/// Timeouts and cancellation are decided by the aggregator and have their
/// own outcome variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    RateLimited,
    AuthError,
    TransportError,
    InvalidResponse,
}

impl From<FailureKind> for ErrorKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::RateLimited => ErrorKind::RateLimited,
            FailureKind::AuthError => ErrorKind::AuthError,
            FailureKind::TransportError => ErrorKind::TransportError,
            FailureKind::InvalidResponse => ErrorKind::InvalidResponse,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ErrorKind::from(*self).fmt(f)
    }
}

/// Terminal state of one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderOutcome {
    Succeeded {
        payload: SuggestionPayload,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
    TimedOut,
    Cancelled,
}

impl ProviderOutcome {
    /// Whether the provider produced a usable response.
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Succeeded { .. })
    }

    /// Returns the payload of a successful call.
    pub fn payload(&self) -> Option<&SuggestionPayload> {
        match self {
            ProviderOutcome::Succeeded { payload } => Some(payload),
            _ => None,
        }
    }

    /// Maps a non-successful outcome onto the error taxonomy.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ProviderOutcome::Succeeded { .. } => None,
            ProviderOutcome::Failed { kind, .. } => Some((*kind).into()),
            ProviderOutcome::TimedOut => Some(ErrorKind::Timeout),
            ProviderOutcome::Cancelled => Some(ErrorKind::Cancelled),
        }
    }

    /// Short label used in logs and reports.
    pub fn label(&self) -> String {
        match self {
            ProviderOutcome::Succeeded { .. } => "Succeeded".to_string(),
            ProviderOutcome::Failed { kind, .. } => format!("Failed({})", kind),
            ProviderOutcome::TimedOut => "TimedOut".to_string(),
            ProviderOutcome::Cancelled => "Cancelled".to_string(),
        }
    }

    /// Returns an emoji representation of the outcome.
    pub fn emoji(&self) -> &'static str {
        match self {
            ProviderOutcome::Succeeded { .. } => "✅",
            ProviderOutcome::Failed { .. } => "❌",
            ProviderOutcome::TimedOut => "⏱️",
            ProviderOutcome::Cancelled => "🚫",
        }
    }
}

/// Outcome of one provider within a single analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Provider identifier.
    pub provider: String,
    /// Terminal state of the call.
    pub outcome: ProviderOutcome,
    /// Number of attempts made, retries included.
    pub attempts: u32,
    /// Wall-clock time spent on this provider.
    pub elapsed_ms: u64,
}

/// Deterministic comparison of the collected results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    /// Fastest provider that succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fastest: Option<String>,
    /// Response length in characters, per succeeding provider.
    pub response_chars: BTreeMap<String, usize>,
    /// Top-level JSON sections present in every structured response.
    pub shared_sections: Vec<String>,
    /// Top-level JSON sections only one provider returned.
    pub unique_sections: BTreeMap<String, Vec<String>>,
    /// Quality scores (0-100) reported in the responses.
    pub quality_scores: BTreeMap<String, f64>,
    /// Difference between the highest and lowest quality score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_spread: Option<f64>,
}

/// The aggregated, per-provider outcome set returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Identifier of the analysis request.
    pub request_id: Uuid,
    /// Target topic, if one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// When the fan-out started.
    pub started_at: DateTime<Utc>,
    /// Total wall-clock duration.
    pub duration_ms: u64,
    /// Timeout applied to each provider call.
    pub per_call_timeout_ms: u64,
    /// One entry per configured provider, keyed by provider id.
    pub results: BTreeMap<String, ProviderResult>,
    /// Deterministic comparison of the results.
    pub comparison: ComparisonSummary,
    /// Synthesis of the successful analyses, when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<ProviderResult>,
}

impl ComparisonReport {
    /// Whether every provider succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|r| r.outcome.is_success())
    }

    /// Providers that did not succeed, in key order.
    pub fn degraded_providers(&self) -> Vec<&str> {
        self.results
            .values()
            .filter(|r| !r.outcome.is_success())
            .map(|r| r.provider.as_str())
            .collect()
    }
}
