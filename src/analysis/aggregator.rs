//! Concurrent fan-out of one analysis request to every provider.
//!
//! Each provider call is bounded by its own timeout and retried on
//! transient errors. Whatever happens, the report holds exactly one entry
//! per provider.

use crate::analysis::{compare, synthesis};
use crate::models::{
    AnalysisRequest, ComparisonReport, ProviderOutcome, ProviderResult, SuggestionPayload,
};
use crate::prompt;
use crate::provider::{ProviderClient, ProviderError};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Caller-contract violations. Provider failures never end up here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("article text is empty")]
    EmptyText,
    #[error("no providers configured")]
    NoProviders,
    #[error("duplicate provider id: {0}")]
    DuplicateProvider(String),
}

/// Retry behaviour for transient provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each following one.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff.saturating_mul(1u32 << retry.min(16))
    }
}

/// Settings applied to every provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    pub per_call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl AggregatorOptions {
    pub fn new(per_call_timeout: Duration) -> Self {
        Self {
            per_call_timeout,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Fans requests out to a fixed set of providers.
pub struct Aggregator {
    providers: Vec<Arc<dyn ProviderClient>>,
    synthesizer: Option<Arc<dyn ProviderClient>>,
    options: AggregatorOptions,
}

impl Aggregator {
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>, options: AggregatorOptions) -> Self {
        Self {
            providers,
            synthesizer: None,
            options,
        }
    }

    /// Merge successful analyses with `synthesizer` after each fan-out.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ProviderClient>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn synthesizer_id(&self) -> Option<&str> {
        self.synthesizer.as_ref().map(|s| s.id())
    }

    /// Analyze one request. Never cancelled from outside.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<ComparisonReport, AnalyzeError> {
        self.analyze_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Analyze one request; calls still pending when `cancel` fires end as
    /// `Cancelled`.
    pub async fn analyze_with_cancel(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<ComparisonReport, AnalyzeError> {
        validate(request, &self.providers)?;

        let started_at = Utc::now();
        let start = Instant::now();
        let text = prompt::analysis_prompt(request);

        info!(
            request_id = %request.id,
            providers = self.providers.len(),
            timeout_ms = self.options.per_call_timeout.as_millis() as u64,
            "Starting provider fan-out"
        );

        let calls = self
            .providers
            .iter()
            .map(|provider| call_provider(provider.as_ref(), &text, &self.options, cancel));

        // Keyed by provider id, so completion order does not matter
        let mut results = BTreeMap::new();
        for result in join_all(calls).await {
            results.insert(result.provider.clone(), result);
        }

        let comparison = compare(&results);

        let synthesis = match self.synthesizer {
            Some(ref synthesizer) => {
                synthesis::synthesize(
                    synthesizer.as_ref(),
                    &results,
                    request.topic.as_deref(),
                    &self.options,
                    cancel,
                )
                .await
            }
            None => None,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            request_id = %request.id,
            succeeded = comparison.succeeded,
            degraded = results.len() - comparison.succeeded,
            duration_ms,
            "Analysis complete"
        );

        Ok(ComparisonReport {
            request_id: request.id,
            topic: request.topic.clone(),
            started_at,
            duration_ms,
            per_call_timeout_ms: self.options.per_call_timeout.as_millis() as u64,
            results,
            comparison,
            synthesis,
        })
    }
}

/// Analyze `request` against `providers`, bounding each call by
/// `per_call_timeout`. No retries.
#[allow(dead_code)] // Library entry point; the binary builds an Aggregator from config
pub async fn analyze(
    request: &AnalysisRequest,
    providers: &[Arc<dyn ProviderClient>],
    per_call_timeout: Duration,
) -> Result<ComparisonReport, AnalyzeError> {
    Aggregator::new(providers.to_vec(), AggregatorOptions::new(per_call_timeout))
        .analyze(request)
        .await
}

fn validate(
    request: &AnalysisRequest,
    providers: &[Arc<dyn ProviderClient>],
) -> Result<(), AnalyzeError> {
    if request.text.trim().is_empty() {
        return Err(AnalyzeError::EmptyText);
    }
    if providers.is_empty() {
        return Err(AnalyzeError::NoProviders);
    }

    let mut seen = HashSet::new();
    for provider in providers {
        if !seen.insert(provider.id()) {
            return Err(AnalyzeError::DuplicateProvider(provider.id().to_string()));
        }
    }

    Ok(())
}

/// Drive one provider call to a terminal state.
pub(crate) async fn call_provider(
    provider: &dyn ProviderClient,
    text: &str,
    options: &AggregatorOptions,
    cancel: &CancellationToken,
) -> ProviderResult {
    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + options.per_call_timeout;
    let attempts = AtomicU32::new(0);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => ProviderOutcome::Cancelled,
        result = tokio::time::timeout_at(
            deadline,
            suggest_with_retries(provider, text, &options.retry, deadline, &attempts),
        ) => match result {
            Err(_) => ProviderOutcome::TimedOut,
            Ok(Ok(payload)) => ProviderOutcome::Succeeded { payload },
            Ok(Err(err)) => match err.failure_kind() {
                Some(kind) => ProviderOutcome::Failed {
                    kind,
                    message: err.to_string(),
                },
                None => ProviderOutcome::TimedOut,
            },
        },
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match outcome.error_kind() {
        None => info!(provider = provider.id(), elapsed_ms, "Provider succeeded"),
        Some(kind) => warn!(
            provider = provider.id(),
            elapsed_ms,
            kind = %kind,
            outcome = outcome.label().as_str(),
            "Provider did not succeed"
        ),
    }

    ProviderResult {
        provider: provider.id().to_string(),
        outcome,
        attempts: attempts.load(Ordering::Relaxed),
        elapsed_ms,
    }
}

async fn suggest_with_retries(
    provider: &dyn ProviderClient,
    text: &str,
    retry: &RetryPolicy,
    deadline: tokio::time::Instant,
    attempts: &AtomicU32,
) -> Result<SuggestionPayload, ProviderError> {
    let mut retries = 0;

    loop {
        attempts.fetch_add(1, Ordering::Relaxed);

        match provider.suggest(text).await {
            Ok(payload) => return Ok(payload),
            Err(err) if err.is_retryable() && retries < retry.max_retries => {
                let delay = retry.backoff(retries);

                // Report the real error rather than sleeping into the timeout
                if tokio::time::Instant::now() + delay >= deadline {
                    debug!(provider = provider.id(), "No time left for another attempt");
                    return Err(err);
                }

                warn!(
                    provider = provider.id(),
                    kind = %err.kind(),
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Transient provider error, retrying"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{FlakyProvider, StubProvider};
    use crate::models::{ErrorKind, FailureKind};

    const ARTICLE: &str = "Technology does many things, but one thing it never does is save time.";

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(ARTICLE, Some("technology".to_string()))
    }

    fn providers(list: Vec<Arc<dyn ProviderClient>>) -> Vec<Arc<dyn ProviderClient>> {
        list
    }

    fn only(provider: Arc<FlakyProvider>) -> Vec<Arc<dyn ProviderClient>> {
        vec![provider as Arc<dyn ProviderClient>]
    }

    #[tokio::test]
    async fn test_one_entry_per_provider() {
        let set = providers(vec![
            StubProvider::ok("a", 5, "ok-a"),
            StubProvider::failing("b", 5, ProviderError::Transport("reset".into())),
            StubProvider::ok("c", 1, "ok-c"),
        ]);

        let report = analyze(&request(), &set, Duration::from_secs(1)).await.unwrap();

        assert_eq!(report.results.len(), 3);
        let keys: Vec<_> = report.results.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(report.results["a"].outcome.is_success());
        assert!(report.results["c"].outcome.is_success());
        assert_eq!(
            report.results["b"].outcome.error_kind(),
            Some(ErrorKind::TransportError)
        );
    }

    #[tokio::test]
    async fn test_slow_provider_times_out_without_blocking() {
        let set = providers(vec![
            StubProvider::ok("A", 10, "ok-A"),
            StubProvider::ok("B", 500, "late-B"),
        ]);

        let start = Instant::now();
        let report = analyze(&request(), &set, Duration::from_millis(200))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(190), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(450), "{:?}", elapsed);

        assert_eq!(
            report.results["A"].outcome.payload().map(|p| p.text.as_str()),
            Some("ok-A")
        );
        assert_eq!(report.results["B"].outcome, ProviderOutcome::TimedOut);
        assert_eq!(report.per_call_timeout_ms, 200);
    }

    #[tokio::test]
    async fn test_auth_error_is_isolated() {
        let set = providers(vec![
            StubProvider::failing("openai", 1, ProviderError::Auth("invalid key".into())),
            StubProvider::ok("perplexity", 1, "ok"),
        ]);

        let report = analyze(&request(), &set, Duration::from_secs(1)).await.unwrap();

        match &report.results["openai"].outcome {
            ProviderOutcome::Failed { kind, message } => {
                assert_eq!(*kind, FailureKind::AuthError);
                assert!(message.contains("invalid key"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(report.results["perplexity"].outcome.is_success());
    }

    #[tokio::test]
    async fn test_provider_reported_timeout_is_timed_out() {
        let set = providers(vec![StubProvider::failing("a", 1, ProviderError::Timeout)]);
        let report = analyze(&request(), &set, Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.results["a"].outcome, ProviderOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_contract_violations() {
        let empty: Vec<Arc<dyn ProviderClient>> = Vec::new();
        let err = analyze(&request(), &empty, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, AnalyzeError::NoProviders);

        let set = providers(vec![StubProvider::ok("a", 1, "ok")]);
        let blank = AnalysisRequest::new("   \n", None);
        let err = analyze(&blank, &set, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, AnalyzeError::EmptyText);
    }

    #[tokio::test]
    async fn test_duplicate_provider_ids_rejected() {
        let set = providers(vec![
            StubProvider::ok("same", 1, "one"),
            StubProvider::ok("same", 1, "two"),
        ]);
        let err = analyze(&request(), &set, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, AnalyzeError::DuplicateProvider("same".to_string()));
    }

    #[tokio::test]
    async fn test_repeated_requests_are_structurally_identical() {
        let set = providers(vec![
            StubProvider::ok("a", 1, "ok-a"),
            StubProvider::failing("b", 1, ProviderError::RateLimited("429".into())),
            StubProvider::ok("c", 300, "late"),
        ]);

        let first = analyze(&request(), &set, Duration::from_millis(100))
            .await
            .unwrap();
        let second = analyze(&request(), &set, Duration::from_millis(100))
            .await
            .unwrap();

        let shape = |r: &ComparisonReport| -> Vec<(String, Option<ErrorKind>)> {
            r.results
                .iter()
                .map(|(k, v)| (k.clone(), v.outcome.error_kind()))
                .collect()
        };
        assert_eq!(shape(&first), shape(&second));
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let flaky = FlakyProvider::new("flaky", 2, ProviderError::RateLimited("429".into()));
        let aggregator = Aggregator::new(
            only(flaky.clone()),
            AggregatorOptions::new(Duration::from_secs(2))
                .with_retry(RetryPolicy::new(3, Duration::from_millis(5))),
        );

        let report = aggregator.analyze(&request()).await.unwrap();
        let result = &report.results["flaky"];
        assert!(result.outcome.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let flaky = FlakyProvider::new("strict", 5, ProviderError::Auth("401".into()));
        let aggregator = Aggregator::new(
            only(flaky.clone()),
            AggregatorOptions::new(Duration::from_secs(2))
                .with_retry(RetryPolicy::new(3, Duration::from_millis(5))),
        );

        let report = aggregator.analyze(&request()).await.unwrap();
        assert_eq!(report.results["strict"].attempts, 1);
        assert_eq!(
            report.results["strict"].outcome.error_kind(),
            Some(ErrorKind::AuthError)
        );
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_last_error() {
        let flaky = FlakyProvider::new("down", 10, ProviderError::Transport("refused".into()));
        let aggregator = Aggregator::new(
            only(flaky.clone()),
            AggregatorOptions::new(Duration::from_secs(2))
                .with_retry(RetryPolicy::new(2, Duration::from_millis(5))),
        );

        let report = aggregator.analyze(&request()).await.unwrap();
        assert_eq!(report.results["down"].attempts, 3);
        assert_eq!(
            report.results["down"].outcome.error_kind(),
            Some(ErrorKind::TransportError)
        );
    }

    #[tokio::test]
    async fn test_backoff_past_deadline_returns_error() {
        let flaky = FlakyProvider::new("busy", 10, ProviderError::RateLimited("429".into()));
        let aggregator = Aggregator::new(
            only(flaky.clone()),
            AggregatorOptions::new(Duration::from_millis(100))
                .with_retry(RetryPolicy::new(5, Duration::from_secs(10))),
        );

        let report = aggregator.analyze(&request()).await.unwrap();
        assert_eq!(report.results["busy"].attempts, 1);
        assert_eq!(
            report.results["busy"].outcome.error_kind(),
            Some(ErrorKind::RateLimited)
        );
    }

    #[tokio::test]
    async fn test_cancellation_marks_pending_calls() {
        let aggregator = Aggregator::new(
            vec![
                StubProvider::ok("fast", 5, "ok-fast"),
                StubProvider::ok("slow", 5_000, "never"),
            ],
            AggregatorOptions::new(Duration::from_secs(10)),
        );
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let report = aggregator
            .analyze_with_cancel(&request(), &cancel)
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(report.results.len(), 2);
        assert!(report.results["fast"].outcome.is_success());
        assert_eq!(report.results["slow"].outcome, ProviderOutcome::Cancelled);
        assert_eq!(report.comparison.cancelled, 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(2), Duration::from_millis(400));
    }
}
