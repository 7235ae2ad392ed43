//! Deterministic stub providers for tests.

use crate::models::SuggestionPayload;
use crate::provider::{ProviderClient, ProviderError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider that answers after a fixed delay.
pub struct StubProvider {
    id: String,
    delay: Duration,
    response: Result<String, ProviderError>,
    calls: AtomicU32,
}

impl StubProvider {
    pub fn ok(id: &str, delay_ms: u64, text: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            delay: Duration::from_millis(delay_ms),
            response: Ok(text.to_string()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(id: &str, delay_ms: u64, error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            delay: Duration::from_millis(delay_ms),
            response: Err(error),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn suggest(&self, _text: &str) -> Result<SuggestionPayload, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.response.clone().map(|text| SuggestionPayload {
            structured: crate::prompt::extract_json(&text),
            ..SuggestionPayload::text(text)
        })
    }
}

/// Provider that fails with `error` for the first `failures` calls.
pub struct FlakyProvider {
    id: String,
    failures: u32,
    error: ProviderError,
    calls: AtomicU32,
}

impl FlakyProvider {
    pub fn new(id: &str, failures: u32, error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            failures,
            error,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for FlakyProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn suggest(&self, _text: &str) -> Result<SuggestionPayload, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(self.error.clone())
        } else {
            Ok(SuggestionPayload::text(format!("ok-{}", self.id)))
        }
    }
}
