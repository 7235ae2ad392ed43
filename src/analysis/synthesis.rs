//! LLM synthesis of the successful analyses.
//!
//! One configured provider is asked to merge the other providers' answers
//! into a single improvement plan. Its outcome is reported like any other
//! provider call and never fails the report.

use crate::analysis::aggregator::{call_provider, AggregatorOptions};
use crate::models::ProviderResult;
use crate::prompt;
use crate::provider::ProviderClient;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Successful analyses needed before a synthesis is worth asking for.
pub const MIN_ANALYSES: usize = 2;

/// Run the synthesis call, or return `None` when too few providers succeeded.
pub async fn synthesize(
    synthesizer: &dyn ProviderClient,
    results: &BTreeMap<String, ProviderResult>,
    topic: Option<&str>,
    options: &AggregatorOptions,
    cancel: &CancellationToken,
) -> Option<ProviderResult> {
    let successes: Vec<&ProviderResult> = results
        .values()
        .filter(|r| r.outcome.is_success())
        .collect();

    if successes.len() < MIN_ANALYSES {
        debug!(
            succeeded = successes.len(),
            "Skipping synthesis, not enough successful analyses"
        );
        return None;
    }

    info!(
        synthesizer = synthesizer.id(),
        analyses = successes.len(),
        "Synthesizing analyses"
    );

    let text = prompt::synthesis_prompt(&successes, topic);
    Some(call_provider(synthesizer, &text, options, cancel).await)
}
