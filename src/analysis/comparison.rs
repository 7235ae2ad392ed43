//! Deterministic comparison of provider results.
//!
//! Works only on what the providers already returned; no extra calls.

use crate::models::{ComparisonSummary, ProviderOutcome, ProviderResult};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Summarize a set of results keyed by provider id.
pub fn compare(results: &BTreeMap<String, ProviderResult>) -> ComparisonSummary {
    let mut summary = ComparisonSummary::default();

    for result in results.values() {
        match &result.outcome {
            ProviderOutcome::Succeeded { payload } => {
                summary.succeeded += 1;
                summary
                    .response_chars
                    .insert(result.provider.clone(), payload.text.chars().count());

                if let Some(score) = payload.structured.as_ref().and_then(quality_score) {
                    summary.quality_scores.insert(result.provider.clone(), score);
                }
            }
            ProviderOutcome::Failed { .. } => summary.failed += 1,
            ProviderOutcome::TimedOut => summary.timed_out += 1,
            ProviderOutcome::Cancelled => summary.cancelled += 1,
        }
    }

    // Ties go to the lower provider id
    summary.fastest = results
        .values()
        .filter(|r| r.outcome.is_success())
        .min_by_key(|r| (r.elapsed_ms, r.provider.as_str()))
        .map(|r| r.provider.clone());

    let (shared, unique) = section_overlap(results);
    summary.shared_sections = shared;
    summary.unique_sections = unique;

    if summary.quality_scores.len() >= 2 {
        let scores = summary.quality_scores.values();
        let max = scores.clone().cloned().fold(f64::MIN, f64::max);
        let min = scores.cloned().fold(f64::MAX, f64::min);
        summary.score_spread = Some(max - min);
    }

    summary
}

/// Top-level JSON keys shared by every structured response, and keys only
/// one provider returned. Empty unless at least two responses are structured.
fn section_overlap(
    results: &BTreeMap<String, ProviderResult>,
) -> (Vec<String>, BTreeMap<String, Vec<String>>) {
    let sections: BTreeMap<&str, BTreeSet<&str>> = results
        .values()
        .filter_map(|r| {
            let object = r.outcome.payload()?.structured.as_ref()?.as_object()?;
            Some((r.provider.as_str(), object.keys().map(String::as_str).collect()))
        })
        .collect();

    if sections.len() < 2 {
        return (Vec::new(), BTreeMap::new());
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for keys in sections.values() {
        for key in keys {
            *counts.entry(*key).or_default() += 1;
        }
    }

    let shared = counts
        .iter()
        .filter(|(_, count)| **count == sections.len())
        .map(|(key, _)| key.to_string())
        .collect();

    let mut unique = BTreeMap::new();
    for (provider, keys) in &sections {
        let only_here: Vec<String> = keys
            .iter()
            .filter(|key| counts.get(*key) == Some(&1))
            .map(|key| key.to_string())
            .collect();
        if !only_here.is_empty() {
            unique.insert(provider.to_string(), only_here);
        }
    }

    (shared, unique)
}

/// Read `qualityAssessment.score` as a number in 0..=100.
fn quality_score(json: &Value) -> Option<f64> {
    let score = json.get("qualityAssessment")?.get("score")?;
    let value = match score {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches("/100").trim().parse().ok()?,
        _ => return None,
    };

    (0.0..=100.0).contains(&value).then_some(value)
}
