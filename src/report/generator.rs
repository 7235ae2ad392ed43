//! Markdown and JSON report generation.
//!
//! This module renders a [`ComparisonReport`] for humans (Markdown) or
//! machines (JSON).

use crate::models::{ComparisonReport, ComparisonSummary, ProviderOutcome, ProviderResult};
use anyhow::Result;
use std::collections::BTreeMap;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ComparisonReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Article Analysis Comparison\n\n");

    // Metadata section
    output.push_str(&generate_metadata_section(report));

    // Outcome table
    output.push_str(&generate_outcomes_section(&report.results));

    // Comparison
    output.push_str(&generate_comparison_section(&report.comparison));

    // Synthesis
    if let Some(ref synthesis) = report.synthesis {
        output.push_str(&generate_synthesis_section(synthesis));
    }

    // Responses
    output.push_str(&generate_responses_section(&report.results));

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &ComparisonReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Request ID:** `{}`\n", report.request_id));
    if let Some(ref topic) = report.topic {
        section.push_str(&format!("- **Topic:** {}\n", topic));
    }
    section.push_str(&format!(
        "- **Started:** {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Providers:** {}\n", report.results.len()));
    section.push_str(&format!(
        "- **Per-call Timeout:** {:.1}s\n",
        report.per_call_timeout_ms as f64 / 1000.0
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n\n",
        report.duration_ms as f64 / 1000.0
    ));

    section
}

/// Generate the per-provider outcome table.
fn generate_outcomes_section(results: &BTreeMap<String, ProviderResult>) -> String {
    let mut section = String::new();

    section.push_str("## Provider Outcomes\n\n");
    section.push_str("| Provider | Outcome | Attempts | Time | Model |\n");
    section.push_str("|:---|:---|:---:|---:|:---|\n");

    for result in results.values() {
        let model = result
            .outcome
            .payload()
            .and_then(|p| p.model.as_deref())
            .unwrap_or("-");
        section.push_str(&format!(
            "| {} | {} {} | {} | {}ms | {} |\n",
            result.provider,
            result.outcome.emoji(),
            result.outcome.label(),
            result.attempts,
            result.elapsed_ms,
            model
        ));
    }
    section.push('\n');

    section
}

/// Generate the comparison section.
fn generate_comparison_section(summary: &ComparisonSummary) -> String {
    let mut section = String::new();

    section.push_str("## Comparison\n\n");
    section.push_str(&format!(
        "| ✅ Succeeded | ❌ Failed | ⏱️ Timed Out | 🚫 Cancelled |\n|:---:|:---:|:---:|:---:|\n| {} | {} | {} | {} |\n\n",
        summary.succeeded, summary.failed, summary.timed_out, summary.cancelled
    ));

    if let Some(ref fastest) = summary.fastest {
        section.push_str(&format!("- **Fastest:** {}\n", fastest));
    }

    if !summary.quality_scores.is_empty() {
        let scores: Vec<String> = summary
            .quality_scores
            .iter()
            .map(|(provider, score)| format!("{} {:.0}", provider, score))
            .collect();
        section.push_str(&format!("- **Quality Scores:** {}\n", scores.join(", ")));
    }
    if let Some(spread) = summary.score_spread {
        section.push_str(&format!("- **Score Spread:** {:.0}\n", spread));
    }

    if !summary.shared_sections.is_empty() {
        section.push_str(&format!(
            "- **Shared Sections:** {}\n",
            summary.shared_sections.join(", ")
        ));
    }
    for (provider, sections) in &summary.unique_sections {
        section.push_str(&format!(
            "- **Only from {}:** {}\n",
            provider,
            sections.join(", ")
        ));
    }
    section.push('\n');

    section
}

/// Generate the synthesis section.
fn generate_synthesis_section(synthesis: &ProviderResult) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Synthesis ({})\n\n", synthesis.provider));
    section.push_str(&outcome_body(&synthesis.outcome));

    section
}

/// Generate one subsection per provider response.
fn generate_responses_section(results: &BTreeMap<String, ProviderResult>) -> String {
    let mut section = String::new();

    section.push_str("## Responses\n\n");

    for result in results.values() {
        section.push_str(&format!("### {}\n\n", result.provider));
        section.push_str(&outcome_body(&result.outcome));
    }

    section
}

/// Render an outcome body: pretty JSON, plain text, or the failure.
fn outcome_body(outcome: &ProviderOutcome) -> String {
    match outcome {
        ProviderOutcome::Succeeded { payload } => match payload.structured {
            Some(ref json) => format!(
                "```json\n{}\n```\n\n",
                serde_json::to_string_pretty(json).unwrap_or_else(|_| payload.text.clone())
            ),
            None => format!("{}\n\n", payload.text.trim()),
        },
        ProviderOutcome::Failed { kind, message } => {
            format!("> ❌ **{}:** {}\n\n", kind, message)
        }
        ProviderOutcome::TimedOut => "> ⏱️ No response within the timeout.\n\n".to_string(),
        ProviderOutcome::Cancelled => "> 🚫 Cancelled before completion.\n\n".to_string(),
    }
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by Article Lens*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ComparisonReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::compare;
    use crate::models::{FailureKind, SuggestionPayload};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn create_test_report() -> ComparisonReport {
        let mut results = BTreeMap::new();
        results.insert(
            "openai".to_string(),
            ProviderResult {
                provider: "openai".to_string(),
                outcome: ProviderOutcome::Succeeded {
                    payload: SuggestionPayload {
                        model: Some("gpt-4o-mini".to_string()),
                        structured: Some(json!({"qualityAssessment": {"score": 70}})),
                        ..SuggestionPayload::text("{\"qualityAssessment\": {\"score\": 70}}")
                    },
                },
                attempts: 1,
                elapsed_ms: 850,
            },
        );
        results.insert(
            "perplexity".to_string(),
            ProviderResult {
                provider: "perplexity".to_string(),
                outcome: ProviderOutcome::Failed {
                    kind: FailureKind::RateLimited,
                    message: "HTTP 429: slow down".to_string(),
                },
                attempts: 3,
                elapsed_ms: 2100,
            },
        );

        ComparisonReport {
            request_id: Uuid::new_v4(),
            topic: Some("remote work".to_string()),
            started_at: Utc::now(),
            duration_ms: 2150,
            per_call_timeout_ms: 30_000,
            comparison: compare(&results),
            results,
            synthesis: None,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Article Analysis Comparison"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("**Topic:** remote work"));
        assert!(markdown.contains("## Provider Outcomes"));
        assert!(markdown.contains("| openai | ✅ Succeeded | 1 | 850ms | gpt-4o-mini |"));
        assert!(markdown.contains("Failed(RateLimited)"));
        assert!(markdown.contains("**Fastest:** openai"));
        assert!(markdown.contains("HTTP 429: slow down"));
        assert!(!markdown.contains("## Synthesis"));
    }

    #[test]
    fn test_markdown_includes_synthesis() {
        let mut report = create_test_report();
        report.synthesis = Some(ProviderResult {
            provider: "openai".to_string(),
            outcome: ProviderOutcome::TimedOut,
            attempts: 1,
            elapsed_ms: 30_000,
        });

        let markdown = generate_markdown_report(&report);
        assert!(markdown.contains("## Synthesis (openai)"));
        assert!(markdown.contains("No response within the timeout"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        let parsed: ComparisonReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert!(json.contains("\"request_id\""));
        assert!(json.contains("\"status\": \"failed\""));
    }
}
