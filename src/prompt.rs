//! Prompt rendering and response parsing.
//!
//! Every provider receives the same rendered prompt so their answers can be
//! compared section by section.

use crate::models::{AnalysisRequest, ProviderResult};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const DEFAULT_TOPIC: &str = "the main theme suggested by this content";

/// System prompt shared by all provider clients.
pub const SYSTEM_PROMPT: &str = r#"You are an expert editor and search-ranking analyst.
Answer with a single JSON object and nothing else."#;

/// Render the structured analysis prompt for one article.
pub fn analysis_prompt(request: &AnalysisRequest) -> String {
    let topic = request.topic.as_deref().unwrap_or(DEFAULT_TOPIC);

    let mut prompt = String::new();
    prompt.push_str("Analyze the following article and provide detailed, actionable feedback.\n\n");
    prompt.push_str("Article:\n");
    prompt.push_str(request.text.trim());
    prompt.push_str("\n\n");
    prompt.push_str(&format!("Target Topic/Search Term: {}\n\n", topic));
    prompt.push_str(ANALYSIS_SECTIONS);
    prompt
}

/// Render the prompt asking one provider to merge the successful analyses.
pub fn synthesis_prompt(results: &[&ProviderResult], topic: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Compare the following {} analyses of an article and provide a comprehensive improvement plan.\n\n",
        results.len()
    ));

    for result in results {
        let Some(payload) = result.outcome.payload() else {
            continue;
        };
        let body = match &payload.structured {
            Some(json) => serde_json::to_string_pretty(json).unwrap_or_else(|_| payload.text.clone()),
            None => payload.text.clone(),
        };
        prompt.push_str(&format!("### Analysis from {}\n{}\n\n", result.provider, body));
    }

    prompt.push_str(&format!(
        "Target Topic: {}\n\n",
        topic.unwrap_or("the main theme")
    ));
    prompt.push_str(SYNTHESIS_SECTIONS);
    prompt
}

fn fenced_block() -> &'static Regex {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    FENCED.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").expect("fenced block pattern is valid")
    })
}

/// Extract a JSON document from a response.
///
/// A fenced ```json block wins over the whole text. Returns `None` when
/// neither parses.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(captures) = fenced_block().captures(text) {
        if let Ok(json) = serde_json::from_str::<Value>(captures[1].trim()) {
            return Some(json);
        }
    }

    serde_json::from_str::<Value>(text.trim()).ok()
}

const ANALYSIS_SECTIONS: &str = r#"Provide a structured analysis with these top-level keys:

1. contentQuality: depth, accuracy and originality, each with a rating (Excellent/Good/Fair/Poor) and specifics.
2. writingStyle: clarity, engagement and flow, each with a rating and concrete issues.
3. contentEnhancement: keyTermsNeeded, examplesNeeded, counterArgumentsNeeded, supportingEvidenceNeeded.
4. searchRankingAnalysis: relevanceScore (0-10), currentRankingPrediction, competitorAnalysis, rankingImprovement, searchIntent, keywordGaps.
5. improvementActions: at least 5 items, each with priority (High/Medium/Low), action and impact.
6. qualityAssessment: score (0-100), explanation, strengths (top 3), immediateImprovements (top 3).

Format your response as a JSON object with these exact keys. Do not wrap the JSON in code blocks."#;

const SYNTHESIS_SECTIONS: &str = r#"Provide a JSON object with these top-level keys:

1. keyInsights: agreement, disagreement, mostActionableFeedback.
2. searchRankingStrategy: currentPosition, topCompetitors, quickWins (3), longTermStrategy, contentGaps.
3. prioritizedImprovementPlan: immediateActions, secondaryImprovements, optionalEnhancements.
4. contentPositioning: bestAspectsToPreserve, criticalAreasToRevise, uniqueAngle, targetAudience.
5. finalAssessment: combinedQualityScore, combinedRankingPrediction, confidenceLevel, expectedTimeToRank.

Do not wrap the JSON in code blocks."#;
