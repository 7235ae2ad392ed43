//! Route handlers.

use crate::analysis::AnalyzeError;
use crate::models::{AnalysisRequest, ComparisonReport};
use crate::server::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct ArticleRequest {
    pub text: String,
    #[serde(default)]
    pub topic: Option<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Article Analysis API",
        "usage": "Send a POST request to /analyze with your article text",
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "providers": state.aggregator.provider_ids(),
        "synthesizer": state.aggregator.synthesizer_id(),
    }))
}

pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<ArticleRequest>,
) -> Result<Json<ComparisonReport>, (StatusCode, String)> {
    let chars = req.text.trim().chars().count();
    if chars < state.min_article_chars {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Article text is too short. Please provide at least {} characters.",
                state.min_article_chars
            ),
        ));
    }

    let request = AnalysisRequest::new(req.text, req.topic);
    info!(request_id = %request.id, chars, "Received analysis request");

    let report = state
        .aggregator
        .analyze_with_cancel(&request, &state.shutdown)
        .await
        .map_err(|e| match e {
            AnalyzeError::EmptyText => (StatusCode::BAD_REQUEST, e.to_string()),
            AnalyzeError::NoProviders | AnalyzeError::DuplicateProvider(_) => {
                error!(error = %e, "Aggregator misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Analysis failed: {}", e),
                )
            }
        })?;

    Ok(Json(report))
}
