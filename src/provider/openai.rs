//! OpenAI-compatible chat completions client.
//!
//! Serves both OpenAI and Perplexity, which expose the same
//! `/chat/completions` API.

use super::{classify_reqwest_error, classify_status, ProviderClient, ProviderError};
use crate::config::ProviderConfig;
use crate::models::{SuggestionPayload, TokenUsage};
use crate::prompt::{extract_json, SYSTEM_PROMPT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Client for any `/chat/completions` endpoint.
pub struct OpenAiCompatibleClient {
    id: String,
    model: String,
    endpoint: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    http: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &ProviderConfig, api_key: String, http: reqwest::Client) -> Self {
        Self {
            id: config.id.clone(),
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url()),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http,
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn suggest(&self, text: &str) -> Result<SuggestionPayload, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(provider = self.id.as_str(), endpoint = self.endpoint.as_str(), "Sending chat request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_reqwest_error(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_chat_response(&body)
    }
}

/// Normalize a chat completions response body.
fn parse_chat_response(body: &str) -> Result<SuggestionPayload, ProviderError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Malformed completion: {}", e)))?;

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse("Completion has no content".to_string()))?;

    Ok(SuggestionPayload {
        structured: extract_json(&text),
        model: response.model,
        usage: response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
        text,
    })
}
