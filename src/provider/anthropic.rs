//! Anthropic Messages API client.

use super::{classify_reqwest_error, classify_status, ProviderClient, ProviderError};
use crate::config::ProviderConfig;
use crate::models::{SuggestionPayload, TokenUsage};
use crate::prompt::{extract_json, SYSTEM_PROMPT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct AnthropicClient {
    id: String,
    model: String,
    endpoint: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: &ProviderConfig, api_key: String, http: reqwest::Client) -> Self {
        Self {
            id: config.id.clone(),
            model: config.model.clone(),
            endpoint: format!("{}/v1/messages", config.base_url()),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http,
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn suggest(&self, text: &str) -> Result<SuggestionPayload, ProviderError> {
        let request = MessagesRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: text,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(provider = self.id.as_str(), "Sending messages request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_reqwest_error(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_messages_response(&body)
    }
}

fn parse_messages_response(body: &str) -> Result<SuggestionPayload, ProviderError> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Malformed message: {}", e)))?;

    // Concatenate text blocks; tool_use and other block types are ignored
    let text: String = response
        .content
        .iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(ProviderError::InvalidResponse(
            "Message has no text content".to_string(),
        ));
    }

    Ok(SuggestionPayload {
        structured: extract_json(&text),
        model: response.model,
        usage: response.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio_test::{assert_err, assert_ok};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: String) -> AnthropicClient {
        let config = ProviderConfig {
            id: "anthropic".to_string(),
            kind: ProviderKind::Anthropic,
            model: "claude-3-5-sonnet-latest".to_string(),
            base_url: Some(base_url),
            api_key_env: "UNUSED".to_string(),
            temperature: 0.0,
            max_tokens: 256,
            enabled: true,
        };
        AnthropicClient::new(&config, "test-key".to_string(), reqwest::Client::new())
    }

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_suggest_against_local_server() {
        let app = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                if header(&headers, "x-api-key") != Some("test-key") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
                }
                if header(&headers, "anthropic-version") != Some(ANTHROPIC_VERSION) {
                    return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad version"})));
                }
                if body["system"] != SYSTEM_PROMPT || body["messages"][0]["role"] != "user" {
                    return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad body"})));
                }

                (
                    StatusCode::OK,
                    Json(json!({
                        "model": body["model"],
                        "content": [{"type": "text", "text": "ok-anthropic"}],
                        "usage": {"input_tokens": 12, "output_tokens": 3}
                    })),
                )
            }),
        );
        let client = client_for(spawn_server(app).await);

        let payload = assert_ok!(client.suggest("analyze this").await);
        assert_eq!(payload.text, "ok-anthropic");
        assert_eq!(payload.model.as_deref(), Some("claude-3-5-sonnet-latest"));
        assert_eq!(payload.usage.map(|u| u.input_tokens), Some(12));
    }

    #[tokio::test]
    async fn test_suggest_maps_rate_limit() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let client = client_for(spawn_server(app).await);

        let err = assert_err!(client.suggest("analyze this").await);
        assert_eq!(
            err,
            ProviderError::RateLimited("HTTP 429: rate limited".to_string())
        );
    }

    #[test]
    fn test_parse_messages_response() {
        let body = r#"{
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "```json\n{\"writingStyle\": {}}\n```"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;

        let payload = parse_messages_response(body).unwrap();
        assert_eq!(payload.model.as_deref(), Some("claude-3-5-sonnet-20241022"));
        assert_eq!(payload.usage.unwrap().output_tokens, 5);
        assert!(payload.structured.unwrap().get("writingStyle").is_some());
    }

    #[test]
    fn test_parse_messages_joins_text_blocks() {
        let body = r#"{"content": [
            {"type": "text", "text": "first"},
            {"type": "tool_use", "id": "x"},
            {"type": "text", "text": "second"}
        ]}"#;
        let payload = parse_messages_response(body).unwrap();
        assert_eq!(payload.text, "first\nsecond");
    }

    #[test]
    fn test_parse_messages_without_text() {
        let err = parse_messages_response(r#"{"content": []}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
