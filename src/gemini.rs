//! Google Gemini `generateContent` adapter.
//!
//! Thin HTTP wrapper: builds the request body, sends it with the key in the
//! `x-goog-api-key` header and classifies failures into
//! [`ModelErrorKind`]s. No retries happen here; rotation decides what to do
//! with a failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::contract::{GenerativeModel, ModelCall, ModelFactory, ResponseFormat};
use crate::error::{parse_retry_after, ModelError, ModelErrorKind};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MAX_ERROR_CHARS: usize = 200;

/// Builds one [`GeminiClient`] per credential, sharing a connection pool.
pub struct GeminiFactory {
    http: reqwest::Client,
    endpoint: String,
}

impl GeminiFactory {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_runtime(config: &RuntimeConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.endpoint.clone(), config.request_timeout)
    }
}

impl ModelFactory for GeminiFactory {
    fn connect(&self, credential: &str, model: &str) -> Result<Box<dyn GenerativeModel>, ModelError> {
        if credential.trim().is_empty() {
            return Err(ModelError::new(
                ModelErrorKind::InvalidCredential,
                "Gemini API key is required",
            ));
        }
        Ok(Box::new(GeminiClient {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            api_key: credential.trim().to_string(),
            model: normalize_model_id(model),
        }))
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

/// Accepts ids such as `googleai/gemini-2.5-flash` or `models/gemini-2.5-flash`.
pub fn normalize_model_id(model: &str) -> String {
    let model = model.trim();
    let model = model.strip_prefix("googleai/").unwrap_or(model);
    model.strip_prefix("models/").unwrap_or(model).to_string()
}

pub fn build_request_body(call: &ModelCall) -> serde_json::Value {
    let mut parts = vec![serde_json::json!({ "text": call.prompt })];
    if let Some(image) = &call.image {
        parts.push(serde_json::json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": image.data,
            }
        }));
    }
    let mut generation_config = serde_json::json!({ "temperature": call.temperature });
    if call.format == ResponseFormat::Json {
        generation_config["responseMimeType"] = serde_json::json!("application/json");
    }
    serde_json::json!({
        "contents": [{ "parts": parts }],
        "generationConfig": generation_config,
    })
}

/// Concatenated text of the first candidate.
pub fn extract_text(response: &GeminiResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

fn truncate(message: &str) -> String {
    if message.chars().count() > MAX_ERROR_CHARS {
        let head: String = message.chars().take(MAX_ERROR_CHARS).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

/// Turns a non-success response into a classified error.
pub fn classify_http_failure(status: StatusCode, headers: &HeaderMap, body: &str) -> ModelError {
    let detail = serde_json::from_str::<GeminiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = format!("Gemini API error {}: {}", status, truncate(&detail));

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelErrorKind::InvalidCredential,
        StatusCode::TOO_MANY_REQUESTS => {
            let from_header = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            ModelErrorKind::QuotaExceeded {
                retry_after: from_header.or_else(|| parse_retry_after(&detail)),
            }
        }
        _ => match ModelErrorKind::classify_message(&detail) {
            ModelErrorKind::Other if status.is_server_error() => ModelErrorKind::Transport,
            kind => kind,
        },
    };
    ModelError::new(kind, message)
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, call: ModelCall) -> Result<String, ModelError> {
        let url = format!("{}/{}:generateContent", self.endpoint, self.model);
        let body = build_request_body(&call);
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| {
            ModelError::new(
                ModelErrorKind::InvalidCredential,
                "API key contains characters that cannot be sent",
            )
        })?;

        info!(
            model = %self.model,
            prompt_chars = call.prompt.len(),
            has_image = call.image.is_some(),
            "[GEMINI] generateContent"
        );

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ModelError::new(
                    ModelErrorKind::Transport,
                    format!("Gemini API request failed: {e}"),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let error_body = response.text().await.unwrap_or_default();
            let err = classify_http_failure(status, &headers, &error_body);
            debug!(%status, kind = ?err.kind, "[GEMINI] Request failed");
            return Err(err);
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            ModelError::invalid_response(format!("Failed to parse Gemini response: {e}"))
        })?;
        extract_text(&parsed)
            .ok_or_else(|| ModelError::invalid_response("Gemini response contained no text"))
    }
}
