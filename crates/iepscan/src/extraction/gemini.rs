//! Client for the Gemini `generateContent` REST API.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::prompts;
use super::{FieldExtractor, TextExtractor};
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::iep::IepFields;

/// Error bodies are cut to this many characters before they reach logs or
/// scan records.
const MAX_ERROR_BODY_LENGTH: usize = 200;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn truncate_error_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String, ExtractionError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(ExtractionError::MalformedResponse(reason));
        };

        Ok(candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_fields(text: &str) -> Result<IepFields, ExtractionError> {
    serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ExtractionError::MalformedResponse(format!("invalid IEP fields JSON: {}", e)))
}

/// Hosted extraction backed by Gemini.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<SecretString>,
}

impl GeminiClient {
    /// Creates a client. A missing `api_key` is not an error here; every
    /// request then fails with [`ExtractionError::MissingApiKey`].
    pub fn new(
        config: &ExtractionConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    fn build_request(
        &self,
        parts: Vec<Part>,
        response_mime_type: Option<&'static str>,
    ) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type,
            },
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, ExtractionError> {
        let api_key = self.api_key.as_ref().ok_or(ExtractionError::MissingApiKey)?;

        debug!("POST {} (model {})", self.url(), self.model);
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| ExtractionError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_error_body(&body);
            warn!("Extraction API returned {}: {}", status, body);
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;
        parsed.into_text()
    }
}

#[async_trait]
impl TextExtractor for GeminiClient {
    async fn extract_text(
        &self,
        document: &[u8],
        mime_type: &str,
    ) -> Result<String, ExtractionError> {
        let request = self.build_request(
            vec![
                Part::InlineData {
                    mime_type: mime_type.to_string(),
                    data: BASE64.encode(document),
                },
                Part::Text(prompts::text_instruction()),
            ],
            None,
        );
        self.generate(&request).await
    }
}

#[async_trait]
impl FieldExtractor for GeminiClient {
    async fn extract_fields(&self, raw_text: &str) -> Result<IepFields, ExtractionError> {
        let request = self.build_request(
            vec![Part::Text(prompts::fields_instruction(raw_text))],
            Some("application/json"),
        );
        let text = self.generate(&request).await?;
        parse_fields(&text)
    }
}
