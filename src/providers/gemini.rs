use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use log::debug;

use crate::errors::ProviderError;
use crate::providers::{error_from_response, CompletionClient, Provider};

/// Gemini client for the `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct Gemini {
    /// HTTP client for API requests
    client: Client,
    /// API key sent in the `x-goog-api-key` header
    api_key: String,
    /// Base URL, e.g. `https://generativelanguage.googleapis.com`
    endpoint: String,
    /// Model used by `complete_prompt`
    model: String,
    /// Sampling temperature used by `complete_prompt`
    temperature: Option<f32>,
    /// HTTP timeout in seconds
    timeout_secs: u64,
}

/// Request body plus the model it is addressed to
#[derive(Debug, Clone)]
pub struct GeminiRequest {
    /// Model name, part of the URL rather than the body
    pub model: String,
    /// JSON body
    pub body: GenerateContentBody,
}

/// `generateContent` JSON body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentBody {
    /// Conversation turns
    pub contents: Vec<GeminiContent>,
    /// Sampling settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    /// `user` or `model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// A content part; only text parts are used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    /// Text content
    #[serde(default)]
    pub text: String,
}

/// Sampling settings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// `generateContent` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    /// Token accounting
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

/// One generated candidate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    /// Candidate content; absent when generation was blocked
    #[serde(default)]
    pub content: Option<GeminiContent>,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Number of prompt tokens
    #[serde(default)]
    pub prompt_token_count: u64,
    /// Number of generated tokens
    #[serde(default)]
    pub candidates_token_count: u64,
}

impl GeminiRequest {
    /// Create a single-turn request for a prompt
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            body: GenerateContentBody {
                contents: vec![GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart { text: prompt.into() }],
                }],
                generation_config: None,
            },
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.body
            .generation_config
            .get_or_insert(GenerationConfig { temperature: None })
            .temperature = Some(temperature);
        self
    }
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: "gemini-2.0-flash".to_string(),
            temperature: None,
            timeout_secs,
        }
    }

    /// Set the model used for prompt completions
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the temperature used for prompt completions
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn api_url(&self, model: &str) -> String {
        let base = if self.endpoint.is_empty() {
            "https://generativelanguage.googleapis.com"
        } else {
            self.endpoint.trim_end_matches('/')
        };
        format!("{}/v1beta/models/{}:generateContent", base, model)
    }
}

#[async_trait]
impl Provider for Gemini {
    type Request = GeminiRequest;
    type Response = GeminiResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let url = self.api_url(&request.model);

        let response = self.client.post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let gemini_response = response.json::<GeminiResponse>().await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Gemini API response: {}", e)))?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!("Gemini usage: {} prompt tokens, {} completion tokens",
                usage.prompt_token_count, usage.candidates_token_count);
        }

        Ok(gemini_response)
    }

    fn extract_text(response: &Self::Response) -> String {
        response.candidates.first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for Gemini {
    async fn complete_prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut request = GeminiRequest::new(self.model.clone(), prompt);
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }
        let response = self.complete(request).await?;
        let text = Self::extract_text(&response);
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }

    fn describe(&self) -> String {
        format!("gemini/{}", self.model)
    }
}
