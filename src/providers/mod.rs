/*!
 * Provider implementations for remote LLM services.
 *
 * This module contains client implementations for the supported providers:
 * - Gemini: Google `generateContent` API (default)
 * - OpenAI: any OpenAI-compatible `chat/completions` server
 * - Mock: scripted in-process provider for tests
 */

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{LlmConfig, LlmProvider};
use crate::errors::ProviderError;

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Extract text from the provider response
    ///
    /// # Arguments
    /// * `response` - The response from the provider
    ///
    /// # Returns
    /// * `String` - The extracted text
    fn extract_text(response: &Self::Response) -> String;
}

/// Text in, text out view of a configured provider
///
/// This is the only surface the retrying client and the dispatcher depend on.
#[async_trait]
pub trait CompletionClient: Send + Sync + Debug {
    /// Send one prompt and return the generated text
    async fn complete_prompt(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Short "provider/model" label for logs
    fn describe(&self) -> String;
}

/// Build the completion client for the active provider
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>> {
    let model = config.get_model();
    let api_key = config.get_api_key();
    let endpoint = config.get_endpoint();
    let timeout_secs = config.get_timeout_secs();
    let temperature = config.common.temperature;

    let client: Arc<dyn CompletionClient> = match config.provider {
        LlmProvider::Gemini => Arc::new(
            gemini::Gemini::new(api_key, endpoint, timeout_secs)
                .with_model(model)
                .with_temperature(temperature),
        ),
        LlmProvider::OpenAI => Arc::new(
            openai::OpenAI::new(api_key, endpoint, timeout_secs)
                .with_model(model)
                .with_temperature(temperature),
        ),
    };
    Ok(client)
}

/// Turn an unsuccessful HTTP response into a classified provider error
pub(crate) async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());
    ProviderError::from_status(status, error_message_from_body(&body))
}

/// Prefer the `error.message` field of a JSON error body, fall back to the raw body
pub(crate) fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

pub mod gemini;
pub mod mock;
pub mod openai;
