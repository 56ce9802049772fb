/*!
 * Model probe.
 *
 * Sends one message to a list of models on an OpenAI-compatible server and
 * separates any `<think>` reasoning from the visible answer.
 */

use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app_config::{LlmConfig, LlmProvider, ProbeConfig, ProviderConfig};
use crate::errors::ProviderError;
use crate::providers::openai::OpenAI;
use crate::providers::CompletionClient;

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("valid regex"));
static THINK_BLOCK_WITH_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>\s*").expect("valid regex"));

/// Suffix asking hybrid reasoning models to skip their thinking phase
pub const NO_THINK_SUFFIX: &str = "/no_think";

/// Reply of one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReply {
    pub model: String,
    pub full_content: String,
    pub think_content: String,
    pub main_content: String,
}

impl ProbeReply {
    /// Split a raw reply into reasoning and answer
    pub fn from_content(model: impl Into<String>, content: &str) -> Self {
        let think_content = THINK_BLOCK
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let main_content = THINK_BLOCK_WITH_SPACE.replace_all(content, "").trim().to_string();
        Self {
            model: model.into(),
            full_content: content.to_string(),
            think_content,
            main_content,
        }
    }
}

/// Message actually sent to `model`
pub fn probe_message(model: &str, message: &str, no_think_models: &[String]) -> String {
    if no_think_models.iter().any(|m| m == model) {
        format!("{}{}", message, NO_THINK_SUFFIX)
    } else {
        message.to_string()
    }
}

/// Probe one model through an already configured client
pub async fn probe_model(
    client: &dyn CompletionClient,
    model: &str,
    message: &str,
    no_think_models: &[String],
) -> Result<ProbeReply, ProviderError> {
    let content = client.complete_prompt(&probe_message(model, message, no_think_models)).await?;
    Ok(ProbeReply::from_content(model, &content))
}

/// Probe every model against the OpenAI-compatible endpoint; failing models are logged and skipped
pub async fn run_probe(llm: &LlmConfig, probe: &ProbeConfig, models: &[String], message: &str) -> Vec<ProbeReply> {
    let provider = llm
        .get_provider_config(&LlmProvider::OpenAI)
        .cloned()
        .unwrap_or_else(|| ProviderConfig::new(LlmProvider::OpenAI));

    let mut replies = Vec::new();
    for model in models {
        info!("Probing {}", model);
        let client = OpenAI::new(provider.api_key.clone(), provider.endpoint.clone(), provider.timeout_secs)
            .with_model(model.clone())
            .with_temperature(Some(probe.temperature));

        match probe_model(&client, model, message, &probe.no_think_models).await {
            Ok(reply) => replies.push(reply),
            Err(e) => error!("Probe of {} failed: {}", model, e),
        }
    }
    replies
}
