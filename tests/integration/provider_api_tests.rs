/*!
 * Provider API integration tests against a local mock server
 *
 * No external API calls are made: every request goes to a wiremock server
 * started by the test.
 */

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ambisent::app_config::{LlmProvider, ProbeConfig};
use ambisent::errors::ProviderError;
use ambisent::judgment::{AutoPolicy, RetrySettings, RetryingClient};
use ambisent::probe::run_probe;
use ambisent::providers::gemini::Gemini;
use ambisent::providers::openai::OpenAI;
use ambisent::providers::CompletionClient;
use ambisent::Controller;
use crate::common;

const GEMINI_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn gemini_reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 5}
    })
}

fn openai_reply(content: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 4}
    })
}

/// A configured Gemini run goes through HTTP and fills the table
#[tokio::test]
async fn test_controller_withGeminiServer_shouldJudgeThroughHttp() -> Result<()> {
    common::init_logger();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({"contents": [{"parts": [{"text": "判断：天气很好。"}]}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("对\n\n解释A\n")))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let csv = common::create_test_file(dir, "sentences.csv", "原句\n天气很好\n")?;
    let template = common::create_template(dir)?;
    let mut config = common::test_config(dir, &csv, &template);
    config.llm.provider_config_mut(LlmProvider::Gemini).endpoint = server.uri();
    config.validate()?;

    let controller = Controller::with_config(config)?;
    let summary = controller.run(&mut AutoPolicy { retry: false, cont: true }).await?;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(common::read(&csv), "原句,ai判断,ai理解\n天气很好。,对,解释A\n");
    Ok(())
}

/// A 503 is retried and the next answer is used
#[tokio::test]
async fn test_gemini_withTransientServerError_shouldRecoverOnRetry() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("错\n解释B")))
        .mount(&server)
        .await;

    let gemini = Gemini::new("test-key", server.uri(), 5);
    let client = RetryingClient::new(Arc::new(gemini), RetrySettings::immediate(3));

    let report = client.complete_with_report("判断：明天.").await;

    assert_eq!(report.text.as_deref(), Some("错\n解释B"));
    assert_eq!(report.attempts, 2);
    assert_eq!(report.retries, 1);
    Ok(())
}

/// A 400 is not worth another attempt
#[tokio::test]
async fn test_gemini_withBadRequest_shouldNotRetry() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gemini = Gemini::new("bad-key", server.uri(), 5);
    let client = RetryingClient::new(Arc::new(gemini), RetrySettings::immediate(3));

    let report = client.complete_with_report("判断：明天.").await;

    assert!(report.text.is_none());
    assert_eq!(report.attempts, 1);
    assert!(matches!(
        report.last_error,
        Some(ProviderError::ApiError { status_code: 400, ref message }) if message == "API key not valid."
    ));
    Ok(())
}

/// A blocked candidate has no text and surfaces as an empty response
#[tokio::test]
async fn test_gemini_withoutCandidateText_shouldReturnEmptyResponse() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        })))
        .mount(&server)
        .await;

    let gemini = Gemini::new("test-key", server.uri(), 5);
    let result = gemini.complete_prompt("判断：明天.").await;

    assert!(matches!(result, Err(ProviderError::EmptyResponse)));
    Ok(())
}

/// OpenAI-compatible servers get a bearer token and a single user message
#[tokio::test]
async fn test_openai_withCompatibleServer_shouldReturnMessageContent() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "Qwen/Qwen3-14B",
            "messages": [{"role": "user", "content": "判断：明天."}],
            "temperature": 0.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(json!("错\n解释B"))))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAI::new("sk-test", server.uri(), 5)
        .with_model("Qwen/Qwen3-14B")
        .with_temperature(Some(0.0));

    assert_eq!(client.describe(), "openai/Qwen/Qwen3-14B");
    assert_eq!(client.complete_prompt("判断：明天.").await?, "错\n解释B");
    Ok(())
}

/// Rate limits are classified as transient
#[tokio::test]
async fn test_openai_withRateLimit_shouldBeTransient() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let client = OpenAI::new("sk-test", server.uri(), 5);
    let error = client.complete_prompt("x").await.unwrap_err();

    assert!(matches!(error, ProviderError::RateLimitExceeded(ref m) if m == "Too Many Requests"));
    assert!(error.is_transient());
    Ok(())
}

/// A null message content is an empty response
#[tokio::test]
async fn test_openai_withNullContent_shouldReturnEmptyResponse() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply(serde_json::Value::Null)))
        .mount(&server)
        .await;

    let client = OpenAI::new("sk-test", server.uri(), 5);
    let result = client.complete_prompt("x").await;

    assert!(matches!(result, Err(ProviderError::EmptyResponse)));
    Ok(())
}

/// A response slower than the request timeout counts as a timeout
#[tokio::test]
async fn test_retryingClient_withSlowServer_shouldTimeOut() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_reply(json!("对")))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut settings = RetrySettings::immediate(2);
    settings.request_timeout = std::time::Duration::from_millis(50);
    let client = RetryingClient::new(Arc::new(OpenAI::new("sk-test", server.uri(), 5)), settings);

    let report = client.complete_with_report("x").await;

    assert!(report.text.is_none());
    assert_eq!(report.attempts, 2);
    assert!(matches!(report.last_error, Some(ProviderError::Timeout(_))));
    Ok(())
}

/// Probing appends the no-think suffix where listed and skips failing models
#[tokio::test]
async fn test_runProbe_shouldSplitThinkingAndSkipFailures() -> Result<()> {
    common::init_logger();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "Qwen/Qwen3-14B",
            "messages": [{"role": "user", "content": "你好，请介绍一下你自己/no_think"}]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(openai_reply(json!("<think>\n\n</think>\n\n我是通义千问。"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "google/gemma-2-9b-it"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let mut config = common::test_config(dir, &dir.join("a.csv"), &dir.join("p.txt"));
    let openai = config.llm.provider_config_mut(LlmProvider::OpenAI);
    openai.endpoint = server.uri();
    openai.api_key = "sk-test".to_string();
    let probe = ProbeConfig {
        no_think_models: vec!["Qwen/Qwen3-14B".to_string()],
        ..ProbeConfig::default()
    };
    let models = vec!["Qwen/Qwen3-14B".to_string(), "google/gemma-2-9b-it".to_string()];

    let replies = run_probe(&config.llm, &probe, &models, "你好，请介绍一下你自己").await;

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].model, "Qwen/Qwen3-14B");
    assert_eq!(replies[0].think_content, "");
    assert_eq!(replies[0].main_content, "我是通义千问。");
    Ok(())
}
