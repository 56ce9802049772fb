/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockProvider::working()` - Always succeeds with a judgment and an explanation
 * - `MockProvider::intermittent(n)` - Every nth request fails with a transient error
 * - `MockProvider::failing()` - Always fails with a transient server error
 * - `MockProvider::rejecting()` - Always fails with a non-retryable API error
 * - `MockProvider::scripted(f)` - Answers are computed per prompt
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::{CompletionClient, Provider};

/// Mock request for testing
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// The rendered prompt
    pub prompt: String,
}

/// Mock response for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// The generated text
    pub text: String,
    /// Simulated prompt tokens
    pub prompt_tokens: Option<u64>,
    /// Simulated completion tokens
    pub completion_tokens: Option<u64>,
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request) with HTTP 503
    Intermittent { fail_every: usize },
    /// Always fails with HTTP 500
    Failing,
    /// Always fails with HTTP 400
    Rejecting,
    /// Returns empty response
    Empty,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
    /// Panics inside the request
    Panicking,
}

/// Per-prompt answer function
pub type Responder = Arc<dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync>;

/// Mock provider for testing judgment runs
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter for intermittent failures
    request_count: Arc<AtomicUsize>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&MockRequest) -> String>,
    /// Scripted answers, take precedence over `behavior`
    responder: Option<Responder>,
    /// Per-prompt delay in milliseconds
    delay: Option<fn(&str) -> u64>,
    /// Every prompt received, in arrival order
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            custom_response: None,
            responder: None,
            delay: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    /// Create a mock provider that always fails with a transient error
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock provider that always fails with a non-retryable error
    pub fn rejecting() -> Self {
        Self::new(MockBehavior::Rejecting)
    }

    /// Create a mock that returns empty responses
    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    /// Create a mock that sleeps before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Create a mock that panics on every request
    pub fn panicking() -> Self {
        Self::new(MockBehavior::Panicking)
    }

    /// Create a mock whose answers are computed from the prompt
    pub fn scripted<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        let mut provider = Self::working();
        provider.responder = Some(Arc::new(responder));
        provider
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: fn(&MockRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Delay each answer by a prompt-dependent number of milliseconds
    pub fn with_delay(mut self, delay: fn(&str) -> u64) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received so far, across clones
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, across clones
    pub fn received_prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Default two-line answer for a prompt
    pub fn default_answer(prompt: &str) -> String {
        format!("对\n模拟解释: {}", prompt)
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("behavior", &self.behavior)
            .field("request_count", &self.request_count())
            .field("scripted", &self.responder.is_some())
            .finish()
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            custom_response: self.custom_response,
            responder: self.responder.clone(),
            delay: self.delay,
            prompts: Arc::clone(&self.prompts),
        }
    }
}

fn response(text: String, request: &MockRequest) -> MockResponse {
    MockResponse {
        prompt_tokens: Some(request.prompt.chars().count() as u64),
        completion_tokens: Some(text.chars().count() as u64),
        text,
    }
}

#[async_trait]
impl Provider for MockProvider {
    type Request = MockRequest;
    type Response = MockResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt.clone());

        if let Some(delay) = self.delay {
            let delay_ms = delay(&request.prompt);
            if delay_ms > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
            }
        }

        if let Some(responder) = &self.responder {
            let text = responder(&request.prompt)?;
            return Ok(response(text, &request));
        }

        match self.behavior {
            MockBehavior::Working => {
                let text = match self.custom_response {
                    Some(generator) => generator(&request),
                    None => Self::default_answer(&request.prompt),
                };
                Ok(response(text, &request))
            }

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ServerError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(response(Self::default_answer(&request.prompt), &request))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ServerError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Rejecting => Err(ProviderError::ApiError {
                message: "Simulated invalid request".to_string(),
                status_code: 400,
            }),

            MockBehavior::Empty => Ok(response(String::new(), &request)),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(response(Self::default_answer(&request.prompt), &request))
            }

            MockBehavior::Panicking => panic!("Simulated panic in mock provider"),
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.text.clone()
    }
}

#[async_trait]
impl CompletionClient for MockProvider {
    async fn complete_prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self.complete(MockRequest { prompt: prompt.to_string() }).await?;
        let text = Self::extract_text(&response);
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }

    fn describe(&self) -> String {
        "mock/mock-model".to_string()
    }
}
