/*!
 * Retrying completion client.
 *
 * Every call waits a random jitter first so that concurrent workers do not hit
 * the API in lockstep, then makes a bounded number of attempts with a fixed
 * delay in between. Failures never escape as errors: an exhausted budget is
 * reported as `None`.
 */

use log::{debug, error, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{RequestCommonConfig, RetryPolicy};
use crate::errors::ProviderError;
use crate::providers::CompletionClient;

/// Retry, delay and timeout settings for one client
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Attempts per prompt, including the first one
    pub retry_count: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Lower bound of the pre-request jitter in milliseconds
    pub jitter_min_ms: u64,
    /// Upper bound of the pre-request jitter in milliseconds
    pub jitter_max_ms: u64,
    /// Bound on a single attempt
    pub request_timeout: Duration,
    /// Which errors are retried
    pub policy: RetryPolicy,
}

impl RetrySettings {
    /// Settings without any waiting, handy for tests and dry runs
    pub fn immediate(retry_count: u32) -> Self {
        Self {
            retry_count,
            retry_delay: Duration::ZERO,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            request_timeout: Duration::from_secs(30),
            policy: RetryPolicy::Transient,
        }
    }

    /// Whether `error` deserves another attempt under the configured policy
    pub fn should_retry(&self, error: &ProviderError) -> bool {
        match self.policy {
            RetryPolicy::Transient => error.is_transient(),
            RetryPolicy::Any => true,
        }
    }

    /// Draw a jitter delay uniformly from the configured range
    pub fn jitter(&self) -> Duration {
        if self.jitter_max_ms == 0 {
            return Duration::ZERO;
        }
        let low = self.jitter_min_ms.min(self.jitter_max_ms);
        let millis = rand::rng().random_range(low..=self.jitter_max_ms);
        Duration::from_millis(millis)
    }
}

impl From<&RequestCommonConfig> for RetrySettings {
    fn from(common: &RequestCommonConfig) -> Self {
        Self {
            retry_count: common.retry_count.max(1),
            retry_delay: Duration::from_millis(common.retry_delay_ms),
            jitter_min_ms: common.jitter_min_ms,
            jitter_max_ms: common.jitter_max_ms,
            request_timeout: Duration::from_secs(common.request_timeout_secs),
            policy: common.retry_policy,
        }
    }
}

/// Outcome of one prompt including the attempt accounting
#[derive(Debug, Clone)]
pub struct CompletionReport {
    /// Generated text, `None` when every attempt failed
    pub text: Option<String>,
    /// Attempts made
    pub attempts: u32,
    /// Retries announced in the log
    pub retries: u32,
    /// Error of the last failed attempt
    pub last_error: Option<ProviderError>,
}

/// Completion client wrapper applying jitter, timeout and retry rules
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Arc<dyn CompletionClient>,
    settings: RetrySettings,
}

impl RetryingClient {
    /// Wrap a completion client
    pub fn new(client: Arc<dyn CompletionClient>, settings: RetrySettings) -> Self {
        Self { client, settings }
    }

    /// Label of the wrapped client
    pub fn describe(&self) -> String {
        self.client.describe()
    }

    /// Complete a prompt, `None` when it could not be completed
    pub async fn complete(&self, prompt: &str) -> Option<String> {
        self.complete_with_report(prompt).await.text
    }

    /// Complete a prompt and report how many attempts it took
    pub async fn complete_with_report(&self, prompt: &str) -> CompletionReport {
        let jitter = self.settings.jitter();
        if !jitter.is_zero() {
            debug!("Waiting {} ms before request", jitter.as_millis());
            tokio::time::sleep(jitter).await;
        }

        let total = self.settings.retry_count.max(1);
        let mut retries = 0;

        for attempt in 1..=total {
            let result = match tokio::time::timeout(
                self.settings.request_timeout,
                self.client.complete_prompt(prompt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.settings.request_timeout.as_secs())),
            };

            let error = match result {
                Ok(text) => {
                    return CompletionReport {
                        text: Some(text),
                        attempts: attempt,
                        retries,
                        last_error: None,
                    }
                }
                Err(error) => error,
            };

            if !self.settings.should_retry(&error) {
                error!("Request to {} failed without retry: {}", self.client.describe(), error);
                return CompletionReport {
                    text: None,
                    attempts: attempt,
                    retries,
                    last_error: Some(error),
                };
            }

            if attempt < total {
                retries += 1;
                warn!("[Retry {}/{}] {}, waiting {} ms", retries, total - 1, error,
                    self.settings.retry_delay.as_millis());
                if !self.settings.retry_delay.is_zero() {
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            } else {
                error!("Request to {} failed after {} attempts: {}", self.client.describe(), total, error);
                return CompletionReport {
                    text: None,
                    attempts: attempt,
                    retries,
                    last_error: Some(error),
                };
            }
        }

        CompletionReport {
            text: None,
            attempts: total,
            retries,
            last_error: None,
        }
    }
}
