use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// environment overrides and validation.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Remote LLM settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Where sentences and the prompt template come from
    #[serde(default)]
    pub input: InputConfig,

    /// Where results and logs are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Batching, concurrency and operator decisions
    #[serde(default)]
    pub batch: BatchConfig,

    /// Scoring of collected answers against human disambiguations
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Model probe settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// LLM provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    // @provider: Google Gemini generateContent
    #[default]
    Gemini,
    // @provider: Any OpenAI-compatible chat/completions server
    OpenAI,
}

impl LlmProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini => "Gemini",
            Self::OpenAI => "OpenAI-compatible",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Gemini => "gemini".to_string(),
            Self::OpenAI => "openai".to_string(),
        }
    }

    // @returns: Environment variable holding the API key
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAI),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: HTTP client timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: LlmProvider) -> Self {
        match provider_type {
            LlmProvider::Gemini => Self {
                provider_type: "gemini".to_string(),
                model: default_gemini_model(),
                api_key: String::new(),
                endpoint: default_gemini_endpoint(),
                timeout_secs: default_timeout_secs(),
            },
            LlmProvider::OpenAI => Self {
                provider_type: "openai".to_string(),
                model: default_openai_model(),
                api_key: String::new(),
                endpoint: default_openai_endpoint(),
                timeout_secs: default_timeout_secs(),
            },
        }
    }
}

/// Which provider failures are worth another attempt
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Only server errors, timeouts, dropped connections and rate limits
    #[default]
    Transient,
    /// Every provider error
    Any,
}

/// LLM service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider to use
    #[serde(default)]
    pub provider: LlmProvider,

    /// Available providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Request settings shared by all providers
    #[serde(default)]
    pub common: RequestCommonConfig,
}

/// Request settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestCommonConfig {
    /// Attempts per prompt, including the first one
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Lower bound of the random pre-request delay in milliseconds
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,

    /// Upper bound of the random pre-request delay in milliseconds
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    /// Upper bound for a single call, enforced around the provider
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Which failures are retried
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Sampling temperature, provider default when unset
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for RequestCommonConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_policy: RetryPolicy::default(),
            temperature: None,
        }
    }
}

/// Input locations
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct InputConfig {
    /// Sentence table; first column holds the sentence
    #[serde(default)]
    pub csv_path: PathBuf,

    /// Prompt template file; its first line is the template
    #[serde(default)]
    pub template_path: PathBuf,
}

/// Output locations and column names
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    /// Table receiving results; the input table when unset
    #[serde(default)]
    pub result_csv: Option<PathBuf>,

    /// Appended log of successful judgments
    #[serde(default = "default_success_log")]
    pub success_log: PathBuf,

    /// Rewritten list of unresolved sentences
    #[serde(default = "default_failed_log")]
    pub failed_log: PathBuf,

    /// Column receiving the first line of each response
    #[serde(default = "default_judgment_column")]
    pub judgment_column: String,

    /// Column receiving the remaining lines
    #[serde(default = "default_explanation_column")]
    pub explanation_column: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            result_csv: None,
            success_log: default_success_log(),
            failed_log: default_failed_log(),
            judgment_column: default_judgment_column(),
            explanation_column: default_explanation_column(),
        }
    }
}

/// Batching and flow control
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchConfig {
    /// Sentences per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent requests within a batch
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Remove markdown emphasis from responses
    #[serde(default = "default_true")]
    pub strip_markdown: bool,

    /// How many times the failed subset of one batch may be retried
    #[serde(default = "default_max_retry_rounds")]
    pub max_retry_rounds: u32,

    /// Fixed answer to "retry failed items?"; ask the operator when unset
    #[serde(default)]
    pub auto_retry: Option<bool>,

    /// Fixed answer to "proceed to next batch?"; ask the operator when unset
    #[serde(default)]
    pub auto_continue: Option<bool>,

    /// Draw a progress bar per batch
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            strip_markdown: true,
            max_retry_rounds: default_max_retry_rounds(),
            auto_retry: None,
            auto_continue: None,
            show_progress: true,
        }
    }
}

/// Scoring settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScoringConfig {
    /// Columns holding the human disambiguations
    #[serde(default = "default_disambiguation_columns")]
    pub disambiguation_columns: Vec<String>,

    /// Column holding the model's understanding
    #[serde(default = "default_explanation_column")]
    pub answer_column: String,

    /// Cell value meaning "no disambiguation"
    #[serde(default = "default_none_marker")]
    pub none_marker: String,

    /// Human-readable per-sample report
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// JSON precision/recall summary
    #[serde(default = "default_metrics_path")]
    pub metrics_path: PathBuf,

    /// Matching prompt; `{0}` is the disambiguations, `{1}` the model answer
    #[serde(default = "default_scoring_prompt")]
    pub prompt_template: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            disambiguation_columns: default_disambiguation_columns(),
            answer_column: default_explanation_column(),
            none_marker: default_none_marker(),
            report_path: default_report_path(),
            metrics_path: default_metrics_path(),
            prompt_template: default_scoring_prompt(),
        }
    }
}

/// Model probe settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProbeConfig {
    /// Models to greet
    #[serde(default = "default_probe_models")]
    pub models: Vec<String>,

    /// Models that get `/no_think` appended to the message
    #[serde(default = "default_no_think_models")]
    pub no_think_models: Vec<String>,

    /// Message sent to every model
    #[serde(default = "default_probe_message")]
    pub message: String,

    /// Sampling temperature
    #[serde(default = "default_probe_temperature")]
    pub temperature: f32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            models: default_probe_models(),
            no_think_models: default_no_think_models(),
            message: default_probe_message(),
            temperature: default_probe_temperature(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    // @returns: Matching log crate filter
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_jitter_min_ms() -> u64 {
    1000
}

fn default_jitter_max_ms() -> u64 {
    2000
}

fn default_batch_size() -> usize {
    10
}

fn default_max_workers() -> usize {
    2
}

fn default_max_retry_rounds() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_success_log() -> PathBuf {
    PathBuf::from("results/success_results.txt")
}

fn default_failed_log() -> PathBuf {
    PathBuf::from("results/failed.txt")
}

fn default_judgment_column() -> String {
    "ai判断".to_string()
}

fn default_explanation_column() -> String {
    "ai理解".to_string()
}

fn default_disambiguation_columns() -> Vec<String> {
    (1..=4).map(|i| format!("歧义句消岐{}", i)).collect()
}

fn default_none_marker() -> String {
    "无".to_string()
}

fn default_report_path() -> PathBuf {
    PathBuf::from("results/match_result.txt")
}

fn default_metrics_path() -> PathBuf {
    PathBuf::from("results/metrics.json")
}

fn default_scoring_prompt() -> String {
    "请你判断下列AI的理解与原理解的匹配程度。\n\n原理解选项:\n{0}\n\nAI的理解:\n{1}\n\n请回答匹配的个数，不需要解释原因。".to_string()
}

fn default_probe_models() -> Vec<String> {
    [
        "Qwen/Qwen3-4B-fast",
        "Qwen/Qwen3-14B",
        "Qwen/Qwen3-32B",
        "google/gemma-2-2b-it",
        "google/gemma-2-9b-it",
        "google/gemma-2-27b-it",
        "Qwen/Qwen3-235B-A22B",
        "deepseek-ai/DeepSeek-R1",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

fn default_no_think_models() -> Vec<String> {
    ["Qwen/Qwen3-4B-fast", "Qwen/Qwen3-14B", "Qwen/Qwen3-32B"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_probe_message() -> String {
    "你好，你是谁？".to_string()
}

fn default_probe_temperature() -> f32 {
    0.9
}

impl Config {
    /// Load the configuration file, writing a default one when it is missing
    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        if config_path.exists() {
            let file = File::open(config_path)
                .with_context(|| format!("Failed to open config file: {}", config_path.display()))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
            return Ok(config);
        }

        log::warn!("Config file not found at '{}', creating default config.", config_path.display());
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        crate::file_utils::FileManager::write_to_file(config_path, &config_json)?;
        Ok(config)
    }

    /// Apply overrides from environment-style variables
    ///
    /// The lookup is injected so the process environment is read only at the entry point.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty("CSV_FILE_PATH") {
            self.input.csv_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty("PROMPT_FILE_PATH") {
            self.input.template_path = PathBuf::from(path);
        }
        for provider in [LlmProvider::Gemini, LlmProvider::OpenAI] {
            if let Some(key) = non_empty(provider.api_key_env_var()) {
                self.llm.provider_config_mut(provider).api_key = key;
            }
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(anyhow!("batch_size must be at least 1"));
        }
        if self.batch.max_workers == 0 {
            return Err(anyhow!("max_workers must be at least 1"));
        }

        let common = &self.llm.common;
        if common.retry_count == 0 {
            return Err(anyhow!("retry_count must be at least 1"));
        }
        if common.jitter_min_ms > common.jitter_max_ms {
            return Err(anyhow!(
                "jitter_min_ms ({}) must not exceed jitter_max_ms ({})",
                common.jitter_min_ms,
                common.jitter_max_ms
            ));
        }
        if common.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be at least 1"));
        }

        let endpoint = self.llm.get_endpoint();
        url::Url::parse(&endpoint)
            .with_context(|| format!("Invalid endpoint URL for {} provider: {}", self.llm.provider.display_name(), endpoint))?;

        if self.llm.get_api_key().is_empty() {
            return Err(anyhow!(
                "API key is required for {} provider (set {} or the config file)",
                self.llm.provider.display_name(),
                self.llm.provider.api_key_env_var()
            ));
        }

        Ok(())
    }

    /// Validate the inputs needed by the judgment workflow
    pub fn validate_inputs(&self) -> Result<()> {
        if self.input.csv_path.as_os_str().is_empty() {
            return Err(anyhow!("No sentence table configured (set CSV_FILE_PATH or --input)"));
        }
        if self.input.template_path.as_os_str().is_empty() {
            return Err(anyhow!("No prompt template configured (set PROMPT_FILE_PATH or --template)"));
        }
        Ok(())
    }

    /// Table that receives results
    pub fn result_csv_path(&self) -> PathBuf {
        self.output
            .result_csv
            .clone()
            .unwrap_or_else(|| self.input.csv_path.clone())
    }
}

impl LlmConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &LlmProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get a provider configuration, adding a default entry when absent
    pub fn provider_config_mut(&mut self, provider_type: LlmProvider) -> &mut ProviderConfig {
        let provider_str = provider_type.to_lowercase_string();
        let position = match self
            .available_providers
            .iter()
            .position(|p| p.provider_type == provider_str)
        {
            Some(position) => position,
            None => {
                self.available_providers.push(ProviderConfig::new(provider_type));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[position]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        match self.provider {
            LlmProvider::Gemini => default_gemini_model(),
            LlmProvider::OpenAI => default_openai_model(),
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            LlmProvider::Gemini => default_gemini_endpoint(),
            LlmProvider::OpenAI => default_openai_endpoint(),
        }
    }

    /// Get the HTTP timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|secs| *secs > 0)
            .unwrap_or_else(default_timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            available_providers: vec![
                ProviderConfig::new(LlmProvider::Gemini),
                ProviderConfig::new(LlmProvider::OpenAI),
            ],
            common: RequestCommonConfig::default(),
        }
    }
}
