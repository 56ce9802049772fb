// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;

use ambisent::app_config::{self, Config, LlmProvider};
use ambisent::app_controller::{Controller, RunSummary};
use ambisent::judgment::{AutoPolicy, BatchDispatcher, ConsolePolicy, DecisionPolicy, RetrySettings, RetryingClient};
use ambisent::probe::run_probe;
use ambisent::providers::build_client;
use ambisent::scoring::Scorer;

/// CLI Wrapper for LlmProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    Gemini,
    #[value(name = "openai")]
    OpenAI,
}

impl From<CliProvider> for LlmProvider {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::Gemini => LlmProvider::Gemini,
            CliProvider::OpenAI => LlmProvider::OpenAI,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config: PathBuf,

    /// Sentence table (CSV, sentences in the first column)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Prompt template file (first line is used)
    #[arg(short, long, global = true)]
    template: Option<PathBuf>,

    /// Write results to this table instead of the input table
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// LLM provider to use
    #[arg(short, long, value_enum, global = true)]
    provider: Option<CliProvider>,

    /// Model name
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Sentences per batch
    #[arg(short, long, global = true)]
    batch_size: Option<usize>,

    /// Concurrent requests per batch
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Retry failed sentences without asking
    #[arg(long, conflicts_with = "no_retry", global = true)]
    auto_retry: bool,

    /// Never retry failed sentences
    #[arg(long, global = true)]
    no_retry: bool,

    /// Continue with the next batch without asking
    #[arg(long, global = true)]
    auto_continue: bool,

    /// Shorthand for --auto-retry --auto-continue
    #[arg(short, long, global = true)]
    yes: bool,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Judge every sentence of the table (default command)
    Judge,

    /// Judge again only the sentences listed in the failure log
    RetryFailed,

    /// Score collected explanations against the annotated disambiguations
    Score {
        /// Text report path
        #[arg(long)]
        report: Option<PathBuf>,

        /// JSON metrics path
        #[arg(long)]
        metrics: Option<PathBuf>,
    },

    /// Send a greeting to models on the OpenAI-compatible endpoint
    Probe {
        /// Model to probe (repeatable); the configured list when absent
        #[arg(long = "model-name")]
        models: Vec<String>,

        /// Message to send
        #[arg(long)]
        message: Option<String>,
    },

    /// Generate shell completions for ambisent
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// ambisent - batch LLM judgments for ambiguous sentences
///
/// Sends every sentence of a CSV table to an LLM, stores the judgment and
/// explanation next to it and keeps logs of what succeeded and what failed.
#[derive(Parser, Debug)]
#[command(name = "ambisent")]
#[command(version)]
#[command(about = "Batch LLM judgments for ambiguous sentences")]
#[command(long_about = "ambisent sends sentences from a CSV table to an LLM and writes the judgments back.

EXAMPLES:
    ambisent                                    # Judge using conf.json and .env
    ambisent -i data.csv -t prompt.txt          # Explicit table and template
    ambisent -p openai -m gpt-4o-mini --yes     # Other provider, no questions asked
    ambisent retry-failed --auto-retry          # Process results/failed.txt again
    ambisent score                              # Precision and recall of the answers
    ambisent probe --model-name Qwen/Qwen3-14B  # Greet one model
    ambisent completions bash > ambisent.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created. GEMINI_API_KEY, OPENAI_API_KEY, CSV_FILE_PATH and
    PROMPT_FILE_PATH are read from the environment or a .env file.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    common: CommonArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // The level is updated after loading the config
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();
    let common = cli.common;

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "ambisent", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::RetryFailed) => {
            let config = load_config(&common)?;
            config.validate_inputs()?;
            let controller = Controller::with_config(config)?;
            let mut policy = decision_policy(controller.config());
            let summary = controller.run_failed(policy.as_mut()).await?;
            report_summary(&summary);
            Ok(())
        }
        Some(Commands::Score { report, metrics }) => {
            let config = load_config(&common)?;
            run_score(&config, report, metrics).await
        }
        Some(Commands::Probe { models, message }) => {
            let config = load_config_unvalidated(&common)?;
            let openai_key = config
                .llm
                .get_provider_config(&LlmProvider::OpenAI)
                .map(|p| p.api_key.clone())
                .unwrap_or_default();
            if openai_key.is_empty() {
                return Err(anyhow!("Probing needs an API key for the OpenAI-compatible provider (set OPENAI_API_KEY)"));
            }
            let models = if models.is_empty() { config.probe.models.clone() } else { models };
            let message = message.unwrap_or_else(|| config.probe.message.clone());

            let replies = run_probe(&config.llm, &config.probe, &models, &message).await;
            for reply in &replies {
                println!("Model: {}", reply.model);
                println!("{}", serde_json::to_string_pretty(reply).context("Failed to serialize probe reply")?);
            }
            Ok(())
        }
        Some(Commands::Judge) | None => {
            let config = load_config(&common)?;
            config.validate_inputs()?;
            let controller = Controller::with_config(config)?;
            let mut policy = decision_policy(controller.config());
            let summary = controller.run(policy.as_mut()).await?;
            report_summary(&summary);
            Ok(())
        }
    }
}

/// Load the configuration: file, then environment, then command line
fn load_config_unvalidated(options: &CommonArgs) -> Result<Config> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Could not read .env file: {}", e);
        }
    }

    let mut config = Config::load_or_create(&options.config)?;
    config.apply_env_overrides(|name| std::env::var(name).ok());
    apply_cli_overrides(&mut config, options);

    log::set_max_level(config.log_level.to_level_filter());
    Ok(config)
}

fn load_config(options: &CommonArgs) -> Result<Config> {
    let config = load_config_unvalidated(options)?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut Config, options: &CommonArgs) {
    if let Some(provider) = &options.provider {
        config.llm.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        let provider = config.llm.provider;
        config.llm.provider_config_mut(provider).model = model.clone();
    }
    if let Some(input) = &options.input {
        config.input.csv_path = input.clone();
    }
    if let Some(template) = &options.template {
        config.input.template_path = template.clone();
    }
    if let Some(output) = &options.output {
        config.output.result_csv = Some(output.clone());
    }
    if let Some(batch_size) = options.batch_size {
        config.batch.batch_size = batch_size;
    }
    if let Some(workers) = options.workers {
        config.batch.max_workers = workers;
    }
    if options.auto_retry || options.yes {
        config.batch.auto_retry = Some(true);
    }
    if options.no_retry {
        config.batch.auto_retry = Some(false);
    }
    if options.auto_continue || options.yes {
        config.batch.auto_continue = Some(true);
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

/// Fixed answers when both questions are settled, the console otherwise
fn decision_policy(config: &Config) -> Box<dyn DecisionPolicy> {
    match (config.batch.auto_retry, config.batch.auto_continue) {
        (Some(retry), Some(cont)) => Box::new(AutoPolicy { retry, cont }),
        (fixed_retry, fixed_continue) => Box::new(ConsolePolicy::stdio(fixed_retry, fixed_continue)),
    }
}

async fn run_score(config: &Config, report: Option<PathBuf>, metrics: Option<PathBuf>) -> Result<()> {
    let client = build_client(&config.llm)?;
    let retrying = RetryingClient::new(client, RetrySettings::from(&config.llm.common));
    let dispatcher = BatchDispatcher::new(retrying, &config.batch);
    let scorer = Scorer::new(dispatcher, &config.scoring, config.batch.batch_size)?;

    let report_path = report.unwrap_or_else(|| config.scoring.report_path.clone());
    let metrics_path = metrics.unwrap_or_else(|| config.scoring.metrics_path.clone());
    let result = scorer
        .run(&config.result_csv_path(), &config.scoring, &report_path, &metrics_path)
        .await?;

    println!("Precision: {:.4}", result.precision);
    println!("Recall: {:.4}", result.recall);
    info!("Report written to {}", report_path.display());
    Ok(())
}

fn report_summary(summary: &RunSummary) {
    if summary.stopped_early {
        warn!("Stopped after {}/{} batches", summary.batches_run, summary.batches_total);
    }
    if summary.failed.is_empty() {
        info!("All {} processed sentences succeeded", summary.succeeded);
    } else {
        warn!("{} sentence(s) still failed:", summary.failed.len());
        for sentence in &summary.failed {
            warn!("  {}", sentence);
        }
    }
}
