/*!
 * # ambisent - batch LLM judgments for ambiguous sentences
 *
 * A Rust library that sends sentences from a CSV table to a remote LLM,
 * collects a judgment and an explanation for each one and writes them back
 * into the table.
 *
 * ## Features
 *
 * - Fixed-size batches with a small pool of concurrent requests
 * - Jittered, bounded retries of transient API failures
 * - Incremental persistence: the table is updated after every batch
 * - Success and failure logs; failed sentences can be processed again later
 * - Operator (or fixed-policy) decisions between batches
 * - Scoring of collected explanations against annotated disambiguations
 * - Providers:
 *   - Google Gemini `generateContent`
 *   - Any OpenAI-compatible `chat/completions` server
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `sentence_loader`: Reading and normalizing the sentence table
 * - `judgment`: Prompt templates, retries, batch dispatch, reply parsing and decisions:
 *   - `judgment::prompts`: Template parsing and rendering
 *   - `judgment::retry`: Retrying completion client
 *   - `judgment::dispatcher`: Concurrent batch fan-out
 *   - `judgment::parsing`: Judgment and explanation extraction
 *   - `judgment::policy`: Retry and continue decisions
 * - `persistence`: Result table merging and text logs
 * - `app_controller`: Main application controller
 * - `scoring`: Precision and recall against human annotations
 * - `probe`: Greeting a list of models on an OpenAI-compatible server
 * - `providers`: Client implementations for the LLM providers:
 *   - `providers::gemini`: Gemini API client
 *   - `providers::openai`: OpenAI-compatible API client
 *   - `providers::mock`: Scripted provider for tests
 * - `file_utils`: File system operations
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod judgment;
pub mod persistence;
pub mod probe;
pub mod providers;
pub mod scoring;
pub mod sentence_loader;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, RunSummary};
pub use errors::{AppError, ProviderError};
pub use sentence_loader::{load_sentences, IndexedSentence};
