/*!
 * Batch dispatching.
 *
 * A batch of prompts is fanned out to at most `max_workers` spawned tasks.
 * Results come back in completion order and are put back into submission
 * order before they are returned.
 */

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error};

use crate::app_config::BatchConfig;
use crate::judgment::parsing::clean_formatting;
use crate::judgment::retry::RetryingClient;

/// Fixed-size contiguous slices of `items`, the last one possibly shorter
pub fn batches<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.max(1))
}

/// Runs one batch of prompts with bounded concurrency
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    client: RetryingClient,
    max_workers: usize,
    strip_markdown: bool,
    show_progress: bool,
}

impl BatchDispatcher {
    /// Create a dispatcher from the batch settings
    pub fn new(client: RetryingClient, batch: &BatchConfig) -> Self {
        Self {
            client,
            max_workers: batch.max_workers.max(1),
            strip_markdown: batch.strip_markdown,
            show_progress: batch.show_progress,
        }
    }

    /// Complete every prompt; slot `i` of the result belongs to `prompts[i]`
    pub async fn run_batch(&self, prompts: &[String]) -> Vec<Option<String>> {
        let progress = self.progress_bar(prompts.len());

        let outcomes = stream::iter(prompts.iter().cloned().enumerate())
            .map(|(slot, prompt)| {
                let client = self.client.clone();
                let progress = progress.clone();
                async move {
                    let handle = tokio::spawn(async move { client.complete(&prompt).await });
                    let outcome = match handle.await {
                        Ok(outcome) => outcome,
                        Err(join_error) => {
                            error!("Worker for prompt {} aborted: {}", slot + 1, join_error);
                            None
                        }
                    };
                    progress.inc(1);
                    (slot, outcome)
                }
            })
            .buffer_unordered(self.max_workers)
            .collect::<Vec<_>>()
            .await;

        progress.finish_and_clear();

        let mut results: Vec<Option<String>> = vec![None; prompts.len()];
        for (slot, outcome) in outcomes {
            results[slot] = outcome.map(|text| self.post_process(text));
        }
        debug!(
            "Batch finished: {}/{} prompts answered",
            results.iter().filter(|r| r.is_some()).count(),
            results.len()
        );
        results
    }

    fn post_process(&self, text: String) -> String {
        if self.strip_markdown {
            clean_formatting(&text).trim().to_string()
        } else {
            text
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} prompts ({percent}%) {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%)"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar
    }
}
