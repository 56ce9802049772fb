use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::judgment::{
    batches, split_result_lines, BatchDispatcher, DecisionPolicy, ParsedResult, PromptTemplate,
    RetrySettings, RetryingClient,
};
use crate::persistence::{FailedSet, ResultPersister};
use crate::providers::{build_client, CompletionClient};
use crate::sentence_loader::{load_sentences, IndexedSentence};

// @module: Application controller for batch judgment runs

/// Outcome of a judgment run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    // @field: Sentences selected for the run
    pub total: usize,
    // @field: Batches processed
    pub batches_run: usize,
    // @field: Batches the run was split into
    pub batches_total: usize,
    // @field: Sentences answered and persisted
    pub succeeded: usize,
    // @field: Sentences still failed at the end, in index order
    pub failed: Vec<IndexedSentence>,
    // @field: Whether the policy declined to continue
    pub stopped_early: bool,
    // @field: Wall-clock time
    pub duration: Duration,
}

/// Drives batches through dispatch, retry decisions and persistence
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Remote completion client
    client: Arc<dyn CompletionClient>,
}

impl Controller {
    // @method: Create a controller with the provider described by the configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let client = build_client(&config.llm)?;
        Ok(Self::with_client(config, client))
    }

    // @method: Create a controller around an existing client
    pub fn with_client(config: Config, client: Arc<dyn CompletionClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatcher for this run's settings
    pub fn dispatcher(&self) -> BatchDispatcher {
        let retrying = RetryingClient::new(self.client.clone(), RetrySettings::from(&self.config.llm.common));
        BatchDispatcher::new(retrying, &self.config.batch)
    }

    /// Judge every sentence of the configured table
    pub async fn run(&self, policy: &mut dyn DecisionPolicy) -> Result<RunSummary> {
        let start_time = Instant::now();
        let template = self.load_template()?;
        let source = &self.config.input.csv_path;
        let sentences = load_sentences(source)
            .with_context(|| format!("Failed to load sentences from {}", source.display()))?;

        let persister = ResultPersister::from_config(&self.config);
        persister.prepare_table(source)?;

        // A fresh run starts from an empty failure log
        let failed = FailedSet::new();
        persister.write_failures(&failed)?;

        info!("Judging {} sentences with {}", sentences.len(), self.client.describe());
        let summary = self.process(&sentences, &template, &persister, failed, policy).await?;
        Ok(self.finish(summary, start_time))
    }

    /// Judge only the sentences listed in the failure log
    pub async fn run_failed(&self, policy: &mut dyn DecisionPolicy) -> Result<RunSummary> {
        let start_time = Instant::now();
        let template = self.load_template()?;
        let persister = ResultPersister::from_config(&self.config);

        let logged = persister.failure_log().read()?;
        if logged.is_empty() {
            info!("No failed sentences in {}", persister.failure_log().path().display());
            return Ok(self.finish(RunSummary::default(), start_time));
        }

        if !FileManager::file_exists(persister.table_path()) {
            persister.prepare_table(&self.config.input.csv_path)?;
        }
        if !FileManager::file_exists(persister.table_path()) {
            return Err(anyhow!("Result table not found: {}", persister.table_path().display()));
        }

        let sentences = self.resolve_logged(logged);
        info!("Retrying {} failed sentences with {}", sentences.len(), self.client.describe());
        let failed: FailedSet = sentences.iter().cloned().collect();
        let summary = self.process(&sentences, &template, &persister, failed, policy).await?;
        Ok(self.finish(summary, start_time))
    }

    /// Keep the logged indices but take each text from the sentence table
    ///
    /// The log holds one line per sentence, so a multi-line cell only survives
    /// there up to its first line break. The log text is used only for indices
    /// the table no longer has.
    fn resolve_logged(&self, logged: Vec<IndexedSentence>) -> Vec<IndexedSentence> {
        let source = &self.config.input.csv_path;
        let mut by_index: HashMap<usize, IndexedSentence> = match load_sentences(source) {
            Ok(sentences) => sentences.into_iter().map(|s| (s.index, s)).collect(),
            Err(e) => {
                warn!("Using failure log text, cannot read {}: {}", source.display(), e);
                HashMap::new()
            }
        };

        logged
            .into_iter()
            .map(|entry| match by_index.remove(&entry.index) {
                Some(sentence) => sentence,
                None => {
                    warn!("Row {} not found in {}, using the logged text", entry.index, source.display());
                    entry
                }
            })
            .collect()
    }

    fn load_template(&self) -> Result<PromptTemplate> {
        let path = &self.config.input.template_path;
        PromptTemplate::from_file(path)
            .with_context(|| format!("Failed to load prompt template from {}", path.display()))
    }

    async fn process(
        &self,
        sentences: &[IndexedSentence],
        template: &PromptTemplate,
        persister: &ResultPersister,
        mut failed: FailedSet,
        policy: &mut dyn DecisionPolicy,
    ) -> Result<RunSummary> {
        let dispatcher = self.dispatcher();
        let batch_list: Vec<&[IndexedSentence]> = batches(sentences, self.config.batch.batch_size).collect();
        let mut summary = RunSummary {
            total: sentences.len(),
            batches_total: batch_list.len(),
            ..RunSummary::default()
        };

        for (batch_index, batch) in batch_list.iter().enumerate() {
            if batch_index > 0 && !policy.should_continue(batch_index + 1, batch_list.len()) {
                info!("Stopping before batch {}/{}", batch_index + 1, batch_list.len());
                summary.stopped_early = true;
                break;
            }

            info!("Processing batch {}/{} ({} sentences)", batch_index + 1, batch_list.len(), batch.len());
            let mut pending = self
                .dispatch_and_persist(batch, template, &dispatcher, persister, &mut failed, &mut summary)
                .await?;

            let mut rounds = 0;
            while !pending.is_empty() && rounds < self.config.batch.max_retry_rounds {
                warn!("{} sentence(s) failed in batch {}", pending.len(), batch_index + 1);
                if !policy.should_retry_failures(&pending) {
                    break;
                }
                rounds += 1;
                info!("Retrying {} sentence(s), round {}/{}", pending.len(), rounds, self.config.batch.max_retry_rounds);
                pending = self
                    .dispatch_and_persist(&pending, template, &dispatcher, persister, &mut failed, &mut summary)
                    .await?;
            }

            summary.batches_run += 1;
        }

        summary.failed = failed.sentences();
        Ok(summary)
    }

    /// Dispatch one slice, persist what succeeded and return what failed
    async fn dispatch_and_persist(
        &self,
        batch: &[IndexedSentence],
        template: &PromptTemplate,
        dispatcher: &BatchDispatcher,
        persister: &ResultPersister,
        failed: &mut FailedSet,
        summary: &mut RunSummary,
    ) -> Result<Vec<IndexedSentence>> {
        let prompts = template.build_prompts(batch);
        let results = dispatcher.run_batch(&prompts).await;

        let mut successes: Vec<(IndexedSentence, ParsedResult)> = Vec::new();
        let mut still_failed = Vec::new();
        for (sentence, result) in batch.iter().zip(results) {
            match result.filter(|text| !text.trim().is_empty()) {
                Some(text) => successes.push((sentence.clone(), split_result_lines(&text))),
                None => still_failed.push(sentence.clone()),
            }
        }

        persister.persist_successes(&successes)?;
        summary.succeeded += successes.len();

        let mut changed = false;
        for (sentence, _) in &successes {
            changed |= failed.remove(sentence.index);
        }
        for sentence in &still_failed {
            changed |= failed.insert(sentence);
        }
        if changed {
            persister.write_failures(failed)?;
        }

        debug!("{} succeeded, {} failed", successes.len(), still_failed.len());
        Ok(still_failed)
    }

    fn finish(&self, mut summary: RunSummary, start_time: Instant) -> RunSummary {
        summary.duration = start_time.elapsed();
        info!(
            "Done in {}: {} succeeded, {} failed, {}/{} batches",
            Self::format_duration(summary.duration),
            summary.succeeded,
            summary.failed.len(),
            summary.batches_run,
            summary.batches_total
        );
        if !summary.failed.is_empty() {
            warn!(
                "Failed sentences are listed in {} (run `retry-failed` to process them again)",
                self.config.output.failed_log.display()
            );
        }
        summary
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
