/*!
 * Scoring of collected explanations against annotated disambiguations.
 *
 * For every row that has both annotations and an AI explanation the model is
 * asked how many of the annotated readings the explanation covers. The
 * counts give precision (matches per sample) and recall (matches per
 * annotated reading).
 */

use anyhow::{Context, Result};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::app_config::ScoringConfig;
use crate::errors::AppError;
use crate::file_utils::FileManager;
use crate::judgment::{batches, BatchDispatcher, PromptTemplate};
use crate::persistence::logs::BLOCK_SEPARATOR;
use crate::persistence::ResultTable;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

/// One row to be scored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringSample {
    /// 1-based data-row number
    pub index: usize,
    /// Annotated readings
    pub disambiguations: Vec<String>,
    /// AI explanation
    pub answer: String,
}

/// Score of one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleScore {
    pub sample: ScoringSample,
    /// Matching readings, capped at the number of annotated readings
    pub matched: usize,
    /// Raw model reply, `None` when the call failed
    pub reply: Option<String>,
}

/// Aggregate metrics written as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringMetrics {
    pub precision: f64,
    pub recall: f64,
    pub total_samples: usize,
    pub total_correct: usize,
}

/// Collect the rows that have at least one reading and a non-empty answer
pub fn collect_samples(table: &ResultTable, config: &ScoringConfig) -> Result<Vec<ScoringSample>, AppError> {
    let answer_column = table.column_index(&config.answer_column).ok_or_else(|| {
        AppError::Config(format!(
            "Answer column '{}' not found in {}",
            config.answer_column,
            table.path().display()
        ))
    })?;

    let reading_columns: Vec<usize> = config
        .disambiguation_columns
        .iter()
        .filter_map(|name| {
            let position = table.column_index(name);
            if position.is_none() {
                warn!("Disambiguation column '{}' not found, ignoring it", name);
            }
            position
        })
        .collect();

    let mut samples = Vec::new();
    for row_offset in 0..table.rows().len() {
        let disambiguations: Vec<String> = reading_columns
            .iter()
            .filter_map(|column| table.cell(row_offset, *column))
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != config.none_marker)
            .map(str::to_string)
            .collect();
        let answer = table.cell(row_offset, answer_column).unwrap_or_default().trim();

        if !disambiguations.is_empty() && !answer.is_empty() {
            samples.push(ScoringSample {
                index: row_offset + 1,
                disambiguations,
                answer: answer.to_string(),
            });
        }
    }
    Ok(samples)
}

/// First run of ASCII digits in a reply
pub fn parse_match_count(reply: &str) -> Option<usize> {
    DIGITS.find(reply).and_then(|m| m.as_str().parse().ok())
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Precision and recall over all scored samples
pub fn compute_metrics(scores: &[SampleScore]) -> ScoringMetrics {
    let total_samples = scores.len();
    let total_correct: usize = scores.iter().map(|s| s.matched).sum();
    let total_gold: usize = scores.iter().map(|s| s.sample.disambiguations.len()).sum();

    let ratio = |numerator: usize, denominator: usize| {
        if denominator == 0 {
            0.0
        } else {
            round4(numerator as f64 / denominator as f64)
        }
    };

    ScoringMetrics {
        precision: ratio(total_correct, total_samples),
        recall: ratio(total_correct, total_gold),
        total_samples,
        total_correct,
    }
}

/// Text report: one block per sample, then the totals
pub fn format_report(scores: &[SampleScore], metrics: &ScoringMetrics) -> String {
    let mut report = String::new();
    for score in scores {
        report.push_str(&format!(
            "样本 {}\n原理解: {}\nAI理解: {}\n匹配个数: {} / {}\n{}\n",
            score.sample.index,
            score.sample.disambiguations.join("; "),
            score.sample.answer,
            score.matched,
            score.sample.disambiguations.len(),
            BLOCK_SEPARATOR
        ));
    }
    let total_gold: usize = scores.iter().map(|s| s.sample.disambiguations.len()).sum();
    report.push_str(&format!(
        "总样本数: {}\n总匹配数: {}\n总标准答案数: {}\nPrecision: {:.4}\nRecall: {:.4}\n",
        metrics.total_samples, metrics.total_correct, total_gold, metrics.precision, metrics.recall
    ));
    report
}

/// Asks the model for match counts
pub struct Scorer {
    dispatcher: BatchDispatcher,
    template: PromptTemplate,
    batch_size: usize,
}

impl Scorer {
    /// Create a scorer; the prompt takes the readings as `{0}` and the answer as `{1}`
    pub fn new(dispatcher: BatchDispatcher, config: &ScoringConfig, batch_size: usize) -> Result<Self, AppError> {
        let template = PromptTemplate::parse_with_arity(&config.prompt_template, 2)?;
        Ok(Self {
            dispatcher,
            template,
            batch_size,
        })
    }

    /// Score every sample, in order
    pub async fn score(&self, samples: Vec<ScoringSample>) -> Vec<SampleScore> {
        let mut scores = Vec::with_capacity(samples.len());
        for batch in batches(&samples, self.batch_size) {
            let prompts: Vec<String> = batch
                .iter()
                .map(|s| {
                    let readings = s.disambiguations.join("; ");
                    self.template.render_args(&[readings.as_str(), s.answer.as_str()])
                })
                .collect();
            let replies = self.dispatcher.run_batch(&prompts).await;

            for (sample, reply) in batch.iter().zip(replies) {
                let matched = match reply.as_deref().map(parse_match_count) {
                    Some(Some(count)) => count.min(sample.disambiguations.len()),
                    Some(None) => {
                        warn!("Row {}: no count in reply, scoring 0", sample.index);
                        0
                    }
                    None => {
                        warn!("Row {}: scoring request failed, scoring 0", sample.index);
                        0
                    }
                };
                scores.push(SampleScore {
                    sample: sample.clone(),
                    matched,
                    reply,
                });
            }
        }
        scores
    }

    /// Score a result table and write the report and metrics files
    pub async fn run(&self, table_path: &Path, config: &ScoringConfig, report_path: &Path, metrics_path: &Path) -> Result<ScoringMetrics> {
        let table = ResultTable::load(table_path)
            .with_context(|| format!("Failed to load result table {}", table_path.display()))?;
        let samples = collect_samples(&table, config)?;
        info!("Scoring {} samples from {}", samples.len(), table_path.display());

        let scores = self.score(samples).await;
        let metrics = compute_metrics(&scores);

        FileManager::write_to_file(report_path, &format_report(&scores, &metrics))?;
        let metrics_json = serde_json::to_string_pretty(&metrics).context("Failed to serialize metrics")?;
        FileManager::write_to_file(metrics_path, &metrics_json)?;

        info!(
            "Precision {:.4}, recall {:.4} over {} samples",
            metrics.precision, metrics.recall, metrics.total_samples
        );
        Ok(metrics)
    }
}
