/*!
 * Result persistence.
 *
 * - `table`: result columns merged into the CSV table by row index
 * - `logs`: appended success blocks and the rewritten failure log
 */

use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::judgment::parsing::ParsedResult;
use crate::sentence_loader::IndexedSentence;

pub mod logs;
pub mod table;

pub use logs::{FailedSet, FailureLog, SuccessLog};
pub use table::ResultTable;

/// Writes results to the table and both logs
#[derive(Debug, Clone)]
pub struct ResultPersister {
    table_path: PathBuf,
    judgment_column: String,
    explanation_column: String,
    success_log: SuccessLog,
    failure_log: FailureLog,
}

impl ResultPersister {
    pub fn from_config(config: &Config) -> Self {
        Self {
            table_path: config.result_csv_path(),
            judgment_column: config.output.judgment_column.clone(),
            explanation_column: config.output.explanation_column.clone(),
            success_log: SuccessLog::new(&config.output.success_log),
            failure_log: FailureLog::new(&config.output.failed_log),
        }
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    pub fn failure_log(&self) -> &FailureLog {
        &self.failure_log
    }

    pub fn success_log(&self) -> &SuccessLog {
        &self.success_log
    }

    /// Create the result table as a copy of the source when they differ and it does not exist yet
    pub fn prepare_table(&self, source: &Path) -> Result<()> {
        if self.table_path != source && !FileManager::file_exists(&self.table_path) {
            info!("Creating result table {} from {}", self.table_path.display(), source.display());
            FileManager::copy_file(source, &self.table_path)?;
        }
        Ok(())
    }

    /// Merge successes into the table, then append them to the success log
    pub fn persist_successes(&self, successes: &[(IndexedSentence, ParsedResult)]) -> Result<()> {
        if successes.is_empty() {
            return Ok(());
        }

        let mut table = ResultTable::load(&self.table_path)
            .with_context(|| format!("Failed to load result table {}", self.table_path.display()))?;
        table.merge_results(&self.judgment_column, &self.explanation_column, successes);
        table
            .save()
            .with_context(|| format!("Failed to save result table {}", self.table_path.display()))?;

        self.success_log
            .append_all(successes)
            .context("Failed to append to success log")
    }

    /// Rewrite the failure log from the current failed set
    pub fn write_failures(&self, failed: &FailedSet) -> Result<()> {
        self.failure_log
            .write(failed)
            .context("Failed to write failure log")
    }
}
