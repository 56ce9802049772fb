/*!
 * In-memory view of the result table.
 *
 * The whole file is read, changed in memory and written back through a
 * temporary file in the same directory, which is then renamed over the
 * original. Cells outside the two result columns are never touched.
 */

use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::AppError;
use crate::file_utils::FileManager;
use crate::judgment::parsing::ParsedResult;
use crate::sentence_loader::IndexedSentence;

/// Header plus data rows of a CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ResultTable {
    /// Read a table; the first record is the header
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::File(format!("Result table not found: {}", path.display())));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut records = reader.records();
        let headers = match records.next() {
            Some(record) => record?.iter().map(str::to_string).collect(),
            None => Vec::new(),
        };
        let mut rows = Vec::new();
        for record in records {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    /// Build a table in memory, to be written with `save`
    pub fn new(path: impl Into<PathBuf>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            path: path.into(),
            headers,
            rows,
        }
    }

    /// Location the table is saved to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header cells
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Cell value, `None` outside the stored data
    pub fn cell(&self, row_offset: usize, column: usize) -> Option<&str> {
        self.rows.get(row_offset).and_then(|row| row.get(column)).map(String::as_str)
    }

    /// Position of a header
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Position of a header, appending it when absent
    pub fn ensure_column(&mut self, name: &str) -> usize {
        match self.column_index(name) {
            Some(position) => position,
            None => {
                debug!("Adding column '{}' to {}", name, self.path.display());
                self.headers.push(name.to_string());
                self.headers.len() - 1
            }
        }
    }

    /// Extend every short row with empty cells up to the header width
    pub fn pad_rows(&mut self) {
        let width = self.headers.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
    }

    /// Overwrite one cell, creating missing rows and cells on the way
    pub fn set_cell(&mut self, row_offset: usize, column: usize, value: &str) {
        let width = self.headers.len().max(column + 1);
        if self.rows.len() <= row_offset {
            self.rows.resize_with(row_offset + 1, || vec![String::new(); width]);
        }
        let row = &mut self.rows[row_offset];
        if row.len() <= column {
            row.resize(width, String::new());
        }
        row[column] = value.to_string();
    }

    /// Write one parsed result into the judgment and explanation columns
    pub fn apply_result(
        &mut self,
        sentence: &IndexedSentence,
        parsed: &ParsedResult,
        judgment_column: usize,
        explanation_column: usize,
    ) {
        let row = sentence.row_offset();
        self.set_cell(row, judgment_column, parsed.judgment_or_empty());
        self.set_cell(row, explanation_column, parsed.explanation_or_empty());
    }

    /// Ensure both result columns exist and write every result, returning how many were written
    pub fn merge_results(
        &mut self,
        judgment_column: &str,
        explanation_column: &str,
        results: &[(IndexedSentence, ParsedResult)],
    ) -> usize {
        let judgment = self.ensure_column(judgment_column);
        let explanation = self.ensure_column(explanation_column);
        self.pad_rows();
        for (sentence, parsed) in results {
            self.apply_result(sentence, parsed, judgment, explanation);
        }
        results.len()
    }

    /// Replace the file on disk with the table's content
    pub fn save(&self) -> Result<(), AppError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        FileManager::ensure_dir(&directory)?;

        let mut temp = tempfile::NamedTempFile::new_in(&directory)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(temp.as_file_mut());
            if !self.headers.is_empty() {
                writer.write_record(&self.headers)?;
            }
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }

        temp.persist(&self.path).map_err(|e| {
            AppError::File(format!("Failed to replace {}: {}", self.path.display(), e.error))
        })?;
        debug!("Saved {} rows to {}", self.rows.len(), self.path.display());
        Ok(())
    }
}
