/*!
 * Sentence table loading.
 *
 * Reads the sentence column of a CSV table and gives every data row a stable
 * 1-based index. That index is the join key used when results are written back,
 * so rows that are skipped still consume their number.
 */

use std::fmt;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Punctuation accepted as the end of a sentence (ASCII and full-width)
pub const SENTENCE_TERMINATORS: [char; 6] = ['。', '.', '！', '!', '？', '?'];

/// Appended to sentences that end without punctuation
pub const DEFAULT_TERMINATOR: char = '。';

/// A sentence together with its data-row position in the source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSentence {
    /// 1-based data-row number (header excluded)
    pub index: usize,
    /// Normalized sentence text
    pub text: String,
}

impl IndexedSentence {
    /// Create a new indexed sentence
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Zero-based row position among the table's data rows
    pub fn row_offset(&self) -> usize {
        self.index.saturating_sub(1)
    }
}

impl fmt::Display for IndexedSentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.text)
    }
}

/// Trim a sentence and make sure it ends with sentence punctuation
pub fn normalize_sentence(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut sentence = trimmed.to_string();
    if !trimmed.ends_with(SENTENCE_TERMINATORS) {
        sentence.push(DEFAULT_TERMINATOR);
    }
    sentence
}

/// Load the sentences of a table whose first column holds the text
///
/// The header row is skipped. Rows with an empty first cell are not returned but
/// keep their index, so later rows stay aligned with the file.
pub fn load_sentences<P: AsRef<Path>>(path: P) -> Result<Vec<IndexedSentence>, AppError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AppError::File(format!("Sentence table not found: {}", path.display())));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut sentences = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        let index = offset + 1;
        match record.get(0).map(str::trim) {
            Some(text) if !text.is_empty() => {
                sentences.push(IndexedSentence::new(index, normalize_sentence(text)));
            }
            _ => debug!("Skipping row {} with an empty sentence cell", index),
        }
    }

    debug!("Loaded {} sentences from {}", sentences.len(), path.display());
    Ok(sentences)
}
