/*!
 * Plain-text success and failure logs.
 */

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;
use crate::judgment::parsing::ParsedResult;
use crate::sentence_loader::IndexedSentence;

static FAILURE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(\d+)\]\s+(.*)$").expect("valid regex"));

/// Separator closing each success block
pub const BLOCK_SEPARATOR: &str = "----------------------------------------";

/// Sentences without a successful result, keyed by index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailedSet {
    entries: BTreeMap<usize, String>,
}

impl FailedSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; returns true when the set changed
    pub fn insert(&mut self, sentence: &IndexedSentence) -> bool {
        self.entries.insert(sentence.index, sentence.text.clone()).as_deref() != Some(sentence.text.as_str())
    }

    /// Forget a sentence that succeeded; returns true when it was present
    pub fn remove(&mut self, index: usize) -> bool {
        self.entries.remove(&index).is_some()
    }

    /// Whether `index` is currently failed
    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    /// Number of failed sentences
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing failed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Failed sentences in index order
    pub fn sentences(&self) -> Vec<IndexedSentence> {
        self.entries
            .iter()
            .map(|(index, text)| IndexedSentence::new(*index, text.clone()))
            .collect()
    }
}

impl FromIterator<IndexedSentence> for FailedSet {
    fn from_iter<I: IntoIterator<Item = IndexedSentence>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|s| (s.index, s.text)).collect(),
        }
    }
}

/// Appends one block per successful sentence
#[derive(Debug, Clone)]
pub struct SuccessLog {
    path: PathBuf,
}

impl SuccessLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the block for one success
    pub fn format_block(sentence: &IndexedSentence, parsed: &ParsedResult) -> String {
        format!(
            "[行号 {}] {}\nAI判断: {}\nAI理解: {}\n{}\n",
            sentence.index,
            sentence.text,
            parsed.judgment_or_empty(),
            parsed.explanation_or_empty(),
            BLOCK_SEPARATOR
        )
    }

    /// Append blocks for all successes in one write
    pub fn append_all(&self, successes: &[(IndexedSentence, ParsedResult)]) -> Result<()> {
        if successes.is_empty() {
            return Ok(());
        }
        let content: String = successes
            .iter()
            .map(|(sentence, parsed)| Self::format_block(sentence, parsed))
            .collect();
        FileManager::append_to_file(&self.path, &content)
    }
}

/// One `[index] sentence` line per unresolved sentence
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the log with the current failed set
    pub fn write(&self, failed: &FailedSet) -> Result<()> {
        let content: String = failed
            .sentences()
            .iter()
            .map(|sentence| format!("{}\n", sentence))
            .collect();
        FileManager::write_to_file(&self.path, &content)
    }

    /// Read the log back; a missing file is an empty log
    pub fn read(&self) -> Result<Vec<IndexedSentence>> {
        if !FileManager::file_exists(&self.path) {
            return Ok(Vec::new());
        }
        let content = FileManager::read_to_string(&self.path)?;
        Ok(Self::parse(&content))
    }

    /// Parse log content, ignoring lines that do not match
    pub fn parse(content: &str) -> Vec<IndexedSentence> {
        content
            .lines()
            .filter_map(|line| {
                let captures = FAILURE_LINE.captures(line.trim())?;
                let index = captures[1].parse::<usize>().ok()?;
                Some(IndexedSentence::new(index, captures[2].trim()))
            })
            .collect()
    }
}
