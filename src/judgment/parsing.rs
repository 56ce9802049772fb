/*!
 * Response parsing.
 *
 * A model response is read as a judgment (its first non-blank line) followed by
 * an explanation (every other non-blank line).
 */

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.*?)__").expect("valid regex"));
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("valid regex"));
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(.*?)_").expect("valid regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`(.*?)`").expect("valid regex"));

/// Judgment and explanation extracted from one response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedResult {
    /// First non-blank line
    pub judgment: Option<String>,
    /// Remaining non-blank lines joined by newlines; empty when there are none
    pub explanation: Option<String>,
}

impl ParsedResult {
    /// Judgment cell value
    pub fn judgment_or_empty(&self) -> &str {
        self.judgment.as_deref().unwrap_or_default()
    }

    /// Explanation cell value
    pub fn explanation_or_empty(&self) -> &str {
        self.explanation.as_deref().unwrap_or_default()
    }
}

/// Split a response into judgment and explanation
///
/// Lines are trimmed and blank lines dropped. When nothing survives both
/// fields are `None`.
pub fn split_result_lines(text: &str) -> ParsedResult {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match lines.split_first() {
        None => ParsedResult::default(),
        Some((first, rest)) => ParsedResult {
            judgment: Some((*first).to_string()),
            explanation: Some(rest.join("\n")),
        },
    }
}

/// Remove markdown emphasis and inline code markers, keeping their content
pub fn clean_formatting(text: &str) -> String {
    let text = BOLD_STARS.replace_all(text, "$1");
    let text = BOLD_UNDERSCORES.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    text.into_owned()
}
