/*!
 * Prompt templates for sentence judgments.
 *
 * Templates use positional format syntax: `{}` or `{0}` marks where the
 * sentence goes, `{{` and `}}` are literal braces. A template is parsed once
 * and rejected when it has no placeholder, so a typo cannot ship the bare
 * template to the model for every sentence.
 */

use std::path::Path;

use crate::errors::AppError;
use crate::sentence_loader::IndexedSentence;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Argument(usize),
}

/// A parsed prompt template with one or more positional slots
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    arity: usize,
}

impl PromptTemplate {
    /// Parse a template that takes a single argument (the sentence)
    pub fn parse(template: &str) -> Result<Self, AppError> {
        Self::parse_with_arity(template, 1)
    }

    /// Parse a template taking `arity` positional arguments
    ///
    /// `{}` fields are numbered automatically from zero, `{N}` fields are explicit.
    /// Every argument must be referenced at least once.
    pub fn parse_with_arity(template: &str, arity: usize) -> Result<Self, AppError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut used = vec![false; arity];
        let mut next_auto = 0usize;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => field.push(ch),
                            None => {
                                return Err(AppError::Template(format!(
                                    "unclosed '{{' in template: {}",
                                    template
                                )))
                            }
                        }
                    }
                    let position = if field.is_empty() {
                        next_auto += 1;
                        next_auto - 1
                    } else {
                        field.trim().parse::<usize>().map_err(|_| {
                            AppError::Template(format!("unsupported field '{{{}}}' in template", field))
                        })?
                    };
                    if position >= arity {
                        return Err(AppError::Template(format!(
                            "template references argument {} but only {} available",
                            position, arity
                        )));
                    }
                    used[position] = true;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Argument(position));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(AppError::Template(format!(
                        "single '}}' in template: {}",
                        template
                    )))
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if let Some(missing) = used.iter().position(|u| !u) {
            return Err(AppError::Template(format!(
                "template has no placeholder for argument {}: {}",
                missing, template
            )));
        }

        Ok(Self { segments, arity })
    }

    /// Read the active template: the first line of the file, trimmed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::File(format!("Prompt template not found: {}", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        let first_line = content.lines().next().unwrap_or_default().trim();
        Self::parse(first_line)
    }

    /// Fill the template with positional arguments
    pub fn render_args(&self, args: &[&str]) -> String {
        debug_assert_eq!(args.len(), self.arity);
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Argument(position) => {
                    rendered.push_str(args.get(*position).copied().unwrap_or_default())
                }
            }
        }
        rendered
    }

    /// Fill the sentence slot
    pub fn render(&self, sentence: &str) -> String {
        self.render_args(&[sentence])
    }

    /// One prompt per sentence, same order and length
    pub fn build_prompts(&self, sentences: &[IndexedSentence]) -> Vec<String> {
        sentences.iter().map(|s| self.render(&s.text)).collect()
    }
}
