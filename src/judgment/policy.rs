/*!
 * Decisions taken between batches.
 *
 * The controller asks two questions: whether to retry the sentences that
 * failed in the current batch, and whether to go on with the next batch.
 * `ConsolePolicy` asks a human, `AutoPolicy` answers from fixed settings.
 */

use log::warn;
use std::io::{self, BufRead, Write};

use crate::sentence_loader::IndexedSentence;

/// Answers the controller's between-batch questions
pub trait DecisionPolicy: Send {
    /// Retry the sentences that failed in the current batch?
    fn should_retry_failures(&mut self, failed: &[IndexedSentence]) -> bool;

    /// Process batch `next_batch` (1-based) of `total_batches`?
    fn should_continue(&mut self, next_batch: usize, total_batches: usize) -> bool;
}

/// Policy with fixed answers, for unattended runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoPolicy {
    /// Answer to "retry failures?"
    pub retry: bool,
    /// Answer to "continue?"
    pub cont: bool,
}

impl AutoPolicy {
    /// Retry and continue without asking
    pub fn unattended() -> Self {
        Self { retry: true, cont: true }
    }
}

impl DecisionPolicy for AutoPolicy {
    fn should_retry_failures(&mut self, _failed: &[IndexedSentence]) -> bool {
        self.retry
    }

    fn should_continue(&mut self, _next_batch: usize, _total_batches: usize) -> bool {
        self.cont
    }
}

/// Policy asking y/n questions on a line-based console
///
/// Either question can be pinned to a fixed answer, in which case it is not asked.
pub struct ConsolePolicy<R: BufRead, W: Write> {
    input: R,
    output: W,
    fixed_retry: Option<bool>,
    fixed_continue: Option<bool>,
}

impl ConsolePolicy<io::BufReader<io::Stdin>, io::Stderr> {
    /// Ask on stdin, prompt on stderr
    pub fn stdio(fixed_retry: Option<bool>, fixed_continue: Option<bool>) -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stderr(), fixed_retry, fixed_continue)
    }
}

impl<R: BufRead, W: Write> ConsolePolicy<R, W> {
    /// Create a console policy over arbitrary streams
    pub fn new(input: R, output: W, fixed_retry: Option<bool>, fixed_continue: Option<bool>) -> Self {
        Self {
            input,
            output,
            fixed_retry,
            fixed_continue,
        }
    }

    /// Consume the policy and return its output stream
    pub fn into_output(self) -> W {
        self.output
    }

    /// Ask until the answer is y or n; end of input counts as no
    fn ask(&mut self, question: &str) -> bool {
        loop {
            if write!(self.output, "{} (y/n): ", question).and_then(|_| self.output.flush()).is_err() {
                warn!("Could not write prompt, assuming 'n'");
                return false;
            }

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return false,
                Ok(_) => match line.trim().to_lowercase().as_str() {
                    "y" | "yes" => return true,
                    "n" | "no" => return false,
                    _ => {
                        let _ = writeln!(self.output, "Please answer y or n.");
                    }
                },
                Err(e) => {
                    warn!("Could not read answer ({}), assuming 'n'", e);
                    return false;
                }
            }
        }
    }
}

impl<R: BufRead + Send, W: Write + Send> DecisionPolicy for ConsolePolicy<R, W> {
    fn should_retry_failures(&mut self, failed: &[IndexedSentence]) -> bool {
        if let Some(answer) = self.fixed_retry {
            return answer;
        }
        let _ = writeln!(self.output, "{} sentence(s) failed:", failed.len());
        for sentence in failed {
            let _ = writeln!(self.output, "  {}", sentence);
        }
        self.ask("Retry the failed sentences?")
    }

    fn should_continue(&mut self, next_batch: usize, total_batches: usize) -> bool {
        if let Some(answer) = self.fixed_continue {
            return answer;
        }
        self.ask(&format!("Continue with batch {}/{}?", next_batch, total_batches))
    }
}
