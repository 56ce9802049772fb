/*!
 * Judgment pipeline building blocks.
 *
 * - `prompts`: template parsing and rendering
 * - `retry`: jittered, bounded retries around a completion client
 * - `dispatcher`: concurrent fan-out of one batch
 * - `parsing`: splitting a reply into judgment and explanation
 * - `policy`: retry and continue decisions between batches
 */

pub mod dispatcher;
pub mod parsing;
pub mod policy;
pub mod prompts;
pub mod retry;

pub use dispatcher::{batches, BatchDispatcher};
pub use parsing::{clean_formatting, split_result_lines, ParsedResult};
pub use policy::{AutoPolicy, ConsolePolicy, DecisionPolicy};
pub use prompts::PromptTemplate;
pub use retry::{CompletionReport, RetrySettings, RetryingClient};
