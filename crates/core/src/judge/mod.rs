//! # Judge
//!
//! Batched LLM-as-judge scoring for entries that survived the rule stage.
//!
//! - `prompt` - builds the numbered batch prompt
//! - `parse` - pulls per-item verdicts out of free-form model text
//! - `evaluator` - retries, backoff and the verdict-to-evaluation mapping

pub mod evaluator;
pub mod parse;
pub mod prompt;

pub use evaluator::{Evaluation, JudgeEvaluator, JudgeSettings};
pub use parse::{parse_judge_response, JudgeVerdict, ParseError};
pub use prompt::build_evaluation_prompt;
