//! # Quality
//!
//! The two-stage data-quality filter.
//!
//! ```text
//! raw JSONL ──> rules (length / keyword / format) ──> judge batches ──> threshold ──> filtered JSONL
//!                      │ rejected                        │ rejected                    + report
//! ```
//!
//! - `rules` - static predicates, no I/O
//! - `summary` - length / keyword / score statistics over all results
//! - `filter` - the orchestrating pipeline with the bounded judge pool
//! - `report` - the JSON report written next to the output

pub mod filter;
pub mod report;
pub mod rules;
pub mod summary;

use serde::{Deserialize, Serialize};

pub use filter::{FilterRun, QualityFilter};
pub use report::QualityReport;
pub use rules::{validate_entry, validate_pair, FilterStats, RuleConfig, RuleIssue, RuleVerdict};
pub use summary::{summarize, LengthStats, QualitySummary};

/// Score given to entries that pass the rules but have not been judged yet
pub const PROVISIONAL_SCORE: u8 = 5;

/// Which stage made the final call on an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStage {
    #[serde(rename = "rule_filter")]
    RuleFilter,
    #[serde(rename = "ai_evaluation")]
    JudgeEvaluation,
}

/// Final decision for one input entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    /// Position in the input file (0-based, among valid JSON lines)
    pub index: usize,
    pub kept: bool,
    /// 0 for rule rejections and unparsed judgements
    pub score: u8,
    pub reason: String,
    pub stage: FilterStage,
    pub stats: FilterStats,
}
