//! # Hoteltune Core
//!
//! Data preparation and fine-tuning for a hotel customer-service assistant:
//! filter raw Q&A pairs, convert them into tuning records and drive a
//! supervised tuning job on Vertex AI.
//!
//! ## Architecture
//!
//! - `dataset/` - record shapes, JSONL I/O, validation and splitting
//! - `quality/` - rule stage, filter pipeline and quality report
//! - `judge/` - batched LLM-as-judge prompt, parsing and retries
//! - `llm/` - the `LlmClient` seam and the Gemini REST client
//! - `convert` - raw pairs to tuning records
//! - `tuning/` - Cloud Storage upload, tuning jobs and polling
//! - `models` / `config` / `auth` - settings and credentials
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hoteltune_core::config::ProcessingConfig;
//! use hoteltune_core::quality::{QualityFilter, RuleConfig};
//!
//! let filter = QualityFilter::rules_only(RuleConfig::default());
//! let run = filter.run(input, output, &ProcessingConfig::default()).await?;
//! println!("kept {}", run.report.summary.high_quality_entries);
//! ```

pub mod auth;
pub mod config;
pub mod convert;
pub mod dataset;
pub mod error;
pub(crate) mod http;
pub mod judge;
pub mod llm;
pub mod models;
pub mod quality;
pub mod tuning;
