//! # Dataset
//!
//! Record shapes and line-delimited JSON files.
//!
//! Records flow file-to-file: raw JSONL -> filtered JSONL -> tuning-format JSONL.
//! A record's only identity is its position in the file it was read from.

pub mod io;
pub mod record;
pub mod split;
pub mod validate;

pub use io::{load_jsonl, report_path_for, write_jsonl, LoadedDataset};
pub use record::{extract_pair, Content, Part, QaPair, TuningRecord, ROLE_MODEL, ROLE_SYSTEM, ROLE_USER};
pub use split::split_dataset;
pub use validate::{validate_tuning_file, validate_tuning_record};
