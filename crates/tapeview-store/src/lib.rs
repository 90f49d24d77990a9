// ABOUTME: Tape file formats for tapeview: JSONL step logs and YAML tape documents.
// ABOUTME: `load_tape` picks the format from the file extension.

pub mod jsonl;
pub mod yaml;

use std::path::Path;

use tapeview_core::Tape;
use thiserror::Error;

pub use jsonl::{JsonlError, StepLog};
pub use yaml::{YamlError, load_tape_yaml, save_tape_yaml};

/// Errors from loading a tape of either format.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("jsonl error: {0}")]
    Jsonl(#[from] JsonlError),

    #[error("yaml error: {0}")]
    Yaml(#[from] YamlError),
}

/// Load a tape from `.yaml`/`.yml` as a full document, anything else as a JSONL step log.
pub fn load_tape(path: &Path) -> Result<Tape, LoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(load_tape_yaml(path)?),
        _ => Ok(StepLog::load_tape(path)?),
    }
}
