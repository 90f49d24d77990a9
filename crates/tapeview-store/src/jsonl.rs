// ABOUTME: Append-only JSONL step log, one JSON-serialized step per line.
// ABOUTME: Provides crash-safe append, sequential replay into a Tape, and repair for truncated files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tapeview_core::{Step, Tape};
use thiserror::Error;

/// Errors that can occur during JSONL log operations.
#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("json error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An append-only step log backed by a file.
pub struct StepLog {
    path: PathBuf,
    file: File,
}

impl StepLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (or create) a step log at the given path, in append mode.
    /// Creates parent directories if they do not exist.
    pub fn open(path: &Path) -> Result<Self, JsonlError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one step as a JSON line and fsync.
    pub fn append(&mut self, step: &Step) -> Result<(), JsonlError> {
        let json = serde_json::to_string(step)?;
        writeln!(self.file, "{}", json)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Read every step in file order. Blank lines are skipped; the first
    /// undecodable line aborts with its 1-based line number.
    pub fn replay(path: &Path) -> Result<Vec<Step>, JsonlError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut steps = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let step: Step = serde_json::from_str(&line).map_err(|source| JsonlError::Json {
                line: index + 1,
                source,
            })?;
            steps.push(step);
        }

        Ok(steps)
    }

    /// Replay the log into a fresh tape.
    pub fn load_tape(path: &Path) -> Result<Tape, JsonlError> {
        let steps = Self::replay(path)?;
        tracing::debug!(path = %path.display(), steps = steps.len(), "loaded JSONL tape");
        Ok(Tape::new(steps))
    }

    /// Write a whole tape as a fresh log, replacing any existing file.
    pub fn save_tape(path: &Path, tape: &Tape) -> Result<(), JsonlError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        for step in tape.steps() {
            writeln!(file, "{}", serde_json::to_string(step)?)?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Keep only complete, decodable lines, dropping partial trailing data.
    /// Uses temp-file + fsync + rename. Returns the number of steps kept.
    pub fn repair(path: &Path) -> Result<usize, JsonlError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut valid_lines: Vec<String> = Vec::new();
        let mut dropped = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if serde_json::from_str::<Step>(&line).is_ok() {
                valid_lines.push(line);
            } else {
                dropped += 1;
            }
        }

        let count = valid_lines.len();

        let tmp_path = path.with_extension("jsonl.tmp");
        let mut tmp_file = File::create(&tmp_path)?;
        for line in &valid_lines {
            writeln!(tmp_file, "{}", line)?;
        }
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, path)?;

        // Best-effort: the rename already succeeded if this fails.
        if let Some(parent) = path.parent()
            && let Ok(dir) = File::open(parent)
        {
            let _ = dir.sync_all();
        }

        if dropped > 0 {
            tracing::warn!(path = %path.display(), dropped, kept = count, "repaired step log");
        }
        Ok(count)
    }
}
