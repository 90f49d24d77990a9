// ABOUTME: Defines Tape, the immutable ordered log of steps, plus its metadata envelope.
// ABOUTME: Every edit is copy-on-write and mints a fresh ULID so identity-keyed caches never see stale content.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::step::Step;

/// Errors from editing a tape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TapeError {
    #[error("cannot pop {requested} steps from a tape of {len}")]
    PopTooMany { requested: usize, len: usize },
}

/// Identity and provenance of a tape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeMetadata {
    pub id: Ulid,
    /// The tape this one was derived from by appending steps, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Ulid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TapeMetadata {
    fn fresh(parent_id: Option<Ulid>, author: Option<String>) -> Self {
        Self {
            id: Ulid::new(),
            parent_id,
            author,
            created_at: Utc::now(),
        }
    }
}

/// An append-only run history. Steps cannot be changed in place; the
/// editing methods return a new tape with a new id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tape {
    pub metadata: TapeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    steps: Arc<[Step]>,
}

impl Tape {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            metadata: TapeMetadata::fresh(None, None),
            context: None,
            steps: steps.into(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.metadata.author = Some(author.into());
        self
    }

    pub fn id(&self) -> Ulid {
        self.metadata.id
    }

    pub fn parent_id(&self) -> Option<Ulid> {
        self.metadata.parent_id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Shared handle to the step slice; cheap to clone.
    pub fn shared_steps(&self) -> Arc<[Step]> {
        Arc::clone(&self.steps)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Same content under a new identity, with no parent link.
    pub fn with_new_id(&self) -> Self {
        self.derive(self.steps.to_vec(), None)
    }

    /// New tape with one more step. The result records this tape as its parent.
    pub fn append(&self, step: Step) -> Self {
        self.extend(std::iter::once(step))
    }

    /// New tape with the given steps appended. The result records this tape as its parent.
    pub fn extend(&self, steps: impl IntoIterator<Item = Step>) -> Self {
        let mut all = self.steps.to_vec();
        all.extend(steps);
        self.derive(all, Some(self.id()))
    }

    /// New tape keeping only the first `n` steps.
    pub fn truncate(&self, n: usize) -> Self {
        let keep = n.min(self.steps.len());
        self.derive(self.steps[..keep].to_vec(), None)
    }

    /// New tape without the last `n` steps. Fails if the tape holds fewer than `n`.
    pub fn pop(&self, n: usize) -> Result<Self, TapeError> {
        let len = self.steps.len();
        let keep = len
            .checked_sub(n)
            .ok_or(TapeError::PopTooMany { requested: n, len })?;
        Ok(self.truncate(keep))
    }

    fn derive(&self, steps: Vec<Step>, parent_id: Option<Ulid>) -> Self {
        Self {
            metadata: TapeMetadata::fresh(parent_id, self.metadata.author.clone()),
            context: self.context.clone(),
            steps: steps.into(),
        }
    }
}
