// ABOUTME: TapeView accumulates the steps one agent frame has seen and its turn counter.
// ABOUTME: Also records the result step each exited subagent handed back to this frame.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::path::AgentPath;
use crate::step::Step;

/// Errors from looking up a subagent output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no output recorded for subagent {0:?}")]
    UnknownSubagent(String),

    #[error("output index {index} out of range ({len} outputs recorded)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Selects a subagent output either by exit order or by subagent name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRef<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for OutputRef<'_> {
    fn from(index: usize) -> Self {
        OutputRef::Index(index)
    }
}

impl<'a> From<&'a str> for OutputRef<'a> {
    fn from(name: &'a str) -> Self {
        OutputRef::Name(name)
    }
}

/// The part of a tape visible to one agent instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TapeView {
    pub agent_name: String,
    pub agent_full_name: AgentPath,
    pub steps: Vec<Step>,
    pub steps_by_kind: BTreeMap<String, Vec<Step>>,
    pub next_node: usize,
    pub last_prompt_id: String,
    /// Result step per subagent, ordered by the first time each subagent exited.
    pub outputs_by_subagent: IndexMap<String, Step>,
}

impl TapeView {
    pub fn new(agent_name: impl Into<String>, agent_full_name: AgentPath) -> Self {
        Self {
            agent_name: agent_name.into(),
            agent_full_name,
            steps: Vec::new(),
            steps_by_kind: BTreeMap::new(),
            next_node: 0,
            last_prompt_id: String::new(),
            outputs_by_subagent: IndexMap::new(),
        }
    }

    /// The synthetic frame at the bottom of every stack.
    pub fn root() -> Self {
        Self::new(crate::path::ROOT, AgentPath::root())
    }

    /// Record a step in order and under its kind.
    pub fn add_step(&mut self, step: Step) {
        self.steps_by_kind
            .entry(step.kind().to_string())
            .or_default()
            .push(step.clone());
        self.steps.push(step);
    }

    pub fn get_output<'a>(&self, which: impl Into<OutputRef<'a>>) -> Result<&Step, LookupError> {
        match which.into() {
            OutputRef::Index(index) => self
                .outputs_by_subagent
                .get_index(index)
                .map(|(_, step)| step)
                .ok_or(LookupError::IndexOutOfRange {
                    index,
                    len: self.outputs_by_subagent.len(),
                }),
            OutputRef::Name(name) => self
                .outputs_by_subagent
                .get(name)
                .ok_or_else(|| LookupError::UnknownSubagent(name.to_string())),
        }
    }

    pub fn steps_of_kind(&self, kind: &str) -> &[Step] {
        self.steps_by_kind
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }
}
