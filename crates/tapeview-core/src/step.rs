// ABOUTME: Defines the closed Step taxonomy recorded on a tape and its JSON wire form.
// ABOUTME: Control-flow steps (call, return, broadcast, jump) are typed; everything else is a generic agent step or observation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::path::AgentPath;

pub const CALL_KIND: &str = "call";
pub const RESPOND_KIND: &str = "return";
pub const BROADCAST_KIND: &str = "broadcast";
pub const JUMP_KIND: &str = "jump";

const RESERVED_KINDS: [&str; 4] = [CALL_KIND, RESPOND_KIND, BROADCAST_KIND, JUMP_KIND];

/// Errors raised while decoding a step from its wire form.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step has no kind")]
    MissingKind,

    #[error("{kind} step must be attributed to an agent via `by`")]
    MissingAuthor { kind: String },

    #[error("invalid fields for {kind} step: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The caller invokes a named subagent.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub by: AgentPath,
    pub prompt_id: String,
    pub agent_name: String,
    pub content: String,
}

/// The callee finishes its turn and hands control back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Respond {
    pub by: AgentPath,
    pub prompt_id: String,
    pub content: String,
}

/// Fan-out message to several subagents. The sender stays active.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub by: AgentPath,
    pub prompt_id: String,
    pub content: String,
    pub from: String,
    pub to: Vec<String>,
}

/// Explicit transfer to a node index within the author's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Jump {
    pub by: AgentPath,
    pub prompt_id: String,
    pub next_node: usize,
}

/// Any other step produced by an agent's own reasoning (thoughts, actions, final answers).
/// `kind` must not be one of the control-flow kinds, or the step will decode
/// back as that control-flow step.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStep {
    pub kind: String,
    pub by: AgentPath,
    pub prompt_id: String,
    pub data: Map<String, Value>,
}

/// Input produced outside any agent, e.g. tool or environment output.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub kind: String,
    pub data: Map<String, Value>,
}

/// A single event on a tape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum Step {
    Call(Call),
    Respond(Respond),
    Broadcast(Broadcast),
    Jump(Jump),
    Agent(AgentStep),
    Observation(Observation),
}

impl Step {
    pub fn call(by: AgentPath, agent_name: impl Into<String>, content: impl Into<String>) -> Self {
        Step::Call(Call {
            by,
            prompt_id: String::new(),
            agent_name: agent_name.into(),
            content: content.into(),
        })
    }

    pub fn respond(by: AgentPath, content: impl Into<String>) -> Self {
        Step::Respond(Respond {
            by,
            prompt_id: String::new(),
            content: content.into(),
        })
    }

    /// Broadcast from `by` to the named subagents. `from` defaults to the author's short name.
    pub fn broadcast<I, S>(by: AgentPath, content: impl Into<String>, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Step::Broadcast(Broadcast {
            from: by.name().to_string(),
            by,
            prompt_id: String::new(),
            content: content.into(),
            to: to.into_iter().map(Into::into).collect(),
        })
    }

    pub fn jump(by: AgentPath, next_node: usize) -> Self {
        Step::Jump(Jump {
            by,
            prompt_id: String::new(),
            next_node,
        })
    }

    pub fn agent(kind: impl Into<String>, by: AgentPath, prompt_id: impl Into<String>) -> Self {
        Step::Agent(AgentStep {
            kind: kind.into(),
            by,
            prompt_id: prompt_id.into(),
            data: Map::new(),
        })
    }

    pub fn observation(kind: impl Into<String>) -> Self {
        Step::Observation(Observation {
            kind: kind.into(),
            data: Map::new(),
        })
    }

    /// Set the prompt id on an agent-attributed step. No-op for observations.
    pub fn with_prompt_id(mut self, id: impl Into<String>) -> Self {
        if let Some(slot) = self.prompt_id_mut() {
            *slot = id.into();
        }
        self
    }

    /// Attach a free-form field. No-op for the typed control-flow steps.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        match &mut self {
            Step::Agent(s) => {
                s.data.insert(key.into(), value);
            }
            Step::Observation(s) => {
                s.data.insert(key.into(), value);
            }
            _ => {}
        }
        self
    }

    /// The discriminator used for `steps_by_kind` and the wire form.
    pub fn kind(&self) -> &str {
        match self {
            Step::Call(_) => CALL_KIND,
            Step::Respond(_) => RESPOND_KIND,
            Step::Broadcast(_) => BROADCAST_KIND,
            Step::Jump(_) => JUMP_KIND,
            Step::Agent(s) => &s.kind,
            Step::Observation(s) => &s.kind,
        }
    }

    /// Author of the step; `None` for observations.
    pub fn by(&self) -> Option<&AgentPath> {
        match self {
            Step::Call(s) => Some(&s.by),
            Step::Respond(s) => Some(&s.by),
            Step::Broadcast(s) => Some(&s.by),
            Step::Jump(s) => Some(&s.by),
            Step::Agent(s) => Some(&s.by),
            Step::Observation(_) => None,
        }
    }

    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Step::Call(s) => Some(&s.prompt_id),
            Step::Respond(s) => Some(&s.prompt_id),
            Step::Broadcast(s) => Some(&s.prompt_id),
            Step::Jump(s) => Some(&s.prompt_id),
            Step::Agent(s) => Some(&s.prompt_id),
            Step::Observation(_) => None,
        }
    }

    fn prompt_id_mut(&mut self) -> Option<&mut String> {
        match self {
            Step::Call(s) => Some(&mut s.prompt_id),
            Step::Respond(s) => Some(&mut s.prompt_id),
            Step::Broadcast(s) => Some(&mut s.prompt_id),
            Step::Jump(s) => Some(&mut s.prompt_id),
            Step::Agent(s) => Some(&mut s.prompt_id),
            Step::Observation(_) => None,
        }
    }

    /// True for everything an agent produced, control-flow steps included.
    pub fn is_agent_step(&self) -> bool {
        !matches!(self, Step::Observation(_))
    }

    pub fn is_call_or_respond(&self) -> bool {
        matches!(self, Step::Call(_) | Step::Respond(_))
    }

    /// Text payload, when the step carries one.
    pub fn content(&self) -> Option<&str> {
        match self {
            Step::Call(s) => Some(&s.content),
            Step::Respond(s) => Some(&s.content),
            Step::Broadcast(s) => Some(&s.content),
            Step::Agent(s) => s.data.get("content").and_then(Value::as_str),
            Step::Observation(s) => s.data.get("content").and_then(Value::as_str),
            Step::Jump(_) => None,
        }
    }
}

/// A step routed between agents and recorded in the message index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "Step")]
pub enum Message {
    Call(Call),
    Respond(Respond),
    Broadcast(Broadcast),
}

impl Message {
    pub fn by(&self) -> &AgentPath {
        match self {
            Message::Call(m) => &m.by,
            Message::Respond(m) => &m.by,
            Message::Broadcast(m) => &m.by,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Call(_) => CALL_KIND,
            Message::Respond(_) => RESPOND_KIND,
            Message::Broadcast(_) => BROADCAST_KIND,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::Call(m) => &m.content,
            Message::Respond(m) => &m.content,
            Message::Broadcast(m) => &m.content,
        }
    }
}

impl From<Message> for Step {
    fn from(message: Message) -> Self {
        match message {
            Message::Call(m) => Step::Call(m),
            Message::Respond(m) => Step::Respond(m),
            Message::Broadcast(m) => Step::Broadcast(m),
        }
    }
}

/// Wire form shared by every step: `kind`, optional `by` and `prompt_id`,
/// and the kind-specific fields inline.
#[derive(Debug, Serialize, Deserialize)]
struct RawStep {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    by: Option<AgentPath>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    prompt_id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct CallFields {
    agent_name: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct RespondFields {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct BroadcastFields {
    content: String,
    #[serde(rename = "from_")]
    from: String,
    to: Vec<String>,
}

#[derive(Deserialize)]
struct JumpFields {
    next_node: usize,
}

fn decode_fields<T: for<'de> Deserialize<'de>>(
    kind: &str,
    fields: Map<String, Value>,
) -> Result<T, StepError> {
    serde_json::from_value(Value::Object(fields)).map_err(|source| StepError::InvalidFields {
        kind: kind.to_string(),
        source,
    })
}

impl TryFrom<RawStep> for Step {
    type Error = StepError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let RawStep {
            kind,
            by,
            prompt_id,
            fields,
        } = raw;
        let kind = match kind {
            Some(kind) if !kind.is_empty() => kind,
            _ => return Err(StepError::MissingKind),
        };

        if !RESERVED_KINDS.contains(&kind.as_str()) {
            return Ok(match by {
                Some(by) => Step::Agent(AgentStep {
                    kind,
                    by,
                    prompt_id,
                    data: fields,
                }),
                None => Step::Observation(Observation { kind, data: fields }),
            });
        }

        let by = by.ok_or_else(|| StepError::MissingAuthor { kind: kind.clone() })?;
        let step = match kind.as_str() {
            CALL_KIND => {
                let f: CallFields = decode_fields(&kind, fields)?;
                Step::Call(Call {
                    by,
                    prompt_id,
                    agent_name: f.agent_name,
                    content: f.content,
                })
            }
            RESPOND_KIND => {
                let f: RespondFields = decode_fields(&kind, fields)?;
                Step::Respond(Respond {
                    by,
                    prompt_id,
                    content: f.content,
                })
            }
            BROADCAST_KIND => {
                let f: BroadcastFields = decode_fields(&kind, fields)?;
                Step::Broadcast(Broadcast {
                    by,
                    prompt_id,
                    content: f.content,
                    from: f.from,
                    to: f.to,
                })
            }
            _ => {
                let f: JumpFields = decode_fields(&kind, fields)?;
                Step::Jump(Jump {
                    by,
                    prompt_id,
                    next_node: f.next_node,
                })
            }
        };
        Ok(step)
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let kind = step.kind().to_string();
        let mut fields = Map::new();
        let (by, prompt_id) = match step {
            Step::Call(s) => {
                fields.insert("agent_name".into(), Value::String(s.agent_name));
                fields.insert("content".into(), Value::String(s.content));
                (Some(s.by), s.prompt_id)
            }
            Step::Respond(s) => {
                fields.insert("content".into(), Value::String(s.content));
                (Some(s.by), s.prompt_id)
            }
            Step::Broadcast(s) => {
                fields.insert("content".into(), Value::String(s.content));
                fields.insert("from_".into(), Value::String(s.from));
                fields.insert(
                    "to".into(),
                    Value::Array(s.to.into_iter().map(Value::String).collect()),
                );
                (Some(s.by), s.prompt_id)
            }
            Step::Jump(s) => {
                fields.insert("next_node".into(), Value::from(s.next_node));
                (Some(s.by), s.prompt_id)
            }
            Step::Agent(s) => {
                fields = s.data;
                (Some(s.by), s.prompt_id)
            }
            Step::Observation(s) => {
                fields = s.data;
                (None, String::new())
            }
        };
        // envelope keys win over anything smuggled in through `data`
        for key in ["kind", "by", "prompt_id"] {
            fields.remove(key);
        }
        RawStep {
            kind: Some(kind),
            by,
            prompt_id,
            fields,
        }
    }
}
