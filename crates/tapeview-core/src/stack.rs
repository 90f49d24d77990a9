// ABOUTME: TapeViewStack, the call-stack state machine that folds a tape into per-agent frames.
// ABOUTME: Handles call/return push-pop, subagent output selection, message routing, and node counting.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::path::AgentPath;
use crate::step::{Broadcast, Call, Message, Respond, Step};
use crate::tape::Tape;
use crate::view::TapeView;

/// Errors from applying a single step.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackError {
    #[error("return by {by} with no open call: only the root frame is on the stack")]
    UnbalancedRespond { by: AgentPath },
}

/// A step failed while folding a sequence; nothing after `index` was applied.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("step {index}: {source}")]
pub struct ReplayError {
    pub index: usize,
    #[source]
    pub source: StackError,
}

/// Stack of tape views for the agents in the current call chain.
///
/// If agent A calls B and B calls C, the frames are:
/// ```text
/// 0: root (A's frame)
/// 1: B
/// 2: C
/// ```
/// Frame 0 is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TapeViewStack {
    stack: Vec<TapeView>,
    messages_by_agent: BTreeMap<AgentPath, Vec<Message>>,
}

impl Default for TapeViewStack {
    fn default() -> Self {
        Self {
            stack: vec![TapeView::root()],
            messages_by_agent: BTreeMap::new(),
        }
    }
}

impl TapeViewStack {
    /// A stack holding only the root frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every step of `tape` into a fresh stack. Not cached; see
    /// [`crate::ViewStackCache`] for the memoized entry point.
    pub fn compute(tape: &Tape) -> Result<Self, ReplayError> {
        Self::replay(tape.steps())
    }

    /// Fold a step sequence into a fresh stack.
    pub fn replay<'a>(steps: impl IntoIterator<Item = &'a Step>) -> Result<Self, ReplayError> {
        let mut stack = Self::new();
        stack.apply_steps(steps, 0)?;
        Ok(stack)
    }

    /// Apply steps in order. `first_index` is the tape position of the first
    /// step and is only used for error reporting.
    pub fn apply_steps<'a>(
        &mut self,
        steps: impl IntoIterator<Item = &'a Step>,
        first_index: usize,
    ) -> Result<(), ReplayError> {
        for (offset, step) in steps.into_iter().enumerate() {
            self.update(step).map_err(|source| ReplayError {
                index: first_index + offset,
                source,
            })?;
        }
        Ok(())
    }

    /// The currently active frame.
    pub fn top(&self) -> &TapeView {
        // stack is never empty
        &self.stack[self.stack.len() - 1]
    }

    fn top_mut(&mut self) -> &mut TapeView {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Number of frames, root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Frames from root (index 0) to the active one.
    pub fn frames(&self) -> &[TapeView] {
        &self.stack
    }

    pub fn messages_by_agent(&self) -> &BTreeMap<AgentPath, Vec<Message>> {
        &self.messages_by_agent
    }

    /// Calls, returns, and broadcasts addressed to or sent from `path`, in tape order.
    pub fn messages_for(&self, path: &AgentPath) -> &[Message] {
        self.messages_by_agent
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when `step` was authored by the agent owning the top frame.
    ///
    /// The stack does not know the real name of the agent at the bottom of
    /// the chain, so the first path segment is ignored on both sides.
    pub fn is_step_by_active_agent(&self, step: &Step) -> bool {
        match step.by() {
            Some(by) => by.same_agent(&self.top().agent_full_name),
            None => false,
        }
    }

    /// Apply one step.
    pub fn update(&mut self, step: &Step) -> Result<(), StackError> {
        tracing::trace!(kind = step.kind(), depth = self.depth(), "applying step");

        match step {
            Step::Call(call) => self.push_frame(call),
            Step::Broadcast(broadcast) => self.broadcast(broadcast),
            Step::Respond(respond) => self.pop_frame(respond)?,
            Step::Jump(jump) => self.top_mut().next_node = jump.next_node,
            Step::Agent(_) | Step::Observation(_) => self.top_mut().add_step(step.clone()),
        }

        // Frames are identified by agent path only, so a recursive call to the
        // same agent would be indistinguishable from its caller here.
        if self.is_step_by_active_agent(step) {
            let prompt_id = step.prompt_id().unwrap_or_default().to_string();
            let top = self.top_mut();
            if !matches!(step, Step::Jump(_)) && prompt_id != top.last_prompt_id {
                top.next_node += 1;
            }
            top.last_prompt_id = prompt_id;
        }

        Ok(())
    }

    fn push_frame(&mut self, call: &Call) {
        let top = self.top_mut();
        top.add_step(Step::Call(call.clone()));
        let full_name = top.agent_full_name.child(&call.agent_name);

        tracing::debug!(
            caller = %call.by,
            callee = %full_name,
            depth = self.depth() + 1,
            "pushing frame"
        );
        self.stack
            .push(TapeView::new(call.agent_name.clone(), full_name));

        let receiver = call.by.child(&call.agent_name);
        self.route(call.by.clone(), Message::Call(call.clone()));
        self.route(receiver, Message::Call(call.clone()));
    }

    fn pop_frame(&mut self, respond: &Respond) -> Result<(), StackError> {
        if self.stack.len() == 1 {
            return Err(StackError::UnbalancedRespond {
                by: respond.by.clone(),
            });
        }
        let popped = self
            .stack
            .pop()
            .ok_or_else(|| StackError::UnbalancedRespond {
                by: respond.by.clone(),
            })?;

        if !respond.by.same_agent(&popped.agent_full_name) {
            tracing::warn!(
                by = %respond.by,
                frame = %popped.agent_full_name,
                "return authored outside the frame it closes"
            );
        }
        tracing::debug!(
            frame = %popped.agent_full_name,
            depth = self.depth(),
            "popping frame"
        );

        // The subagent's result is the last step it collected that is neither
        // a call/return nor one of the caller's own inputs to it.
        let output = popped
            .steps
            .iter()
            .rev()
            .find(|s| !s.is_call_or_respond() && !self.is_step_by_active_agent(s))
            .cloned();

        let new_top = self.top_mut();
        new_top.next_node += 1;
        match output {
            Some(output) => {
                new_top.add_step(output.clone());
                new_top
                    .outputs_by_subagent
                    .insert(popped.agent_name.clone(), output);
            }
            None => {
                tracing::warn!(
                    frame = %popped.agent_full_name,
                    "subagent exited without an output step"
                );
            }
        }

        self.route(respond.by.clone(), Message::Respond(respond.clone()));
        self.route(respond.by.parent(), Message::Respond(respond.clone()));
        self.top_mut().add_step(Step::Respond(respond.clone()));
        Ok(())
    }

    fn broadcast(&mut self, broadcast: &Broadcast) {
        self.top_mut()
            .add_step(Step::Broadcast(broadcast.clone()));
        for to in &broadcast.to {
            self.route(
                broadcast.by.child(to),
                Message::Broadcast(broadcast.clone()),
            );
        }
    }

    fn route(&mut self, path: AgentPath, message: Message) {
        self.messages_by_agent
            .entry(path)
            .or_default()
            .push(message);
    }
}
