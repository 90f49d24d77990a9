// ABOUTME: Plain-text rendering of view stacks, message routes, and step-by-step traces.
// ABOUTME: Structured output (json/yaml) goes through serde instead.

use std::fmt::Write;

use serde::Serialize;
use tapeview_core::{AgentPath, Message, ReplayError, Step, Tape, TapeViewStack};

const PREVIEW_CHARS: usize = 60;

/// State of the machine right after one step was applied.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRow {
    pub index: usize,
    pub kind: String,
    pub by: Option<String>,
    pub depth: usize,
    pub top: String,
    pub next_node: usize,
}

impl TraceRow {
    pub fn capture(index: usize, step: &Step, stack: &TapeViewStack) -> Self {
        Self {
            index,
            kind: step.kind().to_string(),
            by: step.by().map(AgentPath::to_string),
            depth: stack.depth(),
            top: stack.top().agent_full_name.to_string(),
            next_node: stack.top().next_node,
        }
    }
}

/// Fold `tape` once, capturing a row after every step.
pub fn trace_rows(tape: &Tape) -> Result<Vec<TraceRow>, ReplayError> {
    let mut stack = TapeViewStack::new();
    let mut rows = Vec::with_capacity(tape.len());
    for (index, step) in tape.steps().iter().enumerate() {
        stack
            .update(step)
            .map_err(|source| ReplayError { index, source })?;
        rows.push(TraceRow::capture(index, step, &stack));
    }
    Ok(rows)
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut)
}

/// One-line summary of a step.
pub fn describe_step(step: &Step) -> String {
    match step {
        Step::Call(c) => format!("call {} -> {}: {}", c.by, c.agent_name, preview(&c.content)),
        Step::Respond(r) => format!("return {}: {}", r.by, preview(&r.content)),
        Step::Broadcast(b) => format!(
            "broadcast {} -> [{}]: {}",
            b.by,
            b.to.join(", "),
            preview(&b.content)
        ),
        Step::Jump(j) => format!("jump {} -> node {}", j.by, j.next_node),
        Step::Agent(a) => match step.content() {
            Some(content) => format!("{} by {} ({}): {}", a.kind, a.by, a.prompt_id, preview(content)),
            None => format!("{} by {} ({})", a.kind, a.by, a.prompt_id),
        },
        Step::Observation(o) => match step.content() {
            Some(content) => format!("{} (observation): {}", o.kind, preview(content)),
            None => format!("{} (observation)", o.kind),
        },
    }
}

fn describe_message(message: &Message) -> String {
    describe_step(&Step::from(message.clone()))
}

pub fn render_stack(stack: &TapeViewStack) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "depth {}", stack.depth());
    for (level, frame) in stack.frames().iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] {} (node {}, {} steps)",
            level,
            frame.agent_full_name,
            frame.next_node,
            frame.steps.len()
        );
        for step in &frame.steps {
            let _ = writeln!(out, "    - {}", describe_step(step));
        }
        for (name, output) in &frame.outputs_by_subagent {
            let _ = writeln!(out, "    output {}: {}", name, describe_step(output));
        }
    }
    out
}

/// Render every route, or only `agent`'s when given.
pub fn render_messages(stack: &TapeViewStack, agent: Option<&AgentPath>) -> String {
    let mut out = String::new();
    match agent {
        Some(path) => {
            let _ = writeln!(out, "{}", path);
            for message in stack.messages_for(path) {
                let _ = writeln!(out, "    - {}", describe_message(message));
            }
        }
        None => {
            for (path, messages) in stack.messages_by_agent() {
                let _ = writeln!(out, "{}", path);
                for message in messages {
                    let _ = writeln!(out, "    - {}", describe_message(message));
                }
            }
        }
    }
    out
}

pub fn render_trace(rows: &[TraceRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(
            out,
            "{:>4}  {:<12} {:<28} depth={} top={} node={}",
            row.index,
            row.kind,
            row.by.as_deref().unwrap_or("-"),
            row.depth,
            row.top,
            row.next_node
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> AgentPath {
        AgentPath::parse(raw).unwrap()
    }

    fn sample_stack() -> TapeViewStack {
        let steps = vec![
            Step::call(path("root"), "B", "please\nhelp"),
            Step::agent("thought", path("root/B"), "p1")
                .with_data("content", serde_json::json!("working on it")),
            Step::respond(path("root/B"), "done"),
        ];
        TapeViewStack::replay(&steps).unwrap()
    }

    #[test]
    fn stack_text_lists_frames_and_outputs() {
        let text = render_stack(&sample_stack());
        assert!(text.starts_with("depth 1\n"));
        assert!(text.contains("[0] root (node 1, 3 steps)"));
        assert!(text.contains("call root -> B: please help"));
        assert!(text.contains("output B: thought by root/B (p1): working on it"));
    }

    #[test]
    fn messages_text_can_filter_one_route() {
        let stack = sample_stack();
        let all = render_messages(&stack, None);
        assert!(all.contains("root\n"));
        assert!(all.contains("root/B\n"));

        let only = render_messages(&stack, Some(&path("root/B")));
        assert_eq!(only.lines().count(), 3);
        assert!(only.contains("return root/B: done"));
    }

    #[test]
    fn long_content_is_shortened() {
        let long = "x".repeat(200);
        let line = describe_step(&Step::respond(path("root/B"), long));
        assert!(line.ends_with("..."));
        assert!(line.len() < 100);
    }

    #[test]
    fn trace_rows_follow_the_fold() {
        let tape = Tape::new(vec![
            Step::call(path("root"), "B", "go"),
            Step::agent("thought", path("root/B"), "p1"),
            Step::respond(path("root/B"), "done"),
        ]);
        let rows = trace_rows(&tape).unwrap();

        let depths: Vec<usize> = rows.iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![2, 2, 1]);
        assert_eq!(rows[1].top, "root/B");
        assert_eq!(rows[1].next_node, 1);
        assert_eq!(rows[2].top, "root");

        let last = TapeViewStack::compute(&tape).unwrap();
        assert_eq!(rows[2].next_node, last.top().next_node);
    }

    #[test]
    fn trace_rows_stop_at_the_bad_step() {
        let tape = Tape::new(vec![
            Step::observation("user_input"),
            Step::respond(path("root"), "nothing open"),
        ]);
        let err = trace_rows(&tape).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn trace_rows_render_one_line_each() {
        let step = Step::observation("user_input");
        let stack = TapeViewStack::new();
        let rows = vec![TraceRow::capture(0, &step, &stack)];
        let text = render_trace(&rows);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("depth=1 top=root node=0"));
    }
}
