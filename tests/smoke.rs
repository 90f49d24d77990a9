// ABOUTME: End-to-end smoke test for the tapeview binary and library stack.
// ABOUTME: Writes a multi-agent tape to disk, then checks frames, routes, and traces it produces.

use std::path::Path;
use std::process::Command;

use tapeview_core::{AgentPath, Step, Tape, TapeViewStack, ViewStackCache};
use tapeview_store::{StepLog, load_tape, save_tape_yaml};

fn path(raw: &str) -> AgentPath {
    AgentPath::parse(raw).unwrap()
}

/// Initiator hands a task to a manager, which delegates to a coder and
/// broadcasts a status note to two reviewers before returning.
fn team_tape() -> Tape {
    Tape::new(vec![
        Step::agent("user_message", path("root"), "p0")
            .with_data("content", serde_json::json!("plot the stocks")),
        Step::call(path("root"), "Manager", "plot the stocks"),
        Step::agent("thought", path("root/Manager"), "m1"),
        Step::call(path("root/Manager"), "Coder", "write plot.py"),
        Step::agent("code", path("root/Manager/Coder"), "c1"),
        Step::observation("code_execution_result")
            .with_data("content", serde_json::json!("saved plot.png")),
        Step::respond(path("root/Manager/Coder"), "done"),
        Step::broadcast(path("root/Manager"), "plot ready", ["Reviewer", "Analyst"])
            .with_prompt_id("m2"),
        Step::agent("final", path("root/Manager"), "m2"),
        Step::respond(path("root/Manager"), "all done"),
    ])
}

fn run(args: &[&str], dir: &Path) -> serde_json::Value {
    let output = Command::new(env!("CARGO_BIN_EXE_tapeview"))
        .args(args)
        .current_dir(dir)
        .env_remove("TAPEVIEW_OUTPUT")
        .env_remove("TAPEVIEW_CACHE_CAPACITY")
        .output()
        .expect("run tapeview");
    assert!(
        output.status.success(),
        "tapeview {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json output")
}

#[test]
fn library_stack_matches_team_run() {
    let tape = team_tape();
    let mut cache = ViewStackCache::default();
    let stack = cache.compute(&tape).unwrap();

    assert_eq!(stack.depth(), 1);
    let root = stack.top();
    let manager_output = root.get_output("Manager").unwrap();
    assert_eq!(manager_output.kind(), "final");
    assert_eq!(root.next_node, 2, "own prompt p0 plus one subagent call");

    let manager_routes = stack.messages_for(&path("root/Manager"));
    let kinds: Vec<&str> = manager_routes.iter().map(|m| m.kind()).collect();
    assert_eq!(kinds, vec!["call", "call", "return", "return"]);
    assert_eq!(stack.messages_for(&path("root/Manager/Reviewer")).len(), 1);
    assert_eq!(stack.messages_for(&path("root/Manager/Analyst")).len(), 1);

    assert_eq!(*stack, TapeViewStack::compute(&tape.with_new_id()).unwrap());
}

#[test]
fn cli_show_reports_final_stack() {
    let dir = tempfile::TempDir::new().unwrap();
    let tape_path = dir.path().join("team.jsonl");
    StepLog::save_tape(&tape_path, &team_tape()).unwrap();

    let json = run(
        &["--format", "json", "show", tape_path.to_str().unwrap()],
        dir.path(),
    );
    let frames = json["stack"].as_array().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["agent_full_name"], "root");
    assert_eq!(frames[0]["outputs_by_subagent"]["Manager"]["kind"], "final");
}

#[test]
fn cli_messages_filters_by_agent() {
    let dir = tempfile::TempDir::new().unwrap();
    let tape_path = dir.path().join("team.yaml");
    save_tape_yaml(&tape_path, &team_tape()).unwrap();

    let json = run(
        &[
            "messages",
            tape_path.to_str().unwrap(),
            "--agent",
            "root/Manager/Coder",
            "--format",
            "json",
        ],
        dir.path(),
    );
    let kinds: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["call", "return"]);
}

#[test]
fn cli_trace_follows_depth() {
    let dir = tempfile::TempDir::new().unwrap();
    let tape_path = dir.path().join("team.jsonl");
    StepLog::save_tape(&tape_path, &team_tape()).unwrap();

    let json = run(
        &["trace", tape_path.to_str().unwrap(), "--format", "json"],
        dir.path(),
    );
    let depths: Vec<u64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["depth"].as_u64().unwrap())
        .collect();
    assert_eq!(depths, vec![1, 2, 2, 3, 3, 3, 2, 2, 2, 1]);
}

#[test]
fn cli_rejects_unbalanced_tape() {
    let dir = tempfile::TempDir::new().unwrap();
    let tape_path = dir.path().join("bad.jsonl");
    StepLog::save_tape(
        &tape_path,
        &Tape::new(vec![Step::respond(path("root"), "nothing to return from")]),
    )
    .unwrap();
    assert_eq!(load_tape(&tape_path).unwrap().len(), 1);

    let output = Command::new(env!("CARGO_BIN_EXE_tapeview"))
        .args(["show", tape_path.to_str().unwrap()])
        .current_dir(dir.path())
        .output()
        .expect("run tapeview");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("malformed"), "{}", stderr);
}
