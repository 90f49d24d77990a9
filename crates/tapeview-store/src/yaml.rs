// ABOUTME: Reads and writes whole tapes (metadata, context, steps) as YAML documents.
// ABOUTME: YAML is the hand-editable tape format; saves are atomic via temp file and rename.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tapeview_core::Tape;
use thiserror::Error;

/// Errors that can occur when reading or writing a YAML tape.
#[derive(Debug, Error)]
pub enum YamlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Load a tape document. The result gets a fresh id: the file may have been
/// edited since the id in it was minted.
pub fn load_tape_yaml(path: &Path) -> Result<Tape, YamlError> {
    let raw = fs::read_to_string(path)?;
    let stored: Tape = serde_yaml::from_str(&raw)?;
    let tape = stored.with_new_id();
    tracing::debug!(path = %path.display(), tape_id = %tape.id(), stored_id = %stored.id(), steps = tape.len(), "loaded YAML tape");
    Ok(tape)
}

/// Write `tape` to `path` atomically (write to .tmp, fsync, rename).
pub fn save_tape_yaml(path: &Path, tape: &Tape) -> Result<(), YamlError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(tape)?;

    let tmp_path = path.with_extension("yaml.tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(yaml.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapeview_core::{AgentPath, Step, ViewStackCache};
    use tempfile::TempDir;

    #[test]
    fn save_then_load_keeps_steps_under_new_identity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tape.yaml");
        let tape = Tape::new(vec![
            Step::call(AgentPath::root(), "Coder", "plot the stocks"),
            Step::observation("code_execution_result")
                .with_data("output", serde_json::json!("ok")),
        ])
        .with_context(serde_json::json!({"task": "plot"}));

        save_tape_yaml(&path, &tape).unwrap();
        let loaded = load_tape_yaml(&path).unwrap();

        assert_ne!(loaded.id(), tape.id());
        assert_eq!(loaded.steps(), tape.steps());
        assert_eq!(loaded.context, tape.context);
        assert!(!path.with_extension("yaml.tmp").exists());
    }

    #[test]
    fn loads_hand_written_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hand.yaml");
        fs::write(
            &path,
            r#"metadata:
  id: 01HTEST0000000000000000000
  created_at: "2025-01-01T00:00:00Z"
steps:
  - kind: call
    by: root
    agent_name: B
    content: hello
  - kind: thought
    by: root/B
    prompt_id: p1
  - kind: return
    by: root/B
"#,
        )
        .unwrap();

        let tape = load_tape_yaml(&path).unwrap();
        assert_eq!(tape.len(), 3);
        assert_eq!(tape.steps()[2].kind(), "return");
        assert!(tape.context.is_none());
    }

    #[test]
    fn reloading_an_edited_file_sees_the_edit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tape.yaml");
        save_tape_yaml(&path, &Tape::new(vec![Step::call(AgentPath::root(), "B", "go")])).unwrap();

        let mut cache = ViewStackCache::default();
        let first = load_tape_yaml(&path).unwrap();
        assert_eq!(cache.compute(&first).unwrap().depth(), 2);

        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("- kind: return\n  by: root/B\n");
        fs::write(&path, raw).unwrap();

        let second = load_tape_yaml(&path).unwrap();
        assert_eq!(second.len(), 2);
        assert_ne!(second.id(), first.id());
        assert_eq!(cache.compute(&second).unwrap().depth(), 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn rejects_unknown_control_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(
            &path,
            "metadata:\n  id: 01HTEST0000000000000000000\n  created_at: \"2025-01-01T00:00:00Z\"\nsteps:\n  - kind: jump\n    by: root\n",
        )
        .unwrap();

        assert!(matches!(load_tape_yaml(&path), Err(YamlError::Yaml(_))));
    }
}
