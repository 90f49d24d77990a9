// ABOUTME: Entry point for the tapeview binary.
// ABOUTME: Loads a tape file, folds it into a view stack, and prints frames, routes, or a per-step trace.

mod config;
mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tapeview_core::{AgentPath, Tape, TapeViewStack, ViewStackCache};

use crate::config::{OutputFormat, TapeviewConfig};

#[derive(Debug, Parser)]
#[command(name = "tapeview", version, about = "Inspect the per-agent views rebuilt from a tape")]
struct Cli {
    /// Output format; overrides TAPEVIEW_OUTPUT.
    #[arg(long, value_enum, global = true)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every frame on the final stack with its steps and subagent outputs.
    Show {
        /// Tape file (.jsonl step log, or .yaml/.yml document).
        tape: PathBuf,
    },
    /// Print the message routes, optionally for one agent path.
    Messages {
        tape: PathBuf,
        /// Full agent path, e.g. root/Manager/Coder.
        #[arg(long)]
        agent: Option<String>,
    },
    /// Print depth, active frame, and node counter after every step.
    Trace { tape: PathBuf },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tapeview=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TapeviewConfig::from_env().context("invalid configuration")?;
    let format = cli.format.unwrap_or(config.output);
    let mut cache = ViewStackCache::new(config.cache_capacity);

    let out = match cli.command {
        Command::Show { tape } => {
            let stack = compute(&mut cache, &load(&tape)?)?;
            emit(format, &*stack, || render::render_stack(&stack))?
        }
        Command::Messages { tape, agent } => {
            let stack = compute(&mut cache, &load(&tape)?)?;
            match agent {
                Some(raw) => {
                    let path = AgentPath::parse(&raw)
                        .with_context(|| format!("invalid agent path {:?}", raw))?;
                    emit(format, stack.messages_for(&path), || {
                        render::render_messages(&stack, Some(&path))
                    })?
                }
                None => emit(format, stack.messages_by_agent(), || {
                    render::render_messages(&stack, None)
                })?,
            }
        }
        Command::Trace { tape } => {
            let tape = load(&tape)?;
            let rows = render::trace_rows(&tape)
                .with_context(|| format!("tape {} is malformed", tape.id()))?;
            emit(format, &rows, || render::render_trace(&rows))?
        }
    };

    print!("{}", out);
    tracing::debug!(stats = ?cache.stats(), "done");
    Ok(())
}

fn load(path: &Path) -> Result<Tape> {
    let tape = tapeview_store::load_tape(path)
        .with_context(|| format!("failed to load tape from {}", path.display()))?;
    tracing::info!(path = %path.display(), tape_id = %tape.id(), steps = tape.len(), "loaded tape");
    Ok(tape)
}

fn compute(cache: &mut ViewStackCache, tape: &Tape) -> Result<Arc<TapeViewStack>> {
    cache
        .compute(tape)
        .with_context(|| format!("tape {} is malformed", tape.id()))
}

fn emit<T, F>(format: OutputFormat, value: &T, text: F) -> Result<String>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    Ok(match format {
        OutputFormat::Text => text(),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(value)?;
            json.push('\n');
            json
        }
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}
