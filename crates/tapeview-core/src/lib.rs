// ABOUTME: Core library for tapeview: the step taxonomy, tapes, and the view stack machine.
// ABOUTME: Rebuilds the per-agent call-chain context from a flat, append-only tape of steps.

pub mod cache;
pub mod path;
pub mod stack;
pub mod step;
pub mod tape;
pub mod view;

pub use cache::{CacheStats, ViewStackCache};
pub use path::{AgentPath, PathError};
pub use stack::{ReplayError, StackError, TapeViewStack};
pub use step::{AgentStep, Broadcast, Call, Jump, Message, Observation, Respond, Step, StepError};
pub use tape::{Tape, TapeError, TapeMetadata};
pub use view::{LookupError, OutputRef, TapeView};
