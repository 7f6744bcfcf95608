//! Turn-based conversation engine

mod context;
mod orchestrator;

pub use context::{INSTRUCTIONS, opening_messages, streaming_instructions};
pub use orchestrator::{
    DEFAULT_MAX_ITERATIONS, Orchestrator, OrchestratorConfig, TurnOutcome, TurnReport,
};
