//! Turn orchestration — session phase machine and the per-cycle pipeline.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{AgentReply, CycleError, CycleMeta, CycleOutcome, TurnOrchestrator};
pub use state::{SequenceError, SessionPhase};
