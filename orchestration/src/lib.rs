//! Orchestration core for a multi-session minority-influence chat experiment.
//!
//! A participant is assigned an experimental condition and walks through
//! three scoped chat sessions, each with an initial opinion capture (T0)
//! followed by four conversational cycles against three simulated agents.
//! This crate implements the part with real algorithmic structure:
//!
//! - `stance`: pure resolution of which rhetorical stance each agent takes
//!   per cycle, from (condition, T0 stance, cycle index)
//! - `prompt`: deterministic system/user instruction construction per agent
//! - `gateway`: bounded generation calls with latency/token accounting and
//!   failure-to-empty conversion
//! - `fallback`: canned responses substituted when generation fails
//! - `turn`: the per-cycle pipeline — sequencing guards, idempotent replay,
//!   concurrent three-way fan-out, fallback merge, best-effort persistence
//! - `store`: idempotent SQLite persistence of participants, sessions,
//!   turns and messages
//!
//! Page routing, form rendering and condition-slot allocation live outside
//! this crate; `study-runner` drives the core from the command line.

pub mod agents;
pub mod condition;
pub mod config;
pub mod fallback;
pub mod gateway;
pub mod prompt;
pub mod rate_limit;
pub mod stance;
pub mod store;
pub mod turn;

pub use agents::AgentProfile;
pub use condition::{
    AgentSlot, Condition, CycleIndex, DomainError, MessageRole, OpinionScore, SessionKey, Stance,
    TaskOrder,
};
pub use config::{ConfigError, StudyConfig};
pub use gateway::{GenerationBackend, GenerationGateway};
pub use rate_limit::CycleRateLimiter;
pub use stance::{resolve, StanceAssignment};
pub use store::StudyStore;
pub use turn::{CycleError, CycleOutcome, SessionPhase, TurnOrchestrator};
