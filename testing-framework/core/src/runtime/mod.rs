mod agent;
mod context;
mod phase;
pub mod report;
mod runner;
mod suite;

pub use agent::{WorkerAgent, agent_seed};
pub use context::{PhaseContext, StateContext};
pub use phase::RunPhase;
pub use report::{
    AgentFailure, AgentOutcome, FailureKind, PhaseResult, RunError, RunReport, RunStatus,
};
pub use runner::Runner;
pub use suite::{Suite, SuiteError, SuiteReport};
