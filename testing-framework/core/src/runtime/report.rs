use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::phase::RunPhase;
use crate::{assert::AssertLevel, workload::ConfigError};

/// Why an agent stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// A check raised by the workload itself.
    Assertion { level: AssertLevel },
    /// Any other error returned by the action, typically from the database.
    Action,
    Panic,
    Transition,
    /// The agent thread never reported back.
    Lost,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentFailure {
    #[serde(flatten)]
    pub kind: FailureKind,
    pub state: String,
    pub iteration: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentOutcome {
    pub tid: usize,
    pub iterations_completed: usize,
    /// State the agent was in when it stopped: the next state to run after a
    /// clean finish, or the failing state.
    pub terminal_state: String,
    pub failure: Option<AgentFailure>,
}

impl AgentOutcome {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PhaseResult {
    #[default]
    NotRun,
    Passed,
    Failed {
        message: String,
    },
}

impl PhaseResult {
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Overall verdict, distinguishing a bug found by the workload from a broken
/// workload and from broken infrastructure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Misconfigured,
    InfrastructureFailure,
    WorkloadFailure,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("workload '{workload}' is misconfigured: {message}")]
    Misconfigured { workload: String, message: String },
    #[error("workload '{workload}' setup failed: {message}")]
    Setup { workload: String, message: String },
    #[error("workload '{workload}': {failed} of {total} agents failed\n{summary}")]
    Agents {
        workload: String,
        failed: usize,
        total: usize,
        summary: String,
    },
    #[error("workload '{workload}' teardown failed: {message}")]
    Teardown { workload: String, message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub workload: String,
    pub collection: String,
    pub seed: Option<u64>,
    pub assert_level: AssertLevel,
    pub phases: Vec<RunPhase>,
    pub configuration_error: Option<String>,
    pub setup: PhaseResult,
    pub agents: Vec<AgentOutcome>,
    pub teardown: PhaseResult,
    pub elapsed: Duration,
}

impl RunReport {
    /// Report for a workload that never got past validation.
    #[must_use]
    pub fn misconfigured(workload: impl Into<String>, error: &ConfigError) -> Self {
        Self {
            workload: workload.into(),
            collection: String::new(),
            seed: None,
            assert_level: AssertLevel::default(),
            phases: vec![RunPhase::Idle],
            configuration_error: Some(error.to_string()),
            setup: PhaseResult::NotRun,
            agents: Vec::new(),
            teardown: PhaseResult::NotRun,
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn final_phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Idle)
    }

    pub fn failed_agents(&self) -> impl Iterator<Item = &AgentOutcome> {
        self.agents.iter().filter(|agent| !agent.passed())
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.configuration_error.is_some() {
            RunStatus::Misconfigured
        } else if self.setup.failed() {
            RunStatus::InfrastructureFailure
        } else if self.failed_agents().next().is_some() {
            RunStatus::WorkloadFailure
        } else if self.teardown.failed() {
            RunStatus::InfrastructureFailure
        } else {
            RunStatus::Passed
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.status() == RunStatus::Passed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Collapse the report into the error a test should fail with, keeping
    /// the report on success.
    pub fn into_result(self) -> Result<Self, RunError> {
        let workload = self.workload.clone();

        if let Some(message) = self.configuration_error.clone() {
            return Err(RunError::Misconfigured { workload, message });
        }
        if let PhaseResult::Failed { message } = &self.setup {
            return Err(RunError::Setup {
                workload,
                message: message.clone(),
            });
        }

        let failures: Vec<String> = self
            .failed_agents()
            .filter_map(|agent| {
                agent.failure.as_ref().map(|failure| {
                    format!(
                        "tid {} in state '{}' at iteration {}: {}",
                        agent.tid, failure.state, failure.iteration, failure.message
                    )
                })
            })
            .collect();
        if !failures.is_empty() {
            return Err(RunError::Agents {
                workload,
                failed: failures.len(),
                total: self.agents.len(),
                summary: failures.join("\n"),
            });
        }

        if let PhaseResult::Failed { message } = &self.teardown {
            return Err(RunError::Teardown {
                workload,
                message: message.clone(),
            });
        }

        Ok(self)
    }
}
