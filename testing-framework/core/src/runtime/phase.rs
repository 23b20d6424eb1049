use serde::Serialize;
use tracing::debug;

/// Lifecycle of one workload run.
///
/// `Idle -> SettingUp -> Running -> TearingDown -> Done`, with `Aborted`
/// reachable from the three active phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    SettingUp,
    Running,
    TearingDown,
    Done,
    Aborted,
}

impl RunPhase {
    #[must_use]
    pub const fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::SettingUp)
                | (Self::SettingUp, Self::Running)
                | (Self::Running, Self::TearingDown)
                | (Self::TearingDown, Self::Done)
                | (Self::SettingUp | Self::Running | Self::TearingDown, Self::Aborted)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

#[derive(Debug)]
pub(crate) struct PhaseTracker {
    history: Vec<RunPhase>,
}

impl PhaseTracker {
    pub(crate) fn new() -> Self {
        Self {
            history: vec![RunPhase::Idle],
        }
    }

    pub(crate) fn current(&self) -> RunPhase {
        self.history.last().copied().unwrap_or(RunPhase::Idle)
    }

    pub(crate) fn advance(&mut self, workload: &str, next: RunPhase) {
        let current = self.current();
        debug_assert!(
            current.allows(next),
            "illegal run phase transition {current:?} -> {next:?}"
        );
        debug!(workload, from = ?current, to = ?next, "run phase transition");
        self.history.push(next);
    }

    pub(crate) fn into_history(self) -> Vec<RunPhase> {
        self.history
    }
}
