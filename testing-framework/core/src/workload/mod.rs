mod action;
mod compose;
mod data;
mod definition;
pub mod transitions;

pub use action::{ActionResult, PhaseAction, StateAction};
pub use compose::WorkloadOverride;
pub use data::{DataError, InitialData, ThreadData};
pub use definition::{
    ConfigError, DEFAULT_START_STATE, SharedPhaseAction, SharedStateAction, WorkloadBuilder,
    WorkloadDefinition,
};
pub use transitions::{TransitionError, TransitionRow, TransitionTable};

/// Error type shared by state, setup and teardown actions.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;
