pub mod assert;
pub mod fixture;
pub mod logging;
pub mod options;
pub mod runtime;
pub mod workload;

pub use assert::{AssertLevel, AssertionFailure, Assertions, Check};
pub use fixture::{
    CachedConnection, ClusterFixture, ConnectionCache, LocalFixture, MemoryStore, NodeRole,
};
pub use options::{CollectionMode, OptionsError, RunOptions, Schedule};
pub use runtime::{
    PhaseContext, RunReport, RunStatus, Runner, StateContext, Suite, SuiteReport, WorkerAgent,
};
pub use workload::{
    ActionResult, ConfigError, DynError, ThreadData, WorkloadBuilder, WorkloadDefinition,
    WorkloadOverride,
};
