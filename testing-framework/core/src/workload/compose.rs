use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::{
    ConfigError, SharedPhaseAction, SharedStateAction, WorkloadBuilder, WorkloadDefinition,
    transitions::TransitionRows,
};
use crate::fixture::ClusterFixture;

impl<Fx: ClusterFixture> WorkloadDefinition<Fx> {
    /// Derive a new workload from this one.
    ///
    /// `f` receives an independent copy of every field plus the base itself,
    /// so overriding actions can fetch and call the base action they replace.
    /// The result is validated like any freshly built workload and keeps no
    /// link back to `self`.
    pub fn extend<F>(&self, f: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(WorkloadBuilder<Fx>, &Self) -> WorkloadBuilder<Fx>,
    {
        let derived = f(self.to_builder(), self).build()?;
        debug!(
            base = self.name(),
            derived = derived.name(),
            "composed workload definition"
        );
        Ok(derived)
    }

    /// Declarative form of [`Self::extend`].
    pub fn compose(&self, overrides: WorkloadOverride<Fx>) -> Result<Self, ConfigError> {
        self.extend(|builder, _| overrides.apply(builder))
    }
}

/// Replacement and extension of a base workload's fields.
///
/// Scalars replace the base value when set. `data`, `states` and
/// `transitions` merge by key: mentioned keys are added or replaced, the rest
/// are inherited. A transition entry replaces the whole row of its state.
pub struct WorkloadOverride<Fx> {
    name: Option<String>,
    data: BTreeMap<String, Value>,
    states: BTreeMap<String, SharedStateAction<Fx>>,
    transitions: TransitionRows,
    setup: Option<SharedPhaseAction<Fx>>,
    teardown: Option<SharedPhaseAction<Fx>>,
    start_state: Option<String>,
    thread_count: Option<usize>,
    iterations: Option<usize>,
}

impl<Fx> Default for WorkloadOverride<Fx> {
    fn default() -> Self {
        Self {
            name: None,
            data: BTreeMap::new(),
            states: BTreeMap::new(),
            transitions: TransitionRows::new(),
            setup: None,
            teardown: None,
            start_state: None,
            thread_count: None,
            iterations: None,
        }
    }
}

impl<Fx: ClusterFixture> WorkloadOverride<Fx> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn data(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn state(mut self, name: impl Into<String>, action: SharedStateAction<Fx>) -> Self {
        self.states.insert(name.into(), action);
        self
    }

    #[must_use]
    pub fn transitions<I, S>(mut self, from: impl Into<String>, row: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let row = row.into_iter().map(|(to, weight)| (to.into(), weight)).collect();
        self.transitions.insert(from.into(), row);
        self
    }

    #[must_use]
    pub fn setup(mut self, action: SharedPhaseAction<Fx>) -> Self {
        self.setup = Some(action);
        self
    }

    #[must_use]
    pub fn teardown(mut self, action: SharedPhaseAction<Fx>) -> Self {
        self.teardown = Some(action);
        self
    }

    #[must_use]
    pub fn start_state(mut self, state: impl Into<String>) -> Self {
        self.start_state = Some(state.into());
        self
    }

    #[must_use]
    pub const fn thread_count(mut self, threads: usize) -> Self {
        self.thread_count = Some(threads);
        self
    }

    #[must_use]
    pub const fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Merge onto `builder` following the override policy.
    #[must_use]
    pub fn apply(self, mut builder: WorkloadBuilder<Fx>) -> WorkloadBuilder<Fx> {
        let Self {
            name,
            data,
            states,
            transitions,
            setup,
            teardown,
            start_state,
            thread_count,
            iterations,
        } = self;

        if let Some(name) = name {
            builder = builder.name(name);
        }
        for (field, value) in data {
            builder = builder.data(field, value);
        }
        for (state, action) in states {
            builder = builder.state_action(state, action);
        }
        for (from, row) in transitions {
            builder = builder.transitions(from, row);
        }
        if let Some(setup) = setup {
            builder = builder.setup_action(setup);
        }
        if let Some(teardown) = teardown {
            builder = builder.teardown_action(teardown);
        }
        if let Some(state) = start_state {
            builder = builder.start_state(state);
        }
        if let Some(threads) = thread_count {
            builder = builder.thread_count(threads);
        }
        if let Some(iterations) = iterations {
            builder = builder.iterations(iterations);
        }
        builder
    }
}
