use std::{collections::BTreeMap, fmt, num::NonZeroUsize, sync::Arc};

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{
    ActionResult, InitialData, PhaseAction, StateAction, ThreadData,
    transitions::{TransitionRow, TransitionRows, TransitionTable},
};
use crate::{
    fixture::ClusterFixture,
    runtime::{PhaseContext, StateContext},
};

pub const DEFAULT_START_STATE: &str = "init";

pub type SharedStateAction<Fx> = Arc<dyn StateAction<Fx>>;
pub type SharedPhaseAction<Fx> = Arc<dyn PhaseAction<Fx>>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("workload name must not be empty")]
    EmptyName,
    #[error("workload '{workload}' defines no states")]
    NoStates { workload: String },
    #[error("workload '{workload}': thread count must be non-zero")]
    ZeroThreadCount { workload: String },
    #[error("workload '{workload}': iterations must be non-zero")]
    ZeroIterations { workload: String },
    #[error("workload '{workload}': start state '{state}' is not a defined state")]
    UnknownStartState { workload: String, state: String },
    #[error("workload '{workload}': transition row for undefined state '{state}'")]
    UnknownTransitionSource { workload: String, state: String },
    #[error("workload '{workload}': transition {from} -> {to} targets an undefined state")]
    UnknownTransitionTarget {
        workload: String,
        from: String,
        to: String,
    },
    #[error("workload '{workload}': transition {from} -> {to} has invalid weight {weight}")]
    InvalidWeight {
        workload: String,
        from: String,
        to: String,
        weight: f64,
    },
    #[error("workload '{workload}': state '{state}' has no transition row")]
    MissingTransitionRow { workload: String, state: String },
    #[error("workload '{workload}': state '{state}' has no transition with positive weight")]
    NoLegalTransition { workload: String, state: String },
    #[error("workload '{workload}': transition {from} -> {to} targets a removed state")]
    TransitionToRemovedState {
        workload: String,
        from: String,
        to: String,
    },
}

/// Unvalidated workload description.
///
/// Built by hand for a fresh workload, or obtained from
/// [`WorkloadDefinition::to_builder`] when deriving one workload from another.
pub struct WorkloadBuilder<Fx> {
    pub(crate) name: String,
    pub(crate) data: InitialData,
    pub(crate) states: BTreeMap<String, SharedStateAction<Fx>>,
    pub(crate) transitions: TransitionRows,
    pub(crate) setup: Option<SharedPhaseAction<Fx>>,
    pub(crate) teardown: Option<SharedPhaseAction<Fx>>,
    pub(crate) start_state: String,
    pub(crate) thread_count: usize,
    pub(crate) iterations: usize,
    pub(crate) pass_connection_cache: bool,
    pub(crate) removed_states: Vec<String>,
}

impl<Fx> Clone for WorkloadBuilder<Fx> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            data: self.data.clone(),
            states: self.states.clone(),
            transitions: self.transitions.clone(),
            setup: self.setup.clone(),
            teardown: self.teardown.clone(),
            start_state: self.start_state.clone(),
            thread_count: self.thread_count,
            iterations: self.iterations,
            pass_connection_cache: self.pass_connection_cache,
            removed_states: self.removed_states.clone(),
        }
    }
}

impl<Fx: ClusterFixture> WorkloadBuilder<Fx> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: InitialData::new(),
            states: BTreeMap::new(),
            transitions: TransitionRows::new(),
            setup: None,
            teardown: None,
            start_state: DEFAULT_START_STATE.to_owned(),
            thread_count: 1,
            iterations: 1,
            pass_connection_cache: false,
            removed_states: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    /// Seed one field of every agent's thread data.
    pub fn data(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    #[must_use]
    /// Define or replace a state with a closure action.
    pub fn state<F>(self, name: impl Into<String>, action: F) -> Self
    where
        F: for<'a> Fn(&'a mut ThreadData, &'a StateContext<'a, Fx>) -> BoxFuture<'a, ActionResult>
            + Send
            + Sync
            + 'static,
    {
        self.state_action(name, Arc::new(action))
    }

    #[must_use]
    /// Define or replace a state with an already shared action, e.g. one taken
    /// from a base workload.
    pub fn state_action(mut self, name: impl Into<String>, action: SharedStateAction<Fx>) -> Self {
        let name = name.into();
        self.removed_states.retain(|removed| *removed != name);
        self.states.insert(name, action);
        self
    }

    #[must_use]
    /// Drop a state together with its transition row. Edges into it must be
    /// removed too or validation fails.
    pub fn without_state(mut self, name: &str) -> Self {
        self.states.remove(name);
        self.transitions.remove(name);
        self.removed_states.push(name.to_owned());
        self
    }

    #[must_use]
    /// Set a single weighted edge, keeping the rest of the row.
    pub fn transition(mut self, from: impl Into<String>, to: impl Into<String>, weight: f64) -> Self {
        self.transitions
            .entry(from.into())
            .or_default()
            .insert(to.into(), weight);
        self
    }

    #[must_use]
    /// Replace the whole row for `from`.
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
    pub fn setup<F>(self, action: F) -> Self
    where
        F: for<'a> Fn(&'a PhaseContext<'a, Fx>) -> BoxFuture<'a, ActionResult>
            + Send
            + Sync
            + 'static,
    {
        self.setup_action(Arc::new(action))
    }

    #[must_use]
    pub fn setup_action(mut self, action: SharedPhaseAction<Fx>) -> Self {
        self.setup = Some(action);
        self
    }

    #[must_use]
    pub fn teardown<F>(self, action: F) -> Self
    where
        F: for<'a> Fn(&'a PhaseContext<'a, Fx>) -> BoxFuture<'a, ActionResult>
            + Send
            + Sync
            + 'static,
    {
        self.teardown_action(Arc::new(action))
    }

    #[must_use]
    pub fn teardown_action(mut self, action: SharedPhaseAction<Fx>) -> Self {
        self.teardown = Some(action);
        self
    }

    #[must_use]
    pub fn start_state(mut self, state: impl Into<String>) -> Self {
        self.start_state = state.into();
        self
    }

    #[must_use]
    pub const fn thread_count(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    #[must_use]
    pub const fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    /// Hand the fixture's connection cache to every state action.
    pub const fn pass_connection_cache(mut self, enabled: bool) -> Self {
        self.pass_connection_cache = enabled;
        self
    }

    /// Validate the state graph and freeze the workload.
    pub fn build(self) -> Result<WorkloadDefinition<Fx>, ConfigError> {
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
            pass_connection_cache,
            removed_states,
        } = self;

        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let thread_count = NonZeroUsize::new(thread_count).ok_or_else(|| {
            ConfigError::ZeroThreadCount {
                workload: name.clone(),
            }
        })?;
        let iterations = NonZeroUsize::new(iterations).ok_or_else(|| ConfigError::ZeroIterations {
            workload: name.clone(),
        })?;

        let table = validate_graph(&name, &states, &transitions, &start_state, &removed_states)?;

        debug!(
            workload = %name,
            states = states.len(),
            threads = thread_count.get(),
            iterations = iterations.get(),
            "workload definition validated"
        );

        Ok(WorkloadDefinition {
            inner: Arc::new(DefinitionInner {
                name,
                data,
                states,
                transitions,
                table,
                setup,
                teardown,
                start_state,
                thread_count,
                iterations,
                pass_connection_cache,
            }),
        })
    }
}

fn validate_graph<A>(
    workload: &str,
    states: &BTreeMap<String, A>,
    transitions: &TransitionRows,
    start_state: &str,
    removed_states: &[String],
) -> Result<TransitionTable, ConfigError> {
    if states.is_empty() {
        return Err(ConfigError::NoStates {
            workload: workload.to_owned(),
        });
    }

    if !states.contains_key(start_state) {
        return Err(ConfigError::UnknownStartState {
            workload: workload.to_owned(),
            state: start_state.to_owned(),
        });
    }

    if let Some(from) = transitions.keys().find(|from| !states.contains_key(*from)) {
        return Err(ConfigError::UnknownTransitionSource {
            workload: workload.to_owned(),
            state: from.clone(),
        });
    }

    let mut rows = BTreeMap::new();
    for state in states.keys() {
        let weights = transitions
            .get(state)
            .ok_or_else(|| ConfigError::MissingTransitionRow {
                workload: workload.to_owned(),
                state: state.clone(),
            })?;

        for (to, weight) in weights {
            if !states.contains_key(to) {
                if removed_states.contains(to) {
                    return Err(ConfigError::TransitionToRemovedState {
                        workload: workload.to_owned(),
                        from: state.clone(),
                        to: to.clone(),
                    });
                }
                return Err(ConfigError::UnknownTransitionTarget {
                    workload: workload.to_owned(),
                    from: state.clone(),
                    to: to.clone(),
                });
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    workload: workload.to_owned(),
                    from: state.clone(),
                    to: to.clone(),
                    weight: *weight,
                });
            }
        }

        let row =
            TransitionRow::from_weights(weights).ok_or_else(|| ConfigError::NoLegalTransition {
                workload: workload.to_owned(),
                state: state.clone(),
            })?;
        rows.insert(state.clone(), row);
    }

    Ok(TransitionTable::new(rows))
}

struct DefinitionInner<Fx> {
    name: String,
    data: InitialData,
    states: BTreeMap<String, SharedStateAction<Fx>>,
    transitions: TransitionRows,
    table: TransitionTable,
    setup: Option<SharedPhaseAction<Fx>>,
    teardown: Option<SharedPhaseAction<Fx>>,
    start_state: String,
    thread_count: NonZeroUsize,
    iterations: NonZeroUsize,
    pass_connection_cache: bool,
}

/// Validated, immutable workload. Cloning shares the same frozen definition.
pub struct WorkloadDefinition<Fx> {
    inner: Arc<DefinitionInner<Fx>>,
}

impl<Fx> Clone for WorkloadDefinition<Fx> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Fx: ClusterFixture> WorkloadDefinition<Fx> {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> WorkloadBuilder<Fx> {
        WorkloadBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn initial_data(&self) -> &InitialData {
        &self.inner.data
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.inner.states.keys().map(String::as_str)
    }

    /// The action registered for `state`, for explicit delegation from a
    /// derived workload.
    #[must_use]
    pub fn state_action(&self, state: &str) -> Option<SharedStateAction<Fx>> {
        self.inner.states.get(state).cloned()
    }

    #[must_use]
    pub fn transition_rows(&self) -> &TransitionRows {
        &self.inner.transitions
    }

    #[must_use]
    pub fn transition_table(&self) -> &TransitionTable {
        &self.inner.table
    }

    #[must_use]
    pub fn setup_action(&self) -> Option<SharedPhaseAction<Fx>> {
        self.inner.setup.clone()
    }

    #[must_use]
    pub fn teardown_action(&self) -> Option<SharedPhaseAction<Fx>> {
        self.inner.teardown.clone()
    }

    #[must_use]
    pub fn start_state(&self) -> &str {
        &self.inner.start_state
    }

    #[must_use]
    pub fn thread_count(&self) -> NonZeroUsize {
        self.inner.thread_count
    }

    #[must_use]
    pub fn iterations(&self) -> NonZeroUsize {
        self.inner.iterations
    }

    #[must_use]
    pub fn passes_connection_cache(&self) -> bool {
        self.inner.pass_connection_cache
    }

    /// Fresh, independently owned builder holding copies of every field.
    #[must_use]
    pub fn to_builder(&self) -> WorkloadBuilder<Fx> {
        let inner = &self.inner;
        WorkloadBuilder {
            name: inner.name.clone(),
            data: inner.data.clone(),
            states: inner.states.clone(),
            transitions: inner.transitions.clone(),
            setup: inner.setup.clone(),
            teardown: inner.teardown.clone(),
            start_state: inner.start_state.clone(),
            thread_count: inner.thread_count.get(),
            iterations: inner.iterations.get(),
            pass_connection_cache: inner.pass_connection_cache,
            removed_states: Vec::new(),
        }
    }

    pub(crate) fn thread_data(&self, tid: usize) -> ThreadData {
        ThreadData::new(
            tid,
            self.inner.thread_count.get(),
            self.inner.iterations.get(),
            &self.inner.data,
        )
    }
}

impl<Fx> fmt::Debug for WorkloadDefinition<Fx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &self.inner;
        f.debug_struct("WorkloadDefinition")
            .field("name", &inner.name)
            .field("states", &inner.states.keys().collect::<Vec<_>>())
            .field("transitions", &inner.transitions)
            .field("start_state", &inner.start_state)
            .field("thread_count", &inner.thread_count)
            .field("iterations", &inner.iterations)
            .field("has_setup", &inner.setup.is_some())
            .field("has_teardown", &inner.teardown.is_some())
            .finish_non_exhaustive()
    }
}
