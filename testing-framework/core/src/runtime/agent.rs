use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt as _;
use rand::{SeedableRng as _, rngs::StdRng};
use tokio::sync::Barrier;
use tracing::{debug, info, warn};

use super::{
    context::StateContext,
    report::{AgentFailure, AgentOutcome, FailureKind},
};
use crate::{
    assert::{AssertionFailure, Assertions},
    fixture::ClusterFixture,
    workload::WorkloadDefinition,
};

const TID_STREAM_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed of the private RNG stream used by agent `tid`.
#[must_use]
pub fn agent_seed(base: u64, tid: usize) -> u64 {
    base.wrapping_add((tid as u64).wrapping_add(1).wrapping_mul(TID_STREAM_SPREAD))
}

/// Drives one thread of a workload through its state graph.
pub struct WorkerAgent<Fx> {
    tid: usize,
    workload: WorkloadDefinition<Fx>,
    fixture: Arc<Fx>,
    collection: Arc<str>,
    assertions: Assertions,
    rng: StdRng,
    start: Option<Arc<Barrier>>,
}

impl<Fx: ClusterFixture> WorkerAgent<Fx> {
    #[must_use]
    pub fn new(
        tid: usize,
        workload: WorkloadDefinition<Fx>,
        fixture: Arc<Fx>,
        collection: Arc<str>,
        assertions: Assertions,
        seed: u64,
    ) -> Self {
        Self {
            tid,
            workload,
            fixture,
            collection,
            assertions,
            rng: StdRng::seed_from_u64(seed),
            start: None,
        }
    }

    /// Wait on `barrier` before the first action so agents start together.
    #[must_use]
    pub fn with_start_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.start = Some(barrier);
        self
    }

    /// Runs exactly `iterations` state executions, stopping at the first
    /// failure. Never panics; panics inside actions become failures.
    pub async fn run(self) -> AgentOutcome {
        let Self {
            tid,
            workload,
            fixture,
            collection,
            assertions,
            mut rng,
            start,
        } = self;

        let iterations = workload.iterations().get();
        let mut data = workload.thread_data(tid);
        let mut current = workload.start_state().to_owned();
        let ctx = StateContext::new(
            fixture.as_ref(),
            &collection,
            tid,
            workload.passes_connection_cache(),
            assertions,
        );

        if let Some(barrier) = start {
            barrier.wait().await;
        }
        info!(workload = workload.name(), tid, iterations, "agent started");

        for iteration in 0..iterations {
            data.set_iteration(iteration);

            let Some(action) = workload.state_action(&current) else {
                let message = format!("state '{current}' has no action");
                return failed(tid, iteration, current, FailureKind::Transition, message);
            };

            let outcome = AssertUnwindSafe(action.call(&mut data, &ctx))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    let kind = classify(error.as_ref());
                    return failed(tid, iteration, current, kind, error.to_string());
                }
                Err(panic) => {
                    let message = format!("state action panicked: {}", panic_message(panic));
                    return failed(tid, iteration, current, FailureKind::Panic, message);
                }
            }

            match workload.transition_table().next(&current, &mut rng) {
                Ok(next) => {
                    debug!(tid, iteration, from = %current, to = next, "agent transition");
                    current = next.to_owned();
                }
                Err(error) => {
                    let mut outcome = failed(
                        tid,
                        iteration,
                        current,
                        FailureKind::Transition,
                        error.to_string(),
                    );
                    outcome.iterations_completed = iteration + 1;
                    return outcome;
                }
            }
        }

        info!(workload = workload.name(), tid, terminal = %current, "agent finished");
        AgentOutcome {
            tid,
            iterations_completed: iterations,
            terminal_state: current,
            failure: None,
        }
    }
}

fn failed(
    tid: usize,
    iteration: usize,
    state: String,
    kind: FailureKind,
    message: String,
) -> AgentOutcome {
    warn!(tid, iteration, state = %state, ?kind, %message, "agent failed");
    AgentOutcome {
        tid,
        iterations_completed: iteration,
        terminal_state: state.clone(),
        failure: Some(AgentFailure {
            kind,
            state,
            iteration,
            message,
        }),
    }
}

fn classify(error: &(dyn std::error::Error + Send + Sync + 'static)) -> FailureKind {
    error
        .downcast_ref::<AssertionFailure>()
        .map_or(FailureKind::Action, |failure| FailureKind::Assertion {
            level: failure.level,
        })
}

/// Attempts to turn a panic payload into a readable string for diagnostics.
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic.downcast::<String>().map_or_else(
        |panic| {
            panic.downcast::<&'static str>().map_or_else(
                |_| "unknown panic".to_owned(),
                |message| (*message).to_owned(),
            )
        },
        |message| *message,
    )
}

/// Failure recorded for an agent whose task vanished without an outcome.
pub(crate) fn lost(tid: usize, start_state: &str, reason: String) -> AgentOutcome {
    failed(tid, 0, start_state.to_owned(), FailureKind::Lost, reason)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::FutureExt as _;

    use super::*;
    use crate::{
        assert::AssertLevel,
        fixture::{ConnectionCache, LocalFixture, MemoryStore, NodeRole},
        workload::WorkloadBuilder,
    };

    type Fx = LocalFixture<MemoryStore, &'static str>;

    fn fixture() -> Arc<Fx> {
        let cache = ConnectionCache::new()
            .with_node("mongos-0", NodeRole::Router, "router")
            .with_node("shard-0", NodeRole::Shard, "shard");
        Arc::new(LocalFixture::new(MemoryStore::new(), "agent").with_connections(cache))
    }

    fn agent(workload: WorkloadBuilder<Fx>, seed: u64, level: AssertLevel) -> WorkerAgent<Fx> {
        WorkerAgent::new(
            0,
            workload.build().unwrap(),
            fixture(),
            Arc::from("agent"),
            Assertions::new(level),
            seed,
        )
    }

    fn recording(visits: Arc<Mutex<Vec<String>>>) -> WorkloadBuilder<Fx> {
        let mut builder = WorkloadDefinition::builder("walk");
        for state in ["init", "x", "y"] {
            let visits = Arc::clone(&visits);
            builder = builder.state(state, move |_data, _ctx| {
                visits
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(state.to_owned());
                async { Ok(()) }.boxed()
            });
        }
        builder
            .transitions("init", [("x", 0.5), ("y", 0.5)])
            .transitions("x", [("x", 0.3), ("y", 0.7)])
            .transitions("y", [("init", 1.0)])
            .iterations(64)
    }

    #[test]
    fn seeds_differ_per_tid() {
        assert_ne!(agent_seed(1, 0), agent_seed(1, 1));
        assert_eq!(agent_seed(9, 4), agent_seed(9, 4));
    }

    #[tokio::test]
    async fn same_seed_walks_the_same_path() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let a = agent(recording(Arc::clone(&first)), 17, AssertLevel::OwnDb).run().await;
        let b = agent(recording(Arc::clone(&second)), 17, AssertLevel::OwnDb).run().await;

        assert_eq!(a, b);
        assert_eq!(*first.lock().unwrap(), *second.lock().unwrap());
        assert_eq!(first.lock().unwrap().len(), 64);
        assert_eq!(first.lock().unwrap()[0], "init");
    }

    #[tokio::test]
    async fn assertion_failures_keep_their_level() {
        let workload = WorkloadDefinition::builder("checks")
            .state("init", |_data, ctx| {
                async move {
                    ctx.assert_when_own_coll().equals(1, 2, "document count")?;
                    Ok(())
                }
                .boxed()
            })
            .transitions("init", [("init", 1.0)])
            .iterations(3);

        let outcome = agent(workload, 1, AssertLevel::OwnDb).run().await;

        let failure = outcome.failure.unwrap();
        assert_eq!(
            failure.kind,
            FailureKind::Assertion {
                level: AssertLevel::OwnColl
            }
        );
        assert_eq!(failure.iteration, 0);
        assert_eq!(outcome.iterations_completed, 0);
    }

    #[tokio::test]
    async fn skipped_checks_do_not_fail() {
        let workload = WorkloadDefinition::builder("checks")
            .state("init", |_data, ctx| {
                async move {
                    ctx.assert_when_own_db().equals(1, 2, "document count")?;
                    Ok(())
                }
                .boxed()
            })
            .transitions("init", [("init", 1.0)])
            .iterations(3);

        let outcome = agent(workload, 1, AssertLevel::Always).run().await;

        assert!(outcome.passed());
        assert_eq!(outcome.iterations_completed, 3);
    }

    #[tokio::test]
    async fn connection_cache_is_opt_in() {
        let probe = |pass: bool| {
            WorkloadDefinition::builder("conns")
                .state("init", |_data, ctx| {
                    async move {
                        if let Some(cache) = ctx.connections() {
                            let routers = cache.by_role(NodeRole::Router).count();
                            ctx.assert_always().equals(routers, 1, "routers")?;
                            return Ok(());
                        }
                        Err("no connection cache".into())
                    }
                    .boxed()
                })
                .transitions("init", [("init", 1.0)])
                .pass_connection_cache(pass)
        };

        assert!(agent(probe(true), 2, AssertLevel::OwnDb).run().await.passed());

        let outcome = agent(probe(false), 2, AssertLevel::OwnDb).run().await;
        assert_eq!(outcome.failure.unwrap().kind, FailureKind::Action);
    }

    #[tokio::test]
    async fn thread_data_persists_across_iterations() {
        let workload = WorkloadDefinition::builder("counter")
            .data("seen", 0)
            .state("init", |data, ctx| {
                async move {
                    let before: i64 = data.get_as("seen")?;
                    ctx.assert_always()
                        .equals(before, data.iteration() as i64, "seen")?;
                    data.increment("seen", 1)?;
                    Ok(())
                }
                .boxed()
            })
            .transitions("init", [("init", 1.0)])
            .iterations(20);

        let outcome = agent(workload, 5, AssertLevel::OwnDb).run().await;

        assert!(outcome.passed(), "{outcome:?}");
        assert_eq!(outcome.iterations_completed, 20);
    }

    #[test]
    fn panic_payloads_become_text() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(3_u8)), "unknown panic");
    }
}
