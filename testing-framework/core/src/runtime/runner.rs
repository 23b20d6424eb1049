use std::{
    collections::BTreeMap, io, panic::AssertUnwindSafe, sync::Arc, thread, time::Instant,
};

use futures::FutureExt as _;
use rand::{Rng as _, thread_rng};
use tokio::{
    runtime::Handle,
    sync::{Barrier, mpsc},
};
use tracing::{info, warn};

use super::{
    agent::{WorkerAgent, agent_seed, lost, panic_message},
    context::PhaseContext,
    phase::{PhaseTracker, RunPhase},
    report::{AgentOutcome, PhaseResult, RunReport},
};
use crate::{
    assert::{AssertLevel, Assertions},
    fixture::ClusterFixture,
    options::RunOptions,
    workload::{SharedPhaseAction, WorkloadBuilder, WorkloadDefinition},
};

/// A workload bound to the collection and ownership level it runs with.
pub(crate) struct RunPlan<Fx> {
    pub(crate) workload: WorkloadDefinition<Fx>,
    pub(crate) collection: String,
    pub(crate) assert_level: AssertLevel,
}

/// Owns whole workload runs: setup once, every agent to completion, teardown
/// once, then a report covering all of it.
#[derive(Clone, Debug, Default)]
pub struct Runner {
    options: RunOptions,
}

impl Runner {
    #[must_use]
    pub const fn new(options: RunOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    pub(crate) fn base_seed(&self) -> u64 {
        self.options.seed.unwrap_or_else(|| thread_rng().r#gen())
    }

    /// Runs one workload against the fixture's collection.
    pub async fn execute<Fx: ClusterFixture>(
        &self,
        workload: &WorkloadDefinition<Fx>,
        fixture: Arc<Fx>,
    ) -> RunReport {
        let plan = RunPlan {
            workload: workload.clone(),
            collection: fixture.collection_name().to_owned(),
            assert_level: self.options.assert_level,
        };
        let mut run = Run::new(plan, self.base_seed(), 0);
        self.drive(std::slice::from_mut(&mut run), &fixture).await;
        run.into_report()
    }

    /// Validates `builder` first; a configuration error comes back as a
    /// misconfigured report instead of a run.
    pub async fn execute_builder<Fx: ClusterFixture>(
        &self,
        builder: WorkloadBuilder<Fx>,
        fixture: Arc<Fx>,
    ) -> RunReport {
        let name = builder.name.clone();
        match builder.build() {
            Ok(workload) => self.execute(&workload, fixture).await,
            Err(error) => {
                warn!(workload = %name, %error, "workload rejected before run");
                RunReport::misconfigured(name, &error)
            }
        }
    }

    /// Drives several workloads through shared phases: every setup, then the
    /// agents of every workload under one start barrier, then every teardown.
    /// Workload `i` is seeded with `base_seed + i`; thread ids are numbered
    /// across all of them, starting at `first_tid`.
    pub(crate) async fn execute_plans<Fx: ClusterFixture>(
        &self,
        plans: Vec<RunPlan<Fx>>,
        fixture: Arc<Fx>,
        base_seed: u64,
        first_tid: usize,
    ) -> Vec<RunReport> {
        let mut next_tid = first_tid;
        let mut runs = Vec::with_capacity(plans.len());
        for (index, plan) in plans.into_iter().enumerate() {
            let run = Run::new(plan, base_seed.wrapping_add(index as u64), next_tid);
            next_tid += run.workload.thread_count().get();
            runs.push(run);
        }

        self.drive(&mut runs, &fixture).await;
        runs.into_iter().map(Run::into_report).collect()
    }

    async fn drive<Fx: ClusterFixture>(&self, runs: &mut [Run<Fx>], fixture: &Arc<Fx>) {
        for run in runs.iter_mut() {
            run.set_up(fixture.as_ref()).await;
        }

        self.run_agents(runs, fixture).await;

        for run in runs.iter_mut() {
            run.tear_down(fixture.as_ref()).await;
        }
    }

    /// Every agent gets a dedicated OS thread that drives its actions through
    /// the caller's runtime handle, so blocking database calls in one agent
    /// never stall another.
    async fn run_agents<Fx: ClusterFixture>(&self, runs: &mut [Run<Fx>], fixture: &Arc<Fx>) {
        let total: usize = runs
            .iter()
            .filter(|run| run.is_running())
            .map(|run| run.workload.thread_count().get())
            .sum();
        if total == 0 {
            return;
        }

        let barrier = self
            .options
            .synchronized_start
            .then(|| Arc::new(Barrier::new(total)));
        let handle = Handle::current();
        let (finished, mut outcomes) = mpsc::unbounded_channel();
        let mut pending: BTreeMap<usize, usize> = BTreeMap::new();

        for (index, run) in runs.iter().enumerate().filter(|(_, run)| run.is_running()) {
            info!(
                workload = run.workload.name(),
                collection = %run.collection,
                threads = run.workload.thread_count().get(),
                iterations = run.workload.iterations().get(),
                seed = run.seed,
                assert_level = %run.assertions.run_level(),
                "starting workload agents"
            );

            for offset in 0..run.workload.thread_count().get() {
                let tid = run.tid_base + offset;
                let mut agent = WorkerAgent::new(
                    tid,
                    run.workload.clone(),
                    Arc::clone(fixture),
                    Arc::clone(&run.collection),
                    run.assertions,
                    agent_seed(run.seed, tid),
                );
                if let Some(barrier) = &barrier {
                    agent = agent.with_start_barrier(Arc::clone(barrier));
                }

                pending.insert(tid, index);
                let started = spawn_agent(&handle, finished.clone(), index, tid, agent);
                if let Err(error) = started {
                    warn!(tid, %error, "failed to start agent thread");
                    // Stand in at the barrier so the started agents are released.
                    if let Some(barrier) = barrier.clone() {
                        handle.spawn(async move {
                            barrier.wait().await;
                        });
                    }
                }
            }
        }
        drop(finished);

        // Full join: a failed agent never cuts the others short.
        while let Some((index, outcome)) = outcomes.recv().await {
            pending.remove(&outcome.tid);
            runs[index].agents.push(outcome);
        }

        for (tid, index) in pending {
            let run = &mut runs[index];
            let outcome = lost(
                tid,
                run.workload.start_state(),
                "agent thread ended without reporting".to_owned(),
            );
            run.agents.push(outcome);
        }

        for run in runs.iter_mut() {
            run.agents.sort_by_key(|agent| agent.tid);
        }
    }
}

fn spawn_agent<Fx: ClusterFixture>(
    handle: &Handle,
    finished: mpsc::UnboundedSender<(usize, AgentOutcome)>,
    index: usize,
    tid: usize,
    agent: WorkerAgent<Fx>,
) -> io::Result<()> {
    let handle = handle.clone();
    thread::Builder::new()
        .name(format!("fsm-agent-{tid}"))
        .spawn(move || {
            let outcome = handle.block_on(agent.run());
            if finished.send((index, outcome)).is_err() {
                warn!(tid, "runner stopped listening before the agent finished");
            }
        })
        .map(drop)
}

struct Run<Fx> {
    workload: WorkloadDefinition<Fx>,
    collection: Arc<str>,
    assertions: Assertions,
    seed: u64,
    tid_base: usize,
    tracker: PhaseTracker,
    setup: PhaseResult,
    teardown: PhaseResult,
    agents: Vec<AgentOutcome>,
    started: Instant,
}

impl<Fx: ClusterFixture> Run<Fx> {
    fn new(plan: RunPlan<Fx>, seed: u64, tid_base: usize) -> Self {
        Self {
            workload: plan.workload,
            collection: Arc::from(plan.collection),
            assertions: Assertions::new(plan.assert_level),
            seed,
            tid_base,
            tracker: PhaseTracker::new(),
            setup: PhaseResult::NotRun,
            teardown: PhaseResult::NotRun,
            agents: Vec::new(),
            started: Instant::now(),
        }
    }

    fn is_running(&self) -> bool {
        self.tracker.current() == RunPhase::Running
    }

    async fn set_up(&mut self, fixture: &Fx) {
        self.tracker.advance(self.workload.name(), RunPhase::SettingUp);

        let ctx = PhaseContext::new(fixture, &self.collection, self.workload.name());
        self.setup = run_phase(self.workload.setup_action(), &ctx, "setup").await;

        if let PhaseResult::Failed { message } = &self.setup {
            warn!(workload = self.workload.name(), %message, "setup failed; no agents started");
            self.tracker.advance(self.workload.name(), RunPhase::Aborted);
        } else {
            self.tracker.advance(self.workload.name(), RunPhase::Running);
        }
    }

    async fn tear_down(&mut self, fixture: &Fx) {
        if !self.is_running() {
            return;
        }
        self.tracker
            .advance(self.workload.name(), RunPhase::TearingDown);

        let ctx = PhaseContext::new(fixture, &self.collection, self.workload.name());
        self.teardown = run_phase(self.workload.teardown_action(), &ctx, "teardown").await;

        if let PhaseResult::Failed { message } = &self.teardown {
            warn!(workload = self.workload.name(), %message, "teardown failed");
            self.tracker.advance(self.workload.name(), RunPhase::Aborted);
        } else {
            self.tracker.advance(self.workload.name(), RunPhase::Done);
        }
    }

    fn into_report(self) -> RunReport {
        let report = RunReport {
            workload: self.workload.name().to_owned(),
            collection: self.collection.to_string(),
            seed: Some(self.seed),
            assert_level: self.assertions.run_level(),
            phases: self.tracker.into_history(),
            configuration_error: None,
            setup: self.setup,
            agents: self.agents,
            teardown: self.teardown,
            elapsed: self.started.elapsed(),
        };

        info!(
            workload = %report.workload,
            status = ?report.status(),
            agents = report.agents.len(),
            failed_agents = report.failed_agents().count(),
            elapsed_ms = report.elapsed.as_millis(),
            "workload run finished"
        );
        report
    }
}

async fn run_phase<Fx: ClusterFixture>(
    action: Option<SharedPhaseAction<Fx>>,
    ctx: &PhaseContext<'_, Fx>,
    phase: &str,
) -> PhaseResult {
    let Some(action) = action else {
        return PhaseResult::Passed;
    };

    match AssertUnwindSafe(action.call(ctx)).catch_unwind().await {
        Ok(Ok(())) => PhaseResult::Passed,
        Ok(Err(error)) => PhaseResult::Failed {
            message: error.to_string(),
        },
        Err(panic) => PhaseResult::Failed {
            message: format!("{phase} panicked: {}", panic_message(panic)),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt as _;

    use super::*;
    use crate::{
        fixture::{LocalFixture, MemoryStore},
        runtime::report::{FailureKind, RunStatus},
    };

    type Fx = LocalFixture<MemoryStore>;

    fn fixture() -> Arc<Fx> {
        Arc::new(LocalFixture::new(MemoryStore::new(), "fsm_runner"))
    }

    fn options() -> RunOptions {
        RunOptions {
            seed: Some(11),
            ..RunOptions::default()
        }
    }

    fn toggle(threads: usize, iterations: usize) -> WorkloadBuilder<Fx> {
        WorkloadDefinition::builder("toggle")
            .data("count", 0)
            .state("a", |data, _ctx| {
                async move {
                    data.increment("count", 1)?;
                    Ok(())
                }
                .boxed()
            })
            .state("b", |_data, _ctx| async { Ok(()) }.boxed())
            .transitions("a", [("b", 1.0)])
            .transitions("b", [("a", 1.0)])
            .start_state("a")
            .thread_count(threads)
            .iterations(iterations)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_agent_completes_every_iteration() {
        let workload = toggle(4, 10).build().unwrap();
        let report = Runner::new(options()).execute(&workload, fixture()).await;

        assert_eq!(report.status(), RunStatus::Passed);
        assert_eq!(report.agents.len(), 4);
        for (tid, agent) in report.agents.iter().enumerate() {
            assert_eq!(agent.tid, tid);
            assert_eq!(agent.iterations_completed, 10);
            assert_eq!(agent.terminal_state, "a");
        }
        assert_eq!(
            report.phases,
            vec![
                RunPhase::Idle,
                RunPhase::SettingUp,
                RunPhase::Running,
                RunPhase::TearingDown,
                RunPhase::Done
            ]
        );
        assert_eq!(report.seed, Some(11));
    }

    #[tokio::test]
    async fn blocking_agents_overlap_on_a_single_threaded_runtime() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (live_in, peak_in) = (Arc::clone(&live), Arc::clone(&peak));
        let workload = WorkloadDefinition::<Fx>::builder("blocking")
            .state("init", move |_data, _ctx| {
                let (live, peak) = (Arc::clone(&live_in), Arc::clone(&peak_in));
                async move {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
                .boxed()
            })
            .transitions("init", [("init", 1.0)])
            .thread_count(4)
            .iterations(3)
            .build()
            .unwrap();

        let report = Runner::new(options()).execute(&workload, fixture()).await;

        assert!(report.passed(), "{:?}", report.into_result());
        assert_eq!(peak.load(Ordering::SeqCst), 4);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn odd_iteration_count_ends_in_the_other_state() {
        let workload = toggle(2, 9).build().unwrap();
        let report = Runner::new(options()).execute(&workload, fixture()).await;

        assert!(report.agents.iter().all(|agent| agent.terminal_state == "b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn setup_failure_skips_agents_and_teardown() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&teardowns);
        let workload = toggle(3, 5)
            .setup(|_ctx| async { Err("cannot create collection".into()) }.boxed())
            .teardown(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }.boxed()
            })
            .build()
            .unwrap();

        let report = Runner::new(options()).execute(&workload, fixture()).await;

        assert_eq!(report.status(), RunStatus::InfrastructureFailure);
        assert!(report.agents.is_empty());
        assert_eq!(report.teardown, PhaseResult::NotRun);
        assert_eq!(teardowns.load(Ordering::SeqCst), 0);
        assert_eq!(report.final_phase(), RunPhase::Aborted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_failing_agent_does_not_stop_the_rest() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&teardowns);
        let workload = toggle(4, 10)
            .state("b", |data, _ctx| {
                async move {
                    if data.tid() == 2 && data.iteration() == 5 {
                        return Err("lost connection".into());
                    }
                    Ok(())
                }
                .boxed()
            })
            .teardown(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }.boxed()
            })
            .build()
            .unwrap();

        let report = Runner::new(options()).execute(&workload, fixture()).await;

        assert_eq!(report.status(), RunStatus::WorkloadFailure);
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(report.final_phase(), RunPhase::Done);
        for agent in &report.agents {
            if agent.tid == 2 {
                assert_eq!(agent.iterations_completed, 5);
                assert_eq!(agent.terminal_state, "b");
                let failure = agent.failure.as_ref().unwrap();
                assert_eq!(failure.kind, FailureKind::Action);
                assert_eq!(failure.message, "lost connection");
            } else {
                assert_eq!(agent.iterations_completed, 10);
                assert!(agent.passed());
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panics_are_reported_as_failures() {
        let workload = toggle(2, 4)
            .state("a", |_data, _ctx| async { panic!("index corrupted") }.boxed())
            .build()
            .unwrap();

        let report = Runner::new(options()).execute(&workload, fixture()).await;

        assert_eq!(report.failed_agents().count(), 2);
        let failure = report.agents[0].failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Panic);
        assert!(failure.message.contains("index corrupted"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn teardown_failure_aborts_after_a_clean_run() {
        let workload = toggle(2, 2)
            .teardown(|_ctx| async { Err("drop failed".into()) }.boxed())
            .build()
            .unwrap();

        let report = Runner::new(options()).execute(&workload, fixture()).await;

        assert_eq!(report.status(), RunStatus::InfrastructureFailure);
        assert!(report.agents.iter().all(AgentOutcome::passed));
        assert_eq!(report.final_phase(), RunPhase::Aborted);
    }

    #[tokio::test]
    async fn invalid_builder_is_reported_as_misconfigured() {
        let report = Runner::new(options())
            .execute_builder(toggle(0, 1), fixture())
            .await;

        assert_eq!(report.status(), RunStatus::Misconfigured);
        assert!(report.agents.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn setup_precedes_and_teardown_follows_every_action() {
        let workload = WorkloadDefinition::<Fx>::builder("ordering")
            .state("init", |_data, ctx| {
                async move {
                    let marker = ctx.db().count(ctx.collection(), |doc| doc["setup"] == true);
                    ctx.assert_always().equals(marker, 1, "setup marker")?;
                    ctx.db().insert(ctx.collection(), serde_json::json!({ "tid": ctx.tid() }));
                    Ok(())
                }
                .boxed()
            })
            .transitions("init", [("init", 1.0)])
            .thread_count(3)
            .iterations(4)
            .setup(|ctx| {
                async move {
                    ctx.db().insert(ctx.collection(), serde_json::json!({ "setup": true }));
                    Ok(())
                }
                .boxed()
            })
            .teardown(|ctx| {
                async move {
                    let written = ctx.db().count(ctx.collection(), |doc| doc.get("tid").is_some());
                    if written != 12 {
                        return Err(format!("expected 12 agent documents, saw {written}").into());
                    }
                    ctx.db().drop_collection(ctx.collection());
                    Ok(())
                }
                .boxed()
            })
            .build()
            .unwrap();

        let fixture = fixture();
        let report = Runner::new(options())
            .execute(&workload, Arc::clone(&fixture))
            .await;

        assert!(report.passed(), "{:?}", report.into_result());
        assert!(fixture.db().collection_names().is_empty());
    }
}
