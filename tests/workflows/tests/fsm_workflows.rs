//! End-to-end runs of the workload library against the in-memory fixture.
//!
//! ```text
//! WorkloadDefinition ──▶ Runner / Suite ──▶ setup ─▶ agents (barrier) ─▶ teardown
//!        ▲                                                   │
//!   extend / compose                                   RunReport (JSON)
//! ```

use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use fsm_framework_core::{
    AssertLevel, ClusterFixture, CollectionMode, RunStatus, Schedule, WorkloadDefinition,
    WorkloadOverride,
    runtime::FailureKind,
};
use futures::FutureExt as _;
use tests_workflows::{
    CounterToggle, Fixture, IndexedInsert, IndexedInsertUpdate, Runner, Suite, collection_wiper,
    init_tracing, local_fixture, seeded,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counter_toggle_runs_to_completion() -> Result<()> {
    init_tracing();
    let toggle = CounterToggle::new();
    let workload = toggle.build::<Fixture>()?;

    let report = Runner::new(seeded(1))
        .execute(&workload, local_fixture("toggle"))
        .await
        .into_result()?;

    assert_eq!(report.agents.len(), 4);
    assert!(
        report
            .agents
            .iter()
            .all(|agent| agent.iterations_completed == 10 && agent.terminal_state == "a")
    );

    let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(json["seed"], 1);
    assert_eq!(json["setup"]["result"], "passed");
    assert_eq!(json["phases"].as_array().map(Vec::len), Some(5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn indexed_workloads_pass_when_they_own_the_database() -> Result<()> {
    init_tracing();
    let insert = IndexedInsert::new().threads(6).iterations(25);
    let fixture = local_fixture("indexed");

    for workload in [
        insert.build::<Fixture>()?,
        IndexedInsertUpdate::with_base(insert.clone()).build::<Fixture>()?,
    ] {
        Runner::new(seeded(2))
            .execute(&workload, Arc::clone(&fixture))
            .await
            .into_result()?;
        assert_eq!(fixture.db().count_all("indexed"), 0);
    }

    assert_eq!(fixture.db().indexes("indexed"), vec![insert.field().to_owned()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ownership_checks_catch_interference_only_when_enabled() -> Result<()> {
    init_tracing();
    let insert = IndexedInsert::new().threads(4).iterations(40).build::<Fixture>()?;
    let wiper = collection_wiper(2, 40)?;

    // Sharing one collection lowers the level to `always`, so the exact
    // counts inside indexed_insert are skipped.
    let shared = Suite::new(
        seeded(3)
            .with_schedule(Schedule::Parallel)
            .with_collection_mode(CollectionMode::Shared),
    )
    .execute(&[insert.clone(), wiper], local_fixture("shared"))
    .await
    .into_result()?;
    assert!(
        shared
            .runs
            .iter()
            .all(|run| run.assert_level == AssertLevel::Always)
    );

    // A find state that empties the collection before counting breaks every
    // agent's per-thread count no matter how the threads interleave.
    let wiped = IndexedInsert::new()
        .threads(4)
        .iterations(10)
        .build::<Fixture>()?
        .extend(|builder, base| {
            let Some(find) = base.state_action("find") else {
                return builder;
            };
            builder
                .name("indexed_insert_wiped")
                .transitions("insert", [("find", 1.0)])
                .state("find", move |data, ctx| {
                    let find = Arc::clone(&find);
                    async move {
                        ctx.db().delete_many(ctx.collection(), |_| true);
                        find.call(data, ctx).await
                    }
                    .boxed()
                })
        })?;

    let report = Runner::new(seeded(4).with_assert_level(AssertLevel::OwnColl))
        .execute(&wiped, local_fixture("contended"))
        .await;
    assert_eq!(report.status(), RunStatus::WorkloadFailure);
    assert_eq!(report.failed_agents().count(), 4);
    for agent in &report.agents {
        let failure = agent
            .failure
            .as_ref()
            .ok_or_else(|| anyhow!("agent {} survived the wipe", agent.tid))?;
        assert_eq!(
            failure.kind,
            FailureKind::Assertion {
                level: AssertLevel::OwnColl
            }
        );
        assert!(agent.iterations_completed <= 2);
    }

    Runner::new(seeded(4).with_assert_level(AssertLevel::Always))
        .execute(&wiped, local_fixture("tolerated"))
        .await
        .into_result()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_suite_isolates_collections() -> Result<()> {
    init_tracing();
    let fixture = local_fixture("suite");
    let workloads = [
        IndexedInsert::new().threads(3).iterations(20).build::<Fixture>()?,
        CounterToggle::new().build::<Fixture>()?,
    ];

    let report = Suite::new(seeded(5).with_schedule(Schedule::Parallel))
        .execute(&workloads, Arc::clone(&fixture))
        .await
        .into_result()?;

    let collections: Vec<&str> = report.runs.iter().map(|run| run.collection.as_str()).collect();
    assert_eq!(collections, ["suite_indexed_insert", "suite_counter_toggle"]);
    assert!(
        report
            .runs
            .iter()
            .all(|run| run.assert_level == AssertLevel::OwnColl)
    );

    let tids: Vec<usize> = report
        .runs
        .iter()
        .flat_map(|run| run.agents.iter().map(|agent| agent.tid))
        .collect();
    assert_eq!(tids, (0..7).collect::<Vec<_>>());

    let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(json["schedule"], "parallel");
    assert_eq!(json["runs"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn composed_workload_leaves_its_base_untouched() -> Result<()> {
    init_tracing();
    let base = CounterToggle::new().threads(2).iterations(6).build::<Fixture>()?;
    let noop = WorkloadDefinition::<Fixture>::builder("noop")
        .state("init", |_data, _ctx| async { Ok(()) }.boxed())
        .transitions("init", [("init", 1.0)])
        .build()?;
    let b_action = noop
        .state_action("init")
        .context("noop workload defines init")?;

    let derived = base.compose(
        WorkloadOverride::new()
            .name("counter_toggle_wide")
            .thread_count(5)
            .state("b", b_action)
            .transitions("a", [("a", 0.0), ("b", 1.0)]),
    )?;

    assert_eq!(base.thread_count().get(), 2);
    assert_eq!(derived.thread_count().get(), 5);
    assert_eq!(derived.iterations(), base.iterations());

    let report = Runner::new(seeded(6))
        .execute(&derived, local_fixture("composed"))
        .await
        .into_result()?;
    assert!(report.agents.iter().all(|agent| agent.terminal_state == "a"));
    Ok(())
}

#[tokio::test]
async fn invalid_workloads_are_reported_as_misconfigured() -> Result<()> {
    let builder = WorkloadDefinition::<Fixture>::builder("broken")
        .state("init", |_data, _ctx| async { Ok(()) }.boxed())
        .transitions("init", [("missing", 1.0)]);

    let report = Runner::new(seeded(7))
        .execute_builder(builder, local_fixture("broken"))
        .await;

    assert_eq!(report.status(), RunStatus::Misconfigured);
    assert!(report.agents.is_empty());
    let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert!(
        json["configuration_error"]
            .as_str()
            .is_some_and(|message| message.contains("missing"))
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_seed_reproduces_every_walk() -> Result<()> {
    let workload = IndexedInsert::new().threads(4).iterations(30).build::<Fixture>()?;

    let first = Runner::new(seeded(99))
        .execute(&workload, local_fixture("replay"))
        .await
        .into_result()?;
    let second = Runner::new(seeded(99))
        .execute(&workload, local_fixture("replay"))
        .await
        .into_result()?;

    assert_eq!(first.agents, second.agents);
    Ok(())
}
