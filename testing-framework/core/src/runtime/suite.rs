use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::{
    report::RunReport,
    runner::{RunPlan, Runner},
};
use crate::{
    assert::AssertLevel,
    fixture::ClusterFixture,
    options::{CollectionMode, RunOptions, Schedule},
    workload::WorkloadDefinition,
};

#[derive(Debug, Error)]
#[error("{failed} of {total} workload runs failed\n{summary}")]
pub struct SuiteError {
    pub failed: usize,
    pub total: usize,
    pub summary: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SuiteReport {
    pub schedule: Schedule,
    pub collection_mode: CollectionMode,
    pub runs: Vec<RunReport>,
}

impl SuiteReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.runs.iter().all(RunReport::passed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn into_result(self) -> Result<Self, SuiteError> {
        let failures: Vec<String> = self
            .runs
            .iter()
            .filter_map(|run| run.clone().into_result().err())
            .map(|error| error.to_string())
            .collect();
        if failures.is_empty() {
            return Ok(self);
        }

        Err(SuiteError {
            failed: failures.len(),
            total: self.runs.len(),
            summary: failures.join("\n"),
        })
    }
}

/// Runs a list of workloads either one after another or all at once.
///
/// Running in parallel weakens what each workload may assume about the data
/// it sees, so the suite lowers the assert level accordingly: at most
/// `own_coll` when every workload gets its own collection, and `always` when
/// they share one.
#[derive(Clone, Debug, Default)]
pub struct Suite {
    runner: Runner,
}

impl Suite {
    #[must_use]
    pub const fn new(options: RunOptions) -> Self {
        Self {
            runner: Runner::new(options),
        }
    }

    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        self.runner.options()
    }

    /// Assert level a workload runs with under this suite's options.
    #[must_use]
    pub fn effective_assert_level(&self) -> AssertLevel {
        let options = self.options();
        match (options.schedule, options.collection_mode) {
            (Schedule::Serial, _) => options.assert_level,
            (Schedule::Parallel, CollectionMode::PerWorkload) => {
                options.assert_level.min(AssertLevel::OwnColl)
            }
            (Schedule::Parallel, CollectionMode::Shared) => AssertLevel::Always,
        }
    }

    pub async fn execute<Fx: ClusterFixture>(
        &self,
        workloads: &[WorkloadDefinition<Fx>],
        fixture: Arc<Fx>,
    ) -> SuiteReport {
        let options = self.options();
        let base_seed = self.runner.base_seed();
        let plans = self.plans(workloads, fixture.collection_name());

        info!(
            workloads = workloads.len(),
            schedule = ?options.schedule,
            collection_mode = ?options.collection_mode,
            seed = base_seed,
            "starting workload suite"
        );

        let runs = match options.schedule {
            Schedule::Parallel => {
                self.runner
                    .execute_plans(plans, Arc::clone(&fixture), base_seed, 0)
                    .await
            }
            Schedule::Serial => {
                let mut runs = Vec::with_capacity(plans.len());
                let mut next_tid = 0;
                for (index, plan) in plans.into_iter().enumerate() {
                    let seed = base_seed.wrapping_add(index as u64);
                    let threads = plan.workload.thread_count().get();
                    runs.extend(
                        self.runner
                            .execute_plans(vec![plan], Arc::clone(&fixture), seed, next_tid)
                            .await,
                    );
                    next_tid += threads;
                }
                runs
            }
        };

        SuiteReport {
            schedule: options.schedule,
            collection_mode: options.collection_mode,
            runs,
        }
    }

    fn plans<Fx: ClusterFixture>(
        &self,
        workloads: &[WorkloadDefinition<Fx>],
        collection: &str,
    ) -> Vec<RunPlan<Fx>> {
        let assert_level = self.effective_assert_level();
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for workload in workloads {
            *seen.entry(workload.name()).or_default() += 1;
        }

        workloads
            .iter()
            .enumerate()
            .map(|(index, workload)| {
                let collection = match self.options().collection_mode {
                    CollectionMode::Shared => collection.to_owned(),
                    CollectionMode::PerWorkload if seen[workload.name()] > 1 => {
                        format!("{collection}_{}_{index}", workload.name())
                    }
                    CollectionMode::PerWorkload => format!("{collection}_{}", workload.name()),
                };
                RunPlan {
                    workload: workload.clone(),
                    collection,
                    assert_level,
                }
            })
            .collect()
    }
}
