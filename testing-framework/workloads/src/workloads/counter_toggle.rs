use fsm_framework_core::{ClusterFixture, ConfigError, WorkloadDefinition};
use futures::FutureExt as _;

pub const NAME: &str = "counter_toggle";

/// Two states, `a` and `b`, alternating deterministically. `a` bumps a
/// thread-local counter; both check the counter against the iteration index,
/// so any lost or repeated step shows up as an assertion failure.
#[derive(Clone, Copy, Debug)]
pub struct CounterToggle {
    threads: usize,
    iterations: usize,
}

impl Default for CounterToggle {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 10,
        }
    }
}

impl CounterToggle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub const fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// State an agent ends in after a clean run.
    #[must_use]
    pub const fn expected_terminal_state(&self) -> &'static str {
        if self.iterations % 2 == 0 { "a" } else { "b" }
    }

    pub fn build<Fx: ClusterFixture>(&self) -> Result<WorkloadDefinition<Fx>, ConfigError> {
        WorkloadDefinition::builder(NAME)
            .data("count", 0)
            .state("a", |data, ctx| {
                async move {
                    let count = data.increment("count", 1)?;
                    let expected = (data.iteration() / 2 + 1) as i64;
                    ctx.assert_always().equals(count, expected, "counter after a")?;
                    Ok(())
                }
                .boxed()
            })
            .state("b", |data, ctx| {
                async move {
                    let count: i64 = data.get_as("count")?;
                    let expected = data.iteration().div_ceil(2) as i64;
                    ctx.assert_always().equals(count, expected, "counter in b")?;
                    Ok(())
                }
                .boxed()
            })
            .transitions("a", [("b", 1.0)])
            .transitions("b", [("a", 1.0)])
            .start_state("a")
            .thread_count(self.threads)
            .iterations(self.iterations)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fsm_framework_core::{LocalFixture, MemoryStore, RunOptions, Runner};

    use super::*;

    type Fx = LocalFixture<MemoryStore>;

    async fn run(toggle: CounterToggle) {
        let workload = toggle.build::<Fx>().unwrap();
        let fixture = Arc::new(LocalFixture::new(MemoryStore::new(), "toggle"));
        let report = Runner::new(RunOptions::default()).execute(&workload, fixture).await;

        assert!(report.passed(), "{:?}", report.clone().into_result());
        assert_eq!(report.agents.len(), toggle.threads);
        for agent in &report.agents {
            assert_eq!(agent.iterations_completed, toggle.iterations);
            assert_eq!(agent.terminal_state, toggle.expected_terminal_state());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn even_iterations_end_in_a() {
        run(CounterToggle::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn odd_iterations_end_in_b() {
        run(CounterToggle::new().threads(3).iterations(9)).await;
    }
}
