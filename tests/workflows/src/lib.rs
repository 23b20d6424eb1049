use std::sync::Arc;

use fsm_framework_core::{ConfigError, WorkloadDefinition};
pub use fsm_framework_core::{
    LocalFixture, MemoryStore, RunOptions, Runner, Suite, logging::init_tracing,
};
pub use fsm_framework_workloads::{CounterToggle, IndexedInsert, IndexedInsertUpdate};
use futures::FutureExt as _;

pub type Fixture = LocalFixture<MemoryStore>;

/// Fresh in-memory database with `collection` as the default collection.
#[must_use]
pub fn local_fixture(collection: &str) -> Arc<Fixture> {
    Arc::new(LocalFixture::new(MemoryStore::new(), collection))
}

/// Options with a fixed seed so failures reproduce.
#[must_use]
pub fn seeded(seed: u64) -> RunOptions {
    RunOptions::default().with_seed(seed)
}

/// Workload that repeatedly empties its collection. Run beside anything that
/// counts documents, it breaks every exact-count invariant.
pub fn collection_wiper(
    threads: usize,
    iterations: usize,
) -> Result<WorkloadDefinition<Fixture>, ConfigError> {
    WorkloadDefinition::<Fixture>::builder("collection_wiper")
        .state("init", |_data, _ctx| async { Ok(()) }.boxed())
        .state("wipe", |_data, ctx| {
            async move {
                ctx.db().delete_many(ctx.collection(), |_| true);
                Ok(())
            }
            .boxed()
        })
        .transitions("init", [("wipe", 1.0)])
        .transitions("wipe", [("wipe", 1.0)])
        .thread_count(threads)
        .iterations(iterations)
        .build()
}
