use fsm_framework_core::{
    ClusterFixture, ConfigError, MemoryStore, WorkloadBuilder, WorkloadDefinition,
};
use futures::FutureExt as _;
use serde_json::{Value, json};
use tracing::info;

use super::util::{count_for_tid, ensure_index, require_index};

pub const NAME: &str = "indexed_insert";
const DEFAULT_FIELD: &str = "indexed_insert";
const DEFAULT_THREADS: usize = 20;
const DEFAULT_ITERATIONS: usize = 50;

/// Each thread inserts documents tagged with its tid into an indexed field,
/// interleaved with lookups through that field.
///
/// Exact per-thread counts only hold while nothing else writes or drops the
/// collection, so they are checked at `own_coll`.
#[derive(Clone, Debug)]
pub struct IndexedInsert {
    field: String,
    threads: usize,
    iterations: usize,
}

impl Default for IndexedInsert {
    fn default() -> Self {
        Self {
            field: DEFAULT_FIELD.to_owned(),
            threads: DEFAULT_THREADS,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl IndexedInsert {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn indexed_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
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

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Unvalidated builder, for callers that want to adjust it further.
    #[must_use]
    pub fn builder<Fx>(&self) -> WorkloadBuilder<Fx>
    where
        Fx: ClusterFixture<Db = MemoryStore>,
    {
        let setup_field = self.field.clone();
        let teardown_field = self.field.clone();

        WorkloadDefinition::<Fx>::builder(NAME)
            .data("indexed_field", self.field.as_str())
            .data("inserted", 0)
            .thread_count(self.threads)
            .iterations(self.iterations)
            .state("init", |_data, _ctx| async { Ok(()) }.boxed())
            .state("insert", |data, ctx| {
                async move {
                    let field: String = data.get_as("indexed_field")?;
                    let tid = data.tid();
                    ctx.db()
                        .insert(ctx.collection(), json!({ "tid": tid, field: tid }));
                    let inserted = data.increment("inserted", 1)?;

                    let count = count_for_tid(ctx.db(), ctx.collection(), tid);
                    ctx.assert_when_own_coll().equals(
                        count as i64,
                        inserted,
                        "documents inserted by this thread",
                    )?;
                    Ok(())
                }
                .boxed()
            })
            .state("find", |data, ctx| {
                async move {
                    let field: String = data.get_as("indexed_field")?;
                    let inserted: i64 = data.get_as("inserted")?;
                    let tid = data.tid() as u64;

                    let found = ctx.db().count(ctx.collection(), |doc| {
                        doc.get(&field).and_then(Value::as_u64) == Some(tid)
                    });
                    ctx.assert_when_own_coll().equals(
                        found as i64,
                        inserted,
                        "documents found through the index",
                    )?;
                    Ok(())
                }
                .boxed()
            })
            .transitions("init", [("insert", 1.0)])
            .transitions("insert", [("insert", 0.2), ("find", 0.8)])
            .transitions("find", [("insert", 0.8), ("find", 0.2)])
            .setup(move |ctx| {
                let field = setup_field.clone();
                async move {
                    info!(collection = ctx.collection(), %field, "creating index");
                    ensure_index(ctx.db(), ctx.collection(), &field);
                    Ok(())
                }
                .boxed()
            })
            .teardown(move |ctx| {
                let field = teardown_field.clone();
                async move {
                    require_index(ctx.db(), ctx.collection(), &field)?;
                    let removed = ctx
                        .db()
                        .delete_many(ctx.collection(), |doc| doc.get(&field).is_some());
                    info!(collection = ctx.collection(), removed, "removed inserted documents");
                    Ok(())
                }
                .boxed()
            })
    }

    pub fn build<Fx>(&self) -> Result<WorkloadDefinition<Fx>, ConfigError>
    where
        Fx: ClusterFixture<Db = MemoryStore>,
    {
        self.builder().build()
    }
}
