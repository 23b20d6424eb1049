use std::sync::Arc;

use fsm_framework_core::{ClusterFixture, ConfigError, MemoryStore, WorkloadDefinition};
use futures::FutureExt as _;
use serde_json::json;

use super::{
    indexed_insert::IndexedInsert,
    util::{count_for_tid, written_by},
};

pub const NAME: &str = "indexed_insert_update";

/// `indexed_insert` whose insert state also rewrites every document the
/// thread owns, checking the update touched exactly what it inserted.
#[derive(Clone, Debug, Default)]
pub struct IndexedInsertUpdate {
    base: IndexedInsert,
}

impl IndexedInsertUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base(base: IndexedInsert) -> Self {
        Self { base }
    }

    #[must_use]
    pub const fn base(&self) -> &IndexedInsert {
        &self.base
    }

    pub fn build<Fx>(&self) -> Result<WorkloadDefinition<Fx>, ConfigError>
    where
        Fx: ClusterFixture<Db = MemoryStore>,
    {
        let base = self.base.build::<Fx>()?;
        derive(&base)
    }
}

/// Derives the update variant from an already built `indexed_insert`.
pub fn derive<Fx>(base: &WorkloadDefinition<Fx>) -> Result<WorkloadDefinition<Fx>, ConfigError>
where
    Fx: ClusterFixture<Db = MemoryStore>,
{
    base.extend(|builder, base| {
        let builder = builder.name(NAME).data("updates", 0);
        let Some(insert) = base.state_action("insert") else {
            return builder;
        };

        builder.state("insert", move |data, ctx| {
            let insert = Arc::clone(&insert);
            async move {
                insert.call(data, ctx).await?;

                let tid = data.tid();
                let stamp = data.iteration();
                let updated = ctx.db().update_many(ctx.collection(), written_by(tid), |doc| {
                    doc["updated_at"] = json!(stamp);
                });
                data.increment("updates", 1)?;

                let inserted: i64 = data.get_as("inserted")?;
                ctx.assert_when_own_coll()
                    .equals(updated as i64, inserted, "documents updated by this thread")?;

                let stamped = ctx.db().count(ctx.collection(), |doc| {
                    written_by(tid)(doc) && doc["updated_at"] == json!(stamp)
                });
                ctx.assert_when_own_coll().equals(
                    stamped,
                    count_for_tid(ctx.db(), ctx.collection(), tid),
                    "documents carrying the latest update",
                )?;
                Ok(())
            }
            .boxed()
        })
    })
}
