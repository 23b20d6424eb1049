use super::{ClusterFixture, ConnectionCache};

/// Fixture over an in-process database handle, used for local runs and tests.
pub struct LocalFixture<Db, Conn = ()> {
    db: Db,
    collection: String,
    connections: ConnectionCache<Conn>,
}

impl<Db> LocalFixture<Db, ()> {
    #[must_use]
    pub fn new(db: Db, collection: impl Into<String>) -> Self {
        Self {
            db,
            collection: collection.into(),
            connections: ConnectionCache::new(),
        }
    }
}

impl<Db, Conn> LocalFixture<Db, Conn> {
    /// Swap in a populated connection cache.
    #[must_use]
    pub fn with_connections<NewConn>(
        self,
        connections: ConnectionCache<NewConn>,
    ) -> LocalFixture<Db, NewConn> {
        let Self { db, collection, .. } = self;

        LocalFixture {
            db,
            collection,
            connections,
        }
    }
}

impl<Db, Conn> ClusterFixture for LocalFixture<Db, Conn>
where
    Db: Send + Sync + 'static,
    Conn: Send + Sync + 'static,
{
    type Db = Db;
    type Conn = Conn;

    fn db(&self) -> &Db {
        &self.db
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn connections(&self) -> &ConnectionCache<Conn> {
        &self.connections
    }
}
