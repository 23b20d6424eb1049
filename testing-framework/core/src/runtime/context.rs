use crate::{
    assert::{Assertions, Check},
    fixture::{ClusterFixture, ConnectionCache},
};

/// Everything a state action sees besides its own thread data.
pub struct StateContext<'a, Fx> {
    fixture: &'a Fx,
    collection: &'a str,
    tid: usize,
    pass_connections: bool,
    assertions: Assertions,
}

impl<'a, Fx: ClusterFixture> StateContext<'a, Fx> {
    pub(crate) const fn new(
        fixture: &'a Fx,
        collection: &'a str,
        tid: usize,
        pass_connections: bool,
        assertions: Assertions,
    ) -> Self {
        Self {
            fixture,
            collection,
            tid,
            pass_connections,
            assertions,
        }
    }

    #[must_use]
    pub fn db(&self) -> &'a Fx::Db {
        self.fixture.db()
    }

    #[must_use]
    pub const fn collection(&self) -> &'a str {
        self.collection
    }

    /// Per-node connections, present only for workloads that asked for them.
    #[must_use]
    pub fn connections(&self) -> Option<&'a ConnectionCache<Fx::Conn>> {
        self.pass_connections.then(|| self.fixture.connections())
    }

    #[must_use]
    pub const fn tid(&self) -> usize {
        self.tid
    }

    #[must_use]
    pub const fn assertions(&self) -> Assertions {
        self.assertions
    }

    #[must_use]
    pub fn assert_always(&self) -> Check {
        self.assertions.always()
    }

    #[must_use]
    pub fn assert_when_own_coll(&self) -> Check {
        self.assertions.when_own_coll()
    }

    #[must_use]
    pub fn assert_when_own_db(&self) -> Check {
        self.assertions.when_own_db()
    }
}

/// Context handed to setup and teardown, which run outside any agent.
pub struct PhaseContext<'a, Fx> {
    fixture: &'a Fx,
    collection: &'a str,
    workload: &'a str,
}

impl<'a, Fx: ClusterFixture> PhaseContext<'a, Fx> {
    pub(crate) const fn new(fixture: &'a Fx, collection: &'a str, workload: &'a str) -> Self {
        Self {
            fixture,
            collection,
            workload,
        }
    }

    #[must_use]
    pub fn db(&self) -> &'a Fx::Db {
        self.fixture.db()
    }

    #[must_use]
    pub const fn collection(&self) -> &'a str {
        self.collection
    }

    /// The whole fixture, for phases that manage topology-wide state.
    #[must_use]
    pub const fn cluster(&self) -> &'a Fx {
        self.fixture
    }

    #[must_use]
    pub const fn workload(&self) -> &'a str {
        self.workload
    }
}
