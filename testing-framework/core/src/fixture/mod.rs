pub mod local;
pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use local::LocalFixture;
pub use memory::MemoryStore;

/// Boundary to the cluster under test.
///
/// Implementations hand out a database handle usable from every agent thread,
/// the collection the run targets, and a read-only cache of per-node
/// connections for actions that inspect individual nodes.
pub trait ClusterFixture: Send + Sync + 'static {
    type Db: Send + Sync + 'static;
    type Conn: Send + Sync + 'static;

    fn db(&self) -> &Self::Db;

    fn collection_name(&self) -> &str;

    fn connections(&self) -> &ConnectionCache<Self::Conn>;
}

/// Role a cached node plays in the deployed topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Router,
    ConfigServer,
    Shard,
    ReplicaMember,
}

#[derive(Clone, Debug)]
pub struct CachedConnection<C> {
    pub role: NodeRole,
    pub conn: C,
}

/// Node id to connection mapping, built by the fixture before a run.
#[derive(Clone, Debug)]
pub struct ConnectionCache<C> {
    nodes: BTreeMap<String, CachedConnection<C>>,
}

impl<C> Default for ConnectionCache<C> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }
}

impl<C> ConnectionCache<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(mut self, id: impl Into<String>, role: NodeRole, conn: C) -> Self {
        self.nodes
            .insert(id.into(), CachedConnection { role, conn });
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&C> {
        self.nodes.get(id).map(|cached| &cached.conn)
    }

    #[must_use]
    pub fn role(&self, id: &str) -> Option<NodeRole> {
        self.nodes.get(id).map(|cached| cached.role)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn by_role(&self, role: NodeRole) -> impl Iterator<Item = (&str, &C)> {
        self.nodes
            .iter()
            .filter(move |(_, cached)| cached.role == role)
            .map(|(id, cached)| (id.as_str(), &cached.conn))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &C)> {
        self.nodes
            .iter()
            .map(|(id, cached)| (id.as_str(), &cached.conn))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
