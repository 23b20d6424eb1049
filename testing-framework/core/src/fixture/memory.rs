use std::{
    collections::{BTreeMap, BTreeSet},
    sync::RwLock,
};

use serde_json::Value;

#[derive(Default)]
struct Collection {
    documents: Vec<Value>,
    indexes: BTreeSet<String>,
}

/// In-process stand-in for a database: named collections of JSON documents.
///
/// Every operation takes the store lock for its own duration only, so
/// concurrent agents interleave at operation granularity, the same way
/// independent client requests would.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, Collection>) -> T) -> T {
        let guard = self
            .collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut BTreeMap<String, Collection>) -> T) -> T {
        let mut guard = self
            .collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Inserts one document, creating the collection on first use.
    pub fn insert(&self, collection: &str, document: Value) {
        self.write(|collections| {
            collections
                .entry(collection.to_owned())
                .or_default()
                .documents
                .push(document);
        });
    }

    #[must_use]
    pub fn find(&self, collection: &str, filter: impl Fn(&Value) -> bool) -> Vec<Value> {
        self.read(|collections| {
            collections
                .get(collection)
                .map(|coll| {
                    coll.documents
                        .iter()
                        .filter(|doc| filter(doc))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    #[must_use]
    pub fn count(&self, collection: &str, filter: impl Fn(&Value) -> bool) -> usize {
        self.read(|collections| {
            collections
                .get(collection)
                .map_or(0, |coll| coll.documents.iter().filter(|doc| filter(doc)).count())
        })
    }

    #[must_use]
    pub fn count_all(&self, collection: &str) -> usize {
        self.count(collection, |_| true)
    }

    /// Applies `update` to every matching document; returns how many matched.
    pub fn update_many(
        &self,
        collection: &str,
        filter: impl Fn(&Value) -> bool,
        mut update: impl FnMut(&mut Value),
    ) -> usize {
        self.write(|collections| {
            let Some(coll) = collections.get_mut(collection) else {
                return 0;
            };
            let mut matched = 0;
            for doc in coll.documents.iter_mut().filter(|doc| filter(doc)) {
                update(doc);
                matched += 1;
            }
            matched
        })
    }

    pub fn delete_many(&self, collection: &str, filter: impl Fn(&Value) -> bool) -> usize {
        self.write(|collections| {
            let Some(coll) = collections.get_mut(collection) else {
                return 0;
            };
            let before = coll.documents.len();
            coll.documents.retain(|doc| !filter(doc));
            before - coll.documents.len()
        })
    }

    /// Returns `false` when the index already existed.
    pub fn create_index(&self, collection: &str, field: &str) -> bool {
        self.write(|collections| {
            collections
                .entry(collection.to_owned())
                .or_default()
                .indexes
                .insert(field.to_owned())
        })
    }

    #[must_use]
    pub fn indexes(&self, collection: &str) -> Vec<String> {
        self.read(|collections| {
            collections
                .get(collection)
                .map(|coll| coll.indexes.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Removes the collection with its documents and indexes.
    pub fn drop_collection(&self, collection: &str) -> bool {
        self.write(|collections| collections.remove(collection).is_some())
    }

    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        self.read(|collections| collections.keys().cloned().collect())
    }
}
