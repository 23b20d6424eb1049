use fsm_framework_core::{DynError, MemoryStore};
use serde_json::Value;
use tracing::debug;

/// Matches documents written by thread `tid`.
pub fn written_by(tid: usize) -> impl Fn(&Value) -> bool {
    move |doc| doc.get("tid").and_then(Value::as_u64) == Some(tid as u64)
}

/// Number of documents in `collection` written by thread `tid`.
#[must_use]
pub fn count_for_tid(db: &MemoryStore, collection: &str, tid: usize) -> usize {
    db.count(collection, written_by(tid))
}

/// Creates the index on `field`, tolerating an index left by an earlier run.
pub fn ensure_index(db: &MemoryStore, collection: &str, field: &str) {
    let created = db.create_index(collection, field);
    debug!(collection, field, created, "ensured index");
}

/// Fails unless `collection` still carries an index on `field`.
pub fn require_index(db: &MemoryStore, collection: &str, field: &str) -> Result<(), DynError> {
    if db.indexes(collection).iter().any(|index| index == field) {
        return Ok(());
    }

    Err(format!("index on '{field}' missing from collection '{collection}'").into())
}
