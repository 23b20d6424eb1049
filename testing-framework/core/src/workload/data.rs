use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field values copied into every agent's record at start.
pub type InitialData = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("thread data has no field '{field}'")]
    MissingField { field: String },
    #[error("thread data field '{field}' has an unexpected shape: {source}")]
    Decode {
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("value for thread data field '{field}' cannot be stored: {source}")]
    Encode {
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("thread data field '{field}' is not an integer")]
    NotAnInteger { field: String },
}

/// Private mutable record of one worker agent.
///
/// Seeded from the workload's initial data plus the agent's `tid`; only the
/// owning agent's state actions ever see it.
#[derive(Clone, Debug, Serialize)]
pub struct ThreadData {
    tid: usize,
    iteration: usize,
    thread_count: usize,
    iterations: usize,
    fields: Map<String, Value>,
}

impl ThreadData {
    #[must_use]
    pub fn new(tid: usize, thread_count: usize, iterations: usize, initial: &InitialData) -> Self {
        Self {
            tid,
            iteration: 0,
            thread_count,
            iterations,
            fields: initial.clone(),
        }
    }

    /// Identifier of the owning agent, stable for the agent's lifetime.
    #[must_use]
    pub const fn tid(&self) -> usize {
        self.tid
    }

    /// Zero-based index of the iteration currently executing.
    #[must_use]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }

    pub(crate) const fn set_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.thread_count
    }

    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<T, DataError> {
        let value = self.get(field).ok_or_else(|| DataError::MissingField {
            field: field.to_owned(),
        })?;

        serde_json::from_value(value.clone()).map_err(|source| DataError::Decode {
            field: field.to_owned(),
            source,
        })
    }

    pub fn set<T: Serialize>(&mut self, field: &str, value: T) -> Result<(), DataError> {
        let value = serde_json::to_value(value).map_err(|source| DataError::Encode {
            field: field.to_owned(),
            source,
        })?;
        self.fields.insert(field.to_owned(), value);
        Ok(())
    }

    pub fn insert_value(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Adds `by` to an integer field (missing fields start at zero) and
    /// returns the new value.
    pub fn increment(&mut self, field: &str, by: i64) -> Result<i64, DataError> {
        let current = match self.fields.get(field) {
            None => 0,
            Some(value) => value.as_i64().ok_or_else(|| DataError::NotAnInteger {
                field: field.to_owned(),
            })?,
        };

        let next = current.saturating_add(by);
        self.fields.insert(field.to_owned(), Value::from(next));
        Ok(next)
    }
}
