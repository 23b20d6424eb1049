pub mod workloads;

pub use workloads::{
    counter_toggle::CounterToggle, indexed_insert::IndexedInsert,
    indexed_insert_update::IndexedInsertUpdate,
};
