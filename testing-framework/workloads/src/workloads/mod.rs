pub mod counter_toggle;
pub mod indexed_insert;
pub mod indexed_insert_update;
pub mod util;
