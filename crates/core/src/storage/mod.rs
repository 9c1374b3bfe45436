pub mod memory;
pub mod record;

pub use memory::{sample_records, InMemoryRecordStore};
pub use record::RecordStore;
