//! Store contract for canonical records.

mod memory;
mod traits;

pub use memory::InMemoryRecordStore;
pub use traits::{HistoryRange, Pruned, RecordStore, UpsertOutcome};
