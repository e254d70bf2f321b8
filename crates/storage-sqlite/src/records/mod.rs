//! Canonical record repository.

mod model;
mod repository;

#[cfg(test)]
mod repository_tests;

pub use model::{RecordDB, RecordHistoryDB};
pub use repository::SqliteRecordStore;
