//! SQLite storage for findash.
//!
//! Implements the `RecordStore` contract from `findash-core` with Diesel:
//! - connection pooling and pragmas
//! - embedded migrations
//! - a single writer actor that runs every write in an immediate transaction
//! - the canonical record repository
//!
//! ```text
//! core (collectors, cache, status)
//!                  │  RecordStore
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod records;
pub mod schema;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};
pub use errors::{IntoCore, StorageError};
pub use records::SqliteRecordStore;

pub use findash_core::errors::{DatabaseError, Error, Result};
