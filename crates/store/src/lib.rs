//! Table stores, the multi-source router, and per-table tombstones.
//!
//! Sits between the byte-level [`framedb_log::RecordLog`] and the query
//! bridge: it knows about tables, columns and sources, but nothing about
//! SQL.

mod error;
mod router;
mod table_store;
mod tombstone;

pub use error::Error;
pub use router::Router;
pub use table_store::{BatchExtractor, FastFieldExtractor, FieldExtractor, ResultSink, StoredRow, TableStore};
pub use tombstone::TombstoneSet;

pub type Result<T> = std::result::Result<T, Error>;
