use thiserror::Error;

/// Aggregates every sub-crate's error type into the one surface callers of
/// [`crate::Database`] see, the way the teacher's `DBError` aggregates
/// `TableError`/`IndexError`/etc. Layers below already fold their own
/// dependencies in (`framedb_store::Error` wraps both the log and index
/// errors), so this enum only needs one variant per direct dependency.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] framedb_store::Error),
    #[error(transparent)]
    Query(#[from] framedb_query::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
