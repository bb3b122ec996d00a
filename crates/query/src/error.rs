use thiserror::Error;

/// Errors raised at the query bridge layer.
///
/// `QueryParse`/`QueryExec` wrap whatever SQLite itself reported; the bridge
/// never swallows the engine's message. `ParameterBind` is raised before a
/// statement ever reaches SQLite, since a wrong-arity bind is cheaper to
/// reject locally.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("unknown column `{0}` on table `{1}`")]
    UnknownColumn(String, String),
    #[error("expected {expected} bound parameters, got {actual}")]
    ParameterBind { expected: usize, actual: usize },
    #[error("failed to parse query: {0}")]
    QueryParse(String),
    #[error(transparent)]
    QueryExec(#[from] rusqlite::Error),
    #[error(transparent)]
    Store(#[from] framedb_store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
