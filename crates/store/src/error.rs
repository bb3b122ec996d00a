use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("unknown column `{0}` on table `{1}`")]
    UnknownColumn(String, String),
    #[error("source `{0}` is already registered")]
    SourceAlreadyRegistered(String),
    #[error("unknown source `{0}`")]
    UnknownSource(String),
    #[error("index key rejected: {0}")]
    Index(#[from] framedb_index::Error),
    #[error(transparent)]
    Log(#[from] framedb_log::Error),
}
