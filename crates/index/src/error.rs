use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("NaN is not a valid index key")]
    NanKey,
}
