use thiserror::Error;

/// Errors raised by [`crate::RecordLog`].
///
/// Corruption (an invalid or out-of-bounds frame length) is always fatal for
/// the call that discovers it; the log is left in its last good state. A
/// truncated tail at the end of an `ingest` call is *not* an error — it is
/// simply unconsumed input the caller should retry with more bytes appended.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("frame at offset {offset} claims length {length}, which escapes the written region ({written} bytes)")]
    Corrupt { offset: u64, length: u32, written: u64 },
    #[error("offset {0} is out of range for this log")]
    OffsetOutOfRange(u64),
    #[error("sequence {0} is not present in this log")]
    SequenceNotFound(u64),
    #[error("ingest_one requires exactly one complete frame, got {consumed} of {total} bytes consumed")]
    IncompleteFrame { consumed: usize, total: usize },
}
