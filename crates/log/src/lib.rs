//! Append-only, length-prefixed record log.
//!
//! A [`RecordLog`] is the exclusive owner of one growing byte buffer. Bytes
//! are handed to it pre-framed (`ingest`) or as bare bodies (`ingest_body`);
//! it assigns each frame a monotonic sequence number, remembers where it
//! lives, and invokes a caller-supplied callback so higher layers (table
//! stores, indexes) can react without the log knowing anything about them.
//! Modeled on the disk-segment bookkeeping of a message log, reduced to a
//! single in-memory buffer since framedb has no durability layer of its own.

use std::collections::HashMap;

mod error;
mod frame;

pub use error::Error;
pub use frame::{file_id_of, FileId};

pub type Result<T> = std::result::Result<T, Error>;

/// Where one ingested frame landed: its offset in the log and its assigned
/// sequence number. Stored per-file-id, in insertion order, as the unit of
/// iteration for full scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordInfo {
    pub offset_in_log: u64,
    pub sequence: u64,
}

/// A frame's metadata, reconstructed on read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub sequence: u64,
    pub file_id: Option<FileId>,
    pub length: u32,
}

/// A frame's header plus a borrow of its body, aliasing the log's buffer.
#[derive(Debug)]
pub struct StoredRecord<'a> {
    pub header: RecordHeader,
    pub body: &'a [u8],
}

const INITIAL_CAPACITY: usize = 4096;

/// The append-only record arena.
///
/// `buf` grows geometrically (at least doubling) and is never shrunk.
/// Everything below `write_offset` is live, fully-written data; anything
/// past it is uninitialized slack reserved for the next frame.
pub struct RecordLog {
    buf: Vec<u8>,
    write_offset: u64,
    next_sequence: u64,
    /// `sequence_to_offset[sequence - 1] == offset`, since sequences are
    /// dense and monotonic from 1.
    sequence_to_offset: Vec<u64>,
    by_file_id: HashMap<Option<FileId>, Vec<RecordInfo>>,
}

impl std::fmt::Debug for RecordLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLog")
            .field("write_offset", &self.write_offset)
            .field("next_sequence", &self.next_sequence)
            .field("buf_capacity", &self.buf.capacity())
            .field("file_ids", &self.by_file_id.len())
            .finish()
    }
}

impl Default for RecordLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLog {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Like [`RecordLog::new`] but pre-allocates `capacity` bytes instead of
    /// [`INITIAL_CAPACITY`], so a caller with a size estimate can avoid the
    /// first few doublings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(INITIAL_CAPACITY)],
            write_offset: 0,
            next_sequence: 1,
            sequence_to_offset: Vec::new(),
            by_file_id: HashMap::new(),
        }
    }

    pub fn len(&self) -> u64 {
        self.write_offset
    }

    pub fn is_empty(&self) -> bool {
        self.write_offset == 0
    }

    pub fn record_count(&self) -> u64 {
        self.sequence_to_offset.len() as u64
    }

    fn ensure_capacity(&mut self, additional: usize) {
        let needed = self.write_offset as usize + additional;
        if needed <= self.buf.len() {
            return;
        }
        let mut new_len = self.buf.len().max(INITIAL_CAPACITY);
        while new_len < needed {
            new_len *= 2;
        }
        self.buf.resize(new_len, 0);
    }

    /// Copies one parsed frame into the buffer at the current write offset,
    /// assigns it the next sequence, and records its position. Returns the
    /// sequence assigned.
    #[tracing::instrument(level = "trace", skip(self, body, on_record))]
    fn store_frame<F>(&mut self, body: &[u8], mut on_record: F) -> u64
    where
        F: FnMut(Option<FileId>, &[u8], u64, u64),
    {
        let frame_offset = self.write_offset;
        self.ensure_capacity(4 + body.len());
        let w = self.write_offset as usize;
        self.buf[w..w + 4].copy_from_slice(&(body.len() as u32).to_le_bytes());
        self.buf[w + 4..w + 4 + body.len()].copy_from_slice(body);
        self.write_offset += (4 + body.len()) as u64;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.sequence_to_offset.push(frame_offset);

        let file_id = frame::file_id_of(body);
        self.by_file_id.entry(file_id).or_default().push(RecordInfo {
            offset_in_log: frame_offset,
            sequence,
        });

        let body_start = w + 4;
        on_record(file_id, &self.buf[body_start..body_start + body.len()], sequence, frame_offset);
        sequence
    }

    /// Parses as many complete frames out of `bytes` as fit, stopping at the
    /// first truncated frame. Returns `(bytes_consumed, records_processed)`;
    /// the caller retains the unconsumed tail for retry once more bytes
    /// arrive.
    #[tracing::instrument(level = "debug", skip(self, bytes, on_record))]
    pub fn ingest<F>(&mut self, bytes: &[u8], mut on_record: F) -> (usize, usize)
    where
        F: FnMut(Option<FileId>, &[u8], u64, u64),
    {
        let mut offset = 0usize;
        let mut processed = 0usize;
        while let Some(parsed) = frame::parse_frame(bytes, offset) {
            self.store_frame(parsed.body, &mut on_record);
            offset = parsed.next_offset;
            processed += 1;
        }
        (offset, processed)
    }

    /// Like [`RecordLog::ingest`] but requires `framed_bytes` to contain
    /// exactly one complete frame and nothing else.
    pub fn ingest_one<F>(&mut self, framed_bytes: &[u8], on_record: F) -> Result<u64>
    where
        F: FnMut(Option<FileId>, &[u8], u64, u64),
    {
        let parsed = frame::parse_frame(framed_bytes, 0).ok_or(Error::IncompleteFrame {
            consumed: 0,
            total: framed_bytes.len(),
        })?;
        if parsed.next_offset != framed_bytes.len() {
            return Err(Error::IncompleteFrame {
                consumed: parsed.next_offset,
                total: framed_bytes.len(),
            });
        }
        let body = parsed.body;
        Ok(self.store_frame(body, on_record))
    }

    /// Convenience for pre-stripped bodies: prepends the length prefix
    /// internally and delegates to [`RecordLog::ingest_one`].
    pub fn ingest_body<F>(&mut self, body_bytes: &[u8], on_record: F) -> Result<u64>
    where
        F: FnMut(Option<FileId>, &[u8], u64, u64),
    {
        let mut framed = Vec::with_capacity(4 + body_bytes.len());
        frame::write_frame(&mut framed, body_bytes);
        self.ingest_one(&framed, on_record)
    }

    /// Resets all state, copies `bytes` wholesale, then replays the frame
    /// parser and callback from offset 0. Used to restore state from an
    /// [`RecordLog::export`].
    #[tracing::instrument(level = "debug", skip(self, bytes, on_record))]
    pub fn load_and_rebuild<F>(&mut self, bytes: &[u8], mut on_record: F)
    where
        F: FnMut(Option<FileId>, &[u8], u64, u64),
    {
        self.buf = vec![0u8; bytes.len().max(INITIAL_CAPACITY)];
        self.buf[..bytes.len()].copy_from_slice(bytes);
        self.write_offset = 0;
        self.next_sequence = 1;
        self.sequence_to_offset.clear();
        self.by_file_id.clear();

        let mut offset = 0usize;
        let live = bytes.len();
        while let Some(parsed) = frame::parse_frame(&self.buf[..live], offset) {
            let len = parsed.body.len();
            let body_start = offset + 4;
            let frame_offset = offset as u64;
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            self.sequence_to_offset.push(frame_offset);
            let file_id = frame::file_id_of(&self.buf[body_start..body_start + len]);
            self.by_file_id.entry(file_id).or_default().push(RecordInfo {
                offset_in_log: frame_offset,
                sequence,
            });
            on_record(file_id, &self.buf[body_start..body_start + len], sequence, frame_offset);
            offset = parsed.next_offset;
        }
        self.write_offset = offset as u64;
    }

    /// O(1) body lookup by offset. Errors if `offset` is out of range or the
    /// framed length would escape the written region — this indicates log
    /// corruption, since every stored frame was already validated on ingest.
    pub fn data_at(&self, offset: u64) -> Result<&[u8]> {
        let off = offset as usize;
        if offset >= self.write_offset || off + 4 > self.write_offset as usize {
            return Err(Error::OffsetOutOfRange(offset));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.buf[off..off + 4]);
        let length = u32::from_le_bytes(len_bytes);
        let body_end = off + 4 + length as usize;
        if body_end as u64 > self.write_offset {
            return Err(Error::Corrupt {
                offset,
                length,
                written: self.write_offset,
            });
        }
        Ok(&self.buf[off + 4..body_end])
    }

    /// The inverse of the sequence → offset map: `offset_of(s)` and the
    /// `sequence` field of whatever `read_record`/`data_at` return at that
    /// offset are mutual inverses, per the log's offset/sequence invariant.
    pub fn offset_of(&self, sequence: u64) -> Result<u64> {
        sequence
            .checked_sub(1)
            .and_then(|i| self.sequence_to_offset.get(i as usize))
            .copied()
            .ok_or(Error::SequenceNotFound(sequence))
    }

    /// Resolves a stored frame via the sequence → offset map.
    pub fn read_record(&self, sequence: u64) -> Result<StoredRecord<'_>> {
        let offset = self.offset_of(sequence)?;
        let body = self.data_at(offset)?;
        Ok(StoredRecord {
            header: RecordHeader {
                sequence,
                file_id: frame::file_id_of(body),
                length: body.len() as u32,
            },
            body,
        })
    }

    /// Walks the per-file-id record vector in insertion order.
    pub fn iterate_by_file_id<F>(&self, file_id: Option<FileId>, mut visitor: F) -> Result<()>
    where
        F: FnMut(RecordInfo, &[u8]),
    {
        let Some(infos) = self.by_file_id.get(&file_id) else {
            return Ok(());
        };
        for info in infos {
            let body = self.data_at(info.offset_in_log)?;
            visitor(*info, body);
        }
        Ok(())
    }

    pub fn record_infos_for(&self, file_id: Option<FileId>) -> &[RecordInfo] {
        self.by_file_id.get(&file_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Copies the live prefix of the buffer (offsets `0..write_offset`).
    pub fn export(&self) -> Vec<u8> {
        self.buf[..self.write_offset as usize].to_vec()
    }
}
