//! Frame encoding: `[u32 length little-endian][length bytes body]`.

/// 4-byte ASCII file identifier, sliced from body offset 4..8.
///
/// Bodies shorter than 8 bytes have no file identifier; this is represented
/// as `None` rather than a sentinel, so it can never collide with a genuine
/// all-zero identifier.
pub type FileId = [u8; 4];

pub const LENGTH_PREFIX_SIZE: u64 = 4;

/// Extracts the file identifier from a record body per the framing algorithm.
pub fn file_id_of(body: &[u8]) -> Option<FileId> {
    if body.len() < 8 {
        return None;
    }
    let mut id = [0u8; 4];
    id.copy_from_slice(&body[4..8]);
    Some(id)
}

/// Appends one frame (`length` prefix + `body`) to `buf`, returning the
/// offset the frame was written at.
pub fn write_frame(buf: &mut Vec<u8>, body: &[u8]) -> u64 {
    let offset = buf.len() as u64;
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    offset
}

/// One successfully parsed frame: its body slice and the offset one past its
/// end (where the next frame, if any, begins).
pub struct ParsedFrame<'a> {
    pub body: &'a [u8],
    pub next_offset: usize,
}

/// Attempts to parse one frame starting at `input[offset..]`. Returns `None`
/// for a truncated tail (not enough bytes yet for length prefix or body) —
/// this is the normal, non-error "retry with more input" case.
pub fn parse_frame(input: &[u8], offset: usize) -> Option<ParsedFrame<'_>> {
    if offset + 4 > input.len() {
        return None;
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&input[offset..offset + 4]);
    let length = u32::from_le_bytes(len_bytes) as usize;
    let body_start = offset + 4;
    let body_end = body_start.checked_add(length)?;
    if body_end > input.len() {
        return None;
    }
    Some(ParsedFrame {
        body: &input[body_start..body_end],
        next_offset: body_end,
    })
}
