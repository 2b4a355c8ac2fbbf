//! On-disk framing.
//!
//! ```text
//! ┌──────────────────────┬──────────────────┐
//! │ Length N (8, u64 BE) │ Payload (N)      │
//! └──────────────────────┴──────────────────┘
//! ```
//!
//! Frames are packed back to back with no file header, padding, checksum or
//! terminator. A frame's position is the offset of its length header.

use crate::error::{Result, StoreError};

/// Width of the length header.
pub const HEADER_SIZE: u64 = 8;

/// Encode the length header for a payload of `len` bytes.
pub fn encode_header(len: u64) -> [u8; HEADER_SIZE as usize] {
    len.to_be_bytes()
}

/// Decode a length header.
pub fn decode_header(header: [u8; HEADER_SIZE as usize]) -> u64 {
    u64::from_be_bytes(header)
}

/// Total bytes a frame with a `payload_len` byte payload occupies on disk.
pub fn frame_len(payload_len: u64) -> u64 {
    HEADER_SIZE + payload_len
}

/// Fail with `OutOfRange` unless `[offset, offset + len)` lies within `size`.
pub(crate) fn check_range(offset: u64, len: u64, size: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(StoreError::OutOfRange { offset, len, size }),
    }
}

/// Check `[offset, offset + len)` against `size` and convert `len` to a
/// buffer length. Fails with `OutOfRange` if it does not fit in memory.
pub(crate) fn buf_len(offset: u64, len: u64, size: u64) -> Result<usize> {
    check_range(offset, len, size)?;
    usize::try_from(len).map_err(|_| StoreError::OutOfRange { offset, len, size })
}
