//! Core types for the frame store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte offset of a frame header within the backing file.
///
/// Returned by [`RecordStore::append`](crate::RecordStore::append) and handed
/// back to [`RecordStore::read`](crate::RecordStore::read). Callers should treat
/// it as an opaque locator.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Position(pub u64);

impl Position {
    /// Position of the frame that follows a frame of `frame_len` bytes at `self`.
    pub fn advance(self, frame_len: u64) -> Self {
        Position(self.0 + frame_len)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({})", self.0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Position> for u64 {
    fn from(pos: Position) -> Self {
        pos.0
    }
}

/// Store statistics for the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Logical end offset, buffered bytes included.
    pub size: u64,
    /// Frames appended since the store was opened.
    pub records_appended: u64,
    /// Times the write buffer was pushed to the file.
    pub flushes: u64,
}
