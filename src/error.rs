//! Error types for the frame store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A read of `len` bytes at `offset` would run past the logical end of the store.
    #[error("Read out of range: offset {offset}, len {len}, size {size}")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    #[error("Store is closed")]
    Closed,

    /// A buffered write or flush failed earlier; the on-disk tail is unknown.
    #[error("Store is poisoned by an earlier write failure")]
    Poisoned,
}

impl StoreError {
    /// True for errors caused by the caller asking for bytes the store does not have.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, StoreError::OutOfRange { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
