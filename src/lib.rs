//! # Frame Store
//!
//! A durable, append-only store of opaque binary records: the building block
//! for write-ahead logs and log-structured segments.
//!
//! ## Core Concepts
//!
//! - **Frame**: one record on disk, an 8-byte big-endian length followed by
//!   the payload. Frames are packed back to back.
//! - **Position**: byte offset of a frame's header; the only way to address
//!   a record. An external index maps its own keys to positions.
//! - **Flush**: buffered appends are written to the file before any read, so
//!   a record is readable the moment `append` returns.
//!
//! ## Example
//!
//! ```no_run
//! use framestore::{Position, RecordStore};
//!
//! let store = RecordStore::open("segment.store")?;
//!
//! let (n, pos) = store.append(b"hello")?;
//! assert_eq!((n, pos), (13, Position(0)));
//! assert_eq!(store.read(pos)?, b"hello");
//!
//! store.close()?;
//! # Ok::<(), framestore::StoreError>(())
//! ```

pub mod error;
pub mod frame;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use frame::HEADER_SIZE;
pub use store::{FrameIterator, RecordStore, StoreConfig};
pub use types::{Position, StoreStats};
