//! Append-only record store over a single growable file.

use crate::error::{Result, StoreError};
use crate::frame::{self, HEADER_SIZE};
use crate::types::{Position, StoreStats};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace, warn};

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Capacity of the in-memory write buffer, in bytes. Zero writes every
    /// append straight through to the file.
    pub buffer_capacity: usize,

    /// Also `fsync` on every explicit `flush()` and on `close()`.
    pub sync_on_flush: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            sync_on_flush: false,
        }
    }
}

/// State guarded by the store lock.
struct Inner {
    /// Buffered writer over the backing file. `None` once closed.
    writer: Option<BufWriter<File>>,

    /// Logical end of the store: file length plus unflushed buffer length.
    size: u64,

    /// Set after any failed write, flush or sync.
    poisoned: bool,

    records_appended: u64,
    flushes: u64,
}

impl Inner {
    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        match self.writer.as_mut() {
            None => Err(StoreError::Closed),
            Some(_) if self.poisoned => Err(StoreError::Poisoned),
            Some(writer) => Ok(writer),
        }
    }

    /// The backing file. Only valid for positional I/O after `flush_buffer`.
    fn file(&mut self) -> Result<&mut File> {
        Ok(self.writer()?.get_mut())
    }

    fn poison(&mut self, err: io::Error) -> StoreError {
        warn!(error = %err, size = self.size, "record store poisoned");
        self.poisoned = true;
        StoreError::Io(err)
    }

    fn flush_buffer(&mut self) -> Result<()> {
        let writer = self.writer()?;
        if writer.buffer().is_empty() {
            return Ok(());
        }
        let flushed = writer.flush();
        if let Err(e) = flushed {
            return Err(self.poison(e));
        }
        self.flushes += 1;
        trace!(size = self.size, "flushed write buffer");
        Ok(())
    }

    fn sync_file(&mut self) -> Result<()> {
        let synced = self.file()?.sync_all();
        synced.map_err(|e| self.poison(e))
    }

    /// Positional read of the backing file. Call `flush_buffer` first.
    #[cfg(unix)]
    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        use std::os::unix::fs::FileExt;

        FileExt::read_exact_at(&*self.file()?, buf, offset)?;
        Ok(())
    }

    /// Positional read of the backing file. Call `flush_buffer` first.
    #[cfg(not(unix))]
    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        use std::io::Read;

        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        let read = file.read_exact(buf);

        // Appends write at the cursor; if it can't go back to the end the
        // next frame would land on top of existing ones.
        let restored = file.seek(SeekFrom::End(0));
        if let Err(e) = restored {
            return Err(self.poison(e));
        }

        read?;
        Ok(())
    }
}

/// Durable, append-only store of length-prefixed records.
///
/// Each record is framed as an 8-byte big-endian length followed by the
/// payload, and is addressed by the [`Position`] of its header. Appends go
/// through an internal write buffer; every read flushes that buffer first, so
/// a record is readable as soon as `append` returns.
///
/// All operations take one exclusive lock, so they are totally ordered and
/// positions are handed out in lock-acquisition order. Share it across
/// threads with `Arc<RecordStore>`.
///
/// # Failure
///
/// A failed write, flush or sync poisons the store: the file may hold a
/// partial frame that the logical size does not account for, so every later
/// operation returns [`StoreError::Poisoned`]. `close` still releases the file.
pub struct RecordStore {
    config: StoreConfig,
    inner: Mutex<Inner>,
}

impl RecordStore {
    /// Wrap an already-open, writable file with the default config.
    ///
    /// Records already in the file stay readable and new appends continue
    /// after them.
    pub fn new(file: File) -> Result<Self> {
        Self::with_config(file, StoreConfig::default())
    }

    /// Wrap an already-open, writable file.
    pub fn with_config(mut file: File, config: StoreConfig) -> Result<Self> {
        let size = file.metadata()?.len();

        // The buffered writer writes at the cursor.
        file.seek(SeekFrom::End(0))?;

        debug!(
            size,
            buffer_capacity = config.buffer_capacity,
            "opened record store"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                writer: Some(BufWriter::with_capacity(config.buffer_capacity, file)),
                size,
                poisoned: false,
                records_appended: 0,
                flushes: 0,
            }),
            config,
        })
    }

    /// Open or create a store file with the default config.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Open or create a store file.
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        debug!(path = %path.display(), "opening record store file");
        Self::with_config(file, config)
    }

    /// Append a record.
    ///
    /// Returns the number of bytes the frame occupies (header included) and
    /// the position of its header. The bytes may still sit in the write
    /// buffer when this returns.
    pub fn append(&self, record: &[u8]) -> Result<(u64, Position)> {
        let mut inner = self.inner.lock();

        let pos = Position(inner.size);
        let header = frame::encode_header(record.len() as u64);

        let writer = inner.writer()?;
        let written = write_frame(writer, &header, record);
        if let Err(e) = written {
            return Err(inner.poison(e));
        }

        let frame_len = frame::frame_len(record.len() as u64);
        inner.size += frame_len;
        inner.records_appended += 1;

        trace!(position = pos.0, frame_len, "appended frame");
        Ok((frame_len, pos))
    }

    /// Read back the record whose header sits at `pos`.
    ///
    /// `pos` must be a position returned by [`append`](Self::append) (in this
    /// session or an earlier one). Any other offset decodes whatever bytes
    /// are there as a length; it fails with `OutOfRange` only if that length
    /// runs past the end of the store.
    pub fn read(&self, pos: Position) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.flush_buffer()?;

        let size = inner.size;
        frame::check_range(pos.0, HEADER_SIZE, size)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        inner.read_exact_at(&mut header, pos.0)?;

        let len = frame::decode_header(header);
        let payload_offset = pos.0 + HEADER_SIZE;
        let payload_len = frame::buf_len(payload_offset, len, size)?;

        let mut payload = vec![0u8; payload_len];
        inner.read_exact_at(&mut payload, payload_offset)?;

        Ok(payload)
    }

    /// Fill `buf` with the raw bytes at `offset`, ignoring record framing.
    ///
    /// Returns `buf.len()`. A read that cannot be satisfied in full fails
    /// with `OutOfRange` instead of returning a short count.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        inner.flush_buffer()?;

        frame::check_range(offset, buf.len() as u64, inner.size)?;
        inner.read_exact_at(buf, offset)?;

        Ok(buf.len())
    }

    /// Push buffered frames to the file (and `fsync` if `sync_on_flush`).
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.flush_buffer()?;
        if self.config.sync_on_flush {
            inner.sync_file()?;
        }
        Ok(())
    }

    /// Flush, then `fsync` the file regardless of config.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.flush_buffer()?;
        inner.sync_file()
    }

    /// Flush buffered frames and release the file.
    ///
    /// If the flush fails the file stays open, the store is poisoned and the
    /// error is returned. Closing a poisoned store releases the file without
    /// writing the buffered bytes and fails with [`StoreError::Poisoned`],
    /// since appends it acknowledged may be lost. Any call after the file is
    /// released fails with [`StoreError::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let writer = inner.writer.take().ok_or(StoreError::Closed)?;

        if inner.poisoned {
            let (_file, unwritten) = writer.into_parts();
            warn!(
                discarded = unwritten.map(|b| b.len()).unwrap_or(0),
                "closed poisoned record store without flushing"
            );
            return Err(StoreError::Poisoned);
        }

        let file = match writer.into_inner() {
            Ok(file) => file,
            Err(e) => {
                let (err, writer) = e.into_parts();
                inner.writer = Some(writer);
                return Err(inner.poison(err));
            }
        };

        if self.config.sync_on_flush {
            if let Err(e) = file.sync_all() {
                inner.writer = Some(BufWriter::with_capacity(self.config.buffer_capacity, file));
                return Err(inner.poison(e));
            }
        }

        debug!(
            size = inner.size,
            records_appended = inner.records_appended,
            "closed record store"
        );
        Ok(())
    }

    /// Logical end of the store; the position the next append will get.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Statistics for this session.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            size: inner.size,
            records_appended: inner.records_appended,
            flushes: inner.flushes,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Iterate every frame from the start of the store.
    pub fn iter(&self) -> FrameIterator<'_> {
        self.iter_from(Position(0))
    }

    /// Iterate frames starting at `pos`, up to the size at the time of the call.
    pub fn iter_from(&self, pos: Position) -> FrameIterator<'_> {
        FrameIterator {
            store: self,
            next: pos,
            end: self.size(),
        }
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let Some(mut writer) = inner.writer.take() else {
            return;
        };

        if inner.poisoned {
            // Don't let BufWriter's own drop write the suspect buffer.
            let _ = writer.into_parts();
            return;
        }

        if let Err(e) = writer.flush() {
            warn!(error = %e, size = inner.size, "failed to flush record store on drop");
        }
    }
}

/// Iterator over frames in the store.
pub struct FrameIterator<'a> {
    store: &'a RecordStore,
    next: Position,
    end: u64,
}

impl<'a> Iterator for FrameIterator<'a> {
    type Item = Result<(Position, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.0 >= self.end {
            return None;
        }

        let pos = self.next;
        match self.store.read(pos) {
            Ok(payload) => {
                self.next = pos.advance(frame::frame_len(payload.len() as u64));
                Some(Ok((pos, payload)))
            }
            Err(e) => {
                // Stop iteration on error
                self.next = Position(self.end);
                Some(Err(e))
            }
        }
    }
}

fn write_frame(writer: &mut BufWriter<File>, header: &[u8], record: &[u8]) -> io::Result<()> {
    writer.write_all(header)?;
    writer.write_all(record)
}
