use std::io::{self, BufRead, Cursor, Read};

use bytes::{Bytes, BytesMut};

use crate::error::BufferError;

/// Default initial capacity, sized for a typical 256px PNG tile.
pub const DEFAULT_HANDOFF_CAPACITY: usize = 16 * 1024;

enum Storage {
    Writable(BytesMut),
    Taken,
}

/// Append-only byte buffer whose storage is handed to a reader without
/// copying.
///
/// The network side appends response chunks; the consumer side calls
/// [`take_reader`](Self::take_reader) once. After that the buffer is frozen:
/// it no longer owns any storage, further appends fail with
/// [`BufferError::Frozen`], and a second take fails with
/// [`BufferError::AlreadyConsumed`].
///
/// # Example
///
/// ```
/// use std::io::Read;
/// use tile_bridge::io::ByteBufferHandoff;
///
/// let mut buffer = ByteBufferHandoff::new();
/// buffer.append(&[0x89, 0x50]).unwrap();
/// buffer.append(&[0x4E, 0x47]).unwrap();
///
/// let mut reader = buffer.take_reader().unwrap();
/// let mut out = Vec::new();
/// reader.read_to_end(&mut out).unwrap();
/// assert_eq!(out, [0x89, 0x50, 0x4E, 0x47]);
///
/// assert!(buffer.append(&[0]).is_err());
/// ```
pub struct ByteBufferHandoff {
    storage: Storage,
}

impl ByteBufferHandoff {
    /// Create an empty buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HANDOFF_CAPACITY)
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: Storage::Writable(BytesMut::with_capacity(capacity)),
        }
    }

    /// Append bytes to the end of the buffer.
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        match &mut self.storage {
            Storage::Writable(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            Storage::Taken => Err(BufferError::Frozen),
        }
    }

    /// Hand the written bytes to a reader.
    ///
    /// The reader shares the buffer's allocation; nothing is copied. The
    /// buffer keeps no reference to the storage afterwards.
    pub fn take_reader(&mut self) -> Result<TileReader, BufferError> {
        match std::mem::replace(&mut self.storage, Storage::Taken) {
            Storage::Writable(buf) => Ok(TileReader::new(buf.freeze())),
            Storage::Taken => Err(BufferError::AlreadyConsumed),
        }
    }

    /// Number of bytes written so far (0 once frozen).
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Writable(buf) => buf.len(),
            Storage::Taken => 0,
        }
    }

    /// Whether no bytes have been written (always true once frozen).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the reader has been taken.
    pub fn is_frozen(&self) -> bool {
        matches!(self.storage, Storage::Taken)
    }
}

impl Default for ByteBufferHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ByteBufferHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBufferHandoff")
            .field("len", &self.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Read-only view over the bytes of a completed tile.
///
/// Implements [`Read`] and [`BufRead`] for renderers that expect a stream,
/// and exposes the underlying [`Bytes`] for consumers that want the payload
/// in one piece.
#[derive(Debug, Clone)]
pub struct TileReader {
    cursor: Cursor<Bytes>,
}

impl TileReader {
    /// Wrap an existing payload, e.g. a cache hit.
    pub fn new(data: Bytes) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// The whole payload, regardless of how much has been read.
    pub fn as_bytes(&self) -> &Bytes {
        self.cursor.get_ref()
    }

    /// Consume the reader and return the whole payload.
    pub fn into_bytes(self) -> Bytes {
        self.cursor.into_inner()
    }

    /// Total payload length.
    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.len()
            .saturating_sub(self.cursor.position() as usize)
    }
}

impl From<Bytes> for TileReader {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl Read for TileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl BufRead for TileReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.cursor.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.cursor.consume(amt)
    }
}
