//! Chunk framing
//!
//! A stream is a sequence of chunks, each a 12-byte little-endian header
//! `{ id, version, size }` followed by `size` payload bytes, ended by a
//! header whose id is zero. Readers can step over any chunk using the
//! declared size alone.

use std::io::{self, Read, Write};

use bytemuck::Pod;

/// Header length in bytes
pub const HEADER_SIZE: usize = 12;

/// Chunk id reserved for the stream terminator
pub const END_ID: u32 = 0;

/// Build a chunk id from a four-character tag
pub const fn chunk_id(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Serialization errors
#[derive(thiserror::Error, Debug)]
pub enum ChunkError {
    /// Underlying reader or writer failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Stream ended inside a header or payload
    #[error("Chunk {id:#010x} truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Chunk id, zero if the header itself was cut short
        id: u32,
        /// Bytes the header promised
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Payload larger than a header can describe
    #[error("Payload of {0} bytes does not fit a chunk header")]
    PayloadTooLarge(usize),

    /// Payload bytes do not decode
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// Serialization result
pub type ChunkResult<T> = Result<T, ChunkError>;

fn read_exact_array<const N: usize, R: Read>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Fixed chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHeader {
    /// Payload type
    pub id: u32,
    /// Payload layout version
    pub version: u32,
    /// Payload length in bytes
    pub size: u32,
}

impl ChunkHeader {
    /// Stream terminator
    pub const END: Self = Self { id: END_ID, version: 0, size: 0 };

    /// True for the terminator
    pub const fn is_end(&self) -> bool {
        self.id == END_ID
    }

    /// Encode as little-endian bytes
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.id.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.size.to_le_bytes());
        bytes
    }

    /// Decode from little-endian bytes
    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self { id: word(0), version: word(4), size: word(8) }
    }
}

/// Writes chunks and the terminator
#[derive(Debug)]
pub struct ChunkWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> ChunkWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Write one chunk
    pub fn write_chunk(&mut self, id: u32, version: u32, payload: &[u8]) -> ChunkResult<()> {
        debug_assert_ne!(id, END_ID, "chunk id 0 is reserved for the terminator");
        let size = u32::try_from(payload.len()).map_err(|_| ChunkError::PayloadTooLarge(payload.len()))?;
        self.inner.write_all(&ChunkHeader { id, version, size }.to_bytes())?;
        self.inner.write_all(payload)?;
        self.written += 1;
        Ok(())
    }

    /// Chunks written so far, not counting the terminator
    pub fn chunks_written(&self) -> usize {
        self.written
    }

    /// Write the terminator and hand back the writer
    pub fn finish(mut self) -> ChunkResult<W> {
        self.inner.write_all(&ChunkHeader::END.to_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads chunk headers and payloads in stream order
#[derive(Debug)]
pub struct ChunkReader<R: Read> {
    inner: R,
    finished: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self { inner, finished: false }
    }

    /// Next header, `None` at the terminator.
    ///
    /// A stream that ends cleanly on a header boundary without a terminator
    /// is accepted with a warning.
    pub fn next_header(&mut self) -> ChunkResult<Option<ChunkHeader>> {
        if self.finished {
            return Ok(None);
        }
        let mut bytes = [0u8; HEADER_SIZE];
        let read = read_fully(&mut self.inner, &mut bytes)?;
        if read == 0 {
            log::warn!("Chunk stream ended without a terminator");
            self.finished = true;
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Err(ChunkError::Truncated { id: 0, expected: HEADER_SIZE, actual: read });
        }
        let header = ChunkHeader::from_bytes(bytes);
        if header.is_end() {
            self.finished = true;
            return Ok(None);
        }
        Ok(Some(header))
    }

    /// Read the payload announced by `header`
    ///
    /// The buffer grows with the bytes actually read, so a corrupt size
    /// field over a short stream fails as truncated instead of allocating
    /// what the header claims.
    pub fn read_payload(&mut self, header: &ChunkHeader) -> ChunkResult<Vec<u8>> {
        let mut payload = Vec::new();
        (&mut self.inner).take(u64::from(header.size)).read_to_end(&mut payload)?;
        if payload.len() < header.size as usize {
            return Err(ChunkError::Truncated {
                id: header.id,
                expected: header.size as usize,
                actual: payload.len(),
            });
        }
        Ok(payload)
    }

    /// Step over the payload announced by `header`
    pub fn skip(&mut self, header: &ChunkHeader) -> ChunkResult<()> {
        let expected = u64::from(header.size);
        let skipped = io::copy(&mut (&mut self.inner).take(expected), &mut io::sink())?;
        if skipped < expected {
            return Err(ChunkError::Truncated {
                id: header.id,
                expected: header.size as usize,
                actual: skipped as usize,
            });
        }
        Ok(())
    }

    /// True once the terminator (or a clean end of stream) was read
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Fill `buf` as far as the reader allows; returns the byte count
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// -------------------------------------------------------------------------
// Payload encoding

/// Little-endian payload builder
#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    bytes: Vec<u8>,
}

impl PayloadWriter {
    /// Empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `u32`
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append an `f32`
    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a bool as one byte
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.bytes.push(u8::from(value));
        self
    }

    /// Append a length-prefixed UTF-8 string
    pub fn string(&mut self, value: &str) -> ChunkResult<&mut Self> {
        self.length(value.len())?;
        self.bytes.extend_from_slice(value.as_bytes());
        Ok(self)
    }

    /// Append a count-prefixed slice of plain values
    pub fn pod_slice<T: Pod>(&mut self, values: &[T]) -> ChunkResult<&mut Self> {
        self.length(values.len())?;
        self.bytes.extend_from_slice(bytemuck::cast_slice(values));
        Ok(self)
    }

    fn length(&mut self, len: usize) -> ChunkResult<&mut Self> {
        let len = u32::try_from(len).map_err(|_| ChunkError::PayloadTooLarge(len))?;
        Ok(self.u32(len))
    }

    /// Encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Little-endian payload cursor
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    /// Read from the start of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> ChunkResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ChunkError::Malformed(format!(
                "needed {} bytes at offset {}, {} left",
                len,
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> ChunkResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a `u32`
    pub fn u32(&mut self) -> ChunkResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Read an `f32`
    pub fn f32(&mut self) -> ChunkResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Read a one-byte bool; anything but 0 or 1 is malformed
    pub fn bool(&mut self) -> ChunkResult<bool> {
        match self.array::<1>()? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(ChunkError::Malformed(format!("invalid bool byte {other}"))),
        }
    }

    /// Read a length-prefixed UTF-8 string
    pub fn string(&mut self) -> ChunkResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| ChunkError::Malformed(e.to_string()))
    }

    /// Read a count-prefixed slice of plain values
    pub fn pod_vec<T: Pod>(&mut self) -> ChunkResult<Vec<T>> {
        let count = self.u32()? as usize;
        let stride = std::mem::size_of::<T>();
        let len = count
            .checked_mul(stride)
            .ok_or_else(|| ChunkError::Malformed(format!("element count {count} overflows")))?;
        let bytes = self.take(len)?;
        Ok(bytes.chunks_exact(stride).map(bytemuck::pod_read_unaligned).collect())
    }

    /// Fail if bytes are left over
    pub fn finish(self) -> ChunkResult<()> {
        match self.remaining() {
            0 => Ok(()),
            left => Err(ChunkError::Malformed(format!("{left} trailing bytes"))),
        }
    }
}
