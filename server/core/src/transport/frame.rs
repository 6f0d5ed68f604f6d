//! Frame Protocol
//!
//! Length-prefixed JSON with a CRC32 checksum.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+----------------+------------------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)                  |
//! | big-endian u32 | CRC32          | ClientEvent or ServerMessage             |
//! +----------------+----------------+------------------------------------------+
//! ```
//!
//! The length covers the payload only. The checksum is the CRC32 of the
//! payload.
//!
//! # Limits
//!
//! Frames larger than [`MAX_FRAME_SIZE`] are refused on both ends. The length
//! is validated before anything is buffered for it, so a hostile peer cannot
//! make the server allocate more than that per connection.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Maximum payload size (1 MB)
///
/// Animation frames are a few hundred bytes; anything near this is garbage.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const MIN_BUFFER_CAPACITY: usize = 4096;

/// Frame header size: 4 bytes length + 4 bytes checksum
const HEADER_SIZE: usize = 8;

#[inline]
fn compute_checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Encode a message as one frame
///
/// # Errors
///
/// Returns `TransportError::SerializationError` if JSON serialization fails
/// or the payload exceeds [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json =
        serde_json::to_vec(msg).map_err(|e| TransportError::SerializationError(e.to_string()))?;

    if json.len() > MAX_FRAME_SIZE {
        return Err(TransportError::SerializationError(format!(
            "Frame too large: {} bytes (max: {})",
            json.len(),
            MAX_FRAME_SIZE
        )));
    }

    let len = u32::try_from(json.len())
        .map_err(|_| TransportError::SerializationError("Frame length overflow".to_string()))?;
    let checksum = compute_checksum(&json);

    let mut buf = Vec::with_capacity(HEADER_SIZE + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Encode `msg` and write it to `writer` in one call
///
/// # Errors
///
/// Returns an encoding error or the underlying IO error.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let bytes = encode(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Streaming frame parser
///
/// Buffers incoming bytes and yields complete messages.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact once most of the buffer has been consumed
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next frame
    ///
    /// Returns `Ok(None)` when more data is needed.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumMismatch` for a corrupted payload and
    /// `SerializationError` for an oversized or malformed one.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let available = self.available();
        if available < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::SerializationError(format!(
                "Frame size {len} exceeds maximum {MAX_FRAME_SIZE}"
            )));
        }

        if available < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload_start = self.read_pos + HEADER_SIZE;
        let payload_end = payload_start + len;
        let payload = &self.buffer[payload_start..payload_end];

        let actual = compute_checksum(payload);
        if actual != expected {
            return Err(TransportError::ChecksumMismatch { expected, actual });
        }

        let msg = serde_json::from_slice(payload)
            .map_err(|e| TransportError::SerializationError(e.to_string()))?;

        self.read_pos = payload_end;
        Ok(Some(msg))
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}

/// Reads whole messages from a byte stream
#[derive(Debug)]
pub struct FramedReader<R> {
    reader: R,
    decoder: FrameDecoder,
    buf: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(),
            buf: vec![0u8; MIN_BUFFER_CAPACITY].into_boxed_slice(),
        }
    }

    /// Next message, or `None` on a clean end of stream
    ///
    /// # Errors
    ///
    /// Returns decode errors, IO errors, and `ConnectionClosed` when the
    /// stream ends partway through a frame.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        loop {
            if let Some(msg) = self.decoder.decode()? {
                return Ok(Some(msg));
            }
            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                if self.decoder.available() > 0 {
                    return Err(TransportError::ConnectionClosed);
                }
                return Ok(None);
            }
            self.decoder.push(&self.buf[..n]);
        }
    }

    /// Unwrap the underlying reader, discarding buffered bytes
    pub fn into_inner(self) -> R {
        self.reader
    }
}
