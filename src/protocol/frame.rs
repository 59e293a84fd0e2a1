//! Frame codec
//!
//! A frame is raw bytes followed by a fixed 4-byte delimiter. There is no
//! escaping: payloads must never contain the delimiter, which is why file
//! contents always travel base64-armored.
//!
//! ```text
//! ┌─────────────────────────────────┬──────────────┐
//! │            Payload              │  \r\n\r\n    │
//! └─────────────────────────────────┴──────────────┘
//! ```

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};

use crate::error::{PoolError, Result};

/// Frame terminator for requests and responses
pub const DELIMITER: &[u8; 4] = b"\r\n\r\n";

/// Upper bound of a single socket read (1 MiB)
pub const READ_CHUNK_SIZE: usize = 1 << 20;

/// Buffer size used when a frame is read only to be thrown away
const DISCARD_CHUNK_SIZE: usize = 8 * 1024;

/// Append the delimiter to a payload
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + DELIMITER.len());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(DELIMITER);
    frame
}

/// Read one frame from a stream
///
/// Accumulates chunks until the delimiter shows up and returns the bytes
/// before it. Anything after the delimiter is dropped. If the peer closes
/// first, the frame is truncated and a `Protocol` error is returned.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => {
                return Err(PoolError::Protocol(format!(
                    "truncated frame ({} bytes before close)",
                    buf.len()
                )))
            }
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        // A delimiter may straddle the previous chunk boundary
        let scan_from = buf.len().saturating_sub(DELIMITER.len() - 1);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_delimiter(&buf[scan_from..]) {
            buf.truncate(scan_from + pos);
            return Ok(buf.freeze());
        }
    }
}

/// Consume one frame without keeping it
///
/// Same termination rules as `read_frame`, but memory use is a small fixed
/// buffer whatever the frame size. Returns the payload length.
pub fn discard_frame<R: Read>(reader: &mut R) -> Result<u64> {
    let keep = DELIMITER.len() - 1;
    let mut buf = [0u8; DISCARD_CHUNK_SIZE];
    let mut carried = 0;
    let mut consumed: u64 = 0;

    loop {
        let n = match reader.read(&mut buf[carried..]) {
            Ok(0) => {
                return Err(PoolError::Protocol(format!(
                    "truncated frame ({} bytes before close)",
                    consumed
                )))
            }
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        consumed += n as u64;
        let filled = carried + n;

        // `buf[0]` sits at stream offset `consumed - filled`
        if let Some(pos) = find_delimiter(&buf[..filled]) {
            return Ok(consumed - filled as u64 + pos as u64);
        }

        carried = filled.min(keep);
        buf.copy_within(filled - carried..filled, 0);
    }
}

/// Write a payload followed by the delimiter, then flush
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_all(&encode_frame(payload))?;
    writer.flush()?;
    Ok(())
}

/// Position of the first delimiter in `haystack`
pub fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}
