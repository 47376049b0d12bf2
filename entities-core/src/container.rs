//! Compressed entities files.
//!
//! A compressed file starts with a 16-byte header: the decompressed size
//! and the compressed size, each a little-endian `u64`. The first payload
//! byte is always `0x8C`, which is how a compressed file is told apart from
//! plain text. The codec itself is supplied by the host.

use std::borrow::Cow;

use tracing::debug;

use crate::error::{Error, Result};

/// Header length in bytes.
pub const HEADER_LEN: usize = 16;

/// First byte of a compressed payload.
pub const MAGIC: u8 = 0x8C;

/// An opaque compression codec.
pub trait Codec {
    /// Decompress `payload` into exactly `expected_size` bytes.
    fn decompress(&self, payload: &[u8], expected_size: usize) -> Result<Vec<u8>, String>;

    fn compress(&self, text: &[u8]) -> Result<Vec<u8>, String>;
}

/// Whether `bytes` carry a compressed-file header.
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() > HEADER_LEN && bytes[HEADER_LEN] == MAGIC
}

fn read_u64(bytes: &[u8]) -> usize {
    let mut le = [0u8; 8];
    le.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(le) as usize
}

/// Return the entities text held in `bytes`.
///
/// Plain text is borrowed unchanged. A compressed file needs a codec; the
/// payload length is checked against the header before decompressing.
pub fn decode<'a>(bytes: &'a [u8], codec: Option<&dyn Codec>) -> Result<Cow<'a, [u8]>> {
    if !is_compressed(bytes) {
        return Ok(Cow::Borrowed(bytes));
    }

    let Some(codec) = codec else {
        return Err(Error::Compression("compressed file but no codec".to_string()));
    };
    let size = read_u64(&bytes[0..8]);
    let compressed = read_u64(&bytes[8..16]);
    let payload = &bytes[HEADER_LEN..];
    if payload.len() < compressed {
        return Err(Error::Truncated { expected: compressed, actual: payload.len() });
    }

    let text = codec.decompress(&payload[..compressed], size).map_err(Error::Compression)?;
    if text.len() != size {
        return Err(Error::Compression(format!("expected {size} bytes, codec produced {}", text.len())));
    }
    debug!(compressed, size, "decompressed entities file");
    Ok(Cow::Owned(text))
}

/// Compress `text` and prepend the header.
pub fn encode(text: &[u8], codec: &dyn Codec) -> Result<Vec<u8>> {
    let payload = codec.compress(text).map_err(Error::Compression)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&(text.len() as u64).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}
