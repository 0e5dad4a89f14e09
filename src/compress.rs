/// Raw zlib DEFLATE of the master ciphertext.
///
/// Compression sits between master encryption and partitioning. AEAD
/// output rarely compresses, but the manifest records a `compressed`
/// flag and the download path must honor it, so the stage is kept
/// wire-compatible rather than dropped.
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{MystError, Result};

/// DEFLATE-compress a buffer.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| MystError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| MystError::Compression(e.to_string()))
}

/// Inflate a buffer produced by `compress`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MystError::Compression(e.to_string()))?;
    Ok(out)
}
