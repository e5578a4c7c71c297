//! zlib wrapping of the chunk stream.
use super::{Error, Result};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub const FASTEST_LEVEL: u32 = 1;
pub const DEFAULT_LEVEL: u32 = 6;
pub const BEST_LEVEL: u32 = 9;

pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level.min(BEST_LEVEL)));
    encoder.write_all(data).map_err(Error::compression)?;
    encoder.finish().map_err(Error::compression)
}

/// Pulls decompressed bytes out of `reader` one block at a time.
pub struct Decompressor<R: Read> {
    inner: ZlibDecoder<R>,
    block: Vec<u8>,
}

impl<R: Read> Decompressor<R> {
    pub fn new(reader: R, block_size: usize) -> Self {
        Self {
            inner: ZlibDecoder::new(reader),
            block: vec![0; block_size.max(1)],
        }
    }

    /// The next block of output, or an empty slice at the end of the stream.
    pub fn next_block(&mut self) -> Result<&[u8]> {
        let n = loop {
            match self.inner.read(&mut self.block) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::decompression(e)),
            }
        };
        Ok(&self.block[..n])
    }
}
