pub mod error;
pub mod buffer;
pub mod chunk;
pub mod pixels;
pub mod layer;
pub mod decoder;
pub mod encoder;
pub mod compress;

pub use error::{Error, ErrorKind};
pub use chunk::{FileHeader, FormatVersion, MAGIC};
pub use decoder::ChunkStreamDecoder;
pub use encoder::{encode_chunk_stream, required_version};

use crate::document::Document;

use log::debug;
use std::io::{Read, Write};

pub type Result<T> = std::result::Result<T, Error>;

/// Size of the decompressed blocks handed to the chunk decoder.
const DECODE_BLOCK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Switch layers using legacy multiply to the alpha-correct variant.
    pub upgrade_multiply_layers: bool,
    /// When upgrading, also rewrite the pixels of those layers.
    pub bake_multiply_layers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Mark the file as legacy-compatible whatever it contains.
    pub force_old_version: bool,
    /// zlib level, 0 (store) to 9 (smallest).
    pub compression_level: u32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            force_old_version: false,
            compression_level: compress::DEFAULT_LEVEL,
        }
    }
}

impl EncodeOptions {
    pub fn autosave() -> Self {
        Self { compression_level: compress::FASTEST_LEVEL, ..Self::default() }
    }

    pub fn export() -> Self {
        Self { compression_level: compress::BEST_LEVEL, ..Self::default() }
    }
}

pub fn decode(bytes: &[u8], options: &DecodeOptions) -> Result<Document> {
    decode_reader(bytes, options)
}

pub fn decode_reader<R: Read>(mut reader: R, options: &DecodeOptions) -> Result<Document> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::malformed_magic("file shorter than its magic marker"),
        _ => Error::io(e),
    })?;
    if &magic != MAGIC {
        return Err(Error::malformed_magic(format!("bad magic marker: {:?}", String::from_utf8_lossy(&magic))));
    }

    let mut stream = compress::Decompressor::new(reader, DECODE_BLOCK_SIZE);
    let mut decoder = ChunkStreamDecoder::new();
    while !decoder.is_complete() {
        let block = stream.next_block()?;
        if block.is_empty() { break; }
        decoder.process_block(block)?;
    }

    let mut doc = decoder.finish()?;
    if options.upgrade_multiply_layers {
        doc.upgrade_multiply_layers(options.bake_multiply_layers);
    }
    doc.select_initial_active_layer();
    Ok(doc)
}

pub fn load<P: AsRef<std::path::Path>>(path: P, options: &DecodeOptions) -> Result<Document> {
    let f = std::fs::File::open(path)?;
    decode_reader(std::io::BufReader::new(f), options)
}

pub fn encode(doc: &Document, options: &EncodeOptions) -> Result<Vec<u8>> {
    let stream = encode_chunk_stream(doc, options)?;
    let packed = compress::compress(&stream, options.compression_level)?;
    debug!("compressed {} chunk bytes to {}", stream.len(), packed.len());

    let mut out = Vec::with_capacity(MAGIC.len() + packed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&packed);
    Ok(out)
}

pub fn save<P: AsRef<std::path::Path>>(path: P, doc: &Document, options: &EncodeOptions) -> Result<()> {
    let bytes = encode(doc, options)?;
    let mut f = std::fs::File::create(path)?;
    f.write_all(&bytes)?;
    Ok(())
}
