//! Reader and writer for the layered `.chi` drawing format.
//!
//! A file is the 8-byte `CHIBIOEK` marker followed by a zlib stream of
//! chunks: `HEAD`, one `LAYR` or `GRUP` per node in pre-order, then `ZEND`.
//! [`format::decode`] and [`format::encode`] cover whole files;
//! [`format::ChunkStreamDecoder`] accepts the decompressed chunk stream in
//! arbitrarily split pieces.
pub mod document;
pub mod format;

#[cfg(test)]
mod testutil;

pub use document::{BlendMode, Document, ImageLayer, LayerGroup, Mask, Node};
pub use format::{decode, decode_reader, encode, load, save, DecodeOptions, EncodeOptions, Error, ErrorKind, Result};
