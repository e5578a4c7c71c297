//! Generic chunk framing and the file header chunk.
use super::buffer::Accumulator;
use super::{Error, Result};

use std::fmt;

/// Marker at the very start of a file, before the compressed chunk stream.
pub const MAGIC: &[u8; 8] = b"CHIBIOEK";

pub const TAG_HEAD: [u8; 4] = *b"HEAD";
pub const TAG_LAYR: [u8; 4] = *b"LAYR";
pub const TAG_GRUP: [u8; 4] = *b"GRUP";
pub const TAG_ZEND: [u8; 4] = *b"ZEND";

pub const CHUNK_HEADER_LEN: usize = 8;
pub const FILE_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: [u8; 4],
    pub length: u32,
}

impl ChunkHeader {
    pub fn new(tag: [u8; 4], length: u32) -> Self {
        Self { tag, length }
    }

    /// Reads a header, or returns `None` without consuming anything when fewer
    /// than 8 bytes are buffered.
    pub fn read(input: &mut Accumulator) -> Option<Self> {
        let bytes = input.read_bytes(CHUNK_HEADER_LEN)?;
        let tag = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let length = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Some(Self { tag, length })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.length.to_be_bytes());
    }
}

impl fmt::Display for ChunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", String::from_utf8_lossy(&self.tag), self.length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    /// Readable by painters that predate groups, masks and clipping.
    pub const LEGACY: FormatVersion = FormatVersion { major: 0, minor: 0 };
    pub const CURRENT: FormatVersion = FormatVersion { major: 1, minor: 0 };

    pub fn from_u32(v: u32) -> Self {
        Self { major: (v >> 16) as u16, minor: (v & 0xffff) as u16 }
    }

    pub fn to_u32(self) -> u32 {
        (self.major as u32) << 16 | self.minor as u32
    }

    pub fn is_legacy(self) -> bool {
        self.major == 0
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Payload of the HEAD chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: FormatVersion,
    pub width: u32,
    pub height: u32,
    pub node_count: u32,
}

impl FileHeader {
    /// Parses the 16 fixed HEAD bytes. Returns `Ok(None)` until they are all
    /// buffered; rejects versions newer than this reader right away.
    pub fn read(input: &mut Accumulator) -> Result<Option<Self>> {
        let bytes = match input.read_bytes(FILE_HEADER_LEN) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let field = |i: usize| u32::from_be_bytes([bytes[i], bytes[i+1], bytes[i+2], bytes[i+3]]);
        let header = Self {
            version: FormatVersion::from_u32(field(0)),
            width: field(4),
            height: field(8),
            node_count: field(12),
        };

        if header.version.major > FormatVersion::CURRENT.major {
            return Err(Error::unsupported_version(format!(
                "file version {} is newer than supported {}", header.version, FormatVersion::CURRENT,
            )));
        }
        Ok(Some(header))
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        ChunkHeader::new(TAG_HEAD, FILE_HEADER_LEN as u32).write(out);
        out.extend_from_slice(&self.version.to_u32().to_be_bytes());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.node_count.to_be_bytes());
    }
}
