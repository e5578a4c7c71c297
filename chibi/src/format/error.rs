use std::io;
use std::fmt;

macro_rules! impl_error_abbr {
    ($(($func:ident, $ekid:expr)),+ $(,)?) => {
        impl Error {$(
            pub fn $func<E: Into<Box<dyn std::error::Error + Send + Sync>>>(error: E) -> Self {
                Self { kind: $ekid, error: error.into() }
            }
        )+}
    };
}

/// Category of a codec failure.
///
/// Every kind is fatal for the decode it came from. Unknown chunk types are not
/// represented here since they are skipped, not reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading or writing the file itself failed.
    Io,
    /// The first 8 bytes are not `CHIBIOEK`.
    MalformedMagic,
    /// The zlib payload could not be inflated.
    Decompression,
    Compression,
    /// The chunk stream ended before ZEND.
    Truncated,
    /// HEAD names a major version newer than this reader.
    UnsupportedVersion,
    /// Group child counts disagree with the chunks that follow.
    Structural,
    /// A chunk or node header holds impossible values.
    Corrupt,
    /// The document cannot be represented on disk, e.g. a chunk over 4 GiB.
    NotSupport,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    error: Box<dyn std::error::Error + Send + Sync>,
}

impl_error_abbr!{
    (io,                  ErrorKind::Io),
    (malformed_magic,     ErrorKind::MalformedMagic),
    (decompression,       ErrorKind::Decompression),
    (compression,         ErrorKind::Compression),
    (truncated,           ErrorKind::Truncated),
    (unsupported_version, ErrorKind::UnsupportedVersion),
    (structural,          ErrorKind::Structural),
    (corrupt,             ErrorKind::Corrupt),
    (not_support,         ErrorKind::NotSupport),
    (internal,            ErrorKind::Internal),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Self::io(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.error)
    }
}
