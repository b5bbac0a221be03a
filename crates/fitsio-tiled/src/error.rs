use alloc::boxed::Box;
use alloc::string::String;

/// All errors that can occur while decoding a tile-compressed image.
#[derive(Debug)]
pub enum Error {
    /// `ZCMPTYPE` names an algorithm this crate does not decode (e.g. `PLIO_1`).
    UnsupportedAlgorithm(String),
    /// A required keyword was not found in the header.
    MissingKeyword(&'static str),
    /// A keyword is present but its value is unusable.
    MalformedHeader(&'static str),
    /// Unrecognized BITPIX value.
    InvalidBitpix(i64),
    /// An optional table column is absent.
    UnknownField(&'static str),
    /// Table rows or heap are shorter than the header declares.
    UnexpectedEof,
    /// A compressed bit stream ended before all samples were decoded.
    TruncatedStream,
    /// HCompress bit-plane data carries an invalid format code.
    CorruptBitplane,
    /// DEFLATE data could not be inflated.
    Inflate,
    /// Decoded tile contents do not fit the tile geometry.
    TileGeometry(&'static str),
    /// A single tile failed to decode.
    Tile {
        index: usize,
        row: usize,
        col: usize,
        source: Box<Error>,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn in_tile(self, index: usize, row: usize, col: usize) -> Self {
        Error::Tile {
            index,
            row,
            col,
            source: Box::new(self),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::UnsupportedAlgorithm(name) => {
                write!(f, "unsupported compression algorithm: {name}")
            }
            Error::MissingKeyword(kw) => write!(f, "missing required keyword: {kw}"),
            Error::MalformedHeader(msg) => write!(f, "malformed header: {msg}"),
            Error::InvalidBitpix(v) => write!(f, "invalid BITPIX value: {v}"),
            Error::UnknownField(name) => write!(f, "no such table column: {name}"),
            Error::UnexpectedEof => write!(f, "unexpected end of table data"),
            Error::TruncatedStream => write!(f, "compressed stream is truncated"),
            Error::CorruptBitplane => write!(f, "corrupt HCompress bit plane"),
            Error::Inflate => write!(f, "failed to inflate tile data"),
            Error::TileGeometry(msg) => write!(f, "tile geometry mismatch: {msg}"),
            Error::Tile {
                index,
                row,
                col,
                source,
            } => write!(f, "tile {index} (row {row}, column {col}): {source}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Tile { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
