//! Library-wide error and result types.

use std::io;

use thiserror::Error;

/// Result alias used throughout wiiarc.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// The stream ended before all expected bytes could be read.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// A header field is outside the bounds the format allows.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    /// The data region uses a compression scheme this library cannot decode.
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedCompression(u32),
    /// A null-terminated string had no null terminator within the buffer.
    #[error("unterminated string")]
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    #[error("corrupt archive: {0}")]
    Corrupt(&'static str),
    /// A file operation was asked of a directory item.
    #[error("item is a directory")]
    IsDirectory,
    /// Item data could not be reproduced (message describes why).
    #[error("data error: {0}")]
    Data(&'static str),
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl Error {
    /// Whether this error only means "the input is not this format".
    ///
    /// Probing code can move on to the next format on these; everything else
    /// means the input was recognized but is damaged.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(
            self,
            Error::BadMagic
                | Error::UnexpectedEof
                | Error::InvalidHeader(_)
                | Error::UnsupportedCompression(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
