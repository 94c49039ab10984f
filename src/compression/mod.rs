//! Decompression of archive data regions.
//!
//! Decoders here are streaming and forward-only: they pull bytes from a
//! [`std::io::Read`] and push every produced byte into a [`DecodeSink`]. They
//! never seek, so a consumer that wants bytes late in the output has to let
//! the decoder run through everything before it. The
//! [`crate::multiplex`] module builds per-item extraction on top of that.
//!
//! ## Submodules
//!
//! | Module | Algorithm | GFCP id |
//! |--------|-----------|---------|
//! | [`stored`] | none (verbatim copy) | 0 |
//! | [`bpe`]    | byte-pair encoding   | 1 |
//!
//! GFCP id 2 is recognized as [`Algorithm::Lz77`] but has no decoder.

pub mod bpe;
pub mod stored;

use crate::{Error, Result};

/// Output is reported to [`DecodeSink::progress`] every time this many bytes
/// have been produced.
pub const PROGRESS_INTERVAL: u64 = 256;

/// Compression algorithm declared by a GFCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Data stored verbatim.
    None,
    /// Byte-pair encoding, see [`bpe`].
    BytePair,
    /// Declared by the format; not supported.
    Lz77,
}

impl Algorithm {
    /// Map a GFCP algorithm id.
    ///
    /// Returns [`Error::UnsupportedCompression`] for ids the format does not
    /// define.
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(Algorithm::None),
            1 => Ok(Algorithm::BytePair),
            2 => Ok(Algorithm::Lz77),
            _ => Err(Error::UnsupportedCompression(id)),
        }
    }

    /// The on-disk id.
    pub fn id(self) -> u32 {
        match self {
            Algorithm::None => 0,
            Algorithm::BytePair => 1,
            Algorithm::Lz77 => 2,
        }
    }
}

/// Destination for decoded bytes.
pub trait DecodeSink {
    /// Accept the next output byte.
    fn put(&mut self, byte: u8) -> Result<()>;

    /// Periodic checkpoint; see [`PROGRESS_INTERVAL`].
    fn progress(&mut self, _bytes_in: u64, _bytes_out: u64) -> Result<()> {
        Ok(())
    }
}

impl DecodeSink for Vec<u8> {
    fn put(&mut self, byte: u8) -> Result<()> {
        self.push(byte);
        Ok(())
    }
}

/// A forward-only decoder.
pub trait Decoder {
    /// Produce exactly `limit` output bytes into `sink`, then stop.
    ///
    /// Input past the point where `limit` is reached is left unread. Running
    /// out of input first is an error.
    fn decode<S: DecodeSink>(&mut self, limit: u64, sink: &mut S) -> Result<()>;
}
