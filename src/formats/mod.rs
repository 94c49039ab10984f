//! Parsers for GameCube/Wii archive formats.
//!
//! Each submodule targets one format family. All parsers follow the same
//! conventions:
//!
//! * **Generic over** [`std::io::Read`] + [`std::io::Seek`] - pass a [`std::fs::File`], a
//!   [`std::io::Cursor`], or anything else that implements both traits.
//! * **Metadata only** - the `parse` method reads headers and rebuilds the
//!   item tree. File data is never eagerly loaded.
//! * **Reader wrappers** - each format has a matching `*Reader<R>` type that
//!   owns the underlying reader and drives extraction through an
//!   [`ExtractCallback`].
//! * **Whole-archive failure** - any structural error aborts the parse; a
//!   half-built tree is never returned.
//!
//! ## Format overview
//!
//! | Module     | Format      | Description |
//! |------------|-------------|-------------|
//! | [`arc`]    | U8 / ARC    | Nested directory tree; file data stored uncompressed |
//! | [`gfarch`] | GFArch      | Flat entry table; all file data in one compressed blob |

pub mod arc;
pub mod gfarch;

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::extract::{ExtractCallback, Selection};
use crate::item::Item;
use crate::utils::bytesa;
use crate::{Error, Result};

use self::arc::U8Reader;
use self::gfarch::GfArchReader;

/// Archive formats this crate can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// U8 / ARC, see [`arc`].
    U8,
    /// GFArch, see [`gfarch`].
    GfArch,
}

impl Format {
    /// Identify a format from its leading signature.
    pub fn detect(magic: &[u8; 4]) -> Option<Self> {
        match *magic {
            arc::MAGIC => Some(Format::U8),
            gfarch::MAGIC => Some(Format::GfArch),
            _ => None,
        }
    }

    /// Peek at the signature at the current position, then seek back.
    ///
    /// Returns [`Error::BadMagic`] if the signature is not recognized.
    pub fn probe<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let start = r.stream_position()?;
        let magic = bytesa::<4>(r);
        r.seek(SeekFrom::Start(start))?;
        Self::detect(&magic?).ok_or(Error::BadMagic)
    }

    /// File extensions the format is known by, preferred one first.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::U8 => &["arc", "u8"],
            Format::GfArch => &["gfa"],
        }
    }

    /// Preferred file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Format::U8 => "arc",
            Format::GfArch => "gfa",
        }
    }
}

/// An opened archive of any supported format.
pub enum ArchiveReader<R> {
    U8(U8Reader<R>),
    GfArch(GfArchReader<R>),
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Probe the signature and parse with the matching format.
    pub fn open(mut reader: R) -> Result<Self> {
        let format = Format::probe(&mut reader)?;
        debug!(?format, "opening archive");
        Ok(match format {
            Format::U8 => ArchiveReader::U8(U8Reader::new(reader)?),
            Format::GfArch => ArchiveReader::GfArch(GfArchReader::new(reader)?),
        })
    }

    /// Which format was detected on open.
    pub fn format(&self) -> Format {
        match self {
            ArchiveReader::U8(_) => Format::U8,
            ArchiveReader::GfArch(_) => Format::GfArch,
        }
    }

    /// All items, in the archive's own order.
    pub fn items(&self) -> &[Item] {
        match self {
            ArchiveReader::U8(r) => r.items(),
            ArchiveReader::GfArch(r) => r.items(),
        }
    }

    /// Full path of item `index`.
    pub fn path(&self, index: usize) -> Option<String> {
        match self {
            ArchiveReader::U8(r) => r.archive.path(index),
            ArchiveReader::GfArch(r) => r.archive.path(index),
        }
    }

    /// Find an item by its full path.
    pub fn find(&self, path: &str) -> Option<usize> {
        match self {
            ArchiveReader::U8(r) => r.archive.find(path),
            ArchiveReader::GfArch(r) => r.archive.find(path),
        }
    }

    /// Fixed header plus metadata region, in bytes.
    pub fn headers_size(&self) -> u64 {
        match self {
            ArchiveReader::U8(r) => r.archive.headers_size(),
            ArchiveReader::GfArch(r) => r.archive.headers_size(),
        }
    }

    /// See [`U8Reader::extract`] and [`GfArchReader::extract`].
    pub fn extract<C: ExtractCallback>(
        &mut self,
        selection: Selection<'_>,
        test: bool,
        callback: &mut C,
    ) -> Result<()> {
        match self {
            ArchiveReader::U8(r) => r.extract(selection, test, callback),
            ArchiveReader::GfArch(r) => r.extract(selection, test, callback),
        }
    }

    /// Consume the archive, returning the inner reader.
    pub fn into_inner(self) -> R {
        match self {
            ArchiveReader::U8(r) => r.into_inner(),
            ArchiveReader::GfArch(r) => r.into_inner(),
        }
    }
}
