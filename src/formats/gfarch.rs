//! GFArch (GFAC) - Good-Feel archive with a compressed data region.
//!
//! All file contents are concatenated into one blob which is then compressed
//! as a whole (GFCP). Item offsets refer to the decompressed blob, so
//! extraction always decodes from the start of the region; see
//! [`crate::multiplex`].
//!
//! ## Layout
//! ```text
//! [0x00] GFAC header                (0x1C bytes)
//! [MetadataOffset]
//!        EntryCount                 (u32 LE)
//!        Entries                    (EntryCount × 0x10 bytes)
//!        Name table                 (null-terminated names)
//! [DataOffset]
//!        GFCP header                (0x14 bytes)
//!        Compressed data
//! ```
//!
//! ## GFAC header (0x1C bytes)
//! ```text
//! [0x00] Magic "GFAC"               (4 bytes)
//! [0x04] Version / flags            (8 bytes, unused)
//! [0x0C] MetadataOffset             (u32 LE) - absolute
//! [0x10] MetadataSize               (u32 LE)
//! [0x14] DataOffset                 (u32 LE) - absolute
//! [0x18] DataSize                   (u32 LE) - GFCP header included
//! ```
//!
//! ## Entry (0x10 bytes, little endian)
//! ```text
//! [0x00] NameHash                   (u32) see [`name_hash`]
//! [0x04] Flags | NameOffset         (u8 | u24) - name offset is absolute
//!         flag 0x01 = directory, 0x80 = last entry of its listing
//! [0x08] Size                       (u32) decompressed size
//! [0x0C] File: DataOffset + position in the decompressed blob
//!        Dir:  absolute offset of the entry that starts its listing
//! ```
//!
//! ## Listings
//! Each directory's entries form one contiguous listing, terminated by an
//! entry flagged 0x80. The root listing comes first. When a listing ends,
//! the entry after it starts the listing of whichever open directory points
//! at that offset. Open directories are searched newest first and only the
//! matching one is closed.
//!
//! ## GFCP header (0x14 bytes)
//! ```text
//! [0x00] Magic "GFCP"               (4 bytes)
//! [0x04] Version                    (4 bytes, unused)
//! [0x08] Algorithm                  (u32 LE) 0 = none, 1 = byte pair, 2 = LZ77
//! [0x0C] DecompressedSize           (u32 LE)
//! [0x10] CompressedSize             (u32 LE)
//! ```

use std::io::{BufReader, Read, Seek, SeekFrom, Take};

use tracing::{debug, trace, warn};

use crate::compression::bpe::BpeDecoder;
use crate::compression::stored::StoredDecoder;
use crate::compression::{Algorithm, DecodeSink, Decoder};
use crate::extract::{AskMode, ExtractCallback, Selection};
use crate::item::{self, Item};
use crate::multiplex::{Multiplexer, Output};
use crate::utils::{bytesa, bytesv, le_u32_at, null_bytes};
use crate::{Error, Result};

/// Archive signature.
pub const MAGIC: [u8; 4] = *b"GFAC";

/// Compression sub-header signature.
pub const GFCP_MAGIC: [u8; 4] = *b"GFCP";

/// Size of the fixed header.
pub const HEADER_SIZE: u64 = 0x1C;

/// Size of the GFCP sub-header at the start of the data region.
pub const GFCP_HEADER_SIZE: u64 = 0x14;

const ENTRY_SIZE: usize = 0x10;
const FLAG_DIRECTORY: u8 = 0x01;
const FLAG_LAST_ENTRY: u8 = 0x80;

/// Parsed GFCP sub-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gfcp {
    /// How the data region is encoded.
    pub algorithm: Algorithm,
    /// Size of the decoded blob holding every file.
    pub decompressed_size: u32,
    /// Bytes of encoded data following the sub-header.
    pub compressed_size: u32,
}

/// Parsed GFArch archive (metadata only).
///
/// File data is accessed via [`GfArchReader`].
#[derive(Debug)]
pub struct GfArch {
    /// Items in entry order. Offsets are into the decompressed blob.
    pub items: Vec<Item>,
    /// Data region description; [`None`] for an archive with no entries.
    pub gfcp: Option<Gfcp>,
    metadata_size: u64,
    /// Absolute stream offset of the compressed data (after GFCP).
    pub(crate) data_start: u64,
}

impl GfArch {
    /// Parse a GFArch archive from `r`.
    ///
    /// `r` must be positioned at the very beginning of the GFAC magic.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;

        let header = bytesa::<0x1C>(r)?;
        if header[..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        let metadata_offset = le_u32_at(&header, 0x0C)?;
        let metadata_size = le_u32_at(&header, 0x10)?;
        if u64::from(metadata_offset) < HEADER_SIZE || metadata_size < 4 {
            return Err(Error::InvalidHeader("metadata region out of bounds"));
        }

        r.seek(SeekFrom::Start(base + u64::from(metadata_offset)))?;
        let metadata = bytesv(r, u64::from(metadata_size))?;

        let count = le_u32_at(&metadata, 0)?;
        if count == 0 {
            return Ok(Self {
                items: Vec::new(),
                gfcp: None,
                metadata_size: u64::from(metadata_size),
                data_start: 0,
            });
        }
        if u64::from(count) * ENTRY_SIZE as u64 + 4 >= u64::from(metadata_size) {
            return Err(Error::InvalidHeader("entry table fills the metadata region"));
        }
        if metadata.last() != Some(&0) {
            return Err(Error::InvalidHeader("name table is not terminated"));
        }

        let data_offset = le_u32_at(&header, 0x14)?;
        let data_size = le_u32_at(&header, 0x18)?;
        if u64::from(data_size) < GFCP_HEADER_SIZE {
            return Err(Error::InvalidHeader("data region smaller than GFCP header"));
        }
        r.seek(SeekFrom::Start(base + u64::from(data_offset)))?;
        let gfcp = read_gfcp(r, data_size)?;

        let items = scan_entries(&metadata, count, metadata_offset, data_offset)?;
        debug!(
            entries = count,
            algorithm = ?gfcp.algorithm,
            decompressed = gfcp.decompressed_size,
            "parsed GFArch archive"
        );

        Ok(Self {
            items,
            gfcp: Some(gfcp),
            metadata_size: u64::from(metadata_size),
            data_start: base + u64::from(data_offset) + GFCP_HEADER_SIZE,
        })
    }

    /// Fixed header plus metadata region.
    pub fn headers_size(&self) -> u64 {
        HEADER_SIZE + self.metadata_size
    }

    /// Full path of item `index`.
    pub fn path(&self, index: usize) -> Option<String> {
        item::path(&self.items, index)
    }

    /// Find an item by its full path.
    pub fn find(&self, path: &str) -> Option<usize> {
        item::find(&self.items, path)
    }
}

fn read_gfcp<R: Read>(r: &mut R, data_size: u32) -> Result<Gfcp> {
    let header = bytesa::<0x14>(r)?;
    if header[..4] != GFCP_MAGIC {
        return Err(Error::BadMagic);
    }
    let algorithm = Algorithm::from_id(le_u32_at(&header, 0x08)?)?;
    let decompressed_size = le_u32_at(&header, 0x0C)?;
    let compressed_size = le_u32_at(&header, 0x10)?;

    if u64::from(compressed_size) > u64::from(data_size) - GFCP_HEADER_SIZE {
        return Err(Error::InvalidHeader("compressed size exceeds data region"));
    }

    Ok(Gfcp {
        algorithm,
        decompressed_size,
        compressed_size,
    })
}

/// GFArch name hash.
///
/// Bytes are sign-extended before accumulating, so names with bytes above
/// 0x7F hash the way the game does.
pub fn name_hash(name: &[u8]) -> u32 {
    name.iter()
        .fold(0u32, |h, &b| (b as i8 as u32).wrapping_add(h.wrapping_mul(137)))
}

/// Walk the entry table once, resolving each entry's parent.
///
/// A stored name hash that disagrees with the name is logged and otherwise
/// ignored.
pub(crate) fn scan_entries(
    metadata: &[u8],
    count: u32,
    metadata_offset: u32,
    data_offset: u32,
) -> Result<Vec<Item>> {
    let count = count as usize;
    let meta_start = u64::from(metadata_offset);
    let meta_end = meta_start + metadata.len() as u64;

    let mut items = Vec::with_capacity(count);
    // (entry index, offset where its listing starts)
    let mut open: Vec<(usize, u64)> = Vec::new();
    let mut parent: Option<usize> = None;

    for index in 0..count {
        let record = 4 + index * ENTRY_SIZE;
        let hash = le_u32_at(metadata, record)?;
        let name_field = le_u32_at(metadata, record + 0x04)?;
        let size = le_u32_at(metadata, record + 0x08)?;
        let pointer = le_u32_at(metadata, record + 0x0C)?;

        let flags = (name_field >> 24) as u8;
        let name_offset = u64::from(name_field & 0x00FF_FFFF);
        if name_offset < meta_start || name_offset >= meta_end {
            debug!(index, name_offset, "entry name outside metadata region");
            return Err(Error::InvalidRange);
        }
        let name = null_bytes(metadata, (name_offset - meta_start) as usize)?;
        if name.is_empty() {
            return Err(Error::Corrupt("entry has an empty name"));
        }

        let computed = name_hash(name);
        if computed != hash {
            warn!(
                index,
                stored = hash,
                computed,
                name = %String::from_utf8_lossy(name),
                "name hash mismatch"
            );
        }

        let is_dir = flags & FLAG_DIRECTORY != 0;
        let (offset, size) = if is_dir || size == 0 {
            (0, 0)
        } else {
            let offset = pointer
                .checked_sub(data_offset)
                .ok_or(Error::Corrupt("file data starts before the data region"))?;
            (u64::from(offset), u64::from(size))
        };
        trace!(index, ?parent, is_dir, offset, size, "entry");

        items.push(Item {
            name: name.to_vec(),
            parent,
            is_dir,
            offset,
            size,
        });

        if is_dir {
            open.push((index, u64::from(pointer)));
        }

        if flags & FLAG_LAST_ENTRY != 0 && index != count - 1 {
            let next = meta_start + (record + ENTRY_SIZE) as u64;
            let Some(pos) = open.iter().rposition(|&(_, start)| start == next) else {
                debug!(index, next, "listing end matches no open directory");
                return Err(Error::Corrupt("unmatched end of directory listing"));
            };
            parent = Some(open.remove(pos).0);
        }
    }

    if !open.is_empty() {
        debug!(open = open.len(), "directories without a listing");
        return Err(Error::Corrupt("directory stack not empty after scan"));
    }

    Ok(items)
}

/// Streaming reader wrapper over a parsed [`GfArch`] archive.
pub struct GfArchReader<R> {
    inner: R,
    /// Parsed metadata.
    pub archive: GfArch,
}

impl<R: Read + Seek> GfArchReader<R> {
    /// Parse a GFArch archive and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let archive = GfArch::parse(&mut reader)?;
        Ok(Self {
            inner: reader,
            archive,
        })
    }

    /// All items in entry order.
    pub fn items(&self) -> &[Item] {
        &self.archive.items
    }

    /// Decode the selected items into sinks provided by `callback`.
    ///
    /// The data region is decoded once, from its start to the end of the
    /// furthest selected item. Every item, selected or not, gets exactly one
    /// operation bracket.
    pub fn extract<C: ExtractCallback>(
        &mut self,
        selection: Selection<'_>,
        test: bool,
        callback: &mut C,
    ) -> Result<()> {
        let indices = selection.resolve(self.archive.items.len())?;
        if indices.is_empty() {
            return Ok(());
        }
        let gfcp = self.data_region()?;

        let mut requested = vec![false; self.archive.items.len()];
        for &i in &indices {
            requested[i] = true;
        }
        let outputs = self
            .archive
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| Output {
                index,
                offset: item.offset,
                size: item.size,
                requested: requested[index],
            })
            .collect();

        let mut decoder = self.region_decoder(gfcp)?;
        let mode = if test { AskMode::Test } else { AskMode::Extract };
        let mux = Multiplexer::new(callback, outputs, mode)?;
        if mux.limit() > u64::from(gfcp.decompressed_size) {
            return Err(Error::Corrupt("selected items extend past the decompressed size"));
        }
        mux.run(&mut decoder)
    }

    /// Decode one file and return its contents.
    pub fn read_file(&mut self, index: usize) -> Result<Vec<u8>> {
        let item = self.archive.items.get(index).ok_or(Error::InvalidRange)?;
        if item.is_dir {
            return Err(Error::IsDirectory);
        }
        let (start, end) = (item.offset, item.end());
        let gfcp = self.data_region()?;
        let mut decoder = self.region_decoder(gfcp)?;
        if end > u64::from(gfcp.decompressed_size) {
            return Err(Error::Corrupt("item extends past the decompressed size"));
        }

        let mut sink = RangeSink {
            start,
            position: 0,
            out: Vec::new(),
        };
        decoder.decode(end, &mut sink)?;
        Ok(sink.out)
    }

    fn data_region(&self) -> Result<Gfcp> {
        self.archive
            .gfcp
            .ok_or(Error::Corrupt("archive has no data region"))
    }

    /// Seek to the compressed data and pick the decoder for its algorithm.
    fn region_decoder(&mut self, gfcp: Gfcp) -> Result<RegionDecoder<BufReader<Take<&mut R>>>> {
        let (stored, length) = match gfcp.algorithm {
            Algorithm::None => (true, gfcp.decompressed_size),
            Algorithm::BytePair => (false, gfcp.compressed_size),
            Algorithm::Lz77 => return Err(Error::UnsupportedCompression(gfcp.algorithm.id())),
        };
        self.inner
            .seek(SeekFrom::Start(self.archive.data_start))?;
        let input = BufReader::new(self.inner.by_ref().take(u64::from(length)));
        Ok(if stored {
            RegionDecoder::Stored(StoredDecoder::new(input))
        } else {
            RegionDecoder::BytePair(BpeDecoder::new(input))
        })
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

enum RegionDecoder<R> {
    Stored(StoredDecoder<R>),
    BytePair(BpeDecoder<R>),
}

impl<R: Read> Decoder for RegionDecoder<R> {
    fn decode<S: DecodeSink>(&mut self, limit: u64, sink: &mut S) -> Result<()> {
        match self {
            RegionDecoder::Stored(d) => d.decode(limit, sink),
            RegionDecoder::BytePair(d) => d.decode(limit, sink),
        }
    }
}

/// Keeps only the decoded bytes from `start` onwards.
struct RangeSink {
    start: u64,
    position: u64,
    out: Vec<u8>,
}

impl DecodeSink for RangeSink {
    fn put(&mut self, byte: u8) -> Result<()> {
        if self.position >= self.start {
            self.out.push(byte);
        }
        self.position += 1;
        Ok(())
    }
}
