//! U8 (ARC) - GameCube/Wii directory-tree archive.
//!
//! Used by first-party GameCube and Wii titles for bundled assets (`.arc`,
//! `.u8`, and the `.szs` files once Yaz0 is stripped). File data is stored
//! uncompressed, so extracting an item is a bounded copy.
//!
//! ## Layout
//! ```text
//! [0x00] Header                     (0x20 bytes)
//! [NodeTableOffset]
//!        Node table                 (NodeCount × 0x0C bytes)
//!        String table               (null-terminated names)
//! [...]  File data                  (absolute offsets from the nodes)
//! ```
//!
//! ## Header (0x20 bytes, big endian)
//! ```text
//! [0x00] Magic 55 AA 38 2D          (4 bytes)
//! [0x04] NodeTableOffset            (u32) - at least 0x20
//! [0x08] MetadataSize               (u32) - node table + string table
//! [0x0C] DataOffset / reserved      (0x14 bytes, unused)
//! ```
//!
//! ## Node (0x0C bytes, big endian)
//! ```text
//! [0x00] Type                       (u8)  0x00 = file, 0x01 = directory
//! [0x01] NameOffset                 (u24) relative to the string table
//! [0x04] File: DataOffset | Dir: parent index (unused here)
//! [0x08] File: DataSize   | Dir: index one past the last descendant
//! ```
//!
//! ## Tree encoding
//! Nodes are stored depth first. Node 0 is the root directory; its end index
//! is the total node count, which also locates the string table at
//! `NodeCount × 0x0C`. A directory's descendants are exactly the nodes from
//! its own index + 1 up to its end index, so the tree is rebuilt with a
//! single forward scan and a stack of open directories. Directories with an
//! empty name (the root) contribute no item; their children attach to the
//! enclosing directory.

use std::io::{self, Read, Seek, SeekFrom, Take, Write};

use tracing::{debug, trace};

use crate::extract::{AskMode, ExtractCallback, OperationResult, Selection};
use crate::item::{self, Item};
use crate::utils::{be_u32_at, bytesa, bytesv, null_bytes};
use crate::{Error, Result};

/// Archive signature.
pub const MAGIC: [u8; 4] = [0x55, 0xAA, 0x38, 0x2D];

/// Size of the fixed header.
pub const HEADER_SIZE: u64 = 0x20;

const NODE_SIZE: usize = 0x0C;
const NODE_FILE: u8 = 0x00;
const NODE_DIRECTORY: u8 = 0x01;

/// Parsed U8 archive (metadata only).
///
/// File data is accessed via [`U8Reader`].
#[derive(Debug)]
pub struct U8Archive {
    /// Items in node order, root excluded. Offsets are absolute within the
    /// archive.
    pub items: Vec<Item>,
    metadata_size: u64,
    /// Absolute stream offset of the archive start.
    pub(crate) base: u64,
}

impl U8Archive {
    /// Parse a U8 archive from `r`.
    ///
    /// `r` must be positioned at the very beginning of the U8 magic.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let base = r.stream_position()?;

        let header = bytesa::<0x20>(r)?;
        if header[..4] != MAGIC {
            return Err(Error::BadMagic);
        }
        let node_table_offset = be_u32_at(&header, 0x04)?;
        let metadata_size = be_u32_at(&header, 0x08)?;

        if u64::from(node_table_offset) < HEADER_SIZE {
            return Err(Error::InvalidHeader("node table overlaps the header"));
        }
        if (metadata_size as usize) < NODE_SIZE {
            return Err(Error::InvalidHeader("metadata smaller than one node"));
        }

        r.seek(SeekFrom::Start(base + u64::from(node_table_offset)))?;
        let metadata = bytesv(r, u64::from(metadata_size))?;

        if metadata[0] != NODE_DIRECTORY {
            return Err(Error::InvalidHeader("first node is not a directory"));
        }
        let node_count = be_u32_at(&metadata, 0x08)?;

        let items = build_tree(&metadata, node_count)?;
        debug!(nodes = node_count, items = items.len(), "parsed U8 archive");

        Ok(Self {
            items,
            metadata_size: u64::from(metadata_size),
            base,
        })
    }

    /// Fixed header plus node and string tables.
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

struct Node<'a> {
    kind: u8,
    name: &'a [u8],
    a: u32,
    b: u32,
}

fn read_node(metadata: &[u8], index: u32, node_count: u32, strings: usize) -> Result<Node<'_>> {
    if index >= node_count {
        return Err(Error::Corrupt("directory extends past the node count"));
    }
    let offset = (index as usize)
        .checked_mul(NODE_SIZE)
        .ok_or(Error::InvalidRange)?;
    let record = metadata
        .get(offset..offset + NODE_SIZE)
        .ok_or(Error::InvalidRange)?;

    let name_offset = strings
        .checked_add((be_u32_at(record, 0)? & 0x00FF_FFFF) as usize)
        .ok_or(Error::InvalidRange)?;
    let name = null_bytes(metadata, name_offset)?;

    let kind = record[0];
    if kind != NODE_FILE && kind != NODE_DIRECTORY {
        return Err(Error::Corrupt("node type is neither file nor directory"));
    }

    Ok(Node {
        kind,
        name,
        a: be_u32_at(record, 4)?,
        b: be_u32_at(record, 8)?,
    })
}

/// Rebuild the item tree from the flat node table.
///
/// Any out-of-range record, name, or node type fails the whole build; no
/// partial tree is returned.
pub(crate) fn build_tree(metadata: &[u8], node_count: u32) -> Result<Vec<Item>> {
    let strings = (node_count as usize)
        .checked_mul(NODE_SIZE)
        .ok_or(Error::InvalidRange)?;

    let mut items = Vec::new();
    // (end index, parent for children)
    let mut open: Vec<(u32, Option<usize>)> = Vec::new();
    let mut index = 0u32;

    loop {
        while let Some(&(end, _)) = open.last() {
            if index < end {
                break;
            }
            open.pop();
        }
        if index > 0 && open.is_empty() {
            break;
        }
        let parent = open.last().and_then(|&(_, p)| p);

        let node = read_node(metadata, index, node_count, strings).inspect_err(|e| {
            debug!(index, error = %e, "bad U8 node");
        })?;
        trace!(index, ?parent, kind = node.kind, "node");

        if node.kind == NODE_FILE {
            items.push(Item {
                name: node.name.to_vec(),
                parent,
                is_dir: false,
                offset: u64::from(node.a),
                size: u64::from(node.b),
            });
        } else {
            let mut children_parent = parent;
            if !node.name.is_empty() {
                children_parent = Some(items.len());
                items.push(Item {
                    name: node.name.to_vec(),
                    parent,
                    is_dir: true,
                    offset: 0,
                    size: 0,
                });
            }
            open.push((node.b, children_parent));
        }

        index += 1;
    }

    Ok(items)
}

/// Streaming reader wrapper over a parsed [`U8Archive`].
pub struct U8Reader<R> {
    inner: R,
    /// Parsed metadata.
    pub archive: U8Archive,
}

impl<R: Read + Seek> U8Reader<R> {
    /// Parse a U8 archive and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let archive = U8Archive::parse(&mut reader)?;
        Ok(Self {
            inner: reader,
            archive,
        })
    }

    /// All items in node order.
    pub fn items(&self) -> &[Item] {
        &self.archive.items
    }

    /// Open a file for streaming access.
    ///
    /// Seeks to the file's start and returns a [`Take`] limited to its byte
    /// range. The borrow ends when the [`Take`] is dropped.
    pub fn read_file(&mut self, index: usize) -> Result<Take<&mut R>> {
        let item = self.archive.items.get(index).ok_or(Error::InvalidRange)?;
        if item.is_dir {
            return Err(Error::IsDirectory);
        }
        let size = item.size;
        self.inner
            .seek(SeekFrom::Start(self.archive.base + item.offset))?;
        Ok(self.inner.by_ref().take(size))
    }

    /// Copy the selected items into sinks provided by `callback`.
    ///
    /// In test mode nothing is read; each item's bracket closes immediately.
    /// A copy that comes up short, or fails mid-way, is reported as
    /// [`OperationResult::DataError`] for that item and extraction moves on.
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

        let total: u64 = indices.iter().map(|&i| self.archive.items[i].size).sum();
        callback.set_total(total)?;

        let mode = if test { AskMode::Test } else { AskMode::Extract };
        let mut done = 0u64;

        for index in indices {
            callback.report_progress(done, done)?;
            let (offset, size, is_dir) = {
                let item = &self.archive.items[index];
                (item.offset, item.size, item.is_dir)
            };

            let sink = callback.request_sink(index, mode)?;
            done += size;
            if !test && sink.is_none() {
                continue;
            }
            callback.begin_operation(mode)?;

            let Some(mut sink) = sink.filter(|_| !test) else {
                callback.end_operation(OperationResult::Ok)?;
                continue;
            };

            let copied = if is_dir {
                Ok(0)
            } else {
                self.copy_range(offset, size, &mut sink)
            };
            drop(sink);

            let result = match copied {
                Ok(n) if n == size => OperationResult::Ok,
                Ok(n) => {
                    debug!(index, copied = n, expected = size, "short copy");
                    OperationResult::DataError
                }
                Err(e) => {
                    debug!(index, error = %e, "copy failed");
                    OperationResult::DataError
                }
            };
            callback.end_operation(result)?;
        }

        Ok(())
    }

    fn copy_range<W: Write>(&mut self, offset: u64, size: u64, sink: &mut W) -> Result<u64> {
        self.inner
            .seek(SeekFrom::Start(self.archive.base + offset))?;
        let copied = io::copy(&mut self.inner.by_ref().take(size), sink)?;
        sink.flush()?;
        Ok(copied)
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
