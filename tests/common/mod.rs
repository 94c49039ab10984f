//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use wiiarc::extract::{AskMode, ExtractCallback, OperationResult};
use wiiarc::formats::gfarch::name_hash;

pub enum Node {
    File(&'static str, Vec<u8>),
    Dir(&'static str, Vec<Node>),
}

pub fn file(name: &'static str, data: impl Into<Vec<u8>>) -> Node {
    Node::File(name, data.into())
}

pub fn dir(name: &'static str, children: Vec<Node>) -> Node {
    Node::Dir(name, children)
}

/// Deterministic filler that compresses reasonably well.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| b"abcabdabe"[(i + seed as usize) % 9] ^ ((i / 97) as u8 & 3))
        .collect()
}

fn align(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

// ---------------------------------------------------------------------------
// U8
// ---------------------------------------------------------------------------

/// Build a U8 archive. Nodes are laid out depth first after an unnamed root.
pub fn u8_archive(root: &[Node]) -> Vec<u8> {
    struct Flat {
        kind: u8,
        name: usize,
        a: u32,
        b: u32,
        data: Option<Vec<u8>>,
    }

    fn walk(nodes: &[Node], parent: u32, flat: &mut Vec<Flat>, strings: &mut Vec<u8>) {
        for node in nodes {
            let name_of = |s: &str, strings: &mut Vec<u8>| {
                let at = strings.len();
                strings.extend_from_slice(s.as_bytes());
                strings.push(0);
                at
            };
            match node {
                Node::File(name, data) => {
                    let name = name_of(name, strings);
                    flat.push(Flat {
                        kind: 0,
                        name,
                        a: 0,
                        b: data.len() as u32,
                        data: Some(data.clone()),
                    });
                }
                Node::Dir(name, children) => {
                    let name = name_of(name, strings);
                    let index = flat.len();
                    flat.push(Flat {
                        kind: 1,
                        name,
                        a: parent,
                        b: 0,
                        data: None,
                    });
                    walk(children, index as u32, flat, strings);
                    flat[index].b = flat.len() as u32;
                }
            }
        }
    }

    let mut strings = vec![0u8];
    let mut flat = vec![Flat {
        kind: 1,
        name: 0,
        a: 0,
        b: 0,
        data: None,
    }];
    walk(root, 0, &mut flat, &mut strings);
    flat[0].b = flat.len() as u32;

    let metadata_size = flat.len() * 12 + strings.len();
    let data_start = align(0x20 + metadata_size, 0x20);

    let mut data = Vec::new();
    for node in &mut flat {
        if let Some(bytes) = &node.data {
            node.a = (data_start + data.len()) as u32;
            data.extend_from_slice(bytes);
            data.resize(align(data.len(), 0x20), 0);
        }
    }

    let mut out = vec![0x55, 0xAA, 0x38, 0x2D];
    out.extend_from_slice(&0x20u32.to_be_bytes());
    out.extend_from_slice(&(metadata_size as u32).to_be_bytes());
    out.extend_from_slice(&(data_start as u32).to_be_bytes());
    out.resize(0x20, 0);
    for node in &flat {
        out.extend_from_slice(&(node.name as u32 | u32::from(node.kind) << 24).to_be_bytes());
        out.extend_from_slice(&node.a.to_be_bytes());
        out.extend_from_slice(&node.b.to_be_bytes());
    }
    out.extend_from_slice(&strings);
    out.resize(data_start, 0);
    out.extend_from_slice(&data);
    out
}

// ---------------------------------------------------------------------------
// GFArch
// ---------------------------------------------------------------------------

pub const GFA_META_OFFSET: usize = 0x1C;

/// A built GFArch archive plus the offsets tests poke at.
pub struct GfArchFixture {
    pub bytes: Vec<u8>,
    pub metadata_size: usize,
    pub data_offset: usize,
    /// Decompressed blob (all file data in entry order).
    pub blob: Vec<u8>,
}

impl GfArchFixture {
    /// Absolute offset of entry `index`'s record.
    pub fn entry(&self, index: usize) -> usize {
        GFA_META_OFFSET + 4 + index * 16
    }

    pub fn put_le32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn le32(&self, at: usize) -> u32 {
        u32::from_le_bytes(self.bytes[at..at + 4].try_into().unwrap())
    }
}

/// Build a GFArch archive with the given GFCP algorithm id.
///
/// Listings are laid out breadth first: the root listing, then each
/// directory's listing in the order the directories were written.
/// Algorithm 1 is compressed with [`bpe_compress`]; any other id stores the
/// blob verbatim.
pub fn gfarch(root: &[Node], algorithm: u32) -> GfArchFixture {
    struct Entry {
        name: &'static str,
        flags: u8,
        size: u32,
        /// File: position in blob. Dir: index of the first child entry.
        target: usize,
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut blob = Vec::new();
    let mut listings: Vec<(Option<usize>, &[Node])> = vec![(None, root)];
    let mut next = 0;
    while next < listings.len() {
        let (owner, nodes) = listings[next];
        next += 1;
        assert!(!nodes.is_empty(), "empty directories cannot be encoded");
        if let Some(owner) = owner {
            entries[owner].target = entries.len();
        }
        for (i, node) in nodes.iter().enumerate() {
            let last = if i + 1 == nodes.len() { 0x80 } else { 0 };
            match node {
                Node::File(name, data) => {
                    entries.push(Entry {
                        name: *name,
                        flags: last,
                        size: data.len() as u32,
                        target: blob.len(),
                    });
                    blob.extend_from_slice(data);
                }
                Node::Dir(name, children) => {
                    listings.push((Some(entries.len()), children.as_slice()));
                    entries.push(Entry {
                        name: *name,
                        flags: last | 0x01,
                        size: 0,
                        target: 0,
                    });
                }
            }
        }
    }

    let names_start = GFA_META_OFFSET + 4 + entries.len() * 16;
    let mut names = Vec::new();
    let mut name_offsets = Vec::new();
    for e in &entries {
        name_offsets.push(names_start + names.len());
        names.extend_from_slice(e.name.as_bytes());
        names.push(0);
    }
    let metadata_size = 4 + entries.len() * 16 + names.len();
    let data_offset = align(GFA_META_OFFSET + metadata_size, 0x10);

    let payload = if algorithm == 1 {
        bpe_compress(&blob)
    } else {
        blob.clone()
    };

    let mut out = b"GFAC".to_vec();
    out.extend_from_slice(&[0; 8]);
    for v in [
        GFA_META_OFFSET,
        metadata_size,
        data_offset,
        0x14 + payload.len(),
    ] {
        out.extend_from_slice(&(v as u32).to_le_bytes());
    }
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (e, &name_offset) in entries.iter().zip(&name_offsets) {
        let pointer = if e.flags & 0x01 != 0 {
            GFA_META_OFFSET + 4 + e.target * 16
        } else {
            data_offset + e.target
        };
        out.extend_from_slice(&name_hash(e.name.as_bytes()).to_le_bytes());
        out.extend_from_slice(&(name_offset as u32 | u32::from(e.flags) << 24).to_le_bytes());
        out.extend_from_slice(&e.size.to_le_bytes());
        out.extend_from_slice(&(pointer as u32).to_le_bytes());
    }
    out.extend_from_slice(&names);
    out.resize(data_offset, 0);

    out.extend_from_slice(b"GFCP");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&algorithm.to_le_bytes());
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);

    GfArchFixture {
        bytes: out,
        metadata_size,
        data_offset,
        blob,
    }
}

/// Header for an archive with no entries.
pub fn empty_gfarch() -> Vec<u8> {
    let mut out = b"GFAC".to_vec();
    out.extend_from_slice(&[0; 8]);
    for v in [0x1Cu32, 8, 0x24, 0] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&[0; 8]);
    out
}

// ---------------------------------------------------------------------------
// Byte-pair encoding
// ---------------------------------------------------------------------------

/// Pair table defining every slot explicitly: two runs of 128 definitions.
pub fn pair_table(pairs: &HashMap<u8, (u8, u8)>) -> Vec<u8> {
    let mut out = Vec::new();
    for half in 0..2usize {
        out.push(127);
        for slot in half * 128..half * 128 + 128 {
            match pairs.get(&(slot as u8)) {
                Some(&(left, right)) => out.extend_from_slice(&[left, right]),
                None => out.push(slot as u8),
            }
        }
    }
    out
}

/// Greedy byte-pair compressor, one block per 4 KiB of input.
///
/// Repeatedly replaces the most frequent adjacent pair with a byte value
/// unused in the block, up to 32 pairs per block.
pub fn bpe_compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(4096) {
        let mut symbols = chunk.to_vec();
        let mut used = [false; 256];
        for &b in &symbols {
            used[b as usize] = true;
        }
        let mut pairs = HashMap::new();

        for _ in 0..32 {
            let Some(slot) = (0..=255u8).find(|&c| !used[c as usize]) else {
                break;
            };
            let mut counts: HashMap<(u8, u8), usize> = HashMap::new();
            for w in symbols.windows(2) {
                *counts.entry((w[0], w[1])).or_default() += 1;
            }
            let Some((&best, &n)) = counts.iter().max_by_key(|&(&p, &n)| (n, p)) else {
                break;
            };
            if n < 3 {
                break;
            }

            let mut next = Vec::with_capacity(symbols.len());
            let mut i = 0;
            while i < symbols.len() {
                if i + 1 < symbols.len() && (symbols[i], symbols[i + 1]) == best {
                    next.push(slot);
                    i += 2;
                } else {
                    next.push(symbols[i]);
                    i += 1;
                }
            }
            symbols = next;
            used[slot as usize] = true;
            pairs.insert(slot, best);
        }

        out.extend(pair_table(&pairs));
        out.extend_from_slice(&(symbols.len() as u16).to_be_bytes());
        out.extend_from_slice(&symbols);
    }
    out
}

// ---------------------------------------------------------------------------
// Recording callback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Request(usize, AskMode),
    Begin(AskMode),
    End(OperationResult),
}

#[derive(Clone, Default)]
pub struct Shared(pub Rc<RefCell<Vec<u8>>>);

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
    pub total: Option<u64>,
    pub progress: Vec<u64>,
    /// Indices whose sink request is declined.
    pub decline: Vec<usize>,
    pub files: Vec<(usize, Shared)>,
}

impl Recorder {
    /// Bytes written to item `index`, if a sink was handed out for it.
    pub fn contents(&self, index: usize) -> Option<Vec<u8>> {
        self.files
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, s)| s.0.borrow().clone())
    }

    pub fn results(&self) -> Vec<OperationResult> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::End(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn requested(&self) -> Vec<(usize, AskMode)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Request(i, m) => Some((*i, *m)),
                _ => None,
            })
            .collect()
    }
}

impl ExtractCallback for Recorder {
    type Sink = Shared;

    fn set_total(&mut self, total: u64) -> wiiarc::Result<()> {
        self.total = Some(total);
        Ok(())
    }

    fn request_sink(&mut self, index: usize, mode: AskMode) -> wiiarc::Result<Option<Shared>> {
        self.events.push(Event::Request(index, mode));
        if mode == AskMode::Skip || self.decline.contains(&index) {
            return Ok(None);
        }
        let sink = Shared::default();
        self.files.push((index, sink.clone()));
        Ok(Some(sink))
    }

    fn begin_operation(&mut self, mode: AskMode) -> wiiarc::Result<()> {
        self.events.push(Event::Begin(mode));
        Ok(())
    }

    fn end_operation(&mut self, result: OperationResult) -> wiiarc::Result<()> {
        self.events.push(Event::End(result));
        Ok(())
    }

    fn report_progress(&mut self, _bytes_in: u64, bytes_out: u64) -> wiiarc::Result<()> {
        self.progress.push(bytes_out);
        Ok(())
    }
}
