//! Logical file-tree entries shared by every archive format.
//!
//! Trees are stored as a flat arena: each [`Item`] names its parent by index,
//! and parents always precede their children. Paths are never stored; they
//! are rebuilt on demand by walking the parent chain.

/// Separator used when joining path components.
pub const PATH_SEPARATOR: u8 = b'/';

/// Placeholder rendered for an item with an empty name.
pub const UNNAMED: &[u8] = b"unknown";

/// One file or directory in an archive's reconstructed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Raw name bytes. Encoding is whatever the archive used; may be empty.
    pub name: Vec<u8>,
    /// Index of the containing directory, [`None`] at the top level.
    pub parent: Option<usize>,
    /// Whether this item is a directory.
    pub is_dir: bool,
    /// Start of the item's bytes in the archive's data region (files only).
    pub offset: u64,
    /// Length of the item's bytes in the data region (files only).
    pub size: u64,
}

impl Item {
    /// One past the last data byte.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// The item name, lossily decoded as UTF-8.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Build the raw path of `items[index]` by walking parent links to the root.
///
/// Returns [`None`] if `index` is out of range. The walk is bounded by the
/// number of items, so a malformed parent chain cannot loop forever.
pub fn path_bytes(items: &[Item], index: usize) -> Option<Vec<u8>> {
    items.get(index)?;

    let mut components = Vec::new();
    let mut cur = Some(index);
    while let Some(i) = cur {
        if components.len() > items.len() {
            break;
        }
        let item = items.get(i)?;
        components.push(if item.name.is_empty() {
            UNNAMED
        } else {
            item.name.as_slice()
        });
        cur = item.parent;
    }

    let mut path = Vec::new();
    for (n, component) in components.iter().rev().enumerate() {
        if n > 0 {
            path.push(PATH_SEPARATOR);
        }
        path.extend_from_slice(component);
    }
    Some(path)
}

/// [`path_bytes`] decoded lossily as UTF-8.
pub fn path(items: &[Item], index: usize) -> Option<String> {
    path_bytes(items, index).map(|p| String::from_utf8_lossy(&p).into_owned())
}

/// Find the index of the item whose path equals `path`.
pub fn find(items: &[Item], path: &str) -> Option<usize> {
    (0..items.len()).find(|&i| path_bytes(items, i).as_deref() == Some(path.as_bytes()))
}
