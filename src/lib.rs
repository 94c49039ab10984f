//! **wiiarc** - read-only decoding of GameCube/Wii archive formats.
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::arc`]    | U8 / ARC - nested directory tree, uncompressed data |
//! | [`formats::gfarch`] | GFArch - Good-Feel archive, byte-pair compressed blob |
//!
//! Open either format with [`formats::ArchiveReader::open`], then drive
//! extraction through an [`extract::ExtractCallback`].

pub mod compression;
pub mod error;
pub mod extract;
pub mod formats;
pub mod item;
pub mod multiplex;
pub(crate) mod utils;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, Result};
