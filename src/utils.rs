//! Low-level I/O primitives shared by all parsers.
//!
//! Stream readers read exactly the bytes they promise or return an error -
//! there is no partial-read ambiguity. Slice readers never index out of
//! bounds; they return [`Error::InvalidRange`] instead.

use std::io::{self, Read};

use crate::{Error, Result};

/// Read one byte, or [`None`] at a clean end of stream.
#[inline]
pub(crate) fn next_u8<R: Read>(r: &mut R) -> Result<Option<u8>> {
    let mut b = [0u8; 1];
    loop {
        match r.read(&mut b) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(b[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
///
/// The buffer grows with the data actually read, so a bogus length field
/// cannot force a huge up-front allocation.
pub(crate) fn bytesv<R: Read>(r: &mut R, len: u64) -> Result<Vec<u8>> {
    let mut b = Vec::new();
    r.take(len).read_to_end(&mut b)?;
    if (b.len() as u64) < len {
        return Err(Error::UnexpectedEof);
    }
    Ok(b)
}

/// Read a big-endian `u32` at `offset` within `buf`.
#[inline]
pub(crate) fn be_u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(u32::from_be_bytes(array_at(buf, offset)?))
}

/// Read a little-endian `u32` at `offset` within `buf`.
#[inline]
pub(crate) fn le_u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(array_at(buf, offset)?))
}

#[inline]
fn array_at<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let end = offset.checked_add(N).ok_or(Error::InvalidRange)?;
    let slice = buf.get(offset..end).ok_or(Error::InvalidRange)?;
    let mut b = [0u8; N];
    b.copy_from_slice(slice);
    Ok(b)
}

/// Borrow the null-terminated byte string starting at `offset` (terminator
/// excluded).
///
/// Returns [`Error::InvalidRange`] if `offset` is out of bounds, or
/// [`Error::UnterminatedName`] if no null byte is found.
#[inline]
pub(crate) fn null_bytes(buf: &[u8], offset: usize) -> Result<&[u8]> {
    let slice = buf.get(offset..).ok_or(Error::InvalidRange)?;
    let end = slice
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnterminatedName)?;
    Ok(&slice[..end])
}
