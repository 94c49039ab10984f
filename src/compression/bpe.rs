//! Byte-pair decoding (GFCP algorithm 1).
//!
//! The compressed stream is a sequence of self-contained blocks:
//!
//! ```text
//! [pair table]   run-length coded definitions for symbol slots 0..=255
//! [u16 BE]       number of input symbols in the block
//! [symbols]      that many bytes
//! ```
//!
//! ## Pair table
//! Every slot starts out as a literal (`left[c] == c`). Control bytes are
//! read until all 256 slots have been visited:
//!
//! * `count > 127` skips `count - 127` slots, which stay literal. Unless that
//!   completes the table, one definition follows.
//! * otherwise `count + 1` definitions follow.
//!
//! A definition is a left byte, plus a right byte only when the left byte
//! differs from the slot index (the slot becomes a pair).
//!
//! ## Symbols
//! A literal symbol is emitted as-is. A pair symbol expands into its left
//! then right child, each of which may itself be a pair; expansion uses an
//! explicit 256-entry stack.

use std::io::Read;

use tracing::trace;

use super::{DecodeSink, Decoder, PROGRESS_INTERVAL};
use crate::utils::next_u8;
use crate::{Error, Result};

const STACK_SIZE: usize = 256;

/// Streaming byte-pair decoder.
///
/// All state (pair table, expansion stack, counters) lives in this value;
/// build a fresh one for every decode.
pub struct BpeDecoder<R> {
    input: R,
    left: [u8; 256],
    right: [u8; 256],
    stack: [u8; STACK_SIZE],
    bytes_in: u64,
}

impl<R: Read> BpeDecoder<R> {
    /// Decode blocks read from `input`, starting at its current position.
    pub fn new(input: R) -> Self {
        Self {
            input,
            left: [0; 256],
            right: [0; 256],
            stack: [0; STACK_SIZE],
            bytes_in: 0,
        }
    }

    /// Compressed bytes consumed so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Consume the decoder, returning the input stream.
    pub fn into_inner(self) -> R {
        self.input
    }

    fn byte(&mut self) -> Result<u8> {
        let b = next_u8(&mut self.input)?.ok_or(Error::Data("compressed stream ended early"))?;
        self.bytes_in += 1;
        Ok(b)
    }

    /// Read the next block header. Returns the block's symbol count, or
    /// [`None`] if the input ends cleanly before a new block.
    fn next_block(&mut self) -> Result<Option<u16>> {
        let Some(count) = next_u8(&mut self.input)? else {
            return Ok(None);
        };
        self.bytes_in += 1;
        self.read_pair_table(count)?;

        let hi = self.byte()?;
        let lo = self.byte()?;
        let symbols = u16::from_be_bytes([hi, lo]);
        trace!(symbols, bytes_in = self.bytes_in, "bpe block");
        Ok(Some(symbols))
    }

    fn read_pair_table(&mut self, mut count: u8) -> Result<()> {
        for (c, slot) in self.left.iter_mut().enumerate() {
            *slot = c as u8;
        }

        let mut c = 0usize;
        loop {
            let mut definitions = count as usize;
            if definitions > 127 {
                c += definitions - 127;
                definitions = 0;
            }
            if c == 256 {
                return Ok(());
            }
            if c > 256 {
                return Err(Error::Corrupt("pair table overran 256 symbols"));
            }

            for _ in 0..=definitions {
                if c >= 256 {
                    return Err(Error::Corrupt("pair table overran 256 symbols"));
                }
                let left = self.byte()?;
                self.left[c] = left;
                if left as usize != c {
                    self.right[c] = self.byte()?;
                }
                c += 1;
            }
            if c == 256 {
                return Ok(());
            }
            count = self.byte()?;
        }
    }
}

impl<R: Read> Decoder for BpeDecoder<R> {
    fn decode<S: DecodeSink>(&mut self, limit: u64, sink: &mut S) -> Result<()> {
        if limit == 0 {
            return Ok(());
        }

        let mut produced = 0u64;
        loop {
            let Some(mut remaining) = self.next_block()? else {
                return Err(Error::Data("compressed stream ended early"));
            };

            let mut sp = 0usize;
            loop {
                let code = if sp > 0 {
                    sp -= 1;
                    self.stack[sp]
                } else {
                    if remaining == 0 {
                        break;
                    }
                    remaining -= 1;
                    self.byte()?
                };

                let c = code as usize;
                if self.left[c] == code {
                    sink.put(code)?;
                    produced += 1;
                    if produced >= limit {
                        return Ok(());
                    }
                    if produced % PROGRESS_INTERVAL == 0 {
                        sink.progress(self.bytes_in, produced)?;
                    }
                } else {
                    if sp + 2 > STACK_SIZE {
                        return Err(Error::Corrupt("pair expansion overflowed decode stack"));
                    }
                    self.stack[sp] = self.right[c];
                    self.stack[sp + 1] = self.left[c];
                    sp += 2;
                }
            }
        }
    }
}

/// Decode a complete byte-pair buffer into `size` bytes.
pub fn decompress_bpe(data: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(size);
    BpeDecoder::new(data).decode(size as u64, &mut out)?;
    Ok(out)
}
