//! Verbatim data regions (GFCP algorithm 0).

use std::io::{ErrorKind, Read};

use super::{DecodeSink, Decoder, PROGRESS_INTERVAL};
use crate::{Error, Result};

/// Pass-through "decoder" that copies input bytes to the sink unchanged.
pub struct StoredDecoder<R> {
    input: R,
}

impl<R: Read> StoredDecoder<R> {
    /// Copy from `input`, starting at its current position.
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: Read> Decoder for StoredDecoder<R> {
    fn decode<S: DecodeSink>(&mut self, limit: u64, sink: &mut S) -> Result<()> {
        let mut buf = [0u8; 8192];
        let mut produced = 0u64;
        while produced < limit {
            let want = (limit - produced).min(buf.len() as u64) as usize;
            let n = match self.input.read(&mut buf[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Err(Error::Data("stored data ended early"));
            }
            for &b in &buf[..n] {
                sink.put(b)?;
                produced += 1;
                if produced % PROGRESS_INTERVAL == 0 && produced < limit {
                    sink.progress(produced, produced)?;
                }
            }
        }
        Ok(())
    }
}
