//! The extraction callback protocol.
//!
//! Extraction is driven by the archive, not the caller: the archive walks its
//! items in data order and asks an [`ExtractCallback`] for somewhere to put
//! each one. Every item the archive visits gets exactly one
//! [`begin_operation`](ExtractCallback::begin_operation) /
//! [`end_operation`](ExtractCallback::end_operation) bracket.

use std::io::Write;

use crate::{Error, Result};

/// Why the archive is asking for an output sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskMode {
    /// The caller wants the item's bytes written out.
    Extract,
    /// The caller only wants the item verified.
    Test,
    /// The item was not selected; the archive is passing over it.
    Skip,
}

/// Outcome reported when an operation bracket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The item was produced in full.
    Ok,
    /// The item's bytes could not be reproduced.
    DataError,
}

/// Receiver for extracted data.
pub trait ExtractCallback {
    /// Where item bytes are written. Dropping it closes it.
    type Sink: Write;

    /// Total number of output bytes the archive expects to produce.
    fn set_total(&mut self, _total: u64) -> Result<()> {
        Ok(())
    }

    /// Ask for the output of item `index`.
    ///
    /// Returning [`None`] declines the item (e.g. the file already exists);
    /// its bytes are then decoded but discarded.
    fn request_sink(&mut self, index: usize, mode: AskMode) -> Result<Option<Self::Sink>>;

    /// Start the work unit for the item whose sink was just requested.
    fn begin_operation(&mut self, mode: AskMode) -> Result<()>;

    /// Finish the current work unit.
    fn end_operation(&mut self, result: OperationResult) -> Result<()>;

    /// Periodic progress in consumed input bytes and produced output bytes.
    fn report_progress(&mut self, _bytes_in: u64, _bytes_out: u64) -> Result<()> {
        Ok(())
    }
}

/// Which items an extraction should materialize.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    /// Every item in the archive.
    All,
    /// Only these item indices.
    Indices(&'a [usize]),
}

impl Selection<'_> {
    /// Resolve to a list of indices, checking each against `item_count`.
    pub fn resolve(&self, item_count: usize) -> Result<Vec<usize>> {
        match self {
            Selection::All => Ok((0..item_count).collect()),
            Selection::Indices(indices) => {
                if indices.iter().any(|&i| i >= item_count) {
                    return Err(Error::InvalidRange);
                }
                Ok(indices.to_vec())
            }
        }
    }
}
