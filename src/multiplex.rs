//! Fan-out of one decoded stream into per-item output sinks.
//!
//! A compressed archive stores all file contents as one blob. Items are
//! disjoint byte ranges inside the decoded blob, and the decoder can only go
//! forward, so extracting any subset means decoding from the start up to the
//! end of the furthest selected item. The [`Multiplexer`] sits between the
//! decoder and an [`ExtractCallback`], opening each item's sink when the
//! decode position enters its range and closing it when the range ends.

use std::io::{BufWriter, Write};

use tracing::{debug, trace};

use crate::compression::{DecodeSink, Decoder};
use crate::extract::{AskMode, ExtractCallback, OperationResult};
use crate::{Error, Result};

/// One item's place in the decoded blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Output {
    /// Item index reported to the callback.
    pub index: usize,
    /// Start of the item's bytes in the decoded blob.
    pub offset: u64,
    /// Length of the item's bytes. Directories use 0.
    pub size: u64,
    /// Whether the caller selected this item.
    pub requested: bool,
}

impl Output {
    fn end(&self) -> u64 {
        self.offset + self.size
    }
}

struct Active<W: Write> {
    output: usize,
    sink: Option<BufWriter<W>>,
}

/// Routes decoded bytes to the item whose range contains them.
///
/// At most one sink is open at a time. Every output gets exactly one
/// operation bracket: outputs the decoder passes through are bracketed as
/// their range is crossed, and the rest (directories, empty files, and
/// anything past the last selected byte) are bracketed after decoding
/// stops, without decoding further.
pub struct Multiplexer<'a, C: ExtractCallback> {
    callback: &'a mut C,
    mode: AskMode,
    outputs: Vec<Output>,
    visited: Vec<bool>,
    /// Outputs with a non-empty range, by ascending offset.
    order: Vec<usize>,
    cursor: usize,
    active: Option<Active<C::Sink>>,
    position: u64,
}

impl<'a, C: ExtractCallback> Multiplexer<'a, C> {
    /// `mode` is used for requested outputs; it must be
    /// [`AskMode::Extract`] or [`AskMode::Test`].
    ///
    /// Returns [`Error::Corrupt`] if any two non-empty ranges overlap.
    pub fn new(callback: &'a mut C, outputs: Vec<Output>, mode: AskMode) -> Result<Self> {
        let mut order: Vec<usize> = (0..outputs.len())
            .filter(|&o| outputs[o].size > 0)
            .collect();
        order.sort_by_key(|&o| outputs[o].offset);

        for pair in order.windows(2) {
            if outputs[pair[0]].end() > outputs[pair[1]].offset {
                debug!(
                    first = outputs[pair[0]].index,
                    second = outputs[pair[1]].index,
                    "overlapping item ranges"
                );
                return Err(Error::Corrupt("overlapping file data ranges"));
            }
        }

        Ok(Self {
            callback,
            mode,
            visited: vec![false; outputs.len()],
            outputs,
            order,
            cursor: 0,
            active: None,
            position: 0,
        })
    }

    /// Number of decoded bytes needed to cover every requested output.
    pub fn limit(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.requested)
            .map(Output::end)
            .max()
            .unwrap_or(0)
    }

    /// Drive `decoder` up to [`limit`](Self::limit), then bracket whatever
    /// was not reached.
    ///
    /// On a decode failure the open item (if any) ends with
    /// [`OperationResult::DataError`], remaining items are left alone, and
    /// the error is returned.
    pub fn run<D: Decoder>(mut self, decoder: &mut D) -> Result<()> {
        let limit = self.limit();
        self.callback.set_total(limit)?;
        debug!(limit, outputs = self.outputs.len(), "multiplexed decode");

        match decoder.decode(limit, &mut self) {
            Ok(()) => {
                self.close_active(OperationResult::Ok)?;
                self.finish_unvisited()
            }
            Err(e) => {
                debug!(position = self.position, error = %e, "decode failed");
                self.abort();
                Err(e)
            }
        }
    }

    fn open(&mut self, o: usize) -> Result<()> {
        let output = self.outputs[o];
        let ask = if output.requested {
            self.mode
        } else {
            AskMode::Skip
        };
        self.visited[o] = true;
        let sink = self.callback.request_sink(output.index, ask)?;
        let mode = match (ask, &sink) {
            (AskMode::Test, _) => AskMode::Test,
            (_, Some(_)) => ask,
            (_, None) => AskMode::Skip,
        };
        trace!(index = output.index, ?mode, "begin item");
        self.callback.begin_operation(mode)?;
        self.active = Some(Active {
            output: o,
            sink: sink.map(BufWriter::new),
        });
        Ok(())
    }

    fn close_active(&mut self, result: OperationResult) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        trace!(index = self.outputs[active.output].index, ?result, "end item");
        let flushed = match active.sink {
            Some(mut sink) => sink.flush(),
            None => Ok(()),
        };
        match flushed {
            Ok(()) => self.callback.end_operation(result),
            Err(e) => {
                self.callback.end_operation(OperationResult::DataError)?;
                Err(e.into())
            }
        }
    }

    fn abort(&mut self) {
        if let Some(active) = self.active.take() {
            drop(active.sink);
            if let Err(e) = self.callback.end_operation(OperationResult::DataError) {
                debug!(error = %e, "callback failed while reporting data error");
            }
        }
    }

    fn finish_unvisited(&mut self) -> Result<()> {
        for o in 0..self.outputs.len() {
            if self.visited[o] {
                continue;
            }
            self.open(o)?;
            self.close_active(OperationResult::Ok)?;
        }
        Ok(())
    }
}

impl<C: ExtractCallback> DecodeSink for Multiplexer<'_, C> {
    fn put(&mut self, byte: u8) -> Result<()> {
        let pos = self.position;

        if self.active.is_none() {
            while let Some(&o) = self.order.get(self.cursor) {
                let output = &self.outputs[o];
                if output.end() <= pos {
                    self.cursor += 1;
                    continue;
                }
                if output.offset <= pos {
                    self.cursor += 1;
                    self.open(o)?;
                }
                break;
            }
        }

        if let Some(active) = &mut self.active {
            if let Some(sink) = &mut active.sink {
                sink.write_all(&[byte])?;
            }
            if pos + 1 >= self.outputs[active.output].end() {
                self.close_active(OperationResult::Ok)?;
            }
        }

        self.position += 1;
        Ok(())
    }

    fn progress(&mut self, bytes_in: u64, bytes_out: u64) -> Result<()> {
        self.callback.report_progress(bytes_in, bytes_out)
    }
}
