//! Single-threaded decoder.

use std::io::BufRead;

use log::warn;

use crate::block::CompressedBlock;
use crate::errors::Result;
use crate::header::RawHeader;
use crate::inflate::{DecompressedBlock, Inflater};

use super::packer::Packer;
use super::{BatchSource, DecoderOptions, RecordBatch};

/// Decoder that reads, decompresses and frames on the calling thread.
///
/// Arenas are never waited for: if the consumer still holds every arena when
/// another one is needed, decoding fails with
/// [`DecodeError::Aborted`](crate::errors::DecodeError::Aborted) instead of
/// deadlocking.
pub struct SerialDecoder<R> {
    reader: R,
    engine: Box<dyn Inflater>,
    verify_crc: bool,
    expect_header: bool,
    compressed: CompressedBlock,
    block: DecompressedBlock,
    /// `block` still holds bytes (or a pending record) to frame.
    pending: bool,
    packer: Packer,
    /// A batch produced while reading ahead for the header.
    ready: Option<RecordBatch>,
    next_seq: u64,
    finished: bool,
}

impl<R: BufRead> SerialDecoder<R> {
    /// Create a decoder over `reader`.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` is invalid.
    pub fn new(reader: R, options: DecoderOptions) -> Result<Self> {
        options.validate()?;
        let packer = Packer::new(
            options.arena_pool(),
            options.expect_header,
            options.keep_runs_together,
            false,
        );
        Ok(Self {
            reader,
            engine: options.inflater.create(),
            verify_crc: options.verify_crc,
            expect_header: options.expect_header,
            compressed: CompressedBlock::new(),
            block: DecompressedBlock::new(),
            pending: false,
            packer,
            ready: None,
            next_seq: 0,
            finished: false,
        })
    }

    /// Advance by one block, or by one arena hand-off within a block.
    fn step(&mut self) -> Result<Option<RecordBatch>> {
        if self.pending {
            if let Some(batch) = self.packer.feed(&mut self.block)? {
                return Ok(Some(batch));
            }
            self.pending = false;
            if self.block.is_terminal() {
                return self.finish().map(Some);
            }
            return Ok(None);
        }

        if !self.compressed.read_from(&mut self.reader, self.next_seq)? {
            warn!("Stream ended without an EOF marker block after {} blocks", self.next_seq);
            return self.finish().map(Some);
        }
        self.next_seq += 1;
        self.block.inflate_from(&self.compressed, self.engine.as_mut(), self.verify_crc)?;
        self.pending = true;
        Ok(None)
    }

    fn finish(&mut self) -> Result<RecordBatch> {
        self.finished = true;
        self.packer.finish()
    }

    /// Run `step`, stopping the decoder on the first error.
    fn step_or_stop(&mut self) -> Result<Option<RecordBatch>> {
        let result = self.step();
        if result.is_err() {
            self.finished = true;
        }
        result
    }
}

impl<R: BufRead> BatchSource for SerialDecoder<R> {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if let Some(batch) = self.ready.take() {
            return Ok(Some(batch));
        }
        while !self.finished {
            if let Some(batch) = self.step_or_stop()? {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }

    fn header(&mut self) -> Result<Option<&RawHeader>> {
        if !self.expect_header {
            return Ok(None);
        }
        while self.packer.header().is_none() && self.ready.is_none() && !self.finished {
            self.ready = self.step_or_stop()?;
        }
        Ok(self.packer.header())
    }

    fn blocks_read(&self) -> u64 {
        self.next_seq
    }
}
