//! Block decompression engines and decompressed block buffers.
//!
//! Decompression is consumed through the [`Inflater`] trait so the pipeline
//! never depends on a particular DEFLATE implementation. Two engines are
//! provided:
//!
//! - [`LibdeflateInflater`] - libdeflate via `libdeflater` (default, fastest)
//! - [`Flate2Inflater`] - a stateful `flate2` raw-deflate stream, reset before each use
//!
//! Engines are created once per pipeline (see [`InflaterKind::create`]) and
//! checked out of a [`crate::pool::BoundedPool`] for each block.

use std::io;

use clap::ValueEnum;
use flate2::{Decompress, FlushDecompress, Status};
use libdeflater::Decompressor;
use parbam_bgzf::MAX_BLOCK_SIZE;

use crate::block::CompressedBlock;
use crate::errors::{DecodeError, Result};

/// A reusable raw-DEFLATE decompression engine.
pub trait Inflater: Send {
    /// Decompress `input` into `output`, returning the number of bytes written.
    ///
    /// `output` is sized to the declared uncompressed size of the block.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is corrupt.
    fn inflate(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<usize>;

    /// Return the engine to a ready state. Called on every checkout.
    fn reset(&mut self) {}
}

/// libdeflate-backed engine.
pub struct LibdeflateInflater {
    decompressor: Decompressor,
}

impl LibdeflateInflater {
    /// Create a new engine.
    #[must_use]
    pub fn new() -> Self {
        Self { decompressor: Decompressor::new() }
    }
}

impl Default for LibdeflateInflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflater for LibdeflateInflater {
    fn inflate(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<usize> {
        self.decompressor.deflate_decompress(input, output).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("deflate decompression failed: {e:?}"))
        })
    }
}

/// flate2-backed engine holding a streaming decompressor.
pub struct Flate2Inflater {
    decompress: Decompress,
}

impl Flate2Inflater {
    /// Create a new engine.
    #[must_use]
    pub fn new() -> Self {
        Self { decompress: Decompress::new(false) }
    }
}

impl Default for Flate2Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflater for Flate2Inflater {
    fn inflate(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<usize> {
        let before = self.decompress.total_out();
        let status = self
            .decompress
            .decompress(input, output, FlushDecompress::Finish)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // Anything short of the stream end means the payload does not fit the declared size
        if status != Status::StreamEnd {
            let reason =
                format!("deflate stream did not end within {} bytes ({status:?})", output.len());
            return Err(io::Error::new(io::ErrorKind::InvalidData, reason));
        }
        Ok((self.decompress.total_out() - before) as usize)
    }

    fn reset(&mut self) {
        self.decompress.reset(false);
    }
}

/// Which decompression engine the pipeline should create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum InflaterKind {
    /// libdeflate (whole-block decompression).
    #[default]
    #[value(name = "libdeflate")]
    Libdeflate,

    /// flate2 streaming decompressor.
    #[value(name = "flate2")]
    Flate2,
}

impl InflaterKind {
    /// Create a new engine of this kind.
    #[must_use]
    pub fn create(self) -> Box<dyn Inflater> {
        match self {
            Self::Libdeflate => Box::new(LibdeflateInflater::new()),
            Self::Flate2 => Box::new(Flate2Inflater::new()),
        }
    }
}

/// Decompressed contents of one block with a read cursor.
///
/// The buffer is allocated once at [`MAX_BLOCK_SIZE`] and reused each time
/// the block cycles through its pool.
#[derive(Debug, Clone)]
pub struct DecompressedBlock {
    /// Backing buffer; only `data[..len]` is valid.
    data: Vec<u8>,
    /// Number of valid bytes.
    len: usize,
    /// Next unread byte.
    pos: usize,
    /// Inherited from the compressed block.
    terminal: bool,
    /// Position of the source block in the stream.
    seq: u64,
}

impl DecompressedBlock {
    /// Create an empty block with a buffer of [`MAX_BLOCK_SIZE`] bytes.
    #[must_use]
    pub fn new() -> Self {
        Self { data: vec![0; MAX_BLOCK_SIZE], len: 0, pos: 0, terminal: false, seq: 0 }
    }

    /// Create a block holding already-decompressed bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], seq: u64, terminal: bool) -> Self {
        Self { data: bytes.to_vec(), len: bytes.len(), pos: 0, terminal, seq }
    }

    /// Decompress `block` into this buffer using `engine`.
    ///
    /// Writes exactly `block.uncompressed_size()` bytes, resets the cursor and
    /// copies the terminal flag and sequence number from `block`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Decompression`] if the engine fails, writes fewer
    /// bytes than declared, or (when `verify_crc` is set) the CRC32 of the
    /// output does not match the trailer.
    pub fn inflate_from(
        &mut self,
        block: &CompressedBlock,
        engine: &mut dyn Inflater,
        verify_crc: bool,
    ) -> Result<()> {
        let expected = block.uncompressed_size();
        self.len = 0;
        self.pos = 0;
        self.terminal = block.is_terminal();
        self.seq = block.seq();

        // Empty blocks (including the EOF marker) carry no data
        if expected == 0 {
            return Ok(());
        }
        if self.data.len() < expected {
            self.data.resize(expected, 0);
        }

        engine.reset();
        let written = engine
            .inflate(block.payload(), &mut self.data[..expected])
            .map_err(|e| DecodeError::Decompression { block: block.seq(), reason: e.to_string() })?;
        if written != expected {
            return Err(DecodeError::Decompression {
                block: block.seq(),
                reason: format!("expected {expected} bytes, decompressed {written}"),
            });
        }

        if verify_crc {
            let actual = crc32fast::hash(&self.data[..expected]);
            if actual != block.crc32() {
                return Err(DecodeError::Decompression {
                    block: block.seq(),
                    reason: format!(
                        "CRC32 mismatch: expected 0x{:08x}, got 0x{actual:08x}",
                        block.crc32()
                    ),
                });
            }
        }

        self.len = expected;
        Ok(())
    }

    /// Get the unread bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..self.len]
    }

    /// Mark `n` bytes as read.
    #[inline]
    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.len, "consumed past end of block");
        self.pos += n;
    }

    /// Whether every byte has been read.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.len
    }

    /// Get the number of decompressed bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this block ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Get the position of the source block in the stream.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Drop the contents, keeping the buffer for reuse.
    pub fn clear(&mut self) {
        self.len = 0;
        self.pos = 0;
        self.terminal = false;
        self.seq = 0;
    }

    /// Turn this into an empty terminal block, for a stream that ended
    /// without an EOF marker after `seq` blocks.
    pub fn end_of_stream(&mut self, seq: u64) {
        self.len = 0;
        self.pos = 0;
        self.terminal = true;
        self.seq = seq;
    }
}

impl Default for DecompressedBlock {
    fn default() -> Self {
        Self::new()
    }
}
