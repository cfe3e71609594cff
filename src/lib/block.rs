//! Raw BGZF block reading.
//!
//! This module reads one framed compressed block at a time without
//! decompressing it, so decompression can happen later on any worker thread.
//! Blocks are meant to be reused: [`CompressedBlock::read_from`] refills an
//! existing (pooled) block in place.
//!
//! # Usage
//!
//! ```
//! use parbam_lib::block::read_block;
//! use std::io::Cursor;
//!
//! let mut reader = Cursor::new(parbam_bgzf::BGZF_EOF.to_vec());
//! let block = read_block(&mut reader, 0).unwrap().unwrap();
//! assert!(block.is_terminal());
//! assert!(read_block(&mut reader, 1).unwrap().is_none());
//! ```

use std::io::{self, BufRead};

use parbam_bgzf::{BGZF_FOOTER_SIZE, BGZF_HEADER_SIZE, MAX_BLOCK_SIZE, parse_header, read_le_u32};

use crate::errors::{DecodeError, Result};

/// A compressed block read from the stream (not yet decompressed).
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    /// Compressed payload followed by the 8-byte trailer.
    data: Vec<u8>,
    /// Size of the compressed payload.
    payload_size: usize,
    /// Uncompressed size declared by the trailer (ISIZE).
    uncompressed_size: usize,
    /// Whether this is the end-of-stream marker.
    terminal: bool,
    /// Position of this block in the stream.
    seq: u64,
}

impl CompressedBlock {
    /// Create an empty block with room for the largest possible payload.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(MAX_BLOCK_SIZE),
            payload_size: 0,
            uncompressed_size: 0,
            terminal: false,
            seq: 0,
        }
    }

    /// Read the next block from `reader` into this block, replacing its contents.
    ///
    /// Returns `Ok(false)` if the stream ended cleanly before the first header
    /// byte (no block was read).
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid, the block is truncated, the
    /// declared uncompressed size exceeds [`MAX_BLOCK_SIZE`], or reading fails.
    pub fn read_from<R: BufRead + ?Sized>(&mut self, reader: &mut R, seq: u64) -> Result<bool> {
        self.seq = seq;
        self.payload_size = 0;
        self.uncompressed_size = 0;
        self.terminal = false;
        self.data.clear();

        let mut header = [0u8; BGZF_HEADER_SIZE];
        let n = read_fully(reader, &mut header)?;
        if n == 0 {
            return Ok(false);
        }
        if n < BGZF_HEADER_SIZE {
            return Err(DecodeError::Truncated {
                block: seq,
                expected: BGZF_HEADER_SIZE,
                actual: n,
            });
        }

        let payload_size = parse_header(&header)
            .map_err(|e| DecodeError::InvalidHeader { block: seq, reason: e.to_string() })?;

        let expected = payload_size + BGZF_FOOTER_SIZE;
        self.data.resize(expected, 0);
        let actual = read_fully(reader, &mut self.data)?;
        if actual != expected {
            return Err(DecodeError::Truncated { block: seq, expected, actual });
        }

        let uncompressed_size = read_le_u32(&self.data, expected - 4) as usize;
        if uncompressed_size > MAX_BLOCK_SIZE {
            return Err(DecodeError::BlockTooLarge {
                block: seq,
                size: uncompressed_size,
                max: MAX_BLOCK_SIZE,
            });
        }

        self.payload_size = payload_size;
        self.uncompressed_size = uncompressed_size;
        self.terminal = uncompressed_size == 0 && reader.fill_buf()?.is_empty();

        Ok(true)
    }

    /// Get the compressed payload (between header and trailer).
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.payload_size]
    }

    /// Get the size of the compressed payload.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Get the uncompressed size declared by the trailer.
    #[must_use]
    pub fn uncompressed_size(&self) -> usize {
        self.uncompressed_size
    }

    /// Get the CRC32 of the uncompressed data declared by the trailer.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        if self.data.len() < BGZF_FOOTER_SIZE {
            return 0;
        }
        read_le_u32(&self.data, self.payload_size)
    }

    /// Whether this block is the end-of-stream marker.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Get the position of this block in the stream.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Default for CompressedBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a single block from the stream into a freshly allocated [`CompressedBlock`].
///
/// Returns `Ok(None)` if the stream ended cleanly at a block boundary.
///
/// # Errors
///
/// See [`CompressedBlock::read_from`].
pub fn read_block<R: BufRead + ?Sized>(reader: &mut R, seq: u64) -> Result<Option<CompressedBlock>> {
    let mut block = CompressedBlock::new();
    if block.read_from(reader, seq)? { Ok(Some(block)) } else { Ok(None) }
}

/// Read until `buf` is full or the stream ends, returning the number of bytes read.
fn read_fully<R: BufRead + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
