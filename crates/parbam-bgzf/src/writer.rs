//! BGZF block compression.
//!
//! [`BlockCompressor`] buffers uncompressed bytes and emits complete BGZF
//! blocks (header + deflate payload + trailer). Callers decide where block
//! boundaries fall by calling [`BlockCompressor::flush`], which is how test
//! fixtures place a record split at an exact byte position.
//!
//! Uses libdeflate (via `libdeflater`) for compression and `crc32fast` for the
//! trailer checksum.

use libdeflater::{CompressionLvl, Compressor};
use std::io;

use crate::reader::{BGZF_EOF, BGZF_FOOTER_SIZE, BGZF_HEADER_SIZE, MAX_BLOCK_SIZE};

/// Maximum uncompressed bytes placed in one block (64KB minus room for the
/// header, trailer and deflate overhead of incompressible input).
pub const BGZF_MAX_INPUT_SIZE: usize = 65280;

/// A compressed BGZF block ready for writing.
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    /// Number of uncompressed bytes in this block.
    pub uncompressed_size: usize,
    /// Complete BGZF block (header + compressed data + trailer).
    pub data: Vec<u8>,
}

/// Inline BGZF compressor.
///
/// # Usage
///
/// ```
/// use parbam_bgzf::BlockCompressor;
///
/// let mut compressor = BlockCompressor::new(6);
/// compressor.write_all(b"first block").unwrap();
/// compressor.flush().unwrap();
/// compressor.write_all(b"second block").unwrap();
///
/// let mut out = Vec::new();
/// compressor.finish(&mut out).unwrap();
/// assert_eq!(&out[out.len() - 28..], &parbam_bgzf::BGZF_EOF);
/// ```
pub struct BlockCompressor {
    /// Buffer accumulating uncompressed data (up to `BGZF_MAX_INPUT_SIZE`).
    buffer: Vec<u8>,
    /// libdeflate compressor (reused across blocks).
    compressor: Compressor,
    /// Completed compressed blocks ready to return.
    completed_blocks: Vec<CompressedBlock>,
    /// Pool of reusable output buffers.
    buffer_pool: Vec<Vec<u8>>,
}

impl BlockCompressor {
    /// Create a new compressor with the specified compression level (clamped to 1-12).
    #[must_use]
    pub fn new(compression_level: u32) -> Self {
        let level = i32::try_from(compression_level.clamp(1, 12)).unwrap_or(6);
        let level = CompressionLvl::new(level).unwrap_or_default();
        Self {
            buffer: Vec::with_capacity(BGZF_MAX_INPUT_SIZE),
            compressor: Compressor::new(level),
            completed_blocks: Vec::new(),
            buffer_pool: Vec::new(),
        }
    }

    /// Get the number of bytes waiting in the current (unflushed) block.
    #[inline]
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Write data, emitting a block each time the buffer fills.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails.
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;

        while offset < data.len() {
            let remaining_in_buffer = BGZF_MAX_INPUT_SIZE - self.buffer.len();
            let to_copy = remaining_in_buffer.min(data.len() - offset);

            self.buffer.extend_from_slice(&data[offset..offset + to_copy]);
            offset += to_copy;

            if self.buffer.len() >= BGZF_MAX_INPUT_SIZE {
                self.compress_current_buffer()?;
            }
        }

        Ok(())
    }

    /// Close the current block, even if it holds less than a full block.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.compress_current_buffer()?;
        }
        Ok(())
    }

    /// Take all completed compressed blocks.
    pub fn take_blocks(&mut self) -> Vec<CompressedBlock> {
        std::mem::take(&mut self.completed_blocks)
    }

    /// Write all completed blocks to `output` and recycle their buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the output fails.
    pub fn write_blocks_to<W: io::Write + ?Sized>(&mut self, output: &mut W) -> io::Result<()> {
        for block in self.completed_blocks.drain(..) {
            output.write_all(&block.data)?;
            let mut buf = block.data;
            buf.clear();
            self.buffer_pool.push(buf);
        }
        Ok(())
    }

    /// Flush, write every pending block and terminate the stream with the EOF marker.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or writing fails.
    pub fn finish<W: io::Write + ?Sized>(&mut self, output: &mut W) -> io::Result<()> {
        self.flush()?;
        self.write_blocks_to(output)?;
        output.write_all(&BGZF_EOF)
    }

    /// Compress the current buffer and add it to the completed blocks.
    fn compress_current_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut data = self.buffer_pool.pop().unwrap_or_default();
        compress_into(&mut self.compressor, &self.buffer, &mut data)?;
        self.completed_blocks.push(CompressedBlock { uncompressed_size: self.buffer.len(), data });
        self.buffer.clear();

        Ok(())
    }
}

/// Compress `input` into a complete BGZF block written to `output` (which is cleared first).
fn compress_into(compressor: &mut Compressor, input: &[u8], output: &mut Vec<u8>) -> io::Result<()> {
    let bound = compressor.deflate_compress_bound(input.len());
    output.clear();
    output.resize(BGZF_HEADER_SIZE + bound + BGZF_FOOTER_SIZE, 0);

    let compressed_len = compressor
        .deflate_compress(input, &mut output[BGZF_HEADER_SIZE..BGZF_HEADER_SIZE + bound])
        .map_err(|e| io::Error::other(format!("BGZF compression failed: {e:?}")))?;

    let block_size = BGZF_HEADER_SIZE + compressed_len + BGZF_FOOTER_SIZE;
    if block_size > MAX_BLOCK_SIZE {
        return Err(io::Error::other(format!(
            "BGZF block of {block_size} bytes exceeds the {MAX_BLOCK_SIZE} byte limit"
        )));
    }
    output.truncate(block_size);

    output[..BGZF_HEADER_SIZE].copy_from_slice(&BGZF_EOF[..BGZF_HEADER_SIZE]);
    let bsize = u16::try_from(block_size - 1)
        .map_err(|_| io::Error::other("BGZF block size does not fit BSIZE"))?;
    output[16..18].copy_from_slice(&bsize.to_le_bytes());

    let crc = crc32fast::hash(input);
    let isize = u32::try_from(input.len())
        .map_err(|_| io::Error::other("BGZF block input does not fit ISIZE"))?;
    let trailer = block_size - BGZF_FOOTER_SIZE;
    output[trailer..trailer + 4].copy_from_slice(&crc.to_le_bytes());
    output[trailer + 4..].copy_from_slice(&isize.to_le_bytes());

    Ok(())
}
