#![deny(unsafe_code)]

//! BGZF (Blocked GZIP Format) block layout and compression utilities.
//!
//! This crate provides the low-level pieces of the BGZF wire format:
//! - [`reader`] - Header/trailer layout constants and header validation
//! - [`writer`] - Inline BGZF block compression using libdeflater

pub mod reader;
pub mod writer;

// Re-export commonly used items
pub use reader::{
    BGZF_EOF, BGZF_FOOTER_SIZE, BGZF_HEADER_SIZE, MAX_BLOCK_SIZE, parse_header, read_le_u32,
};
pub use writer::{BGZF_MAX_INPUT_SIZE, BlockCompressor, CompressedBlock};
