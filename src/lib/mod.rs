#![deny(unsafe_code)]
// Clippy lint configuration for CI
// - cast_*: block, record and arena sizes move between u16, u32, u64 and usize
// - missing_*_doc: error and panic conditions are documented where non-obvious
// - module_name_repetitions: types such as DecodeError read better unprefixed
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::struct_excessive_bools,
    clippy::uninlined_format_args
)]

//! # parbam - parallel BGZF to BAM record decoding
//!
//! Decodes a BGZF-compressed stream of length-prefixed BAM records into
//! batches of records packed into fixed-budget arenas.
//!
//! ## Overview
//!
//! ### Stages
//!
//! - **[`block`]** - Reads and validates one compressed BGZF block at a time
//! - **[`inflate`]** - Pluggable DEFLATE engines and decompressed block buffers
//! - **[`framing`]** - Splits the decompressed byte stream into records across
//!   arbitrary block boundaries
//! - **[`arena`]** - Packs records and their index slots into a single budget
//! - **[`decoder`]** - Serial and multi-threaded drivers tying the stages together
//!
//! ### Support
//!
//! - **[`pool`]** - Bounded blocking object pools providing backpressure
//! - **[`reorder_buffer`]** - Restores stream order after parallel decompression
//! - **[`header`]** - Captures the binary BAM header preceding the records
//! - **[`record`]** - Read-name access and structural checks on raw records
//! - **[`progress`]** and **[`logging`]** - Progress and summary logging
//!
//! ## Quick Start
//!
//! ```no_run
//! use parbam_lib::decoder::{BatchSource, DecoderOptions, ParallelDecoder};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! # fn main() -> anyhow::Result<()> {
//! let reader = BufReader::new(File::open("input.bam")?);
//! let options = DecoderOptions { threads: Some(4), expect_header: true, ..Default::default() };
//! let mut decoder = ParallelDecoder::new(reader, options)?;
//!
//! let references = decoder.header()?.map_or(0, |h| h.reference_count());
//! println!("{references} references");
//! while let Some(batch) = decoder.next_batch()? {
//!     for record in batch.iter() {
//!         // Each record excludes its 4-byte length prefix
//!         let _ = record.len();
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod block;
pub mod decoder;
pub mod errors;
pub mod framing;
pub mod header;
pub mod inflate;
pub mod logging;
pub mod pool;
pub mod progress;
pub mod record;
pub mod reorder_buffer;

pub use decoder::{BatchSource, DecoderOptions, ParallelDecoder, RecordBatch, SerialDecoder};
pub use errors::{DecodeError, Result};
