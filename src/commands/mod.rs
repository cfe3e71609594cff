//! CLI command implementations for parbam.
//!
//! - [`count`] - Decode a stream and report record, block and batch totals
//! - [`dump`] - Decode a stream and write its records, raw or re-compressed

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

pub mod command;
pub mod common;
pub mod count;
pub mod dump;
