//! Custom error types for parbam decoding.

use std::io;

use thiserror::Error;

/// Result type alias for parbam operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Error type for decoding a BGZF stream into records.
///
/// Every variant is fatal for the stream it occurred on. A full arena is not
/// an error; it is reported as [`crate::framing::ParseStatus::ArenaFull`].
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Block header failed validation
    #[error("Invalid block header at block {block}: {reason}")]
    InvalidHeader {
        /// Sequence number of the offending block
        block: u64,
        /// Explanation of the problem
        reason: String,
    },

    /// Fewer bytes available than a block declared
    #[error("Unexpected end of stream in block {block}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Sequence number of the offending block
        block: u64,
        /// Bytes the block declared
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Declared uncompressed size exceeds the maximum block size
    #[error("Uncompressed size {size} of block {block} exceeds maximum block size {max}")]
    BlockTooLarge {
        /// Sequence number of the offending block
        block: u64,
        /// Declared uncompressed size
        size: usize,
        /// Maximum block size
        max: usize,
    },

    /// Payload could not be decompressed or failed its checksum
    #[error("Decompression of block {block} failed: {reason}")]
    Decompression {
        /// Sequence number of the offending block
        block: u64,
        /// Explanation of the problem
        reason: String,
    },

    /// Stream ended inside a record or its length prefix
    #[error("Stream ended inside a record: {reason}")]
    TruncatedRecord {
        /// Explanation of the problem
        reason: String,
    },

    /// A record cannot fit into an empty arena
    #[error("Record of {length} bytes does not fit into an empty arena of {capacity} bytes")]
    RecordTooLarge {
        /// Length of the record payload
        length: usize,
        /// Arena capacity in bytes
        capacity: usize,
    },

    /// Invalid configuration value
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// The pipeline was shut down before the stream was fully decoded
    #[error("Decoding pipeline aborted: {0}")]
    Aborted(String),
}

impl DecodeError {
    /// Convenience constructor for [`DecodeError::InvalidParameter`].
    pub fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { parameter: parameter.to_string(), reason: reason.into() }
    }
}
