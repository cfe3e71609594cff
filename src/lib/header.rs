//! Streaming capture of the binary BAM header.
//!
//! A BAM stream starts with a header that is not length-prefixed like the
//! records that follow it:
//!
//! ```text
//! magic "BAM\1" | l_text | text[l_text] | n_ref | { l_name | name[l_name] | l_ref } * n_ref
//! ```
//!
//! [`HeaderCapture`] consumes these bytes incrementally, possibly across many
//! blocks, so record framing can start at the first byte after the header.
//! The header is kept as an opaque [`RawHeader`]; nothing beyond its
//! structure is interpreted.

use crate::errors::{DecodeError, Result};

/// BAM magic bytes.
pub const BAM_MAGIC: [u8; 4] = *b"BAM\x01";

/// One entry of the reference dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference name (without NUL terminator).
    pub name: Vec<u8>,
    /// Reference length.
    pub length: u32,
}

/// The binary header of a BAM stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeader {
    bytes: Vec<u8>,
    text_len: usize,
    references: Vec<Reference>,
}

impl RawHeader {
    /// Encode a header from its SAM text and reference dictionary.
    ///
    /// # Panics
    ///
    /// Panics if the text, a reference name or the reference count exceeds
    /// `i32::MAX`.
    #[must_use]
    pub fn new(text: &[u8], references: Vec<Reference>) -> Self {
        let to_i32 = |n: usize| i32::try_from(n).expect("header field exceeds i32::MAX");

        let mut bytes = Vec::with_capacity(12 + text.len());
        bytes.extend_from_slice(&BAM_MAGIC);
        bytes.extend_from_slice(&to_i32(text.len()).to_le_bytes());
        bytes.extend_from_slice(text);
        bytes.extend_from_slice(&to_i32(references.len()).to_le_bytes());
        for reference in &references {
            bytes.extend_from_slice(&to_i32(reference.name.len() + 1).to_le_bytes());
            bytes.extend_from_slice(&reference.name);
            bytes.push(0);
            bytes.extend_from_slice(&reference.length.to_le_bytes());
        }
        Self { bytes, text_len: text.len(), references }
    }

    /// Get the encoded header exactly as it appeared in the stream.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the SAM header text (may include trailing NUL padding).
    #[must_use]
    pub fn text(&self) -> &[u8] {
        &self.bytes[8..8 + self.text_len]
    }

    /// Get the reference dictionary.
    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Get the number of reference sequences.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Magic,
    TextLength,
    Text,
    ReferenceCount,
    NameLength,
    Name,
    ReferenceLength,
    Done,
}

/// Incremental parser for the BAM header.
#[derive(Debug)]
pub struct HeaderCapture {
    bytes: Vec<u8>,
    stage: Stage,
    /// Offset in `bytes` where the current field starts.
    field_start: usize,
    /// Length of the current field.
    field_len: usize,
    text_len: usize,
    reference_count: usize,
    references: Vec<Reference>,
}

impl Default for HeaderCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCapture {
    /// Create a parser positioned before the magic bytes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            stage: Stage::Magic,
            field_start: 0,
            field_len: BAM_MAGIC.len(),
            text_len: 0,
            reference_count: 0,
            references: Vec::new(),
        }
    }

    /// Whether the whole header has been consumed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Whether any header byte has been consumed yet.
    #[must_use]
    pub fn is_started(&self) -> bool {
        !self.bytes.is_empty()
    }

    /// Consume header bytes from `data`, returning how many were used.
    ///
    /// Stops at the end of the header; the remaining bytes of `data` are the
    /// first record bytes. `block` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidHeader`] on a bad magic number or a
    /// negative length field.
    pub fn feed(&mut self, data: &[u8], block: u64) -> Result<usize> {
        let mut consumed = 0;
        while self.stage != Stage::Done {
            let have = self.bytes.len() - self.field_start;
            if have == self.field_len {
                self.next_field(block)?;
                continue;
            }
            if consumed == data.len() {
                break;
            }
            let take = (self.field_len - have).min(data.len() - consumed);
            self.bytes.extend_from_slice(&data[consumed..consumed + take]);
            consumed += take;
        }
        Ok(consumed)
    }

    /// Return the captured header.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TruncatedRecord`] if the stream ended inside
    /// the header.
    pub fn finish(self) -> Result<RawHeader> {
        if !self.is_complete() {
            return Err(DecodeError::TruncatedRecord {
                reason: format!("stream ended inside the BAM header after {} bytes", self.bytes.len()),
            });
        }
        Ok(RawHeader { bytes: self.bytes, text_len: self.text_len, references: self.references })
    }

    fn field(&self) -> &[u8] {
        &self.bytes[self.field_start..]
    }

    fn field_i32(&self, block: u64, what: &str) -> Result<usize> {
        let f = self.field();
        let value = i32::from_le_bytes([f[0], f[1], f[2], f[3]]);
        usize::try_from(value).map_err(|_| DecodeError::InvalidHeader {
            block,
            reason: format!("negative {what} in BAM header: {value}"),
        })
    }

    fn start_field(&mut self, stage: Stage, len: usize) {
        self.stage = stage;
        self.field_start = self.bytes.len();
        self.field_len = len;
    }

    /// Interpret the completed field and move to the next one.
    fn next_field(&mut self, block: u64) -> Result<()> {
        match self.stage {
            Stage::Magic => {
                if self.field() != BAM_MAGIC {
                    return Err(DecodeError::InvalidHeader {
                        block,
                        reason: format!("invalid BAM magic: {:?}", self.field()),
                    });
                }
                self.start_field(Stage::TextLength, 4);
            }
            Stage::TextLength => {
                self.text_len = self.field_i32(block, "header text length")?;
                self.start_field(Stage::Text, self.text_len);
            }
            Stage::Text => self.start_field(Stage::ReferenceCount, 4),
            Stage::ReferenceCount => {
                self.reference_count = self.field_i32(block, "reference count")?;
                if self.reference_count == 0 {
                    self.start_field(Stage::Done, 0);
                } else {
                    self.start_field(Stage::NameLength, 4);
                }
            }
            Stage::NameLength => {
                let l_name = self.field_i32(block, "reference name length")?;
                self.start_field(Stage::Name, l_name);
            }
            Stage::Name => {
                let mut name = self.field().to_vec();
                if name.last() == Some(&0) {
                    name.pop();
                }
                self.references.push(Reference { name, length: 0 });
                self.start_field(Stage::ReferenceLength, 4);
            }
            Stage::ReferenceLength => {
                let f = self.field();
                let length = u32::from_le_bytes([f[0], f[1], f[2], f[3]]);
                if let Some(reference) = self.references.last_mut() {
                    reference.length = length;
                }
                if self.references.len() == self.reference_count {
                    self.start_field(Stage::Done, 0);
                } else {
                    self.start_field(Stage::NameLength, 4);
                }
            }
            Stage::Done => {}
        }
        Ok(())
    }
}
