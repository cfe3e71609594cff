//! Record framing across block boundaries.
//!
//! Decompressed blocks carry a stream of `[u32 LE length][payload]` records
//! that may be split at any byte, including inside the length prefix.
//! [`FramingState`] recovers whole records from consecutive blocks and packs
//! them into a [`PackingArena`].
//!
//! # Algorithm
//!
//! Each call to [`FramingState::parse_block`] proceeds as follows:
//!
//! 1. While capturing the BAM header, header bytes are consumed first.
//! 2. Records in the putback space are reinserted (oldest first).
//! 3. A record whose body is being collected in the carry buffer is completed
//!    from the block and inserted.
//! 4. Records lying entirely inside the block are inserted straight from the
//!    block bytes.
//! 5. A trailing partial prefix or body is moved into the state for the next
//!    block.
//!
//! Whenever an insert fails the call returns [`ParseStatus::ArenaFull`]
//! without consuming the rejected bytes; after the caller swaps in an empty
//! arena, calling again with the same block resumes exactly where it stopped.

use crate::arena::{LENGTH_PREFIX_SIZE, PackingArena, PushBackSpace};
use crate::errors::{DecodeError, Result};
use crate::header::{HeaderCapture, RawHeader};
use crate::inflate::DecompressedBlock;

/// Outcome of feeding a block to the framing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// Every byte of the block was consumed.
    Complete,
    /// The arena rejected a record; the block still holds unconsumed bytes
    /// or a record is pending in the framing state.
    ArenaFull,
}

/// Position of the parser within the record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    /// Reading (possibly the remainder of) a 4-byte length prefix.
    AwaitingLength,
    /// Collecting a record body into the carry buffer.
    AwaitingBody,
}

/// Streaming record framer.
#[derive(Debug)]
pub struct FramingState {
    stage: FrameStage,
    /// Prefix bytes seen so far.
    length_bytes: [u8; LENGTH_PREFIX_SIZE],
    length_read: usize,
    /// Length of the record being collected in `carry`.
    body_len: usize,
    carry: Vec<u8>,
    /// Stack of whole records to insert before anything else.
    putback: Vec<Vec<u8>>,
    header: Option<HeaderCapture>,
    raw_header: Option<RawHeader>,
    records: u64,
    rejected_len: usize,
}

impl Default for FramingState {
    fn default() -> Self {
        Self::new()
    }
}

impl FramingState {
    /// Create a framer for a stream that starts directly with records.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: FrameStage::AwaitingLength,
            length_bytes: [0; LENGTH_PREFIX_SIZE],
            length_read: 0,
            body_len: 0,
            carry: Vec::new(),
            putback: Vec::new(),
            header: None,
            raw_header: None,
            records: 0,
            rejected_len: 0,
        }
    }

    /// Create a framer for a stream that starts with a binary BAM header.
    #[must_use]
    pub fn with_header() -> Self {
        Self { header: Some(HeaderCapture::new()), ..Self::new() }
    }

    /// Current stage of the parser.
    #[must_use]
    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    /// Number of records inserted into arenas so far.
    #[must_use]
    pub fn records_framed(&self) -> u64 {
        self.records
    }

    /// Number of records waiting in the putback space.
    #[must_use]
    pub fn putback_len(&self) -> usize {
        self.putback.len()
    }

    /// Payload length of the record most recently rejected by a full arena.
    #[must_use]
    pub fn rejected_len(&self) -> usize {
        self.rejected_len
    }

    /// The captured header, once it has been fully read.
    #[must_use]
    pub fn header(&self) -> Option<&RawHeader> {
        self.raw_header.as_ref()
    }

    /// Take the captured header out of the framer.
    pub fn take_header(&mut self) -> Option<RawHeader> {
        self.raw_header.take()
    }

    /// Whether no partial record, pending prefix or putback record is held.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.stage == FrameStage::AwaitingLength && self.length_read == 0 && self.putback.is_empty()
    }

    #[inline]
    fn insert(&mut self, arena: &mut PackingArena, record: &[u8]) -> bool {
        if arena.put(record) {
            self.records += 1;
            true
        } else {
            self.rejected_len = record.len();
            false
        }
    }

    /// Frame as many records of `block` as fit into `arena`.
    ///
    /// Returns [`ParseStatus::Complete`] once every byte of the block has been
    /// consumed (a trailing partial record is kept for the next block), or
    /// [`ParseStatus::ArenaFull`] as soon as an insert fails.
    ///
    /// # Errors
    ///
    /// Returns an error only while capturing the header, if it is malformed.
    pub fn parse_block(
        &mut self,
        block: &mut DecompressedBlock,
        arena: &mut PackingArena,
    ) -> Result<ParseStatus> {
        if let Some(capture) = self.header.as_mut() {
            let used = capture.feed(block.remaining(), block.seq())?;
            block.consume(used);
            if !capture.is_complete() {
                return Ok(ParseStatus::Complete);
            }
            if let Some(capture) = self.header.take() {
                self.raw_header = Some(capture.finish()?);
            }
        }

        while let Some(record) = self.putback.pop() {
            if !self.insert(arena, &record) {
                self.putback.push(record);
                return Ok(ParseStatus::ArenaFull);
            }
        }

        loop {
            match self.stage {
                FrameStage::AwaitingBody => {
                    // A body that cannot fit even an empty arena is rejected before it is buffered
                    if arena.footprint(self.body_len) > arena.capacity() {
                        self.rejected_len = self.body_len;
                        return Ok(ParseStatus::ArenaFull);
                    }
                    let wanted = self.body_len - self.carry.len();
                    let take = wanted.min(block.remaining().len());
                    self.carry.extend_from_slice(&block.remaining()[..take]);
                    block.consume(take);
                    if self.carry.len() < self.body_len {
                        return Ok(ParseStatus::Complete);
                    }

                    let carry = std::mem::take(&mut self.carry);
                    let inserted = self.insert(arena, &carry);
                    self.carry = carry;
                    if !inserted {
                        return Ok(ParseStatus::ArenaFull);
                    }
                    self.carry.clear();
                    self.stage = FrameStage::AwaitingLength;
                }
                FrameStage::AwaitingLength => {
                    if self.length_read == 0 {
                        // Records entirely inside the block go straight in
                        loop {
                            let rest = block.remaining();
                            if rest.len() < LENGTH_PREFIX_SIZE {
                                break;
                            }
                            let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
                            let end = LENGTH_PREFIX_SIZE + len;
                            if rest.len() < end {
                                break;
                            }
                            if !arena.put(&rest[LENGTH_PREFIX_SIZE..end]) {
                                self.rejected_len = len;
                                return Ok(ParseStatus::ArenaFull);
                            }
                            self.records += 1;
                            block.consume(end);
                        }
                    }

                    let rest = block.remaining();
                    if rest.is_empty() {
                        return Ok(ParseStatus::Complete);
                    }
                    let take = (LENGTH_PREFIX_SIZE - self.length_read).min(rest.len());
                    self.length_bytes[self.length_read..self.length_read + take]
                        .copy_from_slice(&rest[..take]);
                    block.consume(take);
                    self.length_read += take;
                    if self.length_read < LENGTH_PREFIX_SIZE {
                        return Ok(ParseStatus::Complete);
                    }

                    // A zero-length record is inserted on the next turn even
                    // when its prefix ended the block
                    self.body_len = u32::from_le_bytes(self.length_bytes) as usize;
                    self.length_read = 0;
                    self.carry.clear();
                    self.stage = FrameStage::AwaitingBody;
                }
            }
        }
    }

    /// Check that the stream ended on a record boundary.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TruncatedRecord`] if the header is incomplete, a
    /// length prefix or record body is partially read, or putback records
    /// were never inserted.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(capture) = self.header.take() {
            self.raw_header = Some(capture.finish()?);
        }
        if self.length_read > 0 {
            return Err(DecodeError::TruncatedRecord {
                reason: format!(
                    "stream ended after {} of {LENGTH_PREFIX_SIZE} length prefix bytes",
                    self.length_read
                ),
            });
        }
        if self.stage == FrameStage::AwaitingBody {
            return Err(DecodeError::TruncatedRecord {
                reason: format!(
                    "stream ended after {} of {} record bytes",
                    self.carry.len(),
                    self.body_len
                ),
            });
        }
        if !self.putback.is_empty() {
            return Err(DecodeError::TruncatedRecord {
                reason: format!("{} pushed-back records were never inserted", self.putback.len()),
            });
        }
        Ok(())
    }
}

impl PushBackSpace for FramingState {
    fn push(&mut self, record: &[u8]) {
        self.putback.push(record.to_vec());
    }
}
