//! Fixed-capacity packing arena for length-prefixed records.
//!
//! The arena packs records into a single byte budget shared by two regions:
//!
//! ```text
//! payload:  [len0][rec0][len1][rec1][len2][rec2]...        (grows forward)
//! index:    [aux..][off0][aux..][off1][aux..][off2]...     (8-byte slots)
//! ```
//!
//! Each record costs `4 + len` payload bytes plus `pointer_multiplicity`
//! index slots: one offset slot and `pointer_multiplicity - 1` auxiliary
//! slots a consumer may use for per-record metadata. `put` is all-or-nothing
//! and fails once the two regions would exceed the capacity.
//!
//! While filling, index position 0 is the newest record. [`PackingArena::reorder`]
//! compacts the index to one slot per record in stream order, after which
//! position 0 is the oldest record and the read cursor, run grouping and
//! extraction operations become available. Runs are maximal sequences of
//! records that a caller-supplied predicate groups together, typically
//! [`record::same_read_name`].

use std::collections::VecDeque;
use std::iter::FusedIterator;

use crate::record;

/// Size of the little-endian length prefix stored before each record.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of one index slot.
pub const SLOT_SIZE: usize = 8;

/// A sink for whole records that must be inserted again later.
///
/// Records are pushed newest first; a stack-based implementation therefore
/// replays them oldest first.
pub trait PushBackSpace {
    /// Store one record payload (without length prefix).
    fn push(&mut self, record: &[u8]);
}

impl PushBackSpace for Vec<Vec<u8>> {
    fn push(&mut self, record: &[u8]) {
        Vec::push(self, record.to_vec());
    }
}

// ============================================================================
// Parsed records
// ============================================================================

/// An owned copy of one record, recycled through the arena's free list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    data: Vec<u8>,
    index: u64,
}

impl ParsedRecord {
    /// Get the record payload.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the absolute position of the record in the stream.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Replace the contents, reusing the allocation.
    pub fn set(&mut self, bytes: &[u8], index: u64) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.index = index;
    }

    /// Consume the record, returning its payload.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

// ============================================================================
// PackingArena
// ============================================================================

/// Fixed-capacity buffer packing records and their offset index.
#[derive(Debug)]
pub struct PackingArena {
    /// Length-prefixed records in insertion order.
    data: Vec<u8>,
    /// Index slots. Before reorder: `pointer_multiplicity` slots per record,
    /// offset last. After reorder: one offset per record.
    slots: Vec<u64>,
    capacity: usize,
    pointer_multiplicity: usize,
    reordered: bool,
    /// Read cursor (position in the reordered index).
    cursor: usize,
    is_final: bool,
    low: u64,
    free_records: Vec<ParsedRecord>,
    stall: VecDeque<ParsedRecord>,
}

impl PackingArena {
    /// Create an arena with a budget of `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `pointer_multiplicity` is zero.
    #[must_use]
    pub fn new(capacity: usize, pointer_multiplicity: usize) -> Self {
        assert!(pointer_multiplicity > 0, "pointer_multiplicity must be at least 1");
        Self {
            data: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity / (SLOT_SIZE * pointer_multiplicity + LENGTH_PREFIX_SIZE)),
            capacity,
            pointer_multiplicity,
            reordered: false,
            cursor: 0,
            is_final: false,
            low: 0,
            free_records: Vec::new(),
            stall: VecDeque::new(),
        }
    }

    /// Bytes a record of `len` payload bytes occupies.
    #[inline]
    #[must_use]
    pub fn footprint(&self, len: usize) -> usize {
        len + LENGTH_PREFIX_SIZE + SLOT_SIZE * self.pointer_multiplicity
    }

    /// Insert one record. Returns `false`, leaving the arena unchanged, if it
    /// does not fit.
    pub fn put(&mut self, bytes: &[u8]) -> bool {
        debug_assert!(!self.reordered, "put after reorder");
        if self.footprint(bytes.len()) > self.free() {
            return false;
        }
        let Ok(len) = u32::try_from(bytes.len()) else {
            return false;
        };

        let offset = self.data.len() as u64;
        self.data.extend_from_slice(&len.to_le_bytes());
        self.data.extend_from_slice(bytes);
        self.slots.extend(std::iter::repeat_n(0, self.pointer_multiplicity - 1));
        self.slots.push(offset);
        true
    }

    /// Number of records stored.
    #[inline]
    #[must_use]
    pub fn fill(&self) -> usize {
        if self.reordered { self.slots.len() } else { self.slots.len() / self.pointer_multiplicity }
    }

    /// Unused bytes of the budget.
    #[inline]
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.data.len() + SLOT_SIZE * self.slots.len())
    }

    /// Whether no records are stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total byte budget.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index slots per record while filling.
    #[must_use]
    pub fn pointer_multiplicity(&self) -> usize {
        self.pointer_multiplicity
    }

    /// Bytes used by the payload region (prefixes included).
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.data.len()
    }

    /// Drop every record and return to the filling state.
    ///
    /// Stalled records go back to the free list; allocations are kept.
    pub fn reset(&mut self) {
        self.data.clear();
        self.slots.clear();
        self.reordered = false;
        self.cursor = 0;
        self.is_final = false;
        self.low = 0;
        let stalled = self.stall.drain(..);
        self.free_records.extend(stalled);
    }

    /// Compact the index to one slot per record in stream order.
    ///
    /// A second call is a no-op.
    pub fn reorder(&mut self) {
        if self.reordered {
            return;
        }
        let pm = self.pointer_multiplicity;
        let n = self.fill();
        for k in 0..n {
            self.slots[k] = self.slots[k * pm + pm - 1];
        }
        self.slots.truncate(n);
        self.reordered = true;
        self.cursor = 0;
    }

    /// Whether [`reorder`](Self::reorder) has been applied.
    #[must_use]
    pub fn is_reordered(&self) -> bool {
        self.reordered
    }

    #[inline]
    fn offset_at(&self, pos: usize) -> usize {
        let slot = if self.reordered {
            self.slots[pos]
        } else {
            self.slots[self.slots.len() - 1 - pos * self.pointer_multiplicity]
        };
        slot as usize
    }

    /// Get the payload length of the record at index position `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos >= fill()`.
    #[inline]
    #[must_use]
    pub fn length_at(&self, pos: usize) -> usize {
        let offset = self.offset_at(pos);
        let prefix = &self.data[offset..offset + LENGTH_PREFIX_SIZE];
        u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize
    }

    /// Get the record at index position `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos >= fill()`.
    #[inline]
    #[must_use]
    pub fn record(&self, pos: usize) -> &[u8] {
        let start = self.offset_at(pos) + LENGTH_PREFIX_SIZE;
        &self.data[start..start + self.length_at(pos)]
    }

    /// Iterate over records by index position (newest first before reorder,
    /// stream order after).
    #[must_use]
    pub fn iter(&self) -> ArenaIter<'_> {
        ArenaIter { arena: self, front: 0, back: self.fill() }
    }

    /// Get the auxiliary slots of the record at `pos`.
    ///
    /// Empty after reorder or when `pointer_multiplicity == 1`.
    ///
    /// # Panics
    ///
    /// Panics if `pos >= fill()` before reorder.
    pub fn aux_slots_mut(&mut self, pos: usize) -> &mut [u64] {
        if self.reordered {
            return &mut [];
        }
        let pm = self.pointer_multiplicity;
        let start = self.slots.len() - (pos + 1) * pm;
        &mut self.slots[start..start + pm - 1]
    }

    // ------------------------------------------------------------------------
    // Read cursor (after reorder)
    // ------------------------------------------------------------------------

    /// Whether the read cursor has records left.
    #[inline]
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.cursor < self.fill()
    }

    /// Move the read cursor forward by `count` records.
    pub fn advance(&mut self, count: usize) {
        debug_assert!(self.cursor + count <= self.fill(), "advanced past the last record");
        self.cursor = (self.cursor + count).min(self.fill());
    }

    /// Position of the read cursor.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Return the record under the cursor and advance past it.
    pub fn next_record(&mut self) -> Option<&[u8]> {
        debug_assert!(self.reordered, "cursor used before reorder");
        if !self.has_next() {
            return None;
        }
        let pos = self.cursor;
        self.cursor += 1;
        Some(self.record(pos))
    }

    // ------------------------------------------------------------------------
    // Run grouping (after reorder)
    // ------------------------------------------------------------------------

    /// Count consecutive records starting at `pos` that `same` groups with the
    /// record at `pos`.
    pub fn count_run_from<F>(&self, pos: usize, same: F) -> usize
    where
        F: Fn(&[u8], &[u8]) -> bool,
    {
        let fill = self.fill();
        if pos >= fill {
            return 0;
        }
        let first = self.record(pos);
        let mut end = pos + 1;
        while end < fill && same(first, self.record(end)) {
            end += 1;
        }
        end - pos
    }

    /// Count consecutive records ending at `pos` (inclusive) that `same` groups
    /// with the record at `pos`.
    pub fn count_run_to<F>(&self, pos: usize, same: F) -> usize
    where
        F: Fn(&[u8], &[u8]) -> bool,
    {
        if pos >= self.fill() {
            return 0;
        }
        let last = self.record(pos);
        let mut start = pos;
        while start > 0 && same(last, self.record(start - 1)) {
            start -= 1;
        }
        pos - start + 1
    }

    /// Count the records in the final run of the arena.
    pub fn count_last_run<F>(&self, same: F) -> usize
    where
        F: Fn(&[u8], &[u8]) -> bool,
    {
        match self.fill() {
            0 => 0,
            fill => self.count_run_to(fill - 1, same),
        }
    }

    /// Count the records in the run starting at the read cursor.
    pub fn next_run<F>(&self, same: F) -> usize
    where
        F: Fn(&[u8], &[u8]) -> bool,
    {
        self.count_run_from(self.cursor, same)
    }

    /// Remove the final run, pushing its records into `sink` newest first.
    ///
    /// Returns the number of records removed. Their payload bytes are released
    /// from the arena. An arena that is not yet reordered is reordered first.
    pub fn remove_last_run<F, S>(&mut self, sink: &mut S, same: F) -> usize
    where
        F: Fn(&[u8], &[u8]) -> bool,
        S: PushBackSpace + ?Sized,
    {
        self.reorder();
        let count = self.count_last_run(same);
        if count == 0 {
            return 0;
        }
        let fill = self.fill();
        for pos in (fill - count..fill).rev() {
            sink.push(self.record(pos));
        }

        // The run is the tail of the payload region
        let first_removed = self.offset_at(fill - count);
        self.data.truncate(first_removed);
        self.slots.truncate(fill - count);
        self.cursor = self.cursor.min(self.slots.len());
        count
    }

    /// Copy the run at the read cursor into parsed records taken from the free
    /// list, appending them to `out` and advancing the cursor past the run.
    ///
    /// Returns the number of records extracted.
    pub fn extract_next_run<F>(&mut self, same: F, out: &mut Vec<ParsedRecord>) -> usize
    where
        F: Fn(&[u8], &[u8]) -> bool,
    {
        let count = self.next_run(same);
        out.reserve(count);
        for _ in 0..count {
            let pos = self.cursor;
            let mut parsed = self.free_records.pop().unwrap_or_default();
            parsed.set(self.record(pos), self.low + pos as u64);
            out.push(parsed);
            self.cursor += 1;
        }
        count
    }

    // ------------------------------------------------------------------------
    // Parsed record free list and stall buffer
    // ------------------------------------------------------------------------

    /// Take a parsed record from the free list (allocating if it is empty).
    pub fn take_record(&mut self) -> ParsedRecord {
        self.free_records.pop().unwrap_or_default()
    }

    /// Return a parsed record to the free list.
    pub fn return_record(&mut self, record: ParsedRecord) {
        self.free_records.push(record);
    }

    /// Return several parsed records to the free list.
    pub fn return_records(&mut self, records: impl IntoIterator<Item = ParsedRecord>) {
        self.free_records.extend(records);
    }

    /// Number of parsed records waiting on the free list.
    #[must_use]
    pub fn free_record_count(&self) -> usize {
        self.free_records.len()
    }

    /// Put a record at the front of the stall buffer.
    pub fn push_front_stall(&mut self, record: ParsedRecord) {
        self.stall.push_front(record);
    }

    /// Put a record at the back of the stall buffer.
    pub fn push_back_stall(&mut self, record: ParsedRecord) {
        self.stall.push_back(record);
    }

    /// Take the record at the front of the stall buffer.
    pub fn pop_stall(&mut self) -> Option<ParsedRecord> {
        self.stall.pop_front()
    }

    /// Number of stalled records.
    #[must_use]
    pub fn stall_len(&self) -> usize {
        self.stall.len()
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    /// Whether this is the last arena of the stream.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Mark this arena as the last of the stream.
    pub fn set_final(&mut self, is_final: bool) {
        self.is_final = is_final;
    }

    /// Absolute stream index of the first record.
    #[must_use]
    pub fn low(&self) -> u64 {
        self.low
    }

    /// Set the absolute stream index of the first record.
    pub fn set_low(&mut self, low: u64) {
        self.low = low;
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Check every record with `is_valid`, returning the position of the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the index position of the first record rejected by `is_valid`.
    pub fn check_valid_with<F>(&self, is_valid: F) -> Result<(), usize>
    where
        F: Fn(&[u8]) -> bool,
    {
        match self.iter().position(|r| !is_valid(r)) {
            Some(pos) => Err(pos),
            None => Ok(()),
        }
    }

    /// Check that every record is a structurally valid BAM record.
    ///
    /// # Errors
    ///
    /// Returns the index position of the first invalid record.
    pub fn check_valid(&self) -> Result<(), usize> {
        self.check_valid_with(record::is_structurally_valid)
    }
}

/// Iterator over the records of a [`PackingArena`].
pub struct ArenaIter<'a> {
    arena: &'a PackingArena,
    front: usize,
    back: usize,
}

impl<'a> Iterator for ArenaIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let record = self.arena.record(self.front);
        self.front += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for ArenaIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        Some(self.arena.record(self.back))
    }
}

impl ExactSizeIterator for ArenaIter<'_> {}

impl FusedIterator for ArenaIter<'_> {}
