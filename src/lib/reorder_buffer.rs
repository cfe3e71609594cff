//! Reordering buffer for blocks decompressed out of order.
//!
//! Workers decompress blocks concurrently, so blocks finish in arbitrary
//! order. The framing stage must see them in stream order; this buffer
//! accepts items tagged with their sequence number and releases them only
//! once every earlier sequence number has been released.
//!
//! # Example
//!
//! ```
//! use parbam_lib::reorder_buffer::ReorderBuffer;
//!
//! let mut buffer: ReorderBuffer<&str> = ReorderBuffer::new();
//! buffer.insert(2, "third");
//! buffer.insert(0, "first");
//! assert_eq!(buffer.try_pop_next(), Some("first"));
//! assert_eq!(buffer.try_pop_next(), None); // 1 is missing
//! buffer.insert(1, "second");
//! assert_eq!(buffer.drain_ready().collect::<Vec<_>>(), vec!["second", "third"]);
//! ```

use std::collections::VecDeque;

/// A buffer that releases items in sequence order.
///
/// Uses a sparse `VecDeque` indexed by `seq - next_seq`, so insert and pop
/// are O(1) for the bounded number of blocks in flight.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    /// Slot `i` holds the item with sequence number `next_seq + i`.
    buffer: VecDeque<Option<T>>,
    /// Next sequence number to release.
    next_seq: u64,
    /// Number of items currently stored.
    count: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    /// Create an empty buffer expecting sequence number 0 first.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: VecDeque::new(), next_seq: 0, count: 0 }
    }

    /// Insert an item with its sequence number.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the sequence number was already released or is
    /// already buffered.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, seq: u64, item: T) {
        debug_assert!(seq >= self.next_seq, "Sequence number {seq} was already released");
        let index = (seq - self.next_seq) as usize;
        if self.buffer.len() <= index {
            self.buffer.resize_with(index + 1, || None);
        }
        debug_assert!(self.buffer[index].is_none(), "Duplicate sequence number: {seq}");
        self.buffer[index] = Some(item);
        self.count += 1;
    }

    /// Pop the item with the next sequence number, if it has arrived.
    #[must_use]
    pub fn try_pop_next(&mut self) -> Option<T> {
        if !self.can_pop() {
            return None;
        }
        let item = self.buffer.pop_front().flatten()?;
        self.next_seq += 1;
        self.count -= 1;
        Some(item)
    }

    /// Drain consecutive ready items, stopping at the first gap.
    pub fn drain_ready(&mut self) -> DrainReady<'_, T> {
        DrainReady { buffer: self }
    }

    /// Whether the item with the next sequence number has arrived.
    #[must_use]
    pub fn can_pop(&self) -> bool {
        self.buffer.front().is_some_and(Option::is_some)
    }

    /// Get the next sequence number to be released.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Get the number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no items are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop every buffered item.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.count = 0;
    }
}

/// Iterator returned by [`ReorderBuffer::drain_ready`].
pub struct DrainReady<'a, T> {
    buffer: &'a mut ReorderBuffer<T>,
}

impl<T> Iterator for DrainReady<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.buffer.try_pop_next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, 'a');
        buffer.insert(1, 'b');
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.try_pop_next(), Some('a'));
        assert_eq!(buffer.try_pop_next(), Some('b'));
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_seq(), 2);
    }

    #[test]
    fn test_out_of_order() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(3, 30);
        buffer.insert(1, 10);
        assert!(!buffer.can_pop());
        assert_eq!(buffer.try_pop_next(), None);

        buffer.insert(0, 0);
        assert!(buffer.can_pop());
        assert_eq!(buffer.drain_ready().collect::<Vec<_>>(), vec![0, 10]);
        assert_eq!(buffer.next_seq(), 2);
        assert_eq!(buffer.len(), 1);

        buffer.insert(2, 20);
        assert_eq!(buffer.drain_ready().collect::<Vec<_>>(), vec![20, 30]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reverse_insertion() {
        let mut buffer = ReorderBuffer::new();
        for seq in (0..100u64).rev() {
            buffer.insert(seq, seq);
        }
        let drained: Vec<u64> = buffer.drain_ready().collect();
        assert_eq!(drained, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, ());
        buffer.insert(5, ());
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.can_pop());
    }

    #[test]
    #[should_panic(expected = "Duplicate sequence number")]
    #[cfg(debug_assertions)]
    fn test_duplicate_panics() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(0, 1);
        buffer.insert(0, 2);
    }
}
