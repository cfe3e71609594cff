//! Drives the framing state over blocks and hands off full arenas.

use log::debug;

use crate::arena::PackingArena;
use crate::errors::{DecodeError, Result};
use crate::framing::{FramingState, ParseStatus};
use crate::header::RawHeader;
use crate::inflate::DecompressedBlock;
use crate::pool::{BoundedPool, Pooled};
use crate::record::same_read_name;

use super::RecordBatch;

/// Owns the framing state and the arena currently being filled.
///
/// Arenas are handed off only when an insert fails or the stream ends.
pub(crate) struct Packer {
    framing: FramingState,
    arena: Option<Pooled<PackingArena>>,
    arenas: BoundedPool<PackingArena>,
    /// Block on an empty arena pool instead of failing.
    blocking: bool,
    keep_runs_together: bool,
    /// Stream index of the first record of the next arena.
    next_low: u64,
    batches: u64,
}

impl Packer {
    pub(crate) fn new(
        arenas: BoundedPool<PackingArena>,
        expect_header: bool,
        keep_runs_together: bool,
        blocking: bool,
    ) -> Self {
        let framing = if expect_header { FramingState::with_header() } else { FramingState::new() };
        Self { framing, arena: None, arenas, blocking, keep_runs_together, next_low: 0, batches: 0 }
    }

    pub(crate) fn header(&self) -> Option<&RawHeader> {
        self.framing.header()
    }

    fn checkout(
        arenas: &BoundedPool<PackingArena>,
        blocking: bool,
        low: u64,
    ) -> Result<Pooled<PackingArena>> {
        let mut arena = if blocking {
            arenas.acquire().ok_or_else(|| DecodeError::Aborted("arena pool closed".to_string()))?
        } else {
            arenas.try_acquire().ok_or_else(|| {
                DecodeError::Aborted(format!(
                    "all {} arenas are held by the consumer; drop batches before requesting more",
                    arenas.capacity()
                ))
            })?
        };
        arena.reset();
        arena.set_low(low);
        Ok(arena)
    }

    /// Frame `block` into the current arena.
    ///
    /// Returns `Some(batch)` when the arena filled up before the block was
    /// consumed; call again with the same block to continue. Returns `None`
    /// once the block is exhausted.
    pub(crate) fn feed(&mut self, block: &mut DecompressedBlock) -> Result<Option<RecordBatch>> {
        let arena = match &mut self.arena {
            Some(arena) => arena,
            slot @ None => slot.insert(Self::checkout(&self.arenas, self.blocking, self.next_low)?),
        };

        match self.framing.parse_block(block, arena)? {
            ParseStatus::Complete => Ok(None),
            ParseStatus::ArenaFull if arena.is_empty() => Err(DecodeError::RecordTooLarge {
                length: self.framing.rejected_len(),
                capacity: arena.capacity(),
            }),
            ParseStatus::ArenaFull => self.hand_off(false).map(Some),
        }
    }

    /// Check the stream ended on a record boundary and return the final batch.
    pub(crate) fn finish(&mut self) -> Result<RecordBatch> {
        self.framing.finish()?;
        self.hand_off(true)
    }

    fn hand_off(&mut self, is_final: bool) -> Result<RecordBatch> {
        let mut arena = match self.arena.take() {
            Some(arena) => arena,
            None => Self::checkout(&self.arenas, self.blocking, self.next_low)?,
        };
        arena.reorder();

        // A run spanning the whole arena cannot be deferred
        if self.keep_runs_together
            && !is_final
            && arena.count_last_run(same_read_name) < arena.fill()
        {
            let moved = arena.remove_last_run(&mut self.framing, same_read_name);
            debug!("Deferred a run of {moved} records to the next arena");
        }

        arena.set_final(is_final);
        self.next_low += arena.fill() as u64;
        self.batches += 1;
        debug!(
            "Handing off arena {} with {} records ({} payload bytes){}",
            self.batches,
            arena.fill(),
            arena.payload_bytes(),
            if is_final { ", final" } else { "" }
        );
        Ok(RecordBatch::new(arena))
    }
}
