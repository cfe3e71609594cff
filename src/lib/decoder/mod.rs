//! Decoding pipelines: from a BGZF byte stream to batches of records.
//!
//! Two drivers share the same framing and packing logic:
//!
//! - [`SerialDecoder`] reads, decompresses and frames on the calling thread.
//! - [`ParallelDecoder`] runs a fixed set of worker threads that read and
//!   decompress blocks concurrently and take turns framing them in stream
//!   order.
//!
//! Both hand out [`RecordBatch`]es: filled arenas checked out of a bounded
//! pool, in stream order, the last one flagged with [`RecordBatch::is_final`].
//! Holding batches applies backpressure; the pipeline stalls once every
//! arena is held by the consumer.
//!
//! ```text
//! stream ─> [read block] ─> [inflate] ─> reorder ─> [frame] ─> arena ─> consumer
//!            (reader lock)   (any worker)  by seq    (one at a time)   (channel)
//! ```
//!
//! # Example
//!
//! ```
//! use parbam_lib::decoder::{BatchSource, DecoderOptions, SerialDecoder};
//! use parbam_bgzf::BlockCompressor;
//! use std::io::Cursor;
//!
//! let mut compressor = BlockCompressor::new(6);
//! for record in [&b"first"[..], b"", b"third"] {
//!     compressor.write_all(&(record.len() as u32).to_le_bytes()).unwrap();
//!     compressor.write_all(record).unwrap();
//! }
//! let mut bgzf = Vec::new();
//! compressor.finish(&mut bgzf).unwrap();
//!
//! let decoder = SerialDecoder::new(Cursor::new(bgzf), DecoderOptions::default()).unwrap();
//! let records: Vec<Vec<u8>> = decoder.into_records().collect::<Result<_, _>>().unwrap();
//! assert_eq!(records, vec![b"first".to_vec(), Vec::new(), b"third".to_vec()]);
//! ```

mod packer;
mod parallel;
mod records;
mod serial;

use std::io::BufRead;
use std::ops::{Deref, DerefMut};

use crate::arena::{LENGTH_PREFIX_SIZE, PackingArena, SLOT_SIZE};
use crate::errors::{DecodeError, Result};
use crate::header::RawHeader;
use crate::inflate::InflaterKind;
use crate::pool::{BoundedPool, Pooled};

pub use parallel::ParallelDecoder;
pub use records::Records;
pub use serial::SerialDecoder;

/// Default arena budget (16 MiB).
pub const DEFAULT_ARENA_CAPACITY: usize = 16 * 1024 * 1024;

/// Default number of arenas.
pub const DEFAULT_ARENA_COUNT: usize = 4;

/// Configuration shared by both decoders.
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Worker threads. `None` selects the single-threaded decoder in
    /// [`decode_all`]; [`ParallelDecoder`] treats it as one worker.
    pub threads: Option<usize>,
    /// Byte budget of each arena.
    pub arena_capacity: usize,
    /// Index slots per record (one offset plus auxiliary slots).
    pub pointer_multiplicity: usize,
    /// Number of arenas; at least one is filled while another is consumed.
    pub arena_count: usize,
    /// Compressed and decompressed block slots. Defaults to `4 * threads`.
    pub block_pool_size: Option<usize>,
    /// Decompression engine.
    pub inflater: InflaterKind,
    /// Check the CRC32 of every decompressed block.
    pub verify_crc: bool,
    /// The stream starts with a binary BAM header.
    pub expect_header: bool,
    /// Never split a run of records sharing a read name across two arenas
    /// (unless the run alone fills an arena).
    pub keep_runs_together: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            threads: None,
            arena_capacity: DEFAULT_ARENA_CAPACITY,
            pointer_multiplicity: 1,
            arena_count: DEFAULT_ARENA_COUNT,
            block_pool_size: None,
            inflater: InflaterKind::default(),
            verify_crc: true,
            expect_header: false,
            keep_runs_together: false,
        }
    }
}

impl DecoderOptions {
    /// Number of worker threads used by [`ParallelDecoder`].
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.threads.unwrap_or(1)
    }

    /// Number of compressed (and decompressed) block slots.
    #[must_use]
    pub fn block_slots(&self) -> usize {
        self.block_pool_size.unwrap_or(4 * self.worker_count())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidParameter`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(DecodeError::invalid_parameter("threads", "must be at least 1"));
        }
        if self.pointer_multiplicity == 0 {
            return Err(DecodeError::invalid_parameter("pointer_multiplicity", "must be at least 1"));
        }
        let minimum = LENGTH_PREFIX_SIZE + SLOT_SIZE * self.pointer_multiplicity;
        if self.arena_capacity < minimum {
            return Err(DecodeError::invalid_parameter(
                "arena_capacity",
                format!("must be at least {minimum} bytes to hold an empty record"),
            ));
        }
        if self.arena_count < 2 {
            return Err(DecodeError::invalid_parameter(
                "arena_count",
                "must be at least 2 so one arena can fill while another is consumed",
            ));
        }
        if let Some(slots) = self.block_pool_size {
            if slots < self.worker_count() {
                return Err(DecodeError::invalid_parameter(
                    "block_pool_size",
                    format!("must be at least the number of threads ({})", self.worker_count()),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn arena_pool(&self) -> BoundedPool<PackingArena> {
        BoundedPool::with_items(self.arena_count, || {
            PackingArena::new(self.arena_capacity, self.pointer_multiplicity)
        })
    }
}

/// A filled arena handed to the consumer, in stream order.
///
/// Dereferences to the [`PackingArena`], already reordered so position 0 is
/// the earliest record. The arena returns to its pool when the batch drops.
#[derive(Debug)]
pub struct RecordBatch {
    arena: Pooled<PackingArena>,
}

impl RecordBatch {
    pub(crate) fn new(arena: Pooled<PackingArena>) -> Self {
        Self { arena }
    }

    /// Number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.fill()
    }

    /// Whether the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Whether this is the last batch of the stream.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.arena.is_final()
    }

    /// Stream index of the first record in the batch.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.arena.low()
    }
}

impl Deref for RecordBatch {
    type Target = PackingArena;

    fn deref(&self) -> &PackingArena {
        &self.arena
    }
}

impl DerefMut for RecordBatch {
    fn deref_mut(&mut self) -> &mut PackingArena {
        &mut self.arena
    }
}

/// A decoder that yields record batches in stream order.
pub trait BatchSource {
    /// Get the next batch, or `None` after the final batch.
    ///
    /// # Errors
    ///
    /// Returns the first fatal decoding error; later calls return `None`.
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    /// Get the BAM header, reading ahead as far as needed.
    ///
    /// Returns `None` unless [`DecoderOptions::expect_header`] was set.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails before the header is complete.
    fn header(&mut self) -> Result<Option<&RawHeader>>;

    /// Number of compressed blocks read so far.
    fn blocks_read(&self) -> u64;

    /// Iterate over every record as an owned byte vector.
    fn into_records(self) -> Records<Self>
    where
        Self: Sized,
    {
        Records::new(self)
    }
}

/// Decode every record of a stream into memory.
///
/// Uses [`SerialDecoder`] when `options.threads` is `None` and
/// [`ParallelDecoder`] otherwise.
///
/// # Errors
///
/// Returns the first decoding error.
pub fn decode_all<R>(reader: R, options: &DecoderOptions) -> Result<Vec<Vec<u8>>>
where
    R: BufRead + Send + 'static,
{
    match options.threads {
        None => SerialDecoder::new(reader, options.clone())?.into_records().collect(),
        Some(_) => ParallelDecoder::new(reader, options.clone())?.into_records().collect(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{bgzf, framed, random_records};
    use super::*;
    use crate::header::Reference;
    use crate::record::{build_unmapped_record, same_read_name};
    use rstest::rstest;
    use std::io::Cursor;

    fn options(threads: Option<usize>, arena_capacity: usize) -> DecoderOptions {
        DecoderOptions { threads, arena_capacity, ..DecoderOptions::default() }
    }

    #[rstest]
    #[case::zero_threads(DecoderOptions { threads: Some(0), ..DecoderOptions::default() }, "threads")]
    #[case::one_arena(DecoderOptions { arena_count: 1, ..DecoderOptions::default() }, "arena_count")]
    #[case::tiny_arena(DecoderOptions { arena_capacity: 8, ..DecoderOptions::default() }, "arena_capacity")]
    #[case::no_slots(
        DecoderOptions { pointer_multiplicity: 0, ..DecoderOptions::default() },
        "pointer_multiplicity"
    )]
    #[case::few_blocks(
        DecoderOptions { threads: Some(4), block_pool_size: Some(2), ..DecoderOptions::default() },
        "block_pool_size"
    )]
    fn test_validate_rejects(#[case] options: DecoderOptions, #[case] parameter: &str) {
        match options.validate() {
            Err(DecodeError::InvalidParameter { parameter: p, .. }) => assert_eq!(p, parameter),
            other => panic!("expected invalid {parameter}, got {other:?}"),
        }
    }

    #[test]
    fn test_default_options_are_valid() {
        let options = DecoderOptions::default();
        options.validate().unwrap();
        assert_eq!(options.worker_count(), 1);
        assert_eq!(options.block_slots(), 4);
    }

    #[rstest]
    #[case::serial(None)]
    #[case::one_worker(Some(1))]
    #[case::four_workers(Some(4))]
    fn test_round_trip_random(#[case] threads: Option<usize>) {
        for (seed, block_size, capacity) in [(1, 100, 4096), (2, 7, 600), (3, 65_280, 1 << 20), (4, 1, 2048)] {
            let records = random_records(seed, 300, 150);
            let stream = bgzf(&framed(&records), block_size, true);
            let decoded = decode_all(Cursor::new(stream), &options(threads, capacity)).unwrap();
            assert_eq!(decoded, records, "seed {seed}, block size {block_size}, arena {capacity}");
        }
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(3))]
    fn test_three_block_scenario(#[case] threads: Option<usize>) {
        let ten: Vec<u8> = (10..20).collect();
        let five = b"five!".to_vec();
        let data = framed(&[ten.clone(), Vec::new(), five.clone()]);

        let mut compressor = parbam_bgzf::BlockCompressor::new(6);
        let mut stream = Vec::new();
        for chunk in [&data[..10], &data[10..14], &data[14..]] {
            compressor.write_all(chunk).unwrap();
            compressor.flush().unwrap();
        }
        compressor.finish(&mut stream).unwrap();

        let decoded = decode_all(Cursor::new(stream), &options(threads, 1024)).unwrap();
        assert_eq!(decoded, vec![ten, Vec::new(), five]);
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_backpressure_batches_concatenate(#[case] threads: Option<usize>) {
        let records = random_records(9, 500, 40);
        let stream = bgzf(&framed(&records), 333, true);
        let opts = DecoderOptions { arena_count: 2, ..options(threads, 512) };

        let mut decoder: Box<dyn BatchSource> = match threads {
            None => Box::new(SerialDecoder::new(Cursor::new(stream), opts).unwrap()),
            Some(_) => Box::new(ParallelDecoder::new(Cursor::new(stream), opts).unwrap()),
        };

        let mut all = Vec::new();
        let mut batches = 0;
        let mut expected_index = 0;
        while let Some(batch) = decoder.next_batch().unwrap() {
            assert_eq!(batch.first_index(), expected_index);
            expected_index += batch.len() as u64;
            all.extend(batch.iter().map(<[u8]>::to_vec));
            batches += 1;
            if batch.is_final() {
                assert!(decoder.next_batch().unwrap().is_none());
                break;
            }
        }
        assert!(batches > 10, "expected many drain cycles, got {batches}");
        assert_eq!(all, records);
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_record_too_large(#[case] threads: Option<usize>) {
        let records = vec![vec![1u8; 10], vec![2u8; 200]];
        let stream = bgzf(&framed(&records), 1000, true);
        let err = decode_all(Cursor::new(stream), &options(threads, 100)).unwrap_err();
        assert!(matches!(err, DecodeError::RecordTooLarge { length: 200, capacity: 100 }));
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_corrupt_length_prefix_fails_fast(#[case] threads: Option<usize>) {
        let mut data = framed(&[vec![1u8; 10]]);
        data.extend_from_slice(&0xffff_fff0u32.to_le_bytes());
        data.extend_from_slice(&vec![0u8; 256 * 1024]);
        let stream = bgzf(&data, 60_000, true);
        let err = decode_all(Cursor::new(stream), &options(threads, 100)).unwrap_err();
        assert!(matches!(err, DecodeError::RecordTooLarge { length: 0xffff_fff0, capacity: 100 }));
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_missing_eof_marker_is_tolerated(#[case] threads: Option<usize>) {
        let records = random_records(5, 50, 30);
        let stream = bgzf(&framed(&records), 64, false);
        assert_eq!(decode_all(Cursor::new(stream), &options(threads, 4096)).unwrap(), records);
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_truncated_record_at_end(#[case] threads: Option<usize>) {
        let mut data = framed(&[b"complete".to_vec()]);
        data.extend_from_slice(&[9, 0, 0, 0, b'p']);
        let stream = bgzf(&data, 1000, true);
        let err = decode_all(Cursor::new(stream), &options(threads, 4096)).unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedRecord { .. }));
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(3))]
    fn test_corrupt_block_is_fatal(#[case] threads: Option<usize>) {
        let records = random_records(6, 200, 50);
        let mut stream = bgzf(&framed(&records), 500, true);
        // Corrupt the CRC of the first block
        let first_block_len = u16::from_le_bytes([stream[16], stream[17]]) as usize + 1;
        stream[first_block_len - 8] ^= 0xff;
        let err = decode_all(Cursor::new(stream), &options(threads, 4096)).unwrap_err();
        assert!(matches!(err, DecodeError::Decompression { block: 0, .. }));
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_empty_stream(#[case] threads: Option<usize>) {
        let stream = parbam_bgzf::BGZF_EOF.to_vec();
        assert!(decode_all(Cursor::new(stream), &options(threads, 4096)).unwrap().is_empty());
        assert!(decode_all(Cursor::new(Vec::new()), &options(threads, 4096)).unwrap().is_empty());
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_header_then_records(#[case] threads: Option<usize>) {
        let header = RawHeader::new(
            b"@HD\tVN:1.6\tSO:queryname\n",
            vec![Reference { name: b"chr7".to_vec(), length: 159_345_973 }],
        );
        let records: Vec<Vec<u8>> =
            (0..20).map(|i| build_unmapped_record(format!("q{i}").as_bytes(), 8, b"")).collect();
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(&framed(&records));
        let stream = bgzf(&data, 17, true);
        let opts = DecoderOptions { expect_header: true, ..options(threads, 8192) };

        let mut decoder: Box<dyn BatchSource> = match threads {
            None => Box::new(SerialDecoder::new(Cursor::new(stream), opts).unwrap()),
            Some(_) => Box::new(ParallelDecoder::new(Cursor::new(stream), opts).unwrap()),
        };
        assert_eq!(decoder.header().unwrap(), Some(&header));

        let batch = decoder.next_batch().unwrap().unwrap();
        assert!(batch.is_final());
        assert_eq!(batch.iter().map(<[u8]>::to_vec).collect::<Vec<_>>(), records);
        assert_eq!(batch.check_valid(), Ok(()));
    }

    #[rstest]
    #[case::serial(None)]
    #[case::parallel(Some(2))]
    fn test_keep_runs_together(#[case] threads: Option<usize>) {
        let mut records = Vec::new();
        for (i, size) in [3usize, 1, 4, 2, 5, 1, 3].iter().enumerate() {
            for _ in 0..*size {
                records.push(build_unmapped_record(format!("read{i}").as_bytes(), 10, b""));
            }
        }
        let stream = bgzf(&framed(&records), 90, true);
        // Room for four records per arena
        let capacity = 4 * (records[0].len() + 12);
        let opts = DecoderOptions { keep_runs_together: true, ..options(threads, capacity) };

        let mut decoder: Box<dyn BatchSource> = match threads {
            None => Box::new(SerialDecoder::new(Cursor::new(stream), opts).unwrap()),
            Some(_) => Box::new(ParallelDecoder::new(Cursor::new(stream), opts).unwrap()),
        };

        let mut all = Vec::new();
        let mut previous_last: Option<Vec<u8>> = None;
        while let Some(batch) = decoder.next_batch().unwrap() {
            let first = batch.record(0).to_vec();
            if let Some(last) = &previous_last {
                // Only a run longer than an arena may straddle two batches
                if same_read_name(last, &first) {
                    assert_eq!(crate::record::read_name(&first), b"read4");
                }
            }
            previous_last = Some(batch.record(batch.len() - 1).to_vec());
            all.extend(batch.iter().map(<[u8]>::to_vec));
            if batch.is_final() {
                break;
            }
        }
        assert_eq!(all, records);
    }
}
