//! Serial and parallel decoding agree on generated BAM files.

use std::fs::File;
use std::io::BufReader;

use rstest::rstest;
use tempfile::TempDir;

use parbam_lib::decoder::{BatchSource, DecoderOptions, ParallelDecoder, SerialDecoder};
use parbam_lib::inflate::InflaterKind;

use crate::helpers::{create_minimal_header, create_templates, write_bam};

fn collect(mut decoder: impl BatchSource) -> (usize, Vec<Vec<u8>>) {
    let mut references = 0;
    if let Some(header) = decoder.header().expect("Failed to read header") {
        references = header.reference_count();
    }
    let mut records = Vec::new();
    while let Some(batch) = decoder.next_batch().expect("Failed to decode") {
        assert_eq!(batch.first_index(), records.len() as u64);
        records.extend(batch.iter().map(<[u8]>::to_vec));
    }
    (references, records)
}

#[rstest]
fn test_serial_equals_parallel(
    #[values(1, 2, 6)] threads: usize,
    #[values(InflaterKind::Libdeflate, InflaterKind::Flate2)] inflater: InflaterKind,
) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("input.bam");
    let sizes: Vec<usize> = (0..800).map(|i| 1 + i % 4).collect();
    let records = create_templates(&sizes);
    write_bam(&path, Some(&create_minimal_header("chrM", 16_569)), &records, 777);

    let open = || BufReader::new(File::open(&path).expect("Failed to open BAM"));
    let options = DecoderOptions {
        arena_capacity: 16 * 1024,
        arena_count: 3,
        inflater,
        expect_header: true,
        keep_runs_together: true,
        ..DecoderOptions::default()
    };

    let serial = collect(SerialDecoder::new(open(), options.clone()).expect("Invalid options"));
    let parallel = collect(
        ParallelDecoder::new(open(), DecoderOptions { threads: Some(threads), ..options })
            .expect("Invalid options"),
    );
    assert_eq!(serial, (1, records));
    assert_eq!(parallel, serial);
}
