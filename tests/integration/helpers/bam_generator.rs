//! Builders for small BGZF-compressed BAM files and record streams.

use std::fs;
use std::path::Path;

use parbam_bgzf::BlockCompressor;
use parbam_lib::header::{RawHeader, Reference};
use parbam_lib::record::build_unmapped_record;

/// A header with a single reference.
pub fn create_minimal_header(name: &str, length: u32) -> RawHeader {
    RawHeader::new(
        b"@HD\tVN:1.6\tSO:unsorted\tGO:query\n",
        vec![Reference { name: name.as_bytes().to_vec(), length }],
    )
}

/// Unmapped records grouped into templates: `sizes[i]` records named `read_{i}`.
pub fn create_templates(sizes: &[usize]) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    for (i, &size) in sizes.iter().enumerate() {
        for j in 0..size {
            let aux = [b'X', b'I', b'C', j as u8];
            records.push(build_unmapped_record(format!("read_{i}").as_bytes(), 20 + i % 7, &aux));
        }
    }
    records
}

/// Concatenate records with their length prefixes.
pub fn frame_records(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        out.extend_from_slice(&(record.len() as u32).to_le_bytes());
        out.extend_from_slice(record);
    }
    out
}

/// Compress `data` into BGZF blocks of at most `block_size` bytes, with EOF marker.
pub fn compress(data: &[u8], block_size: usize) -> Vec<u8> {
    let mut compressor = BlockCompressor::new(1);
    let mut out = Vec::new();
    for chunk in data.chunks(block_size) {
        compressor.write_all(chunk).expect("Failed to compress");
        compressor.flush().expect("Failed to compress");
    }
    compressor.finish(&mut out).expect("Failed to finish BGZF stream");
    out
}

/// Write a BAM file holding `header` and `records`; returns the decompressed bytes.
pub fn write_bam(
    path: &Path,
    header: Option<&RawHeader>,
    records: &[Vec<u8>],
    block_size: usize,
) -> Vec<u8> {
    let mut data = header.map(|h| h.as_bytes().to_vec()).unwrap_or_default();
    data.extend_from_slice(&frame_records(records));
    fs::write(path, compress(&data, block_size)).expect("Failed to write BAM");
    data
}
