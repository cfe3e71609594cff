//! Integration tests for the dump command.

use std::fs;
use std::process::Command;

use rstest::rstest;
use tempfile::TempDir;

use parbam_lib::decoder::{DecoderOptions, decode_all};

use crate::helpers::{compress, create_minimal_header, create_templates, write_bam};

#[rstest]
#[case::serial(None)]
#[case::parallel(Some("3"))]
fn test_dump_raw_matches_decompressed_stream(#[case] threads: Option<&str>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("input.bam");
    let output = temp_dir.path().join("records.raw");
    let header = create_minimal_header("chr2", 5_000);
    let expected = write_bam(&input, Some(&header), &create_templates(&[1, 2, 3, 4]), 64);

    let mut command = Command::new(env!("CARGO_BIN_EXE_parbam"));
    command.args(["dump", "-i"]).arg(&input).arg("-o").arg(&output);
    if let Some(threads) = threads {
        command.args(["--threads", threads]);
    }
    let status = command.status().expect("Failed to run dump command");
    assert!(status.success(), "dump command failed");

    assert_eq!(fs::read(&output).expect("Failed to read output"), expected);
}

#[test]
fn test_dump_bgzf_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("input.bam");
    let output = temp_dir.path().join("copy.bam");
    let records = create_templates(&[2; 500]);
    write_bam(&input, Some(&create_minimal_header("chr1", 10_000)), &records, 1000);

    let status = Command::new(env!("CARGO_BIN_EXE_parbam"))
        .args(["dump", "--bgzf", "--compression-level", "6", "--threads", "2", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("Failed to run dump command");
    assert!(status.success(), "dump command failed");

    let bytes = fs::read(&output).expect("Failed to read output");
    assert!(bytes.ends_with(&parbam_bgzf::BGZF_EOF));

    let options = DecoderOptions { expect_header: true, ..DecoderOptions::default() };
    let decoded = decode_all(std::io::Cursor::new(bytes), &options).expect("Failed to decode copy");
    assert_eq!(decoded, records);
}

#[test]
fn test_dump_headerless_to_stdout() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("records.gz");
    let data = [3u8, 0, 0, 0, b'a', b'b', b'c', 0, 0, 0, 0];
    fs::write(&input, compress(&data, 5)).expect("Failed to write input");

    let output = Command::new(env!("CARGO_BIN_EXE_parbam"))
        .args(["dump", "--no-header", "-o", "-", "-i"])
        .arg(&input)
        .output()
        .expect("Failed to run dump command");
    assert!(output.status.success());
    assert_eq!(output.stdout, data);
}

#[test]
fn test_dump_rejects_bad_compression_level() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("records.gz");
    fs::write(&input, compress(&[0, 0, 0, 0], 4)).expect("Failed to write input");

    let status = Command::new(env!("CARGO_BIN_EXE_parbam"))
        .args(["dump", "--no-header", "--bgzf", "--compression-level", "13", "-o"])
        .arg(temp_dir.path().join("out.gz"))
        .arg("-i")
        .arg(&input)
        .status()
        .expect("Failed to run dump command");
    assert!(!status.success());
}
