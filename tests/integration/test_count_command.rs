//! Integration tests for the count command.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{create_minimal_header, create_templates, write_bam};

/// Run `parbam count` and parse its metric table.
fn run_count(input: &Path, extra: &[&str]) -> HashMap<String, u64> {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output = temp_dir.path().join("counts.tsv");

    let status = Command::new(env!("CARGO_BIN_EXE_parbam"))
        .arg("count")
        .arg("-i")
        .arg(input)
        .arg("-o")
        .arg(&output)
        .args(extra)
        .status()
        .expect("Failed to run count command");
    assert!(status.success(), "count command failed");

    let text = fs::read_to_string(&output).expect("Failed to read counts");
    text.lines()
        .skip(1)
        .map(|line| {
            let (key, value) = line.split_once('\t').expect("Malformed counts line");
            (key.to_string(), value.parse().expect("Non-numeric count"))
        })
        .collect()
}

#[rstest]
#[case::serial(&[])]
#[case::one_thread(&["--threads", "1"])]
#[case::four_threads(&["--threads", "4"])]
fn test_count_bam(#[case] threading: &[&str]) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("input.bam");
    let sizes = [2, 1, 3, 2, 2, 1, 4];
    let records = create_templates(&sizes);
    write_bam(&input, Some(&create_minimal_header("chr1", 10_000)), &records, 100);

    let mut args = vec!["--validate", "--count-runs"];
    args.extend_from_slice(threading);
    let counts = run_count(&input, &args);

    assert_eq!(counts["references"], 1);
    assert_eq!(counts["records"], records.len() as u64);
    assert_eq!(counts["name_runs"], sizes.len() as u64);
    let bytes: usize = records.iter().map(Vec::len).sum();
    assert_eq!(counts["record_bytes"], bytes as u64);
    assert!(counts["blocks"] > 1);
}

#[test]
fn test_count_runs_across_batches() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("input.bam");
    let sizes: Vec<usize> = (0..15_000).map(|i| 1 + i % 3).collect();
    let records = create_templates(&sizes);
    write_bam(&input, Some(&create_minimal_header("chr1", 10_000)), &records, 4096);

    // About 2.5 MB of records spread over 1 MiB arenas
    let counts = run_count(&input, &["--count-runs", "--threads", "3", "--arena-mib", "1"]);
    assert_eq!(counts["records"], records.len() as u64);
    assert_eq!(counts["name_runs"], sizes.len() as u64);
}

#[test]
fn test_count_headerless_stream() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("records.gz");
    let records: Vec<Vec<u8>> = (0..100u8).map(|i| vec![i; usize::from(i)]).collect();
    write_bam(&input, None, &records, 37);

    let counts = run_count(&input, &["--no-header", "--inflater", "flate2"]);
    assert!(!counts.contains_key("references"));
    assert_eq!(counts["records"], 100);
    assert_eq!(counts["record_bytes"], (0..100u64).sum::<u64>());
}

#[test]
fn test_count_validate_rejects_non_bam_records() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("records.gz");
    write_bam(&input, None, &[vec![1u8; 40]], 100);

    let status = Command::new(env!("CARGO_BIN_EXE_parbam"))
        .args(["count", "--no-header", "--validate", "-i"])
        .arg(&input)
        .status()
        .expect("Failed to run count command");
    assert!(!status.success());
}

#[test]
fn test_count_missing_input_fails() {
    let status = Command::new(env!("CARGO_BIN_EXE_parbam"))
        .args(["count", "-i", "/nonexistent/input.bam"])
        .status()
        .expect("Failed to run count command");
    assert!(!status.success());
}

#[test]
fn test_count_truncated_file_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("input.bam");
    let records = create_templates(&[3, 3]);
    write_bam(&input, Some(&create_minimal_header("chr1", 10_000)), &records, 50);

    let bytes = fs::read(&input).expect("Failed to read BAM");
    fs::write(&input, &bytes[..bytes.len() / 2]).expect("Failed to truncate BAM");

    for threads in [None, Some("2")] {
        let mut command = Command::new(env!("CARGO_BIN_EXE_parbam"));
        command.args(["count", "-i"]).arg(&input);
        if let Some(threads) = threads {
            command.args(["--threads", threads]);
        }
        let status = command.status().expect("Failed to run count command");
        assert!(!status.success(), "truncated input must fail (threads {threads:?})");
    }
}
