//! Count the records of a BGZF-compressed BAM or record stream.
//!
//! Decodes the whole input, optionally checking every record for BAM
//! structural validity and counting runs of records sharing a read name, then
//! writes a small tab-separated table of totals.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use parbam_lib::arena::LENGTH_PREFIX_SIZE;
use parbam_lib::logging::{DecodeSummary, OperationTimer, format_count, log_decode_summary};
use parbam_lib::progress::ProgressTracker;
use parbam_lib::record::{read_name, same_read_name};

use crate::commands::command::Command;
use crate::commands::common::{DecoderArgs, InputOptions, ThreadingOptions, open_decoder};

/// Count records in a BGZF stream.
#[derive(Debug, Parser)]
#[command(
    name = "count",
    about = "\x1b[38;5;72m[DECODE]\x1b[0m         \x1b[36mCount records in a BAM or BGZF record stream\x1b[0m",
    long_about = r#"
Count the records of a BGZF-compressed BAM file or headerless record stream.

The input is decoded into batches of length-prefixed records. Totals for blocks,
batches, records and record bytes are written as a two-column table to the
output (stdout by default).

With --validate every record must be a structurally valid BAM record. With
--count-runs the number of runs of consecutive records sharing a read name is
also reported (for query-grouped input this is the number of templates).

Example usage:
  parbam count -i input.bam
  parbam count -i input.bam --threads 8 --validate --count-runs
  parbam count -i records.gz --no-header -o counts.tsv
"#
)]
pub struct Count {
    /// Input options
    #[command(flatten)]
    pub input: InputOptions,

    /// Optional output file for the counts (default: stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Fail on the first record that is not a structurally valid BAM record
    #[arg(long = "validate", default_value_t = false)]
    pub validate: bool,

    /// Count runs of consecutive records sharing a read name
    #[arg(long = "count-runs", default_value_t = false)]
    pub count_runs: bool,

    /// Threading options
    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Decoder tuning options
    #[command(flatten)]
    pub decoder: DecoderArgs,
}

/// Totals reported by [`Count`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counts {
    summary: DecodeSummary,
    references: Option<usize>,
    runs: Option<u64>,
}

impl Counts {
    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "metric\tvalue")?;
        if let Some(references) = self.references {
            writeln!(out, "references\t{references}")?;
        }
        writeln!(out, "blocks\t{}", self.summary.blocks)?;
        writeln!(out, "batches\t{}", self.summary.batches)?;
        writeln!(out, "records\t{}", self.summary.records)?;
        writeln!(out, "record_bytes\t{}", self.summary.record_bytes)?;
        if let Some(runs) = self.runs {
            writeln!(out, "name_runs\t{runs}")?;
        }
        Ok(())
    }
}

impl Command for Count {
    fn execute(&self, _command_line: &str) -> Result<()> {
        let options = self.decoder.to_options(&self.input, &self.threading)?;

        info!("Input: {}", self.input.input.display());
        match options.threads {
            Some(threads) => info!("Decoding with {threads} worker threads"),
            None => info!("Decoding on the main thread"),
        }

        let timer = OperationTimer::new("Counting records");
        let mut decoder = open_decoder(self.input.open()?, options)?;
        let mut counts = Counts::default();

        if let Some(header) = decoder.header()? {
            info!("Header has {} references", format_count(header.reference_count() as u64));
            counts.references = Some(header.reference_count());
        }

        let progress = ProgressTracker::new("Counted records");
        let mut runs = 0u64;
        // Read name of the last record of the previous batch
        let mut last_name: Option<Vec<u8>> = None;

        while let Some(mut batch) = decoder.next_batch()? {
            if self.validate {
                if let Err(pos) = batch.check_valid() {
                    bail!(
                        "Record {} is not a structurally valid BAM record",
                        batch.first_index() + pos as u64
                    );
                }
            }

            if self.count_runs && !batch.is_empty() {
                let first = read_name(batch.record(0));
                let continues = last_name.as_deref().is_some_and(|name| name == first);
                while batch.has_next() {
                    let run = batch.next_run(same_read_name);
                    batch.advance(run);
                    runs += 1;
                }
                if continues {
                    runs -= 1;
                }
                last_name = Some(read_name(batch.record(batch.len() - 1)).to_vec());
            }

            let records = batch.len();
            counts.summary.add_batch(records, batch.payload_bytes() - LENGTH_PREFIX_SIZE * records);
            progress.add(records as u64);
        }
        progress.log_final();

        counts.summary.blocks = decoder.blocks_read();
        if self.count_runs {
            counts.runs = Some(runs);
        }

        match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create output: {}", path.display()))?;
                let mut out = BufWriter::new(file);
                counts.write_to(&mut out)?;
                out.flush()?;
            }
            None => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                counts.write_to(&mut out)?;
                out.flush()?;
            }
        }

        log_decode_summary(&counts.summary, timer.elapsed());
        timer.log_completion(counts.summary.records);
        Ok(())
    }
}
