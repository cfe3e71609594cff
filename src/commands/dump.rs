//! Decode a BGZF stream and write its records back out.
//!
//! Records are written in stream order with their 4-byte length prefixes,
//! preceded by the raw BAM header when the input has one. The output is either
//! the plain decompressed stream or, with `--bgzf`, the same bytes re-framed
//! into fresh BGZF blocks (a valid BAM file for BAM input).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use parbam_bgzf::BlockCompressor;
use parbam_lib::logging::{DecodeSummary, OperationTimer, log_decode_summary};
use parbam_lib::progress::ProgressTracker;

use crate::commands::command::Command;
use crate::commands::common::{
    CompressionOptions, DecoderArgs, InputOptions, ThreadingOptions, open_decoder,
};

/// Write decoded records as a length-prefixed stream.
#[derive(Debug, Parser)]
#[command(
    name = "dump",
    about = "\x1b[38;5;72m[DECODE]\x1b[0m         \x1b[36mWrite decoded records as a raw or BGZF stream\x1b[0m",
    long_about = r#"
Decode a BGZF-compressed BAM file or record stream and write its records.

Each record is written with its 4-byte little-endian length prefix, in stream
order. When the input has a BAM header it is written first, unchanged.

By default the output is uncompressed. With --bgzf the output is compressed
into new BGZF blocks and terminated with an EOF marker, so a BAM input yields
an equivalent BAM output.

Example usage:
  parbam dump -i input.bam -o records.raw
  parbam dump -i input.bam -o copy.bam --bgzf --threads 4
  parbam dump -i input.bam -o - | xxd | head
"#
)]
pub struct Dump {
    /// Input options
    #[command(flatten)]
    pub input: InputOptions,

    /// Output file; `-` writes stdout
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Compress the output into BGZF blocks
    #[arg(long = "bgzf", default_value_t = false)]
    pub bgzf: bool,

    /// Compression options for BGZF output
    #[command(flatten)]
    pub compression: CompressionOptions,

    /// Threading options
    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Decoder tuning options
    #[command(flatten)]
    pub decoder: DecoderArgs,
}

/// Destination for dumped bytes, compressing on the way when requested.
struct RecordSink<W: Write> {
    out: W,
    compressor: Option<BlockCompressor>,
}

impl<W: Write> RecordSink<W> {
    fn new(out: W, compressor: Option<BlockCompressor>) -> Self {
        Self { out, compressor }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.compressor {
            Some(compressor) => {
                compressor.write_all(bytes)?;
                compressor.write_blocks_to(&mut self.out)
            }
            None => self.out.write_all(bytes),
        }
    }

    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let len = u32::try_from(record.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record exceeds u32::MAX"))?;
        self.write_all(&len.to_le_bytes())?;
        self.write_all(record)
    }

    fn finish(mut self) -> io::Result<W> {
        if let Some(compressor) = &mut self.compressor {
            compressor.finish(&mut self.out)?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl Command for Dump {
    fn execute(&self, _command_line: &str) -> Result<()> {
        self.compression.validate()?;
        let options = self.decoder.to_options(&self.input, &self.threading)?;

        info!("Input: {}", self.input.input.display());
        info!("Output: {}", self.output.display());
        if self.bgzf {
            info!("Compressing output at level {}", self.compression.compression_level);
        }

        let out: Box<dyn Write> = if self.output.as_os_str() == "-" {
            Box::new(io::stdout().lock())
        } else {
            let file = File::create(&self.output)
                .with_context(|| format!("Failed to create output: {}", self.output.display()))?;
            Box::new(file)
        };
        let compressor = self.bgzf.then(|| BlockCompressor::new(self.compression.compression_level));
        let mut sink = RecordSink::new(BufWriter::new(out), compressor);

        let timer = OperationTimer::new("Dumping records");
        let mut decoder = open_decoder(self.input.open()?, options)?;
        if let Some(header) = decoder.header()? {
            sink.write_all(header.as_bytes())?;
        }

        let progress = ProgressTracker::new("Dumped records");
        let mut summary = DecodeSummary::default();
        while let Some(batch) = decoder.next_batch()? {
            let mut record_bytes = 0;
            for record in batch.iter() {
                sink.write_record(record)?;
                record_bytes += record.len();
            }
            summary.add_batch(batch.len(), record_bytes);
            progress.add(batch.len() as u64);
        }
        progress.log_final();
        sink.finish()?;

        summary.blocks = decoder.blocks_read();
        log_decode_summary(&summary, timer.elapsed());
        timer.log_completion(summary.records);
        Ok(())
    }
}
