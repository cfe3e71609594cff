//! Common CLI options shared across commands.
//!
//! Argument structures here are composed into command structs using
//! `#[command(flatten)]`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;

use parbam_lib::decoder::{
    BatchSource, DEFAULT_ARENA_CAPACITY, DEFAULT_ARENA_COUNT, DecoderOptions, ParallelDecoder,
    SerialDecoder,
};
use parbam_lib::inflate::InflaterKind;

/// Read buffer for input files; large enough to hold several BGZF blocks.
const INPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// Input options for commands that read a BGZF stream.
#[derive(Debug, Clone, Args)]
pub struct InputOptions {
    /// Input BGZF file (BAM or headerless record stream); `-` reads stdin
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// The decompressed stream does not start with a BAM header
    #[arg(long = "no-header", default_value_t = false)]
    pub no_header: bool,
}

impl InputOptions {
    /// Opens the input for buffered reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the input file does not exist or cannot be opened.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        if is_stdin_path(&self.input) {
            return Ok(Box::new(BufReader::with_capacity(INPUT_BUFFER_SIZE, io::stdin())));
        }
        if !self.input.exists() {
            bail!("Input file does not exist: {}", self.input.display());
        }
        let file = File::open(&self.input)
            .with_context(|| format!("Failed to open input: {}", self.input.display()))?;
        Ok(Box::new(BufReader::with_capacity(INPUT_BUFFER_SIZE, file)))
    }
}

/// Creates the decoder selected by `options.threads`.
///
/// # Errors
///
/// Returns an error if the options are invalid or workers cannot be started.
pub fn open_decoder(
    reader: Box<dyn BufRead + Send>,
    options: DecoderOptions,
) -> Result<Box<dyn BatchSource>> {
    Ok(match options.threads {
        None => Box::new(SerialDecoder::new(reader, options)?),
        Some(_) => Box::new(ParallelDecoder::new(reader, options)?),
    })
}

/// Whether `path` names standard input.
#[must_use]
pub fn is_stdin_path(path: &Path) -> bool {
    path.as_os_str() == "-" || path == Path::new("/dev/stdin")
}

/// Threading options.
///
/// ```bash
/// parbam count -i in.bam
/// # Decodes on the main thread
///
/// parbam count -i in.bam --threads 8
/// # Decodes with 8 worker threads
/// ```
#[derive(Debug, Clone, Default, Args)]
pub struct ThreadingOptions {
    /// Number of decoding worker threads.
    ///
    /// If not specified, reads, decompresses and frames on the main thread.
    /// When specified (even with --threads 1), runs the worker pipeline.
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,
}

/// Tuning options for the decoder.
#[derive(Debug, Clone, Args)]
pub struct DecoderArgs {
    /// Byte budget of each record arena, in MiB
    #[arg(long = "arena-mib", default_value_t = DEFAULT_ARENA_CAPACITY / (1024 * 1024))]
    pub arena_mib: usize,

    /// Number of record arenas
    #[arg(long = "arenas", default_value_t = DEFAULT_ARENA_COUNT)]
    pub arena_count: usize,

    /// Compressed and decompressed block slots (default: 4 per thread)
    #[arg(long = "block-slots")]
    pub block_slots: Option<usize>,

    /// DEFLATE engine
    #[arg(long = "inflater", value_enum, default_value_t = InflaterKind::default())]
    pub inflater: InflaterKind,

    /// Skip CRC32 verification of decompressed blocks
    #[arg(long = "no-crc", default_value_t = false)]
    pub no_crc: bool,

    /// Never split a run of records sharing a read name across two batches
    #[arg(long = "keep-runs-together", default_value_t = false)]
    pub keep_runs_together: bool,
}

impl Default for DecoderArgs {
    fn default() -> Self {
        Self {
            arena_mib: DEFAULT_ARENA_CAPACITY / (1024 * 1024),
            arena_count: DEFAULT_ARENA_COUNT,
            block_slots: None,
            inflater: InflaterKind::default(),
            no_crc: false,
            keep_runs_together: false,
        }
    }
}

impl DecoderArgs {
    /// Builds validated decoder options.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid option.
    pub fn to_options(
        &self,
        input: &InputOptions,
        threading: &ThreadingOptions,
    ) -> Result<DecoderOptions> {
        let Some(arena_capacity) = self.arena_mib.checked_mul(1024 * 1024) else {
            bail!("--arena-mib ({}) is too large", self.arena_mib);
        };
        let options = DecoderOptions {
            threads: threading.threads,
            arena_capacity,
            pointer_multiplicity: 1,
            arena_count: self.arena_count,
            block_pool_size: self.block_slots,
            inflater: self.inflater,
            verify_crc: !self.no_crc,
            expect_header: !input.no_header,
            keep_runs_together: self.keep_runs_together,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Options for output compression.
#[derive(Debug, Clone, Args)]
pub struct CompressionOptions {
    /// Compression level for BGZF output (1-12).
    ///
    /// Level 1 is fastest with larger files.
    /// Level 12 produces smallest files but is slowest.
    #[arg(long, default_value_t = 1)]
    pub compression_level: u32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self { compression_level: 1 }
    }
}

impl CompressionOptions {
    /// Validates the compression level.
    ///
    /// # Errors
    ///
    /// Returns an error if the level is outside 1-12.
    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.compression_level) {
            bail!("--compression-level must be between 1 and 12, got {}", self.compression_level);
        }
        Ok(())
    }
}
