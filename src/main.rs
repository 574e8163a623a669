use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use barcode_decoder::io::OutputFormat;
use barcode_decoder::processing::decode;
use barcode_decoder::DecodeOpts;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Mismatch-tolerant barcode index decoder for SAM/BAM/CRAM"
)]
struct Args {
    /// Input file (SAM, BAM, or CRAM)
    input: PathBuf,

    /// Output file [default: stdout]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File containing barcodes (tab-separated: sequence, name, library,
    /// sample, description; the first line is a header)
    #[arg(short, long)]
    barcode_file: PathBuf,

    /// Per-barcode decode metrics written to this file
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Barcode tag name
    #[arg(long, default_value = "BC")]
    barcode_tag_name: String,

    /// Quality tag name
    #[arg(long, default_value = "QT")]
    quality_tag_name: String,

    /// Convert low quality bases in the barcode read to 'N'
    #[arg(long, default_value_t = false)]
    convert_low_quality: bool,

    /// Max low quality phred value to convert bases in the barcode read to 'N'
    #[arg(long, default_value_t = 15)]
    max_low_quality_to_convert: u8,

    /// Max allowable number of no-calls in a barcode read before it is
    /// considered unmatchable
    #[arg(long, default_value_t = 2)]
    max_no_calls: usize,

    /// Maximum mismatches for a barcode to be considered a match
    #[arg(long, default_value_t = 1)]
    max_mismatches: usize,

    /// Minimum difference between the number of mismatches in the best and
    /// second best barcodes for a barcode to be considered a match
    #[arg(long, default_value_t = 1)]
    min_mismatch_delta: usize,

    /// Change the read name by adding a #<barcode name> suffix
    #[arg(long, default_value_t = false)]
    change_read_name: bool,

    /// Format of the output file [default: inferred from the output path,
    /// BAM for stdout]
    #[arg(long, value_enum)]
    output_fmt: Option<OutputFormat>,

    /// Compression level of the output file [0..9]
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9))]
    compression_level: Option<u32>,

    /// Verbose output (show elapsed time)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let opts = DecodeOpts {
        barcode_tag: args.barcode_tag_name,
        quality_tag: args.quality_tag_name,
        convert_low_quality: args.convert_low_quality,
        max_low_quality_to_convert: args.max_low_quality_to_convert,
        max_no_calls: args.max_no_calls,
        max_mismatches: args.max_mismatches,
        min_mismatch_delta: args.min_mismatch_delta,
        change_read_name: args.change_read_name,
        output_format: args.output_fmt,
        compression_level: args.compression_level,
        command_line,
    };

    let start = std::time::Instant::now();
    let stats = decode(
        &args.input,
        args.output.as_deref(),
        &args.barcode_file,
        args.metrics_file.as_deref(),
        &opts,
    )?;
    let elapsed = start.elapsed();

    let decoded = stats.assigned + stats.unmatched;
    let pct_assigned = if decoded > 0 {
        (stats.assigned as f64 / decoded as f64) * 100.0
    } else {
        0.0
    };
    info!(
        "{} records written, {} assigned ({:.2}%), {} unmatched",
        stats.records, stats.assigned, pct_assigned, stats.unmatched
    );
    if args.verbose {
        eprintln!("Elapsed: {:.3}s", elapsed.as_secs_f64());
    }

    Ok(())
}
