pub mod barcodes;
pub mod header;
pub mod io;
pub mod matcher;
pub mod metrics;
pub mod processing;

use thiserror::Error;

use crate::io::OutputFormat;

/// Errors raised while decoding.
///
/// `Format` and `TruncatedPair` are fatal; `LengthMismatch` is a per-record
/// anomaly that the caller absorbs by skipping quality-based conversion for
/// that record.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Malformed or inconsistent barcode definition file.
    #[error("invalid barcode file: {reason}")]
    Format { reason: String },

    /// A barcode and its quality string have different lengths.
    #[error("barcode and quality are different lengths ({barcode_len} vs {quality_len})")]
    LengthMismatch {
        barcode_len: usize,
        quality_len: usize,
    },

    /// The input ended (or was reordered) where the mate of a paired read
    /// was expected. Mates must be adjacent in the input stream.
    #[error("input ended before the mate of paired read '{qname}'")]
    TruncatedPair { qname: String },
}

/// Run configuration consumed by the decoding pipeline.
///
/// Defaults mirror the tool's command-line defaults: barcode tag `BC`,
/// quality tag `QT`, quality threshold 15, up to 2 no-calls and 1 mismatch,
/// and a minimum best/second-best mismatch delta of 1.
#[derive(Debug, Clone)]
pub struct DecodeOpts {
    /// Name of the record tag holding the observed barcode read.
    pub barcode_tag: String,
    /// Name of the record tag holding the barcode base qualities.
    pub quality_tag: String,
    /// Convert low quality barcode bases to 'N' before matching.
    pub convert_low_quality: bool,
    /// Highest Phred value still considered low quality.
    pub max_low_quality_to_convert: u8,
    /// Max no-calls in a barcode read before it is considered unmatchable.
    pub max_no_calls: usize,
    /// Max mismatches for a barcode to be considered a match.
    pub max_mismatches: usize,
    /// Min difference between best and second-best mismatch counts.
    pub min_mismatch_delta: usize,
    /// Append a #<barcode name> suffix to each read name.
    pub change_read_name: bool,
    /// Output container format; inferred from the output path when `None`.
    pub output_format: Option<OutputFormat>,
    /// Compression level of the output file.
    pub compression_level: Option<u32>,
    /// Invocation recorded in the output header's @PG line.
    pub command_line: String,
}

impl Default for DecodeOpts {
    fn default() -> Self {
        Self {
            barcode_tag: "BC".to_string(),
            quality_tag: "QT".to_string(),
            convert_low_quality: false,
            max_low_quality_to_convert: 15,
            max_no_calls: 2,
            max_mismatches: 1,
            min_mismatch_delta: 1,
            change_read_name: false,
            output_format: None,
            compression_level: None,
            command_line: String::new(),
        }
    }
}
