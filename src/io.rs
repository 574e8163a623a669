use anyhow::{Context, Result};
use clap::ValueEnum;
use rust_htslib::bam;
use std::path::Path;

/// Output container formats supported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Sam,
    Bam,
    Cram,
}

impl OutputFormat {
    /// Determine the output format from a filename suffix.
    ///
    /// Supports `.sam`, `.bam` and `.cram`; returns `None` for anything
    /// else so the caller can fall back to a default.
    pub fn from_path(path: &Path) -> Option<Self> {
        let fname = path.file_name()?.to_str()?.to_lowercase();

        if fname.ends_with(".sam") {
            return Some(OutputFormat::Sam);
        }
        if fname.ends_with(".bam") {
            return Some(OutputFormat::Bam);
        }
        if fname.ends_with(".cram") {
            return Some(OutputFormat::Cram);
        }
        None
    }

    fn to_htslib(self) -> bam::Format {
        match self {
            OutputFormat::Sam => bam::Format::Sam,
            OutputFormat::Bam => bam::Format::Bam,
            OutputFormat::Cram => bam::Format::Cram,
        }
    }
}

/// Create a record writer for `path` (stdout when `None`) using `header`
/// as a template, with an optional compression level.
pub fn create_writer(
    path: Option<&Path>,
    header: &bam::Header,
    format: OutputFormat,
    compression_level: Option<u32>,
) -> Result<bam::Writer> {
    let mut writer = match path {
        Some(p) => bam::Writer::from_path(p, header, format.to_htslib())
            .with_context(|| format!("Failed to create output file {}", p.display()))?,
        None => bam::Writer::from_stdout(header, format.to_htslib())
            .context("Failed to create stdout writer")?,
    };
    if let Some(level) = compression_level {
        writer
            .set_compression_level(bam::CompressionLevel::Level(level))
            .context("Failed to set compression level")?;
    }
    Ok(writer)
}
