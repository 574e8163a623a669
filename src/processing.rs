use anyhow::{Context, Result};
use log::{info, warn};
use rust_htslib::bam::record::Aux;
use rust_htslib::bam::{self, Read, Record};
use std::path::Path;

use crate::barcodes::{Assignment, BarcodeTable};
use crate::io::{create_writer, OutputFormat};
use crate::{header, matcher, metrics, DecodeError, DecodeOpts};

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    /// Records written, mates and pass-throughs included.
    pub records: u64,
    /// Reads assigned to a real barcode.
    pub assigned: u64,
    /// Reads assigned to the unmatched sentinel.
    pub unmatched: u64,
}

/// Decode an input record stream end to end.
///
/// Loads the barcode table, rewrites the header's read groups, then runs
/// every record (and, for paired reads, its adjacent mate) through the
/// matcher, writing tagged records to the output and, when requested, the
/// final metrics report. Mates must be adjacent in the input; a paired
/// read with no following record is a fatal [`DecodeError::TruncatedPair`].
pub fn decode(
    input: &Path,
    output: Option<&Path>,
    barcode_file: &Path,
    metrics_file: Option<&Path>,
    opts: &DecodeOpts,
) -> Result<DecodeStats> {
    let mut table = BarcodeTable::from_path(barcode_file)?;
    info!(
        "loaded {} barcodes of length {} from {}",
        table.barcodes().len(),
        table.tag_len(),
        barcode_file.display()
    );

    let mut reader = bam::Reader::from_path(input)
        .with_context(|| format!("Failed to open input file {}", input.display()))?;

    let header_text = String::from_utf8_lossy(reader.header().as_bytes()).into_owned();
    let expanded = header::expand_read_groups(&header_text, &table, &program_line(opts));
    let out_header = bam::Header::from_template(&bam::HeaderView::from_bytes(expanded.as_bytes()));

    let format = opts
        .output_format
        .or_else(|| output.and_then(OutputFormat::from_path))
        .unwrap_or(OutputFormat::Bam);
    let mut writer = create_writer(output, &out_header, format, opts.compression_level)?;

    let mut stats = DecodeStats::default();
    let mut records = reader.records();
    while let Some(result) = records.next() {
        let mut rec = result.context("Failed to read record")?;
        let name = process_record(&mut rec, &mut table, opts, &mut stats)?;
        writer.write(&rec).context("Failed to write record")?;
        stats.records += 1;

        if rec.is_paired() {
            let mut mate = match records.next() {
                Some(r) => r.context("Failed to read mate record")?,
                None => {
                    return Err(DecodeError::TruncatedPair {
                        qname: String::from_utf8_lossy(rec.qname()).into_owned(),
                    }
                    .into())
                }
            };
            // The mate inherits the primary read's decision; it is never
            // matched or counted on its own.
            if let Some(name) = name.as_deref() {
                set_read_group(&mut mate, name)?;
                if opts.change_read_name {
                    append_name_suffix(&mut mate, name);
                }
            }
            writer.write(&mate).context("Failed to write record")?;
            stats.records += 1;
        }
    }

    info!(
        "processed {} records: {} assigned, {} unmatched",
        stats.records, stats.assigned, stats.unmatched
    );

    if let Some(path) = metrics_file {
        metrics::write_metrics(path, &table, opts)?;
        info!("wrote metrics to {}", path.display());
    }

    Ok(stats)
}

/// Decode one record in place.
///
/// Returns the assigned barcode name, or `None` when the record carries no
/// barcode tag and passes through untouched.
fn process_record(
    rec: &mut Record,
    table: &mut BarcodeTable,
    opts: &DecodeOpts,
    stats: &mut DecodeStats,
) -> Result<Option<String>> {
    let observed = match get_string_aux(rec, opts.barcode_tag.as_bytes()) {
        Some(seq) => seq,
        None => return Ok(None),
    };
    let mut observed = observed.into_bytes();

    if opts.convert_low_quality {
        if let Some(quality) = get_string_aux(rec, opts.quality_tag.as_bytes()) {
            match matcher::convert_low_quality(
                &observed,
                quality.as_bytes(),
                opts.max_low_quality_to_convert,
            ) {
                Ok(converted) => observed = converted,
                // record-local anomaly: keep the unconverted barcode
                Err(e) => warn!("{}: {}", String::from_utf8_lossy(rec.qname()), e),
            }
        }
    }
    if observed.len() > table.tag_len() {
        observed.truncate(table.tag_len());
    }

    let assignment = matcher::find_best_match(
        &observed,
        table,
        opts.max_no_calls,
        opts.max_mismatches,
        opts.min_mismatch_delta,
    );
    table.record_match(assignment, &observed, !rec.is_quality_check_failed());
    match assignment {
        Assignment::Unmatched => stats.unmatched += 1,
        Assignment::Barcode(_) => stats.assigned += 1,
    }

    let name = table.entry(assignment).name.clone();
    set_read_group(rec, &name)?;
    if opts.change_read_name {
        append_name_suffix(rec, &name);
    }
    Ok(Some(name))
}

/// Replace the record's `RG` tag with `<existing value or empty>#<name>`.
fn set_read_group(rec: &mut Record, name: &str) -> Result<()> {
    let existing = get_string_aux(rec, b"RG").unwrap_or_default();
    let tagged = format!("{existing}#{name}");
    if rec.aux(b"RG").is_ok() {
        rec.remove_aux(b"RG").context("Failed to replace RG tag")?;
    }
    rec.push_aux(b"RG", Aux::String(&tagged))
        .context("Failed to set RG tag")?;
    Ok(())
}

/// Append `#<name>` to the record's read name.
fn append_name_suffix(rec: &mut Record, name: &str) {
    let mut qname = rec.qname().to_vec();
    qname.push(b'#');
    qname.extend_from_slice(name.as_bytes());
    rec.set_qname(&qname);
}

fn get_string_aux(rec: &Record, tag: &[u8]) -> Option<String> {
    match rec.aux(tag) {
        Ok(Aux::String(value)) => Some(value.to_string()),
        _ => None,
    }
}

/// The `@PG` line recording this invocation, appended after the expanded
/// read groups.
fn program_line(opts: &DecodeOpts) -> String {
    let mut line = format!(
        "@PG\tID:{name}\tPN:{name}\tVN:{version}",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION")
    );
    if !opts.command_line.is_empty() {
        line.push_str("\tCL:");
        line.push_str(&opts.command_line);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcodes::BarcodeTable;

    fn table() -> BarcodeTable {
        let text = "seq\tname\tlib\tsample\tdesc\n\
                    AAAA\t1\tlib1\tsam1\tfirst\n\
                    CCCC\t2\tlib2\tsam2\tsecond\n";
        BarcodeTable::from_reader(text.as_bytes()).unwrap()
    }

    fn record_with_aux(tags: &[(&str, &str)]) -> Record {
        let mut rec = Record::new();
        rec.set(b"read1", None, b"ACGTACGT", b"IIIIIIII");
        for (tag, value) in tags {
            rec.push_aux(tag.as_bytes(), Aux::String(value)).unwrap();
        }
        rec
    }

    fn summed_reads(table: &BarcodeTable) -> u64 {
        table.entries().map(|e| e.counts.reads).sum()
    }

    #[test]
    fn test_record_without_barcode_tag_passes_through() {
        let mut rec = record_with_aux(&[]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let name = process_record(&mut rec, &mut t, &DecodeOpts::default(), &mut stats).unwrap();
        assert_eq!(name, None);
        assert!(rec.aux(b"RG").is_err());
        assert_eq!(stats.assigned + stats.unmatched, 0);
        assert_eq!(summed_reads(&t), 0);
    }

    #[test]
    fn test_record_is_tagged_and_counted() {
        let mut rec = record_with_aux(&[("RG", "rg1"), ("BC", "AAAA")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let name = process_record(&mut rec, &mut t, &DecodeOpts::default(), &mut stats).unwrap();
        assert_eq!(name.as_deref(), Some("1"));
        assert_eq!(get_string_aux(&rec, b"RG").as_deref(), Some("rg1#1"));
        assert_eq!(stats.assigned, 1);
        assert_eq!(t.barcodes()[0].counts.reads, 1);
        assert_eq!(t.barcodes()[0].counts.perfect, 1);
    }

    #[test]
    fn test_record_without_existing_read_group() {
        let mut rec = record_with_aux(&[("BC", "CCCC")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        process_record(&mut rec, &mut t, &DecodeOpts::default(), &mut stats).unwrap();
        assert_eq!(get_string_aux(&rec, b"RG").as_deref(), Some("#2"));
    }

    #[test]
    fn test_unmatched_record_gets_sentinel_name() {
        let mut rec = record_with_aux(&[("BC", "GGGG")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let name = process_record(&mut rec, &mut t, &DecodeOpts::default(), &mut stats).unwrap();
        assert_eq!(name.as_deref(), Some("0"));
        assert_eq!(stats.unmatched, 1);
        assert_eq!(t.sentinel().counts.reads, 1);
    }

    #[test]
    fn test_long_barcode_read_is_truncated() {
        // extra trailing bases past the tag length are never examined
        let mut rec = record_with_aux(&[("BC", "AAAATTTT")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let name = process_record(&mut rec, &mut t, &DecodeOpts::default(), &mut stats).unwrap();
        assert_eq!(name.as_deref(), Some("1"));
        assert_eq!(t.barcodes()[0].counts.perfect, 1);
    }

    #[test]
    fn test_short_barcode_read_is_unmatched() {
        // missing tail positions score as mismatches, so a truncated read
        // never looks like a perfect match
        let mut rec = record_with_aux(&[("BC", "AA")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let name = process_record(&mut rec, &mut t, &DecodeOpts::default(), &mut stats).unwrap();
        assert_eq!(name.as_deref(), Some("0"));
        assert_eq!(stats.unmatched, 1);
        assert_eq!(t.barcodes()[0].counts.reads, 0);
        assert_eq!(t.barcodes()[0].counts.perfect, 0);
    }

    #[test]
    fn test_low_quality_conversion_rejects_match() {
        let mut rec = record_with_aux(&[("BC", "AAAA"), ("QT", "!!!!")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let opts = DecodeOpts {
            convert_low_quality: true,
            ..DecodeOpts::default()
        };
        // all four bases convert to N: too many no-calls to match
        let name = process_record(&mut rec, &mut t, &opts, &mut stats).unwrap();
        assert_eq!(name.as_deref(), Some("0"));
    }

    #[test]
    fn test_quality_length_mismatch_keeps_original_barcode() {
        let mut rec = record_with_aux(&[("BC", "AAAA"), ("QT", "!!")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let opts = DecodeOpts {
            convert_low_quality: true,
            ..DecodeOpts::default()
        };
        let name = process_record(&mut rec, &mut t, &opts, &mut stats).unwrap();
        // conversion is skipped, the raw barcode still matches
        assert_eq!(name.as_deref(), Some("1"));
    }

    #[test]
    fn test_change_read_name_appends_suffix() {
        let mut rec = record_with_aux(&[("BC", "AAAA")]);
        let mut t = table();
        let mut stats = DecodeStats::default();
        let opts = DecodeOpts {
            change_read_name: true,
            ..DecodeOpts::default()
        };
        process_record(&mut rec, &mut t, &opts, &mut stats).unwrap();
        assert_eq!(rec.qname(), b"read1#1");
    }

    #[test]
    fn test_qc_failed_read_is_not_pass_filter() {
        let mut rec = record_with_aux(&[("BC", "AAAA")]);
        rec.set_flags(rec.flags() | 0x200);
        let mut t = table();
        let mut stats = DecodeStats::default();
        process_record(&mut rec, &mut t, &DecodeOpts::default(), &mut stats).unwrap();
        assert_eq!(t.barcodes()[0].counts.reads, 1);
        assert_eq!(t.barcodes()[0].counts.pf_reads, 0);
    }
}
