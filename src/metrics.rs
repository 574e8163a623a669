use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::barcodes::{BarcodeEntry, BarcodeTable};
use crate::DecodeOpts;

/// Totals computed over the final table state. A pure function of the
/// counters, so recomputing it on an unmodified table is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSummary {
    /// Sum of `reads` over all entries, sentinel included.
    pub total_reads: u64,
    /// Sum of `pf_reads` over all entries, sentinel included.
    pub total_pf_reads: u64,
    /// Max of `reads` over the real barcodes.
    pub max_reads: u64,
    /// Max of `pf_reads` over the real barcodes.
    pub max_pf_reads: u64,
    /// Sum of `pf_reads` over the real barcodes only.
    pub total_pf_reads_assigned: u64,
    /// Number of real barcodes.
    pub barcode_count: u64,
}

/// Compute the cross-barcode totals from the table's counters.
pub fn summarize(table: &BarcodeTable) -> MetricsSummary {
    let mut summary = MetricsSummary {
        total_reads: table.sentinel().counts.reads,
        total_pf_reads: table.sentinel().counts.pf_reads,
        max_reads: 0,
        max_pf_reads: 0,
        total_pf_reads_assigned: 0,
        barcode_count: table.barcodes().len() as u64,
    };
    for entry in table.barcodes() {
        summary.total_reads += entry.counts.reads;
        summary.total_pf_reads += entry.counts.pf_reads;
        summary.total_pf_reads_assigned += entry.counts.pf_reads;
        summary.max_reads = summary.max_reads.max(entry.counts.reads);
        summary.max_pf_reads = summary.max_pf_reads.max(entry.counts.pf_reads);
    }
    summary
}

/// A zero denominator yields 0, never NaN.
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Write the per-barcode metrics report.
///
/// A `##` parameter comment block precedes a fixed 16-column header row,
/// then one row per real barcode in table order, then the sentinel row
/// with its name blanked, its perfect-match counters forced to zero and
/// a zero normalized-matches denominator.
pub fn write_metrics(path: &Path, table: &BarcodeTable, opts: &DecodeOpts) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create metrics file {}", path.display()))?;
    let mut w = BufWriter::new(file);
    let summary = summarize(table);

    writeln!(w, "##")?;
    writeln!(
        w,
        "# BARCODE_TAG_NAME={} MAX_MISMATCHES={} MIN_MISMATCH_DELTA={} MAX_NO_CALLS={} ",
        opts.barcode_tag, opts.max_mismatches, opts.min_mismatch_delta, opts.max_no_calls
    )?;
    writeln!(w, "##")?;
    writeln!(w, "#")?;
    writeln!(w)?;
    writeln!(w, "##")?;

    writeln!(
        w,
        "BARCODE\tBARCODE_NAME\tLIBRARY_NAME\tSAMPLE_NAME\tDESCRIPTION\t\
         READS\tPF_READS\tPERFECT_MATCHES\tPF_PERFECT_MATCHES\t\
         ONE_MISMATCH_MATCHES\tPF_ONE_MISMATCH_MATCHES\tPCT_MATCHES\t\
         RATIO_THIS_BARCODE_TO_BEST_BARCODE_PCT\tPF_PCT_MATCHES\t\
         PF_RATIO_THIS_BARCODE_TO_BEST_BARCODE_PCT\tPF_NORMALIZED_MATCHES"
    )?;

    for entry in table.barcodes() {
        write_row(
            &mut w,
            entry,
            &entry.name,
            entry.counts.perfect,
            entry.counts.pf_perfect,
            &summary,
            summary.total_pf_reads_assigned,
        )?;
    }

    // The sentinel renders last, with blanked name, zeroed perfect-match
    // counters and a zero normalized-matches denominator.
    write_row(
        &mut w,
        table.sentinel(),
        "",
        0,
        0,
        &summary,
        0,
    )?;

    w.flush().context("Failed to write metrics file")?;
    Ok(())
}

fn write_row<W: Write>(
    w: &mut W,
    entry: &BarcodeEntry,
    name: &str,
    perfect: u64,
    pf_perfect: u64,
    summary: &MetricsSummary,
    assigned_denominator: u64,
) -> std::io::Result<()> {
    let c = &entry.counts;
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
        String::from_utf8_lossy(&entry.seq),
        name,
        entry.library,
        entry.sample,
        entry.description,
        c.reads,
        c.pf_reads,
        perfect,
        pf_perfect,
        c.one_mismatch,
        c.pf_one_mismatch,
        ratio(c.reads, summary.total_reads),
        ratio(c.reads, summary.max_reads),
        ratio(c.pf_reads, summary.total_pf_reads),
        ratio(c.pf_reads, summary.max_pf_reads),
        ratio(c.pf_reads * summary.barcode_count, assigned_denominator),
    )
}
