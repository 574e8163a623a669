use std::fs::File;
use std::path::Path;

use anyhow::Context;

use crate::matcher::count_mismatches;
use crate::DecodeError;

/// Per-barcode counters, each split into an all-reads and a pass-filter
/// variant. Monotonically increasing over a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BarcodeCounts {
    pub reads: u64,
    pub pf_reads: u64,
    pub perfect: u64,
    pub pf_perfect: u64,
    pub one_mismatch: u64,
    pub pf_one_mismatch: u64,
}

/// One row of the barcode definition file, plus its live counters.
#[derive(Debug, Clone)]
pub struct BarcodeEntry {
    pub seq: Vec<u8>,
    pub name: String,
    pub library: String,
    pub sample: String,
    pub description: String,
    pub counts: BarcodeCounts,
}

/// Outcome of matching an observed barcode read against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// No confident match; the read belongs to the sentinel entry.
    Unmatched,
    /// Index into [`BarcodeTable::barcodes`].
    Barcode(usize),
}

/// The set of known barcodes plus the reserved "unmatched" sentinel.
///
/// The sentinel's sequence is all no-calls of the shared tag length, its
/// name is `"0"` and its remaining fields are empty. It collects counts
/// like any real entry but is excluded from cross-barcode denominators
/// at report time.
#[derive(Debug, Clone)]
pub struct BarcodeTable {
    sentinel: BarcodeEntry,
    barcodes: Vec<BarcodeEntry>,
    tag_len: usize,
}

impl BarcodeTable {
    /// Load a barcode table from tab-separated definition text.
    ///
    /// The first line is a header and is discarded; every following row is
    /// `sequence<TAB>name<TAB>library<TAB>sample<TAB>description`. All
    /// sequences must share one length, which also becomes the sentinel's
    /// length. Duplicate sequences are kept as-is, in file order.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, DecodeError> {
        let mut rows = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut barcodes: Vec<BarcodeEntry> = Vec::new();
        let mut tag_len = 0usize;

        for result in rows.records() {
            let row = result.map_err(|e| DecodeError::Format {
                reason: e.to_string(),
            })?;
            if row.len() != 5 {
                return Err(DecodeError::Format {
                    reason: format!(
                        "expected 5 tab-separated fields, found {} in row '{}'",
                        row.len(),
                        row.iter().collect::<Vec<_>>().join(" ")
                    ),
                });
            }

            let seq = row[0].as_bytes().to_vec();
            if seq.is_empty() {
                return Err(DecodeError::Format {
                    reason: format!("empty barcode sequence for '{}'", &row[1]),
                });
            }
            if tag_len == 0 {
                tag_len = seq.len();
            } else if seq.len() != tag_len {
                return Err(DecodeError::Format {
                    reason: format!(
                        "barcode '{}' is a different length to the previous barcodes",
                        &row[0]
                    ),
                });
            }

            barcodes.push(BarcodeEntry {
                seq,
                name: row[1].to_string(),
                library: row[2].to_string(),
                sample: row[3].to_string(),
                description: row[4].to_string(),
                counts: BarcodeCounts::default(),
            });
        }

        // The sentinel sequence cannot be built until the tag length is known.
        let sentinel = BarcodeEntry {
            seq: vec![b'N'; tag_len],
            name: "0".to_string(),
            library: String::new(),
            sample: String::new(),
            description: String::new(),
            counts: BarcodeCounts::default(),
        };

        Ok(Self {
            sentinel,
            barcodes,
            tag_len,
        })
    }

    /// Load a barcode table from a file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open barcode file {}", path.display()))?;
        let table = Self::from_reader(file)
            .with_context(|| format!("Failed to parse barcode file {}", path.display()))?;
        Ok(table)
    }

    /// The shared length of all barcode sequences (0 for an empty table).
    pub fn tag_len(&self) -> usize {
        self.tag_len
    }

    /// The non-sentinel entries, in definition-file order.
    pub fn barcodes(&self) -> &[BarcodeEntry] {
        &self.barcodes
    }

    /// The reserved "unmatched" entry.
    pub fn sentinel(&self) -> &BarcodeEntry {
        &self.sentinel
    }

    /// All entries, sentinel first.
    pub fn entries(&self) -> impl Iterator<Item = &BarcodeEntry> {
        std::iter::once(&self.sentinel).chain(self.barcodes.iter())
    }

    /// Resolve an assignment to its entry.
    pub fn entry(&self, assignment: Assignment) -> &BarcodeEntry {
        match assignment {
            Assignment::Unmatched => &self.sentinel,
            Assignment::Barcode(i) => &self.barcodes[i],
        }
    }

    /// Update the counters of the assigned entry for one decoded read.
    ///
    /// `reads`/`pf_reads` are bumped unconditionally; the perfect and
    /// one-mismatch counters are bumped when `observed` is exactly 0 or 1
    /// mismatches from the entry's sequence. Note that the sentinel's all-N
    /// sequence never mismatches a full-length read, so its perfect counters
    /// do grow; they are zeroed when the metrics are rendered.
    pub fn record_match(&mut self, assignment: Assignment, observed: &[u8], is_pf: bool) {
        let entry = match assignment {
            Assignment::Unmatched => &mut self.sentinel,
            Assignment::Barcode(i) => &mut self.barcodes[i],
        };
        let nm = count_mismatches(&entry.seq, observed);

        entry.counts.reads += 1;
        if is_pf {
            entry.counts.pf_reads += 1;
        }
        if nm == 0 {
            entry.counts.perfect += 1;
            if is_pf {
                entry.counts.pf_perfect += 1;
            }
        }
        if nm == 1 {
            entry.counts.one_mismatch += 1;
            if is_pf {
                entry.counts.pf_one_mismatch += 1;
            }
        }
    }
}
