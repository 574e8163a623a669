use crate::barcodes::{Assignment, BarcodeTable};
use crate::DecodeError;

/// Returns true for the no-call symbols `N`, `n` and `.`.
#[inline(always)]
pub fn is_no_call(base: u8) -> bool {
    base == b'N' || base == b'n' || base == b'.'
}

/// Count the no-call positions in a sequence.
pub fn count_no_calls(seq: &[u8]) -> usize {
    seq.iter().filter(|&&b| is_no_call(b)).count()
}

/// Count mismatching positions between two sequences, ignoring no-calls.
///
/// A position contributes only when both sides carry a real call and the
/// calls differ; a no-call on either side never counts as a mismatch. A
/// position present on only one side always counts as a mismatch, so a
/// truncated barcode read can never score better than a full-length one.
/// For call-only sequences of equal length this is the Hamming distance.
pub fn count_mismatches(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .zip(b)
        .filter(|(&x, &y)| !is_no_call(x) && !is_no_call(y) && x != y)
        .count()
        + a.len().abs_diff(b.len())
}

/// Return a copy of `barcode` with low quality bases converted to 'N'.
///
/// Qualities are Phred-scaled ASCII (value - 33); any position at or below
/// `max_low_quality` becomes a no-call. Fails with
/// [`DecodeError::LengthMismatch`] when the two strings differ in length,
/// in which case the caller should keep the original barcode.
pub fn convert_low_quality(
    barcode: &[u8],
    quality: &[u8],
    max_low_quality: u8,
) -> Result<Vec<u8>, DecodeError> {
    if barcode.len() != quality.len() {
        return Err(DecodeError::LengthMismatch {
            barcode_len: barcode.len(),
            quality_len: quality.len(),
        });
    }

    Ok(barcode
        .iter()
        .zip(quality)
        .map(|(&b, &q)| {
            if (q as i32 - 33) <= max_low_quality as i32 {
                b'N'
            } else {
                b
            }
        })
        .collect())
}

/// Find the barcode entry best matching `observed`.
///
/// Performs a linear best/second-best scan over the table (ties keep the
/// first-seen entry as best and feed the second-best tracker). The best
/// entry is accepted only when the observed read has at most `max_no_calls`
/// no-calls, the best mismatch count is at most `max_mismatches`, and the
/// second-best count exceeds the best by at least `min_mismatch_delta`;
/// otherwise the read is left unmatched.
pub fn find_best_match(
    observed: &[u8],
    table: &BarcodeTable,
    max_no_calls: usize,
    max_mismatches: usize,
    min_mismatch_delta: usize,
) -> Assignment {
    let mut best: Option<usize> = None;
    let mut nm_best = table.tag_len();
    let mut nm_second = table.tag_len();

    for (i, entry) in table.barcodes().iter().enumerate() {
        let nm = count_mismatches(&entry.seq, observed);
        if nm < nm_best {
            if best.is_some() {
                nm_second = nm_best;
            }
            nm_best = nm;
            best = Some(i);
        } else if nm < nm_second {
            nm_second = nm;
        }
    }

    match best {
        Some(i)
            if count_no_calls(observed) <= max_no_calls
                && nm_best <= max_mismatches
                && nm_second - nm_best >= min_mismatch_delta =>
        {
            Assignment::Barcode(i)
        }
        _ => Assignment::Unmatched,
    }
}
