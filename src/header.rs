use crate::barcodes::{BarcodeEntry, BarcodeTable};

/// Expand every `@RG` declaration in `header_text` into one declaration per
/// barcode entry, sentinel first.
///
/// This is a pure transformation: the returned text contains all non-RG
/// lines in their original order, then the expanded `@RG` block, then
/// `program_line` (the `@PG` entry recording this invocation). No original
/// `@RG` line survives.
///
/// Per emitted declaration for barcode name `n`: `ID` and `PU` (when
/// present) get a `#n` suffix; `LB`, `SM` and `DS` are replaced with the
/// entry's library, sample and description for real barcodes and kept
/// unchanged for the sentinel; every other tag is copied as-is, preserving
/// the original tag order.
pub fn expand_read_groups(
    header_text: &str,
    table: &BarcodeTable,
    program_line: &str,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut read_groups: Vec<Vec<(String, String)>> = Vec::new();

    for line in header_text.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with("@RG") {
            read_groups.push(parse_read_group(line));
        } else {
            lines.push(line.to_string());
        }
    }

    for rg in &read_groups {
        lines.push(render_read_group(rg, "0", None));
        for entry in table.barcodes() {
            lines.push(render_read_group(rg, &entry.name, Some(entry)));
        }
    }
    lines.push(program_line.to_string());

    lines.join("\n") + "\n"
}

/// Split an `@RG` line into ordered (tag, value) pairs.
fn parse_read_group(line: &str) -> Vec<(String, String)> {
    line.split('\t')
        .skip(1)
        .filter_map(|field| field.split_once(':'))
        .map(|(tag, value)| (tag.to_string(), value.to_string()))
        .collect()
}

/// Render one expanded `@RG` line for the barcode named `name`; `entry` is
/// `None` for the sentinel.
fn render_read_group(
    fields: &[(String, String)],
    name: &str,
    entry: Option<&BarcodeEntry>,
) -> String {
    let mut line = String::from("@RG");
    for (tag, value) in fields {
        let substituted = match (tag.as_str(), entry) {
            ("ID", _) | ("PU", _) => format!("{value}#{name}"),
            ("LB", Some(e)) => e.library.clone(),
            ("SM", Some(e)) => e.sample.clone(),
            ("DS", Some(e)) => e.description.clone(),
            _ => value.clone(),
        };
        line.push('\t');
        line.push_str(tag);
        line.push(':');
        line.push_str(&substituted);
    }
    line
}
