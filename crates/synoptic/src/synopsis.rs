//! Final synopsis output: threshold filtering, multi-protein expansion, and
//! reproducible tab-delimited rows.

use std::io::Write;
use std::sync::LazyLock;

use regex::Regex;

use crate::psm::NormalizedMatch;
use crate::reader::SourceOptions;
use crate::Error;

pub const HEADER: [&str; 14] = [
    "ResultID",
    "Scan",
    "Charge",
    "PrecursorMZ",
    "DelM",
    "DelM_PPM",
    "MH",
    "Peptide",
    "Protein",
    "ProteinPosition",
    "Score",
    "Rank",
    "FDR",
    "QValue",
];

static PROTEIN_POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\[([^\[\]]+)\]$").unwrap());

/// Split `Name[start~end]` into name and position; mappings without the
/// bracket suffix get an empty position.
pub fn split_protein_position(mapping: &str) -> (&str, &str) {
    match PROTEIN_POSITION.captures(mapping) {
        Some(caps) => {
            let name = caps.get(1).map_or("", |m| m.as_str()).trim_end();
            let position = caps.get(2).map_or("", |m| m.as_str());
            (name, position)
        }
        None => (mapping, ""),
    }
}

/// Fixed five-decimal formatting; output must be byte-identical across runs
/// on identical input, which shortest-representation float printing is not.
fn dec5(value: f64) -> String {
    format!("{:.5}", value)
}

fn dec4(value: f64) -> String {
    format!("{:.4}", value)
}

/// Scores span tool conventions from hyperscores (~50) to E-values (~1e-12);
/// small magnitudes switch to scientific notation so they do not collapse
/// to zero.
fn format_score(value: f64) -> String {
    if value == 0.0 || value.abs() >= 0.001 {
        dec5(value)
    } else {
        format!("{:.5e}", value)
    }
}

struct ExpandedRow<'a> {
    psm: &'a NormalizedMatch,
    protein: &'a str,
    position: &'a str,
}

/// Expand accepted matches into one row per protein mapping and write the
/// synopsis table, assigning a strictly increasing ResultID over the final
/// sorted row set. Returns the number of rows written.
pub fn write_synopsis<W: Write>(
    matches: &[NormalizedMatch],
    options: &SourceOptions,
    writer: W,
) -> Result<usize, Error> {
    let mut rows = Vec::new();
    for psm in matches {
        if !options
            .score_direction
            .passes(psm.score, options.acceptance_threshold)
        {
            continue;
        }
        if psm.proteins.is_empty() {
            rows.push(ExpandedRow {
                psm,
                protein: "",
                position: "",
            });
        }
        for mapping in &psm.proteins {
            let (protein, position) = split_protein_position(mapping);
            rows.push(ExpandedRow {
                psm,
                protein,
                position,
            });
        }
    }

    rows.sort_by(|a, b| {
        options
            .score_direction
            .compare(a.psm.score, b.psm.score)
            .then_with(|| a.psm.scan.cmp(&b.psm.scan))
            .then_with(|| a.psm.charge.cmp(&b.psm.charge))
            .then_with(|| a.psm.clean_sequence.cmp(&b.psm.clean_sequence))
            .then_with(|| a.protein.cmp(b.protein))
    });

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    wtr.write_record(HEADER)?;

    let mut itoa = itoa::Buffer::new();
    for (index, row) in rows.iter().enumerate() {
        let mut record = csv::ByteRecord::new();
        record.push_field(itoa.format(index + 1).as_bytes());
        record.push_field(itoa.format(row.psm.scan).as_bytes());
        record.push_field(itoa.format(row.psm.charge).as_bytes());
        record.push_field(dec5(row.psm.precursor_mz).as_bytes());
        record.push_field(dec5(row.psm.del_m).as_bytes());
        record.push_field(dec4(row.psm.del_m_ppm).as_bytes());
        record.push_field(dec5(row.psm.mh).as_bytes());
        record.push_field(row.psm.annotated_sequence.as_bytes());
        record.push_field(row.protein.as_bytes());
        record.push_field(row.position.as_bytes());
        record.push_field(format_score(row.psm.score).as_bytes());
        record.push_field(itoa.format(row.psm.rank).as_bytes());
        record.push_field(dec4(row.psm.fdr).as_bytes());
        record.push_field(dec4(row.psm.q_value).as_bytes());
        wtr.write_byte_record(&record)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}
