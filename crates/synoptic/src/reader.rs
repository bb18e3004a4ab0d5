//! Tab-delimited PSM input: header detection, column mapping, row parsing.
//!
//! Column-to-field mapping happens exactly once, producing a [`ColumnSchema`]
//! of resolved indices that is validated before any row is processed. Rows
//! then fail individually (`Result<_, RowError>`) without touching the rest
//! of the file.

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::fdr::{DecoyConvention, DuplicateKey};
use crate::rank::ScoreDirection;
use crate::{Error, RowError};

/// Where a source tool puts its modification annotations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModAnnotation {
    /// Mass deltas embedded in the peptide string, e.g. `A+15.995BC`
    #[default]
    Inline,
    /// Comma list in a dedicated column, e.g. `15M(15.9949), Dehydro 52`
    SideChannel,
}

/// Per-tool conventions that vary between source search engines while the
/// transform algorithms stay identical.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceOptions {
    pub score_direction: ScoreDirection,
    pub decoy: DecoyConvention,
    pub duplicate_key: DuplicateKey,
    /// Acceptance cutoff for synopsis emission, in the score's own direction
    pub acceptance_threshold: f64,
    pub mod_annotation: ModAnnotation,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            score_direction: ScoreDirection::HigherIsBetter,
            decoy: DecoyConvention::default(),
            duplicate_key: DuplicateKey::default(),
            acceptance_threshold: f64::NEG_INFINITY,
            mod_annotation: ModAnnotation::default(),
        }
    }
}

/// Resolved column indices for one input file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub scan: usize,
    pub charge: usize,
    pub precursor_mz: usize,
    pub peptide: usize,
    pub score: usize,
    pub protein: Option<usize>,
    pub modifications: Option<usize>,
    pub reported_mass: Option<usize>,
}

fn known(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "scan" | "scannum" | "scannumber" | "spectrum" => Some("scan"),
        "charge" | "chargestate" => Some("charge"),
        "precursormz" | "precursorm/z" | "precursor_mz" | "mz" => Some("precursor_mz"),
        "peptide" | "sequence" | "annotation" => Some("peptide"),
        "score" | "msgfscore" | "xcorr" | "hyperscore" | "specevalue" | "evalue" | "probability" => {
            Some("score")
        }
        "protein" | "proteins" | "reference" => Some("protein"),
        "modifications" | "modificationlist" | "mods" => Some("modifications"),
        "calculatedmonomass" | "theoreticalmass" | "monoisotopicmass" | "mass" => {
            Some("reported_mass")
        }
        _ => None,
    }
}

impl ColumnSchema {
    /// Heuristic from the flat-file convention: a data row carries an integer
    /// in its second column (charge or scan), a header row does not.
    pub fn looks_like_header(first_record: &StringRecord) -> bool {
        match first_record.get(1) {
            Some(field) => field.trim().parse::<i64>().is_err(),
            None => true,
        }
    }

    /// Fixed column order applied when the file carries no header.
    pub fn default_order() -> Self {
        Self {
            scan: 0,
            charge: 1,
            precursor_mz: 2,
            reported_mass: Some(3),
            peptide: 4,
            modifications: Some(5),
            protein: Some(6),
            score: 7,
        }
    }

    /// Build the schema from a header row. Unknown header names are logged,
    /// not rejected; a missing required column aborts the file.
    pub fn from_header(header: &StringRecord) -> Result<Self, Error> {
        let mut scan = None;
        let mut charge = None;
        let mut precursor_mz = None;
        let mut peptide = None;
        let mut score = None;
        let mut protein = None;
        let mut modifications = None;
        let mut reported_mass = None;

        for (index, name) in header.iter().enumerate() {
            match known(name.trim()) {
                Some("scan") => scan = scan.or(Some(index)),
                Some("charge") => charge = charge.or(Some(index)),
                Some("precursor_mz") => precursor_mz = precursor_mz.or(Some(index)),
                Some("peptide") => peptide = peptide.or(Some(index)),
                Some("score") => score = score.or(Some(index)),
                Some("protein") => protein = protein.or(Some(index)),
                Some("modifications") => modifications = modifications.or(Some(index)),
                Some("reported_mass") => reported_mass = reported_mass.or(Some(index)),
                _ => log::warn!("ignoring unrecognized column '{}'", name.trim()),
            }
        }

        let require = |col: Option<usize>, name: &str| {
            col.ok_or_else(|| Error::InvalidHeader(format!("missing required column '{}'", name)))
        };

        Ok(Self {
            scan: require(scan, "Scan")?,
            charge: require(charge, "Charge")?,
            precursor_mz: require(precursor_mz, "PrecursorMZ")?,
            peptide: require(peptide, "Peptide")?,
            score: require(score, "Score")?,
            protein,
            modifications,
            reported_mass,
        })
    }

    pub fn parse_row(&self, record: &StringRecord) -> Result<ParsedRow, RowError> {
        let field = |index: usize, name: &'static str| {
            record
                .get(index)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(RowError::MissingColumn(name))
        };
        let numeric = |index: usize, name: &'static str| {
            field(index, name).and_then(|s| {
                s.parse::<f64>()
                    .map_err(|_| RowError::InvalidNumber(name, s.into()))
            })
        };

        let scan = field(self.scan, "Scan")?
            .parse::<u32>()
            .map_err(|_| RowError::InvalidNumber("Scan", record[self.scan].into()))?;
        let charge = field(self.charge, "Charge")?
            .parse::<u8>()
            .map_err(|_| RowError::InvalidNumber("Charge", record[self.charge].into()))?;
        let precursor_mz = numeric(self.precursor_mz, "PrecursorMZ")?;
        let peptide = field(self.peptide, "Peptide")?.to_string();

        let score = numeric(self.score, "Score")?;
        let reported_mass = match self.reported_mass {
            Some(index) => match record.get(index).map(str::trim) {
                Some("") | None => 0.0,
                Some(s) => s
                    .parse::<f64>()
                    .map_err(|_| RowError::InvalidNumber("Mass", s.into()))?,
            },
            None => 0.0,
        };

        // multi-protein mappings are semicolon- or comma-delimited
        let proteins = match self.protein.and_then(|index| record.get(index)) {
            Some(list) => list
                .split([';', ','])
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            None => Vec::new(),
        };

        let modification_list = self
            .modifications
            .and_then(|index| record.get(index))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(ParsedRow {
            scan,
            charge,
            precursor_mz,
            peptide,
            score,
            reported_mass,
            proteins,
            modification_list,
        })
    }
}

/// One raw input row after column mapping, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRow {
    pub scan: u32,
    pub charge: u8,
    pub precursor_mz: f64,
    pub peptide: String,
    pub score: f64,
    pub reported_mass: f64,
    pub proteins: Vec<String>,
    pub modification_list: Option<String>,
}
