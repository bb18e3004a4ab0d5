use serde::Serialize;

use crate::modification::ModificationEntry;

/// Canonical scored record for one peptide-spectrum match, independent of the
/// search engine that produced it. Created once per input line; rank, FDR and
/// q-value are filled in by the bulk stages after sorting.
#[derive(Clone, Debug, Serialize)]
pub struct NormalizedMatch {
    /// Scan (spectrum) number
    pub scan: u32,
    /// Precursor charge state
    pub charge: u8,
    /// Reported precursor m/z
    pub precursor_mz: f64,
    /// Sequence with all annotation stripped
    pub clean_sequence: String,
    /// Sequence as annotated by the source tool
    pub annotated_sequence: String,
    /// Resolved dynamic + re-derived static modifications
    pub modifications: Vec<ModificationEntry>,
    /// Theoretical monoisotopic mass (clean sequence + modifications)
    pub calc_mono_mass: f64,
    /// Neutral mass derived from precursor m/z and charge
    pub observed_precursor_mass: f64,
    /// Isotope-corrected mass error, Da
    pub del_m: f64,
    /// Isotope-corrected mass error, ppm
    pub del_m_ppm: f64,
    /// Conventional (M+H)+ of the theoretical mass
    pub mh: f64,
    /// Primary search engine score
    pub score: f64,
    /// Dense per-scan rank, 1 = best
    pub rank: u32,
    /// Protein mappings, one entry per protein, optionally `Name[start~end]`
    pub proteins: Vec<String>,
    /// Decoy-estimated false discovery rate of this match's duplicate group
    pub fdr: f64,
    /// Monotonic q-value (cumulative minimum FDR, best-to-worst)
    pub q_value: f64,
}

impl NormalizedMatch {
    /// Key identifying one physical PSM regardless of how many proteins it
    /// maps to.
    pub fn duplicate_key(&self, use_clean_sequence: bool) -> (u32, u8, &str) {
        let peptide = if use_clean_sequence {
            &self.clean_sequence
        } else {
            &self.annotated_sequence
        };
        (self.scan, self.charge, peptide)
    }
}
