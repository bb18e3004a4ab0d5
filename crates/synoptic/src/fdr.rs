//! Decoy-based false discovery rate estimation and monotonic q-values.
//!
//! FDR is estimated over duplicate groups, not rows: one physical PSM that
//! maps to several proteins arrives as several rows, and counting each row
//! would bias the decoy/forward ratio.

use serde::{Deserialize, Serialize};

use crate::psm::NormalizedMatch;

/// How protein names are recognized as decoys.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecoyConvention {
    /// Case-insensitive protein name prefix, e.g. `Reversed_` or `XXX_`
    pub prefix: String,
}

impl Default for DecoyConvention {
    fn default() -> Self {
        Self {
            prefix: "Reversed_".into(),
        }
    }
}

impl DecoyConvention {
    pub fn is_decoy(&self, protein: &str) -> bool {
        protein.len() >= self.prefix.len()
            && protein[..self.prefix.len()].eq_ignore_ascii_case(&self.prefix)
    }
}

/// Which peptide identity delimits a duplicate group. Source tools disagree
/// on whether two modification states of one clean sequence are the same
/// identification, so this is an explicit configuration point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKey {
    /// Modification-annotated sequence: different mod states compete separately
    #[default]
    AnnotatedSequence,
    /// Clean sequence: mod states of one peptide collapse into one group
    CleanSequence,
}

/// Assign per-group FDR and monotonic q-values in place.
///
/// # Invariants
/// * `matches` must already be sorted better-score-first (rows of one PSM
///   contiguous); [`crate::rank::assign_ranks`] followed by the final
///   better-first sort satisfies this.
pub fn assign_fdr(matches: &mut [NormalizedMatch], convention: &DecoyConvention, key: DuplicateKey) {
    let use_clean = key == DuplicateKey::CleanSequence;
    let mut forward = 0u64;
    let mut reverse = 0u64;

    let mut i = 0;
    while i < matches.len() {
        let mut j = i + 1;
        while j < matches.len()
            && matches[j].duplicate_key(use_clean) == matches[i].duplicate_key(use_clean)
        {
            j += 1;
        }

        // the group is decoy only if it has proteins and every one of them
        // matches; a group with no protein mappings at all counts as forward
        let mut proteins = matches[i..j]
            .iter()
            .flat_map(|m| m.proteins.iter())
            .peekable();
        let decoy = proteins.peek().is_some()
            && proteins.all(|protein| convention.is_decoy(protein));

        match decoy {
            true => reverse += 1,
            false => forward += 1,
        }

        let fdr = match forward {
            0 => 1.0,
            _ => reverse as f64 / forward as f64,
        };
        for m in &mut matches[i..j] {
            m.fdr = fdr;
        }
        i = j;
    }

    // cumulative minimum from the worst row back to the best; q-value read
    // best-to-worst is then non-decreasing
    let mut q_min = 1.0f64;
    for m in matches.iter_mut().rev() {
        q_min = q_min.min(m.fdr);
        m.q_value = q_min;
    }
}
