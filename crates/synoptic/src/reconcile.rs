//! Cross-check of recomputed theoretical mass against the mass the source
//! tool reported.

use crate::mass;
use crate::modification::{total_modification_mass, ModificationEntry};
use crate::{RowError, Throttle};

/// Recomputed vs. reported masses are expected to agree to well under this;
/// larger gaps point at a misconfigured modification catalog.
pub const MASS_MISMATCH_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct ReconciledMass {
    /// Residue masses + water + all modification masses
    pub theoretical: f64,
    /// (M+H)+ of the theoretical mass
    pub mh: f64,
}

/// Recomputes theoretical monoisotopic mass and validates the tool-reported
/// value, rate-limiting the advisory so a systematically bad catalog cannot
/// flood the log.
#[derive(Debug, Default)]
pub struct MassReconciler {
    mismatch_throttle: Throttle,
}

impl MassReconciler {
    /// `reported_mass` of (near) zero means the tool omitted the field and
    /// the recomputed value stands in for it.
    pub fn reconcile(
        &mut self,
        clean_sequence: &str,
        modifications: &[ModificationEntry],
        reported_mass: f64,
    ) -> Result<ReconciledMass, RowError> {
        let theoretical = mass::peptide_mass(clean_sequence).map_err(RowError::InvalidResidue)?
            + total_modification_mass(modifications);

        let reported = if reported_mass.abs() <= f64::EPSILON {
            theoretical
        } else {
            reported_mass
        };

        if (theoretical - reported).abs() > MASS_MISMATCH_TOLERANCE && self.mismatch_throttle.tick()
        {
            log::warn!(
                "recomputed mass {:.4} differs from reported mass {:.4} for {} (occurrence {}); \
                 check the modification catalog",
                theoretical,
                reported,
                clean_sequence,
                self.mismatch_throttle.occurrences(),
            );
        }

        Ok(ReconciledMass {
            theoretical,
            mh: mass::mh(theoretical),
        })
    }

    /// Total mismatches observed for the completion report.
    pub fn mismatches(&self) -> u64 {
        self.mismatch_throttle.occurrences()
    }
}
