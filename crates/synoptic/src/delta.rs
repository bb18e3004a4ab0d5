//! Isotope-corrected precursor mass error.
//!
//! Precursor selection can pick an adjacent isotope peak instead of the
//! monoisotopic one, shifting the observed mass by a near-integer multiple of
//! [`ISOTOPE_SPACING`]. The corrector removes that shift before computing the
//! ppm error, so a +1 isotope selection does not masquerade as a ~500 ppm
//! mass error.

use crate::mass::{self, ISOTOPE_SPACING};
use crate::Throttle;

/// Beyond this raw delta the discrepancy is no isotope artifact but a likely
/// modification-assignment error; correction would only hide it.
pub const MAX_PLAUSIBLE_DELTA: f64 = 15.0;

const MAX_ISOTOPE_SHIFT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaMass {
    /// Observed minus theoretical, uncorrected, Da
    pub raw_da: f64,
    /// Isotope-corrected error, Da
    pub corrected_da: f64,
    /// Isotope-corrected error, ppm
    pub corrected_ppm: f64,
    /// Number of isotope spacings removed
    pub isotope_shift: i64,
}

#[derive(Debug, Default)]
pub struct DeltaCorrector {
    implausible_throttle: Throttle,
}

impl DeltaCorrector {
    /// Compute the corrected mass error between an observed neutral precursor
    /// mass and the theoretical mass of the assigned peptide.
    pub fn correct(&mut self, observed_mass: f64, theoretical_mass: f64) -> DeltaMass {
        let raw_da = observed_mass - theoretical_mass;

        if raw_da.abs() > MAX_PLAUSIBLE_DELTA {
            if self.implausible_throttle.tick() {
                log::warn!(
                    "implausible precursor delta of {:.3} Da vs theoretical {:.4} \
                     (occurrence {}); likely modification assignment error",
                    raw_da,
                    theoretical_mass,
                    self.implausible_throttle.occurrences(),
                );
            }
            return DeltaMass {
                raw_da,
                corrected_da: raw_da,
                corrected_ppm: mass::ppm_error(raw_da, theoretical_mass),
                isotope_shift: 0,
            };
        }

        // closed form of min over n of |raw - n * spacing|
        let isotope_shift = (raw_da / ISOTOPE_SPACING).round() as i64;
        let isotope_shift = isotope_shift.clamp(-MAX_ISOTOPE_SHIFT, MAX_ISOTOPE_SHIFT);
        let corrected_da = raw_da - isotope_shift as f64 * ISOTOPE_SPACING;

        DeltaMass {
            raw_da,
            corrected_da,
            corrected_ppm: mass::ppm_error(corrected_da, theoretical_mass),
            isotope_shift,
        }
    }

    pub fn implausible_count(&self) -> u64 {
        self.implausible_throttle.occurrences()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_shift_for_small_delta() {
        let mut corrector = DeltaCorrector::default();
        let delta = corrector.correct(1000.005, 1000.0);
        assert_eq!(delta.isotope_shift, 0);
        assert!((delta.corrected_da - 0.005).abs() < 1E-9);
        assert!((delta.corrected_ppm - 5.0).abs() < 0.01);
    }

    #[test]
    fn plus_one_isotope_is_removed() {
        let mut corrector = DeltaCorrector::default();
        // observed one isotope peak up, plus 2 ppm of genuine error
        let theoretical = 1500.0;
        let observed = theoretical + ISOTOPE_SPACING + 0.003;
        let delta = corrector.correct(observed, theoretical);
        assert_eq!(delta.isotope_shift, 1);
        assert!((delta.corrected_da - 0.003).abs() < 1E-9);
        assert!((delta.corrected_ppm - 2.0).abs() < 0.01);
    }

    #[test]
    fn negative_shift() {
        let mut corrector = DeltaCorrector::default();
        let delta = corrector.correct(2000.0 - 2.0 * ISOTOPE_SPACING, 2000.0);
        assert_eq!(delta.isotope_shift, -2);
        assert!(delta.corrected_da.abs() < 1E-9);
    }

    #[test]
    fn implausible_delta_skips_correction() {
        let mut corrector = DeltaCorrector::default();
        let delta = corrector.correct(1080.0, 1000.0);
        assert_eq!(delta.isotope_shift, 0);
        assert_eq!(delta.corrected_da, delta.raw_da);
        assert!((delta.corrected_ppm - 80_000.0).abs() < 1.0);
        assert_eq!(corrector.implausible_count(), 1);
    }
}
