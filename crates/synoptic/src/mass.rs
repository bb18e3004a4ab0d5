//! Monoisotopic masses and mass/charge arithmetic shared by every stage.

pub const H2O: f64 = 18.0105633;
pub const PROTON: f64 = 1.00727646688;

/// Spacing between adjacent isotope peaks of a peptide precursor, in Da.
/// Used to correct for the instrument selecting a C13 peak instead of the
/// monoisotopic one.
pub const ISOTOPE_SPACING: f64 = 1.00235;

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

pub trait Mass {
    fn monoisotopic(&self) -> f64;
}

impl Mass for u8 {
    fn monoisotopic(&self) -> f64 {
        match self {
            b'A' => 71.0371138,
            b'R' => 156.1011110,
            b'N' => 114.0429274,
            b'D' => 115.0269430,
            b'C' => 103.0091845,
            b'E' => 129.0425931,
            b'Q' => 128.0585775,
            b'G' => 57.0214637,
            b'H' => 137.0589119,
            b'I' => 113.0840640,
            b'L' => 113.0840640,
            b'K' => 128.0949630,
            b'M' => 131.0404846,
            b'F' => 147.0684139,
            b'P' => 97.0527639,
            b'S' => 87.0320284,
            b'T' => 101.0476785,
            b'W' => 186.0793130,
            b'Y' => 163.0633285,
            b'V' => 99.0684139,
            b'U' => 150.9536334,
            b'O' => 237.1477269,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

/// Sum of residue masses plus one water for an unmodified peptide.
/// Residues outside [`VALID_AA`] are returned as the error.
pub fn peptide_mass(clean_sequence: &str) -> Result<f64, char> {
    let mut mass = H2O;
    for c in clean_sequence.bytes() {
        if !VALID_AA.contains(&c) {
            return Err(c as char);
        }
        mass += c.monoisotopic();
    }
    Ok(mass)
}

/// Neutral monoisotopic mass from a reported m/z and charge state.
pub fn neutral_mass(mz: f64, charge: u8) -> f64 {
    (mz - PROTON) * charge as f64
}

/// Conventional (M+H)+ value for a neutral monoisotopic mass.
pub fn mh(monoisotopic: f64) -> f64 {
    monoisotopic + PROTON
}

/// Relative mass error in parts per million.
pub fn ppm_error(delta: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        0.0
    } else {
        delta / reference * 1E6
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic() > 0.0);
        }
    }

    #[test]
    fn glycine_dipeptide() {
        // 2x Gly + water
        let mass = peptide_mass("GG").unwrap();
        assert!((mass - 132.0534907).abs() < 1E-4);
    }

    #[test]
    fn invalid_residue() {
        assert_eq!(peptide_mass("ABZ"), Err('B'));
    }

    #[test]
    fn charge_round_trip() {
        let mono = 2044.1234;
        let mz = mono / 2.0 + PROTON;
        assert!((neutral_mass(mz, 2) - mono).abs() < 1E-9);
    }
}
