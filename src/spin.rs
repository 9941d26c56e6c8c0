//! Spin adaptation of single excitations.
//!
//! CIS/TDDFT amplitudes are stored per spatial excitation `occ -> virt`.
//! For a restricted (closed-shell) reference these have to be expanded into
//! Slater determinants before they can be written:
//!
//! | Target | Determinants | Amplitude |
//! |--------|--------------|-----------|
//! | Singlet | `occ=b, virt=a` and `occ=a, virt=b` | `c / sqrt(2)` each |
//! | Triplet | `occ=a, virt=a` | `c` |
//!
//! For an unrestricted reference the vector is the alpha block followed by
//! the beta block, and each excitation already refers to one spin: the
//! occupied spin orbital is emptied and the virtual one filled. No scaling.

use crate::occupation::{Determinant, OccupationCode};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;
use thiserror::Error;

/// Errors raised by the spin adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpinError {
    /// Restricted references only support singlet and triplet targets
    #[error("No spin adaptation for multiplicity {0} on a restricted reference (only 1 and 3 are supported)")]
    UnsupportedMultiplicity(u32),
    /// The adaptation does not fit the reference type
    #[error("Adaptation {adaptation:?} cannot be applied to a {reference} reference")]
    ReferenceMismatch {
        /// Requested adaptation
        adaptation: SpinAdaptation,
        /// "restricted" or "unrestricted"
        reference: &'static str,
    },
    /// Excitation index outside the reference vector
    #[error("Excitation {occ} -> {virt} is outside the reference of length {length}")]
    IndexOutOfRange {
        /// Occupied orbital
        occ: usize,
        /// Virtual orbital
        virt: usize,
        /// Length of the spin block the indices refer to
        length: usize,
    },
}

type Result<T> = std::result::Result<T, SpinError>;

/// Spin of an unrestricted excitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Spin {
    /// Alpha spin block
    Alpha,
    /// Beta spin block
    Beta,
}

/// One spatial (or spin-orbital) single excitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SingleExcitation {
    /// Occupied orbital index
    pub occ: usize,
    /// Virtual orbital index
    pub virt: usize,
    /// Spin block; always `Alpha` for restricted references
    pub spin: Spin,
}

/// How a single excitation becomes determinants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinAdaptation {
    /// Two determinants scaled by 1/sqrt(2)
    Singlet,
    /// One alpha/alpha determinant
    Triplet,
    /// Pass-through for spin-orbital excitations
    Unadapted,
}

impl SpinAdaptation {
    /// Picks the adaptation for a target multiplicity and reference type.
    pub fn for_reference(multiplicity: u32, restricted: bool) -> Result<Self> {
        if !restricted {
            return Ok(SpinAdaptation::Unadapted);
        }
        match multiplicity {
            1 => Ok(SpinAdaptation::Singlet),
            3 => Ok(SpinAdaptation::Triplet),
            m => Err(SpinError::UnsupportedMultiplicity(m)),
        }
    }
}

/// Single-determinant reference of a CIS/TDDFT calculation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceDeterminant {
    /// Closed shell: doubly occupied then empty
    Restricted(Vec<OccupationCode>),
    /// Separate alpha and beta blocks, concatenated when written
    Unrestricted {
        /// Alpha block: alpha-occupied then empty
        alpha: Vec<OccupationCode>,
        /// Beta block: beta-occupied then empty
        beta: Vec<OccupationCode>,
    },
}

impl ReferenceDeterminant {
    /// Closed-shell reference with `n_occupied` doubly occupied orbitals.
    pub fn restricted(n_occupied: usize, n_virtual: usize) -> Self {
        let mut codes = vec![OccupationCode::Doubly; n_occupied];
        codes.extend(vec![OccupationCode::Empty; n_virtual]);
        ReferenceDeterminant::Restricted(codes)
    }

    /// Open-shell reference built from per-spin occupied/virtual counts.
    pub fn unrestricted(
        n_occ_alpha: usize,
        n_virt_alpha: usize,
        n_occ_beta: usize,
        n_virt_beta: usize,
    ) -> Self {
        let mut alpha = vec![OccupationCode::Alpha; n_occ_alpha];
        alpha.extend(vec![OccupationCode::Empty; n_virt_alpha]);
        let mut beta = vec![OccupationCode::Beta; n_occ_beta];
        beta.extend(vec![OccupationCode::Empty; n_virt_beta]);
        ReferenceDeterminant::Unrestricted { alpha, beta }
    }

    /// True for a closed-shell reference.
    pub fn is_restricted(&self) -> bool {
        matches!(self, ReferenceDeterminant::Restricted(_))
    }

    /// Length of the alpha block (the whole vector when restricted).
    pub fn alpha_len(&self) -> usize {
        match self {
            ReferenceDeterminant::Restricted(codes) => codes.len(),
            ReferenceDeterminant::Unrestricted { alpha, .. } => alpha.len(),
        }
    }

    /// The reference as one occupation vector.
    pub fn determinant(&self) -> Determinant {
        match self {
            ReferenceDeterminant::Restricted(codes) => Determinant::new(codes.clone()),
            ReferenceDeterminant::Unrestricted { alpha, beta } => {
                let mut codes = alpha.clone();
                codes.extend_from_slice(beta);
                Determinant::new(codes)
            }
        }
    }

    fn reference_name(&self) -> &'static str {
        if self.is_restricted() {
            "restricted"
        } else {
            "unrestricted"
        }
    }
}

/// Expands single excitations into determinants for one target state.
#[derive(Debug, Clone)]
pub struct SpinAdapter {
    adaptation: SpinAdaptation,
    reference: ReferenceDeterminant,
}

impl SpinAdapter {
    /// Pairs an adaptation with its reference, rejecting invalid combinations.
    pub fn new(adaptation: SpinAdaptation, reference: ReferenceDeterminant) -> Result<Self> {
        let valid = match adaptation {
            SpinAdaptation::Singlet | SpinAdaptation::Triplet => reference.is_restricted(),
            SpinAdaptation::Unadapted => !reference.is_restricted(),
        };
        if !valid {
            return Err(SpinError::ReferenceMismatch {
                adaptation,
                reference: reference.reference_name(),
            });
        }
        Ok(Self {
            adaptation,
            reference,
        })
    }

    /// The adaptation in use.
    pub fn adaptation(&self) -> SpinAdaptation {
        self.adaptation
    }

    /// The reference determinant.
    pub fn reference(&self) -> &ReferenceDeterminant {
        &self.reference
    }

    /// Expands one excitation with amplitude `c` into one or two determinants.
    pub fn expand(&self, excitation: SingleExcitation, c: f64) -> Result<Vec<(Determinant, f64)>> {
        let mut base = self.reference.determinant();
        let (occ, virt) = self.positions(excitation, base.len())?;

        match self.adaptation {
            SpinAdaptation::Singlet => {
                let mut second = base.clone();
                base.codes_mut()[occ] = OccupationCode::Beta;
                base.codes_mut()[virt] = OccupationCode::Alpha;
                second.codes_mut()[occ] = OccupationCode::Alpha;
                second.codes_mut()[virt] = OccupationCode::Beta;
                Ok(vec![(base, c * FRAC_1_SQRT_2), (second, c * FRAC_1_SQRT_2)])
            }
            SpinAdaptation::Triplet => {
                base.codes_mut()[occ] = OccupationCode::Alpha;
                base.codes_mut()[virt] = OccupationCode::Alpha;
                Ok(vec![(base, c)])
            }
            SpinAdaptation::Unadapted => {
                let filled = match excitation.spin {
                    Spin::Alpha => OccupationCode::Alpha,
                    Spin::Beta => OccupationCode::Beta,
                };
                base.codes_mut()[occ] = OccupationCode::Empty;
                base.codes_mut()[virt] = filled;
                Ok(vec![(base, c)])
            }
        }
    }

    /// Absolute positions of the excitation in the full vector.
    fn positions(&self, excitation: SingleExcitation, total: usize) -> Result<(usize, usize)> {
        let alpha_len = self.reference.alpha_len();
        let (offset, block_len) = match excitation.spin {
            Spin::Beta if !self.reference.is_restricted() => (alpha_len, total - alpha_len),
            _ => (0, alpha_len),
        };
        if excitation.occ >= block_len || excitation.virt >= block_len {
            return Err(SpinError::IndexOutOfRange {
                occ: excitation.occ,
                virt: excitation.virt,
                length: block_len,
            });
        }
        Ok((offset + excitation.occ, offset + excitation.virt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc(occ: usize, virt: usize, spin: Spin) -> SingleExcitation {
        SingleExcitation { occ, virt, spin }
    }

    #[test]
    fn test_singlet_expansion() {
        let adapter = SpinAdapter::new(
            SpinAdaptation::Singlet,
            ReferenceDeterminant::restricted(2, 2),
        )
        .unwrap();
        let dets = adapter.expand(exc(1, 2, Spin::Alpha), -0.9).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].0.to_string(), "dbae");
        assert_eq!(dets[1].0.to_string(), "dabe");
        // Both carry c / sqrt(2) with the source sign
        for (_, c) in &dets {
            assert!((c.abs() - 0.9 / 2f64.sqrt()).abs() < 1e-12);
            assert!(*c < 0.0);
        }
    }

    #[test]
    fn test_triplet_expansion() {
        let adapter = SpinAdapter::new(
            SpinAdaptation::Triplet,
            ReferenceDeterminant::restricted(2, 2),
        )
        .unwrap();
        let dets = adapter.expand(exc(0, 3, Spin::Alpha), 0.7).unwrap();
        assert_eq!(dets, vec![(Determinant::parse("adea").unwrap(), 0.7)]);
    }

    #[test]
    fn test_unrestricted_beta_offset() {
        let reference = ReferenceDeterminant::unrestricted(2, 1, 1, 2);
        assert_eq!(reference.determinant().to_string(), "aaebee");
        let adapter = SpinAdapter::new(SpinAdaptation::Unadapted, reference).unwrap();

        let alpha = adapter.expand(exc(1, 2, Spin::Alpha), 0.3).unwrap();
        assert_eq!(alpha[0].0.to_string(), "aeabee");
        let beta = adapter.expand(exc(0, 2, Spin::Beta), 0.4).unwrap();
        assert_eq!(beta[0].0.to_string(), "aaeeeb");
        assert_eq!(beta[0].1, 0.4);
    }

    #[test]
    fn test_adaptation_choice() {
        assert_eq!(
            SpinAdaptation::for_reference(1, true).unwrap(),
            SpinAdaptation::Singlet
        );
        assert_eq!(
            SpinAdaptation::for_reference(3, true).unwrap(),
            SpinAdaptation::Triplet
        );
        assert_eq!(
            SpinAdaptation::for_reference(2, false).unwrap(),
            SpinAdaptation::Unadapted
        );
        assert_eq!(
            SpinAdaptation::for_reference(5, true),
            Err(SpinError::UnsupportedMultiplicity(5))
        );
    }

    #[test]
    fn test_mismatched_reference_rejected() {
        let result = SpinAdapter::new(
            SpinAdaptation::Unadapted,
            ReferenceDeterminant::restricted(1, 1),
        );
        assert!(matches!(result, Err(SpinError::ReferenceMismatch { .. })));
    }

    #[test]
    fn test_out_of_range_excitation() {
        let adapter = SpinAdapter::new(
            SpinAdaptation::Triplet,
            ReferenceDeterminant::restricted(1, 1),
        )
        .unwrap();
        assert!(adapter.expand(exc(0, 5, Spin::Alpha), 1.0).is_err());
    }
}
