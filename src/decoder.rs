//! Sparse excitation decoder.
//!
//! ORCA prints CASSCF and MRCI configurations relative to the orbital
//! partition: only the active window is written explicitly, and excitations
//! out of the internal space (holes) or into the external space (particles)
//! are listed as orbital indices. The spin labels of the hole and particle
//! orbitals are not written next to their indices. Instead they borrow slots
//! at the edges of the active code string:
//!
//! ```text
//! h 0h 1[ u d | 2 u 0 | d u ]p 9p 12
//!         ^^^             ^^^
//!     hole codes        particle codes
//!     (front, in        (back, last code
//!     hole order)       to last particle)
//! ```
//!
//! A doubly removed internal orbital (`h 3h 3`) or doubly filled external
//! orbital (`p 9p 9`) has no spin label and takes no slot; it becomes
//! [`OccupationCode::Empty`] or [`OccupationCode::Doubly`] directly.
//!
//! Decoding is split over the nine `(holes, particles)` combinations of
//! [`ExcitationRank`]. Every decode ends with a length check against the
//! partition; a mismatch is a hard error because it means the text layout
//! assumptions no longer hold.

use crate::occupation::{Determinant, OccupationCode};
use crate::partition::{OrbitalPartition, PartitionError};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding one excitation record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Hole or particle index outside its orbital range
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// More than two holes or particles
    #[error("Unsupported excitation with {holes} holes and {particles} particles (at most 2 of each)")]
    UnsupportedRank {
        /// Number of hole indices in the record
        holes: usize,
        /// Number of particle indices in the record
        particles: usize,
    },
    /// Not enough codes left for the boundary orbitals
    #[error("Active code string of length {length} has no code left for {side} orbital {orbital}")]
    CodesExhausted {
        /// "hole" or "particle"
        side: &'static str,
        /// Orbital that needed a code
        orbital: usize,
        /// Length of the code string
        length: usize,
    },
    /// Decoded vector length differs from the orbital count
    #[error("Orbital vector ({found}) not matching total number of orbitals ({expected})")]
    OrbitalCountMismatch {
        /// Length of the decoded vector
        found: usize,
        /// Total orbitals in the partition
        expected: usize,
    },
    /// CFG weights are squared amplitudes
    #[error("Negative CFG weight {0}")]
    NegativeWeight(f64),
}

type Result<T> = std::result::Result<T, DecodeError>;

/// Amplitude attached to a printed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Amplitude {
    /// Squared amplitude from a CFG line
    Weight(f64),
    /// Signed CI coefficient from a determinant line
    Coefficient(f64),
}

/// One parsed configuration line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcitationRecord {
    /// Internal orbitals that lost electrons (0, 1 or 2 entries)
    pub holes: Vec<usize>,
    /// External orbitals that gained electrons (0, 1 or 2 entries)
    pub particles: Vec<usize>,
    /// Active window plus borrowed boundary codes
    pub active_codes: Vec<OccupationCode>,
    /// Weight or coefficient
    pub amplitude: Amplitude,
}

impl ExcitationRecord {
    /// A record without holes or particles.
    pub fn active_only(active_codes: Vec<OccupationCode>, amplitude: Amplitude) -> Self {
        Self {
            holes: Vec::new(),
            particles: Vec::new(),
            active_codes,
            amplitude,
        }
    }
}

/// The nine hole/particle combinations a record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcitationRank {
    /// Pure active-space configuration
    Reference,
    /// One internal hole
    OneHole,
    /// Two internal holes (possibly the same orbital)
    TwoHoles,
    /// One external particle
    OneParticle,
    /// Two external particles (possibly the same orbital)
    TwoParticles,
    /// One hole, one particle
    OneHoleOneParticle,
    /// One hole, two particles
    OneHoleTwoParticles,
    /// Two holes, one particle
    TwoHolesOneParticle,
    /// Two holes, two particles
    TwoHolesTwoParticles,
}

impl ExcitationRank {
    /// All ranks in (holes, particles) order.
    pub const ALL: [ExcitationRank; 9] = [
        ExcitationRank::Reference,
        ExcitationRank::OneParticle,
        ExcitationRank::TwoParticles,
        ExcitationRank::OneHole,
        ExcitationRank::OneHoleOneParticle,
        ExcitationRank::OneHoleTwoParticles,
        ExcitationRank::TwoHoles,
        ExcitationRank::TwoHolesOneParticle,
        ExcitationRank::TwoHolesTwoParticles,
    ];

    /// Classifies a record by its hole and particle counts.
    pub fn classify(holes: usize, particles: usize) -> Result<Self> {
        use ExcitationRank::*;
        Ok(match (holes, particles) {
            (0, 0) => Reference,
            (1, 0) => OneHole,
            (2, 0) => TwoHoles,
            (0, 1) => OneParticle,
            (0, 2) => TwoParticles,
            (1, 1) => OneHoleOneParticle,
            (1, 2) => OneHoleTwoParticles,
            (2, 1) => TwoHolesOneParticle,
            (2, 2) => TwoHolesTwoParticles,
            _ => return Err(DecodeError::UnsupportedRank { holes, particles }),
        })
    }

    /// `(holes, particles)` counts of this rank.
    pub fn arity(self) -> (usize, usize) {
        use ExcitationRank::*;
        match self {
            Reference => (0, 0),
            OneHole => (1, 0),
            TwoHoles => (2, 0),
            OneParticle => (0, 1),
            TwoParticles => (0, 2),
            OneHoleOneParticle => (1, 1),
            OneHoleTwoParticles => (1, 2),
            TwoHolesOneParticle => (2, 1),
            TwoHolesTwoParticles => (2, 2),
        }
    }
}

/// A decoded determinant with its coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDeterminant {
    /// Full occupation vector
    pub determinant: Determinant,
    /// CI coefficient
    pub coefficient: f64,
    /// Set when the coefficient was rebuilt from a CFG weight
    pub reconstructed: bool,
}

/// Two-ended reader over the active code string.
struct CodeCursor<'a> {
    codes: &'a [OccupationCode],
    front: usize,
    back: usize,
}

impl<'a> CodeCursor<'a> {
    fn new(codes: &'a [OccupationCode]) -> Self {
        Self {
            codes,
            front: 0,
            back: codes.len(),
        }
    }

    fn take_front(&mut self, orbital: usize) -> Result<OccupationCode> {
        if self.front >= self.back {
            return Err(self.exhausted("hole", orbital));
        }
        let code = self.codes[self.front];
        self.front += 1;
        Ok(code)
    }

    fn take_back(&mut self, orbital: usize) -> Result<OccupationCode> {
        if self.back <= self.front {
            return Err(self.exhausted("particle", orbital));
        }
        self.back -= 1;
        Ok(self.codes[self.back])
    }

    fn middle(&self) -> &'a [OccupationCode] {
        &self.codes[self.front..self.back]
    }

    fn exhausted(&self, side: &'static str, orbital: usize) -> DecodeError {
        DecodeError::CodesExhausted {
            side,
            orbital,
            length: self.codes.len(),
        }
    }
}

/// Internal and external blocks being filled in by the decoder.
struct Blocks<'p> {
    partition: &'p OrbitalPartition,
    internal: Vec<OccupationCode>,
    external: Vec<OccupationCode>,
}

impl<'p> Blocks<'p> {
    fn new(partition: &'p OrbitalPartition) -> Self {
        Self {
            partition,
            internal: partition.internal_default(),
            external: partition.external_default(),
        }
    }

    fn set_hole(&mut self, orbital: usize, code: OccupationCode) -> Result<()> {
        self.partition.check_internal(orbital)?;
        self.internal[orbital] = code;
        Ok(())
    }

    fn set_particle(&mut self, orbital: usize, code: OccupationCode) -> Result<()> {
        self.partition.check_external(orbital)?;
        self.external[orbital - self.partition.external_first()] = code;
        Ok(())
    }

    fn one_hole(&mut self, cursor: &mut CodeCursor, h: usize) -> Result<()> {
        let code = cursor.take_front(h)?;
        self.set_hole(h, code)
    }

    fn two_holes(&mut self, cursor: &mut CodeCursor, h1: usize, h2: usize) -> Result<()> {
        if h1 == h2 {
            return self.set_hole(h1, OccupationCode::Empty);
        }
        let c1 = cursor.take_front(h1)?;
        let c2 = cursor.take_front(h2)?;
        self.set_hole(h1, c1)?;
        self.set_hole(h2, c2)
    }

    fn one_particle(&mut self, cursor: &mut CodeCursor, p: usize) -> Result<()> {
        let code = cursor.take_back(p)?;
        self.set_particle(p, code)
    }

    fn two_particles(&mut self, cursor: &mut CodeCursor, p1: usize, p2: usize) -> Result<()> {
        if p1 == p2 {
            return self.set_particle(p1, OccupationCode::Doubly);
        }
        let c2 = cursor.take_back(p2)?;
        let c1 = cursor.take_back(p1)?;
        self.set_particle(p1, c1)?;
        self.set_particle(p2, c2)
    }

    fn assemble(self, middle: &[OccupationCode]) -> Result<Determinant> {
        let mut codes = self.internal;
        codes.extend_from_slice(middle);
        codes.extend(self.external);
        let expected = self.partition.total();
        if codes.len() != expected {
            return Err(DecodeError::OrbitalCountMismatch {
                found: codes.len(),
                expected,
            });
        }
        Ok(Determinant::new(codes))
    }
}

/// Rebuilds the full occupation vector of a record.
pub fn decode_occupation(
    record: &ExcitationRecord,
    partition: &OrbitalPartition,
) -> Result<Determinant> {
    let rank = ExcitationRank::classify(record.holes.len(), record.particles.len())?;
    let h = &record.holes;
    let p = &record.particles;
    let mut cursor = CodeCursor::new(&record.active_codes);
    let mut blocks = Blocks::new(partition);

    match rank {
        ExcitationRank::Reference => {}
        ExcitationRank::OneHole => blocks.one_hole(&mut cursor, h[0])?,
        ExcitationRank::TwoHoles => blocks.two_holes(&mut cursor, h[0], h[1])?,
        ExcitationRank::OneParticle => blocks.one_particle(&mut cursor, p[0])?,
        ExcitationRank::TwoParticles => blocks.two_particles(&mut cursor, p[0], p[1])?,
        ExcitationRank::OneHoleOneParticle => {
            blocks.one_hole(&mut cursor, h[0])?;
            blocks.one_particle(&mut cursor, p[0])?;
        }
        ExcitationRank::OneHoleTwoParticles => {
            blocks.one_hole(&mut cursor, h[0])?;
            blocks.two_particles(&mut cursor, p[0], p[1])?;
        }
        ExcitationRank::TwoHolesOneParticle => {
            blocks.two_holes(&mut cursor, h[0], h[1])?;
            blocks.one_particle(&mut cursor, p[0])?;
        }
        ExcitationRank::TwoHolesTwoParticles => {
            blocks.two_holes(&mut cursor, h[0], h[1])?;
            blocks.two_particles(&mut cursor, p[0], p[1])?;
        }
    }

    blocks.assemble(cursor.middle())
}

/// Decodes a record into a determinant and its coefficient.
///
/// A [`Amplitude::Weight`] record has no sign information: the coefficient
/// is `sqrt(weight)` and the result is marked as reconstructed.
pub fn decode(record: &ExcitationRecord, partition: &OrbitalPartition) -> Result<DecodedDeterminant> {
    let determinant = decode_occupation(record, partition)?;
    let (coefficient, reconstructed) = match record.amplitude {
        Amplitude::Coefficient(c) => (c, false),
        Amplitude::Weight(w) if w < 0.0 => return Err(DecodeError::NegativeWeight(w)),
        Amplitude::Weight(w) => {
            warn!(
                "Determinant {} rebuilt from CFG weight {:.6}; coefficient sign is assumed positive",
                determinant, w
            );
            (w.sqrt(), true)
        }
    };
    Ok(DecodedDeterminant {
        determinant,
        coefficient,
        reconstructed,
    })
}

/// True when a CFG code string has no singly occupied orbital, i.e. the
/// configuration is a single determinant that ORCA may not print separately.
pub fn is_closed_shell_cfg(codes: &[OccupationCode]) -> bool {
    codes
        .iter()
        .all(|&c| matches!(c, OccupationCode::Empty | OccupationCode::Doubly))
}

#[cfg(test)]
mod tests {
    use super::*;
    use OccupationCode::*;

    fn partition() -> OrbitalPartition {
        OrbitalPartition::new(2, 3, 2).unwrap()
    }

    fn record(holes: &[usize], particles: &[usize], codes: &[OccupationCode]) -> ExcitationRecord {
        ExcitationRecord {
            holes: holes.to_vec(),
            particles: particles.to_vec(),
            active_codes: codes.to_vec(),
            amplitude: Amplitude::Coefficient(0.5),
        }
    }

    #[test]
    fn test_classify_all_nine() {
        for rank in ExcitationRank::ALL {
            let (h, p) = rank.arity();
            assert_eq!(ExcitationRank::classify(h, p).unwrap(), rank);
        }
        assert!(matches!(
            ExcitationRank::classify(3, 0),
            Err(DecodeError::UnsupportedRank { holes: 3, .. })
        ));
    }

    #[test]
    fn test_reference_weight_record() {
        // CFG record with weight 0.64 gives coefficient 0.8
        let rec = ExcitationRecord::active_only(vec![Alpha, Beta, Empty], Amplitude::Weight(0.64));
        let decoded = decode(&rec, &partition()).unwrap();
        assert_eq!(decoded.determinant.to_string(), "ddabeee");
        assert!((decoded.coefficient - 0.8).abs() < 1e-12);
        assert!(decoded.reconstructed);
    }

    #[test]
    fn test_one_hole_takes_front_code() {
        let rec = record(&[1], &[], &[Alpha, Beta, Empty, Empty]);
        let det = decode_occupation(&rec, &partition()).unwrap();
        assert_eq!(det.codes()[1], Alpha);
        assert_eq!(&det.codes()[2..5], &[Beta, Empty, Empty]);
        assert_eq!(det.len(), 7);
    }

    #[test]
    fn test_double_hole_same_orbital() {
        // No slot consumed, orbital emptied
        let rec = record(&[0, 0], &[], &[Doubly, Doubly, Doubly]);
        let det = decode_occupation(&rec, &partition()).unwrap();
        assert_eq!(det.to_string(), "eddddee");
    }

    #[test]
    fn test_two_particles_distinct() {
        // Second to last code goes to the first particle
        let rec = record(&[], &[5, 6], &[Doubly, Alpha, Empty, Alpha, Beta]);
        let det = decode_occupation(&rec, &partition()).unwrap();
        assert_eq!(det.to_string(), "dddaeab");
    }

    #[test]
    fn test_double_particle_same_orbital() {
        let rec = record(&[0, 1], &[6, 6], &[Empty, Empty, Doubly, Doubly, Empty]);
        let det = decode_occupation(&rec, &partition()).unwrap();
        assert_eq!(det.to_string(), "eeddeed");
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let rec = record(&[], &[], &[Doubly, Alpha]);
        assert_eq!(
            decode_occupation(&rec, &partition()),
            Err(DecodeError::OrbitalCountMismatch {
                found: 6,
                expected: 7
            })
        );
    }

    #[test]
    fn test_index_checks() {
        let rec = record(&[3], &[], &[Alpha, Beta, Empty, Empty]);
        assert!(matches!(
            decode_occupation(&rec, &partition()),
            Err(DecodeError::Partition(_))
        ));
        let rec = record(&[0, 1], &[], &[Alpha]);
        assert!(matches!(
            decode_occupation(&rec, &partition()),
            Err(DecodeError::CodesExhausted { side: "hole", .. })
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let rec = ExcitationRecord::active_only(vec![Doubly, Empty, Empty], Amplitude::Weight(-0.1));
        assert!(matches!(
            decode(&rec, &partition()),
            Err(DecodeError::NegativeWeight(_))
        ));
    }

    #[test]
    fn test_closed_shell_cfg() {
        assert!(is_closed_shell_cfg(&[Doubly, Empty]));
        assert!(!is_closed_shell_cfg(&[Doubly, Alpha]));
    }
}
