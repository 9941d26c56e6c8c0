//! Orbital occupation codes and determinants.
//!
//! Every spatial orbital of a Slater determinant carries one of four
//! occupation codes. The codes have three textual encodings that appear in
//! the files this crate reads and writes:
//!
//! | Code | Electrons | Determinant file | ORCA determinant | ORCA CFG |
//! |------|-----------|------------------|------------------|----------|
//! | [`OccupationCode::Empty`] | 0 | `e` | `0` | `0` |
//! | [`OccupationCode::Alpha`] | 1 | `a` | `u` | `1` (lossy) |
//! | [`OccupationCode::Beta`] | 1 | `b` | `d` | `1` (lossy) |
//! | [`OccupationCode::Doubly`] | 2 | `d` | `2` | `2` |
//!
//! The derived ordering follows the numeric codes 0 < 1 < 2 < 3, which is
//! the order the determinant file writer sorts by (descending).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Occupation of a single spatial orbital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OccupationCode {
    /// No electron (`e`)
    Empty,
    /// One alpha electron (`a`)
    Alpha,
    /// One beta electron (`b`)
    Beta,
    /// Two paired electrons (`d`)
    Doubly,
}

impl OccupationCode {
    /// All four codes in ascending numeric order.
    pub const ALL: [OccupationCode; 4] = [
        OccupationCode::Empty,
        OccupationCode::Alpha,
        OccupationCode::Beta,
        OccupationCode::Doubly,
    ];

    /// Number of electrons in the orbital.
    pub fn electrons(self) -> u32 {
        match self {
            OccupationCode::Empty => 0,
            OccupationCode::Alpha | OccupationCode::Beta => 1,
            OccupationCode::Doubly => 2,
        }
    }

    /// Numeric code 0..=3.
    pub fn code(self) -> u8 {
        match self {
            OccupationCode::Empty => 0,
            OccupationCode::Alpha => 1,
            OccupationCode::Beta => 2,
            OccupationCode::Doubly => 3,
        }
    }

    /// Character used in the determinant file.
    pub fn as_char(self) -> char {
        match self {
            OccupationCode::Empty => 'e',
            OccupationCode::Alpha => 'a',
            OccupationCode::Beta => 'b',
            OccupationCode::Doubly => 'd',
        }
    }

    /// Parses a determinant-file character (`e`, `a`, `b`, `d`).
    pub fn from_det_char(c: char) -> Option<Self> {
        match c {
            'e' => Some(OccupationCode::Empty),
            'a' => Some(OccupationCode::Alpha),
            'b' => Some(OccupationCode::Beta),
            'd' => Some(OccupationCode::Doubly),
            _ => None,
        }
    }

    /// Parses a character from an ORCA determinant bracket (`2`, `u`, `d`, `0`).
    pub fn from_orca_det(c: char) -> Option<Self> {
        match c {
            '2' => Some(OccupationCode::Doubly),
            'u' => Some(OccupationCode::Alpha),
            'd' => Some(OccupationCode::Beta),
            '0' => Some(OccupationCode::Empty),
            _ => None,
        }
    }

    /// Parses a character from an ORCA CFG bracket (`2`, `1`, `0`).
    ///
    /// A singly occupied CFG orbital has no spin label; it is read as alpha.
    /// Callers only use this on CFGs without open shells unless they accept
    /// the loss.
    pub fn from_orca_cfg(c: char) -> Option<Self> {
        match c {
            '2' => Some(OccupationCode::Doubly),
            '1' => Some(OccupationCode::Alpha),
            '0' => Some(OccupationCode::Empty),
            _ => None,
        }
    }
}

impl fmt::Display for OccupationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// An occupation vector: one [`OccupationCode`] per orbital.
///
/// Equality is positional. Ordering is lexicographic on the numeric codes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Determinant(Vec<OccupationCode>);

impl Determinant {
    /// Wraps a list of codes.
    pub fn new(codes: Vec<OccupationCode>) -> Self {
        Self(codes)
    }

    /// Parses the `e/a/b/d` string of the determinant file.
    pub fn parse(text: &str) -> Option<Self> {
        text.chars()
            .map(OccupationCode::from_det_char)
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    /// Number of orbitals.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-orbital vector.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Codes as a slice.
    pub fn codes(&self) -> &[OccupationCode] {
        &self.0
    }

    /// Mutable access used by the spin adapter.
    pub fn codes_mut(&mut self) -> &mut [OccupationCode] {
        &mut self.0
    }

    /// Total electron count.
    pub fn electrons(&self) -> u32 {
        self.0.iter().map(|c| c.electrons()).sum()
    }

    /// Number of singly occupied alpha orbitals.
    pub fn alpha_count(&self) -> usize {
        self.0.iter().filter(|&&c| c == OccupationCode::Alpha).count()
    }

    /// Number of singly occupied beta orbitals.
    pub fn beta_count(&self) -> usize {
        self.0.iter().filter(|&&c| c == OccupationCode::Beta).count()
    }

    /// Spin multiplicity `n_alpha - n_beta + 1` implied by the open shells.
    pub fn implied_multiplicity(&self) -> i64 {
        self.alpha_count() as i64 - self.beta_count() as i64 + 1
    }

    /// Returns a copy with the codes in `range` removed.
    pub fn without(&self, range: std::ops::Range<usize>) -> Self {
        let mut codes = self.0.clone();
        codes.drain(range);
        Self(codes)
    }
}

impl fmt::Display for Determinant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.0 {
            write!(f, "{}", code.as_char())?;
        }
        Ok(())
    }
}

impl From<Vec<OccupationCode>> for Determinant {
    fn from(codes: Vec<OccupationCode>) -> Self {
        Self(codes)
    }
}
