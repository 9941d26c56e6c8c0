//! CI state vectors and the wfoverlap determinant file.
//!
//! The determinant file is plain text:
//!
//! ```text
//! 2 7 3                                  nstates norb ndets
//! dddabee   0.9000000    0.0000000
//! ddabdee   0.3000000   -0.7000000
//! ...
//! ```
//!
//! Determinants are the union over all states written together, sorted in
//! descending code order (`d > b > a > e`, position by position), with one
//! `%11.7f` column per state and zeros for absent entries.

use crate::decoder::DecodedDeterminant;
use crate::occupation::Determinant;
use crate::truncate::{truncate, TruncationSummary};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised when building, writing or reading determinant files.
#[derive(Error, Debug)]
pub enum CiVectorError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Nothing to write
    #[error("No determinants to write: {0}")]
    Empty(String),
    /// Determinants of different length in one file
    #[error("Determinant {determinant} has {found} orbitals, expected {expected}")]
    InconsistentOrbitals {
        /// Offending determinant
        determinant: String,
        /// Its length
        found: usize,
        /// Length of the first determinant
        expected: usize,
    },
    /// Malformed determinant file
    #[error("Parse error in determinant file: {0}")]
    Parse(String),
}

type Result<T> = std::result::Result<T, CiVectorError>;

/// CI vector of one electronic state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    /// Spin multiplicity
    pub multiplicity: u32,
    /// Root index as printed by the QM program
    pub root: usize,
    /// Total energy (Eh)
    pub energy: f64,
    /// Determinant coefficients
    pub coefficients: BTreeMap<Determinant, f64>,
    /// Determinants whose coefficient came from a CFG weight
    pub reconstructed: BTreeSet<Determinant>,
}

impl StateVector {
    /// Empty state vector.
    pub fn new(multiplicity: u32, root: usize, energy: f64) -> Self {
        Self {
            multiplicity,
            root,
            energy,
            coefficients: BTreeMap::new(),
            reconstructed: BTreeSet::new(),
        }
    }

    /// State vector with explicit coefficients.
    pub fn with_coefficients(
        multiplicity: u32,
        root: usize,
        energy: f64,
        coefficients: BTreeMap<Determinant, f64>,
    ) -> Self {
        Self {
            coefficients,
            ..Self::new(multiplicity, root, energy)
        }
    }

    /// Adds a decoded determinant.
    ///
    /// An explicit coefficient replaces a reconstructed one for the same
    /// determinant; a reconstructed value never replaces an explicit one.
    pub fn insert(&mut self, decoded: DecodedDeterminant) {
        let DecodedDeterminant {
            determinant,
            coefficient,
            reconstructed,
        } = decoded;
        if reconstructed {
            if self.coefficients.contains_key(&determinant)
                && !self.reconstructed.contains(&determinant)
            {
                return;
            }
            self.reconstructed.insert(determinant.clone());
        } else {
            self.reconstructed.remove(&determinant);
        }
        self.coefficients.insert(determinant, coefficient);
    }

    /// True when any coefficient is a CFG reconstruction.
    pub fn is_lossy(&self) -> bool {
        !self.reconstructed.is_empty()
    }

    /// Number of determinants.
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    /// True when the vector has no determinants.
    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Sum of squared coefficients.
    pub fn norm(&self) -> f64 {
        self.coefficients.values().map(|c| c * c).sum()
    }

    /// Greedy truncation against `wfthres`.
    pub fn truncate(&mut self, wfthres: f64) -> TruncationSummary {
        let summary = truncate(&mut self.coefficients, wfthres);
        let kept = &self.coefficients;
        self.reconstructed.retain(|d| kept.contains_key(d));
        summary
    }

    /// Drops determinants whose open shells imply another multiplicity.
    pub fn retain_multiplicity(&mut self) -> usize {
        let mult = self.multiplicity as i64;
        let before = self.coefficients.len();
        self.coefficients.retain(|det, _| {
            let keep = det.implied_multiplicity() == mult;
            if !keep {
                warn!(
                    "Determinant {} does not match multiplicity {}. Skipping determinant",
                    det, mult
                );
            }
            keep
        });
        let kept = &self.coefficients;
        self.reconstructed.retain(|d| kept.contains_key(d));
        before - self.coefficients.len()
    }
}

/// All states of one multiplicity from one output file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiplicityBlock {
    /// Spin multiplicity
    pub multiplicity: u32,
    /// States in root order
    pub states: Vec<StateVector>,
}

impl MultiplicityBlock {
    /// Empty block.
    pub fn new(multiplicity: u32) -> Self {
        Self {
            multiplicity,
            states: Vec::new(),
        }
    }

    /// Energies of the states in root order.
    pub fn energies(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.energy).collect()
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True without states.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Determinant-by-state coefficient table, the in-memory form of the
/// determinant file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeterminantTable {
    nstates: usize,
    norb: usize,
    rows: Vec<(Determinant, Vec<f64>)>,
}

impl DeterminantTable {
    /// Builds the table for the given states.
    pub fn from_states(states: &[StateVector]) -> Result<Self> {
        if states.is_empty() {
            return Err(CiVectorError::Empty("no states given".to_string()));
        }
        let all: BTreeSet<&Determinant> = states.iter().flat_map(|s| s.coefficients.keys()).collect();
        let norb = match all.iter().next() {
            Some(first) => first.len(),
            None => {
                return Err(CiVectorError::Empty(
                    "all state vectors are empty".to_string(),
                ))
            }
        };
        if let Some(bad) = all.iter().find(|d| d.len() != norb) {
            return Err(CiVectorError::InconsistentOrbitals {
                determinant: bad.to_string(),
                found: bad.len(),
                expected: norb,
            });
        }

        let rows = all
            .into_iter()
            .rev()
            .map(|det| {
                let column = states
                    .iter()
                    .map(|s| s.coefficients.get(det).copied().unwrap_or(0.0))
                    .collect();
                (det.clone(), column)
            })
            .collect();
        Ok(Self {
            nstates: states.len(),
            norb,
            rows,
        })
    }

    /// Number of state columns.
    pub fn nstates(&self) -> usize {
        self.nstates
    }

    /// Orbitals per determinant.
    pub fn norb(&self) -> usize {
        self.norb
    }

    /// Number of determinant rows.
    pub fn ndets(&self) -> usize {
        self.rows.len()
    }

    /// Rows in file order.
    pub fn rows(&self) -> &[(Determinant, Vec<f64>)] {
        &self.rows
    }

    /// Removes rows whose implied multiplicity differs from `multiplicity`.
    /// Returns the number of rows removed.
    pub fn retain_multiplicity(&mut self, multiplicity: u32) -> usize {
        let before = self.rows.len();
        self.rows.retain(|(det, _)| {
            let keep = det.implied_multiplicity() == multiplicity as i64;
            if !keep {
                warn!("Wrong multiplicity for determinant {}. Skipping determinant", det);
            }
            keep
        });
        before - self.rows.len()
    }

    /// Parses a determinant file.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| CiVectorError::Parse("empty file".to_string()))?;
        let counts: Vec<usize> = header
            .split_whitespace()
            .map(|t| t.parse::<usize>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| CiVectorError::Parse(format!("bad header '{}': {}", header, e)))?;
        if counts.len() != 3 {
            return Err(CiVectorError::Parse(format!("bad header '{}'", header)));
        }
        let (nstates, norb, ndets) = (counts[0], counts[1], counts[2]);

        let mut rows = Vec::with_capacity(ndets);
        for line in lines {
            let mut parts = line.split_whitespace();
            let det_text = parts.next().unwrap_or_default();
            let det = Determinant::parse(det_text)
                .ok_or_else(|| CiVectorError::Parse(format!("bad determinant '{}'", det_text)))?;
            if det.len() != norb {
                return Err(CiVectorError::InconsistentOrbitals {
                    determinant: det_text.to_string(),
                    found: det.len(),
                    expected: norb,
                });
            }
            let column: Vec<f64> = parts
                .map(|t| t.parse::<f64>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| CiVectorError::Parse(format!("bad coefficient in '{}': {}", line, e)))?;
            if column.len() != nstates {
                return Err(CiVectorError::Parse(format!(
                    "expected {} coefficients, found {} in '{}'",
                    nstates,
                    column.len(),
                    line
                )));
            }
            rows.push((det, column));
        }
        if rows.len() != ndets {
            return Err(CiVectorError::Parse(format!(
                "header announces {} determinants, found {}",
                ndets,
                rows.len()
            )));
        }
        Ok(Self {
            nstates,
            norb,
            rows,
        })
    }

    /// Reads a determinant file from disk.
    pub fn read(path: &Path) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Writes the table to disk.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for DeterminantTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {}", self.nstates, self.norb, self.rows.len())?;
        for (det, column) in &self.rows {
            write!(f, "{}", det)?;
            for c in column {
                write!(f, " {:11.7} ", c)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Renders the determinant file for a set of states.
pub fn format_ci_vectors(states: &[StateVector]) -> Result<String> {
    Ok(DeterminantTable::from_states(states)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(s: &str) -> Determinant {
        Determinant::parse(s).unwrap()
    }

    fn state(entries: &[(&str, f64)]) -> StateVector {
        StateVector::with_coefficients(
            1,
            0,
            -1.0,
            entries.iter().map(|(d, c)| (det(d), *c)).collect(),
        )
    }

    #[test]
    fn test_format_layout() {
        let s1 = state(&[("ddee", 0.9), ("dbae", 0.3)]);
        let s2 = state(&[("dabe", -0.7)]);
        let text = format_ci_vectors(&[s1, s2]).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "2 4 3");
        // d > b > a > e, compared position by position
        assert_eq!(lines[1], "ddee   0.9000000    0.0000000 ");
        assert_eq!(lines[2], "dbae   0.3000000    0.0000000 ");
        assert_eq!(lines[3], "dabe   0.0000000   -0.7000000 ");
    }

    #[test]
    fn test_empty_and_inconsistent() {
        assert!(matches!(
            format_ci_vectors(&[]),
            Err(CiVectorError::Empty(_))
        ));
        let bad = state(&[("ddee", 0.9), ("dde", 0.1)]);
        assert!(matches!(
            format_ci_vectors(&[bad]),
            Err(CiVectorError::InconsistentOrbitals { .. })
        ));
    }

    #[test]
    fn test_parse_written_table() {
        let s1 = state(&[("ddee", 0.9), ("dbae", 0.3)]);
        let table = DeterminantTable::from_states(&[s1]).unwrap();
        let parsed = DeterminantTable::parse(&table.to_string()).unwrap();
        assert_eq!(parsed.ndets(), 2);
        assert_eq!(parsed.norb(), 4);
        assert_eq!(parsed.rows()[1].1, vec![0.3]);
    }

    #[test]
    fn test_retain_multiplicity() {
        let s1 = state(&[("ddee", 0.9), ("daae", 0.3), ("dbae", 0.2)]);
        let mut table = DeterminantTable::from_states(&[s1]).unwrap();
        assert_eq!(table.retain_multiplicity(1), 1);
        assert_eq!(table.ndets(), 2);
        assert!(table.to_string().starts_with("1 4 2\n"));
    }

    #[test]
    fn test_explicit_overrides_reconstructed() {
        let mut s = StateVector::new(1, 0, -1.0);
        s.insert(DecodedDeterminant {
            determinant: det("ddee"),
            coefficient: 0.8,
            reconstructed: true,
        });
        assert!(s.is_lossy());
        s.insert(DecodedDeterminant {
            determinant: det("ddee"),
            coefficient: -0.8,
            reconstructed: false,
        });
        assert!(!s.is_lossy());
        assert_eq!(s.coefficients[&det("ddee")], -0.8);
        // A later CFG fallback does not clobber the explicit value
        s.insert(DecodedDeterminant {
            determinant: det("ddee"),
            coefficient: 0.8,
            reconstructed: true,
        });
        assert_eq!(s.coefficients[&det("ddee")], -0.8);
    }

    #[test]
    fn test_state_truncation_and_norm() {
        let mut s = state(&[("ddee", 0.9), ("dbae", 0.3), ("dabe", 0.01)]);
        assert!((s.norm() - 0.9001).abs() < 1e-12);
        s.truncate(0.001);
        assert_eq!(s.len(), 2);
    }
}
