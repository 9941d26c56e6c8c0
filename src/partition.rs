//! Orbital partition model.
//!
//! A CI expansion splits the orbitals into three contiguous ranges:
//!
//! ```text
//! [0, n_internal)                          internal  (doubly occupied by default)
//! [n_internal, n_internal + n_active)      active    (explicit in every record)
//! [n_internal + n_active, total)           external  (empty by default)
//! ```
//!
//! Hole indices of an excitation record must be internal, particle indices
//! external. The partition is immutable once built.

use crate::occupation::{Determinant, OccupationCode};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// Errors raised when building or querying a partition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PartitionError {
    /// Negative counts or an empty orbital space
    #[error("Invalid orbital partition: {0}")]
    InvalidPartition(String),
    /// Index outside the expected range
    #[error("Orbital index {index} is not {expected} (range {start}..{end})")]
    IndexOutOfRange {
        /// Offending orbital index
        index: usize,
        /// Range name ("internal" or "external")
        expected: &'static str,
        /// First index of the range
        start: usize,
        /// One past the last index of the range
        end: usize,
    },
}

type Result<T> = std::result::Result<T, PartitionError>;

/// Internal/active/external split of the orbital space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrbitalPartition {
    n_internal: usize,
    n_active: usize,
    n_external: usize,
}

impl OrbitalPartition {
    /// Builds a partition from the three range sizes.
    ///
    /// Counts come straight from parsed output, so they are accepted as
    /// signed integers and rejected when negative. A partition with zero
    /// orbitals in total is rejected as well.
    pub fn new(n_internal: i64, n_active: i64, n_external: i64) -> Result<Self> {
        if n_internal < 0 || n_active < 0 || n_external < 0 {
            return Err(PartitionError::InvalidPartition(format!(
                "negative orbital count (internal={}, active={}, external={})",
                n_internal, n_active, n_external
            )));
        }
        let total = n_internal
            .checked_add(n_active)
            .and_then(|t| t.checked_add(n_external))
            .ok_or_else(|| {
                PartitionError::InvalidPartition(format!(
                    "orbital count overflows (internal={}, active={}, external={})",
                    n_internal, n_active, n_external
                ))
            })?;
        if total == 0 {
            return Err(PartitionError::InvalidPartition(
                "orbital space is empty".to_string(),
            ));
        }
        Ok(Self {
            n_internal: n_internal as usize,
            n_active: n_active as usize,
            n_external: n_external as usize,
        })
    }

    /// Number of internal orbitals.
    pub fn n_internal(&self) -> usize {
        self.n_internal
    }

    /// Number of active orbitals.
    pub fn n_active(&self) -> usize {
        self.n_active
    }

    /// Number of external orbitals.
    pub fn n_external(&self) -> usize {
        self.n_external
    }

    /// Total number of orbitals.
    pub fn total(&self) -> usize {
        self.n_internal + self.n_active + self.n_external
    }

    /// Internal index range.
    pub fn internal(&self) -> Range<usize> {
        0..self.n_internal
    }

    /// Active index range.
    pub fn active(&self) -> Range<usize> {
        self.n_internal..self.n_internal + self.n_active
    }

    /// External index range.
    pub fn external(&self) -> Range<usize> {
        self.external_first()..self.total()
    }

    /// First external orbital index.
    pub fn external_first(&self) -> usize {
        self.n_internal + self.n_active
    }

    /// Checks that `index` is an internal orbital.
    pub fn check_internal(&self, index: usize) -> Result<()> {
        let range = self.internal();
        if range.contains(&index) {
            Ok(())
        } else {
            Err(PartitionError::IndexOutOfRange {
                index,
                expected: "internal",
                start: range.start,
                end: range.end,
            })
        }
    }

    /// Checks that `index` is an external orbital.
    pub fn check_external(&self, index: usize) -> Result<()> {
        let range = self.external();
        if range.contains(&index) {
            Ok(())
        } else {
            Err(PartitionError::IndexOutOfRange {
                index,
                expected: "external",
                start: range.start,
                end: range.end,
            })
        }
    }

    /// Default internal block: all doubly occupied.
    pub fn internal_default(&self) -> Vec<OccupationCode> {
        vec![OccupationCode::Doubly; self.n_internal]
    }

    /// Default external block: all empty.
    pub fn external_default(&self) -> Vec<OccupationCode> {
        vec![OccupationCode::Empty; self.n_external]
    }

    /// Full vector with the given active window spliced between the defaults.
    pub fn with_active(&self, active: &[OccupationCode]) -> Determinant {
        let mut codes = self.internal_default();
        codes.extend_from_slice(active);
        codes.extend(self.external_default());
        Determinant::new(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        let p = OrbitalPartition::new(2, 3, 2).unwrap();
        assert_eq!(p.total(), 7);
        assert_eq!(p.internal(), 0..2);
        assert_eq!(p.active(), 2..5);
        assert_eq!(p.external(), 5..7);
        assert_eq!(p.external_first(), 5);
    }

    #[test]
    fn test_invalid_partitions() {
        assert!(matches!(
            OrbitalPartition::new(-1, 3, 2),
            Err(PartitionError::InvalidPartition(_))
        ));
        assert!(matches!(
            OrbitalPartition::new(0, 0, 0),
            Err(PartitionError::InvalidPartition(_))
        ));
        // Zero-sized ranges are fine as long as the space is not empty
        assert!(OrbitalPartition::new(0, 4, 0).is_ok());
    }

    #[test]
    fn test_overflowing_counts() {
        assert!(matches!(
            OrbitalPartition::new(i64::MAX, 1, 0),
            Err(PartitionError::InvalidPartition(_))
        ));
        assert!(matches!(
            OrbitalPartition::new(1, i64::MAX - 1, 1),
            Err(PartitionError::InvalidPartition(_))
        ));
    }

    #[test]
    fn test_index_checks() {
        let p = OrbitalPartition::new(2, 3, 2).unwrap();
        assert!(p.check_internal(1).is_ok());
        assert!(p.check_internal(2).is_err());
        assert!(p.check_external(5).is_ok());
        assert!(matches!(
            p.check_external(4),
            Err(PartitionError::IndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn test_with_active() {
        use OccupationCode::*;
        let p = OrbitalPartition::new(1, 2, 1).unwrap();
        assert_eq!(p.with_active(&[Alpha, Beta]).to_string(), "dabe");
    }
}
