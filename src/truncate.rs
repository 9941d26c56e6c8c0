//! Greedy norm truncation of CI vectors.
//!
//! Entries are ranked by descending squared coefficient (ties keep key
//! order). Walking up from the smallest, an entry is dropped while the
//! discarded norm after dropping it stays within `wfthres`. The walk stops
//! at the first entry that would push it over. Survivors are not
//! renormalized.

use log::debug;
use std::collections::BTreeMap;

/// What a truncation pass removed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TruncationSummary {
    /// Number of entries dropped
    pub removed: usize,
    /// Sum of squared coefficients of the dropped entries
    pub discarded_norm: f64,
}

/// Truncates `entries` in place against the discarded-norm budget `wfthres`.
///
/// A threshold of zero (or below) keeps everything, exact zeros included.
pub fn truncate<K: Ord + Clone>(entries: &mut BTreeMap<K, f64>, wfthres: f64) -> TruncationSummary {
    if wfthres <= 0.0 {
        return TruncationSummary::default();
    }
    let mut ranked: Vec<(K, f64)> = entries.iter().map(|(k, &c)| (k.clone(), c * c)).collect();
    // Stable sort keeps ascending key order among equal weights
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut summary = TruncationSummary::default();
    for (key, weight) in ranked.into_iter().rev() {
        let after = summary.discarded_norm + weight;
        if after > wfthres {
            break;
        }
        entries.remove(&key);
        summary.discarded_norm = after;
        summary.removed += 1;
    }

    if summary.removed > 0 {
        debug!(
            "Truncation removed {} entries (discarded norm {:.3e}, threshold {:.3e})",
            summary.removed, summary.discarded_norm, wfthres
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector() -> BTreeMap<u32, f64> {
        [(0, 0.9), (1, -0.3), (2, 0.2), (3, 0.1), (4, -0.05)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_zero_threshold_keeps_all() {
        let mut v = vector();
        let summary = truncate(&mut v, 0.0);
        assert_eq!(summary.removed, 0);
        assert_eq!(v.len(), 5);
    }

    #[test]
    fn test_zero_threshold_keeps_zero_coefficients() {
        let mut v = vector();
        v.insert(5, 0.0);
        assert_eq!(truncate(&mut v, 0.0).removed, 0);
        assert_eq!(v.len(), 6);
        assert_eq!(truncate(&mut v, -1.0).removed, 0);
        // Any positive budget takes the zero first
        assert_eq!(truncate(&mut v, 1e-6).removed, 1);
        assert!(!v.contains_key(&5));
    }

    #[test]
    fn test_greedy_stops_at_first_overflow() {
        let mut v = vector();
        // 0.0025 + 0.01 = 0.0125 fits, adding 0.04 would give 0.0525
        let summary = truncate(&mut v, 0.05);
        assert_eq!(summary.removed, 2);
        assert!((summary.discarded_norm - 0.0125).abs() < 1e-12);
        assert_eq!(v.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_monotone_in_threshold() {
        let thresholds = [0.0, 0.001, 0.01, 0.05, 0.1, 0.2, 1.0, 2.0];
        let mut previous = usize::MAX;
        for t in thresholds {
            let mut v = vector();
            truncate(&mut v, t);
            assert!(v.len() <= previous);
            previous = v.len();
        }
        // A budget of 2 swallows a normalized vector completely
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_no_renormalization() {
        let mut v = vector();
        truncate(&mut v, 0.05);
        assert_eq!(v[&0], 0.9);
        assert_eq!(v[&1], -0.3);
    }
}
