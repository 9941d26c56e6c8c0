use dysonpes::civector::{DeterminantTable, StateVector};
use dysonpes::decoder::{decode, decode_occupation, Amplitude, ExcitationRank, ExcitationRecord};
use dysonpes::partition::OrbitalPartition;
use dysonpes::spin::{ReferenceDeterminant, SingleExcitation, Spin, SpinAdaptation, SpinAdapter};
use dysonpes::truncate::truncate;
use dysonpes::{Determinant, OccupationCode};
use proptest::prelude::*;
use std::collections::BTreeMap;

use OccupationCode::*;

const CODES: [OccupationCode; 4] = [Empty, Alpha, Beta, Doubly];

/// Builds a target determinant and the record ORCA would print for it.
///
/// Distinct holes put their codes at the front of the active string in
/// index order, distinct particles at the back. Repeated indices consume no
/// code: a double hole empties the orbital, a double particle fills it.
fn encode(
    partition: &OrbitalPartition,
    rank: ExcitationRank,
    same_hole: bool,
    same_particle: bool,
    seeds: &[u8],
) -> (Determinant, ExcitationRecord) {
    let (n_holes, n_particles) = rank.arity();
    let mut seed = seeds.iter().copied().cycle();
    let mut next = move || seed.next().unwrap_or(0) as usize;

    let mut holes: Vec<usize> = Vec::new();
    while holes.len() < n_holes {
        let h = next() % partition.n_internal();
        if n_holes == 2 && same_hole && holes.len() == 1 {
            holes.push(holes[0]);
        } else if !holes.contains(&h) {
            holes.push(h);
        } else {
            holes.push((holes[0] + 1) % partition.n_internal());
        }
    }
    let mut particles: Vec<usize> = Vec::new();
    while particles.len() < n_particles {
        let p = partition.external_first() + next() % partition.n_external();
        if n_particles == 2 && same_particle && particles.len() == 1 {
            particles.push(particles[0]);
        } else if !particles.contains(&p) {
            particles.push(p);
        } else {
            let first = particles[0] - partition.external_first();
            particles.push(partition.external_first() + (first + 1) % partition.n_external());
        }
    }

    let mut internal = vec![Doubly; partition.n_internal()];
    let mut front = Vec::new();
    if holes.len() == 2 && holes[0] == holes[1] {
        internal[holes[0]] = Empty;
    } else {
        for &h in &holes {
            let code = CODES[next() % 3];
            internal[h] = code;
            front.push(code);
        }
    }

    let mut external = vec![Empty; partition.n_external()];
    let mut back = Vec::new();
    if particles.len() == 2 && particles[0] == particles[1] {
        external[particles[0] - partition.external_first()] = Doubly;
    } else {
        for &p in &particles {
            let code = CODES[1 + next() % 3];
            external[p - partition.external_first()] = code;
            back.push(code);
        }
    }

    let active: Vec<OccupationCode> = (0..partition.n_active()).map(|_| CODES[next() % 4]).collect();

    let mut full = internal;
    full.extend_from_slice(&active);
    full.extend(external);

    let mut active_codes = front;
    active_codes.extend_from_slice(&active);
    active_codes.extend(back);

    let record = ExcitationRecord {
        holes,
        particles,
        active_codes,
        amplitude: Amplitude::Coefficient(0.1),
    };
    (Determinant::new(full), record)
}

proptest! {
    #[test]
    fn decoder_inverts_orca_printing(
        n_internal in 2i64..6,
        n_active in 0i64..5,
        n_external in 2i64..6,
        rank in 0usize..9,
        same_hole in any::<bool>(),
        same_particle in any::<bool>(),
        seeds in proptest::collection::vec(any::<u8>(), 24),
    ) {
        let partition = OrbitalPartition::new(n_internal, n_active, n_external).unwrap();
        let rank = ExcitationRank::ALL[rank];
        let (expected, record) = encode(&partition, rank, same_hole, same_particle, &seeds);
        let decoded = decode_occupation(&record, &partition).unwrap();
        prop_assert_eq!(decoded.len(), partition.total());
        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn truncation_keeps_norm_within_budget(
        coefficients in proptest::collection::vec(-1.0f64..1.0, 1..40),
        wfthres in 0.0f64..0.5,
    ) {
        let mut entries: BTreeMap<usize, f64> = coefficients.iter().copied().enumerate().collect();
        let before: f64 = entries.values().map(|c| c * c).sum();
        let summary = truncate(&mut entries, wfthres);
        let after: f64 = entries.values().map(|c| c * c).sum();
        prop_assert!(before - after <= wfthres + 1e-12);
        prop_assert!(after <= before + 1e-12);
        prop_assert_eq!(summary.removed + entries.len(), coefficients.len());
    }
}

#[test]
fn test_cfg_reference_record_end_to_end() {
    let partition = OrbitalPartition::new(2, 3, 2).unwrap();
    let record = ExcitationRecord::active_only(vec![Alpha, Beta, Empty], Amplitude::Weight(0.64));
    let decoded = decode(&record, &partition).unwrap();
    assert_eq!(decoded.determinant.codes(), &[Doubly, Doubly, Alpha, Beta, Empty, Empty, Empty]);
    assert!((decoded.coefficient - 0.8).abs() < 1e-12);
    assert!(decoded.reconstructed);
}

#[test]
fn test_one_hole_record_end_to_end() {
    let partition = OrbitalPartition::new(2, 3, 2).unwrap();
    let record = ExcitationRecord {
        holes: vec![1],
        particles: vec![],
        active_codes: vec![Alpha, Beta, Empty, Empty],
        amplitude: Amplitude::Coefficient(-0.3),
    };
    let decoded = decode(&record, &partition).unwrap();
    assert_eq!(decoded.determinant.to_string(), "dabeeee");
    assert_eq!(decoded.coefficient, -0.3);
    assert!(!decoded.reconstructed);
}

#[test]
fn test_singlet_expansion_into_determinant_file() {
    // Two occupied, two virtual; excitation 1 -> 2
    let adapter = SpinAdapter::new(SpinAdaptation::Singlet, ReferenceDeterminant::restricted(2, 2)).unwrap();
    let excitation = SingleExcitation { occ: 1, virt: 2, spin: Spin::Alpha };
    let determinants = adapter.expand(excitation, 0.5).unwrap();
    assert_eq!(determinants.len(), 2);
    let norm: f64 = determinants.iter().map(|(_, c)| c * c).sum();
    assert!((norm - 0.25).abs() < 1e-12);

    let mut state = StateVector::new(1, 1, -1.0);
    for (det, c) in determinants {
        state.coefficients.insert(det, c);
    }
    let table = DeterminantTable::from_states(&[state]).unwrap();
    assert_eq!(table.ndets(), 2);
    assert_eq!(table.norb(), 4);
    let rows: Vec<String> = table.rows().iter().map(|(d, _)| d.to_string()).collect();
    assert!(rows.contains(&"dabe".to_string()));
    assert!(rows.contains(&"dbae".to_string()));
}
