//! CIS/TDDFT state vectors from ORCA's packed amplitude file.
//!
//! The `.cis` file written by an ORCA TDA/TDDFT run is a raw native-endian
//! stream:
//!
//! ```text
//! i32            nvec            number of stored vectors
//! i32 x 8        header          first/last occ, first/last virt (alpha),
//!                                then the same four for beta
//! per vector:
//!   40 bytes     record prefix   (root data, skipped)
//!   f64 ...      amplitudes      (occ, virt) row-major, alpha block, then
//!                                beta block for unrestricted references
//! ```
//!
//! Full TDDFT (no TDA) stores two vectors per root, `X+Y` and `X-Y`; they are
//! combined as `(v1 + v2) / 2`, which leaves `X`.
//!
//! Orbital indices in the header are absolute, so they index directly into
//! the reference determinant (frozen core included).
//!
//! The orbital counts come from the ORCA log (`Orbital ranges used for CIS
//! calculation:`); when the log has none, they are derived from the electron
//! count and multiplicity.

use crate::civector::StateVector;
use crate::config::HARTREE_TO_EV;
use crate::occupation::{Determinant, OccupationCode};
use crate::spin::{ReferenceDeterminant, SingleExcitation, Spin, SpinAdaptation, SpinAdapter, SpinError};
use crate::truncate::truncate;
use byteorder::{ByteOrder, NativeEndian, ReadBytesExt};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Bytes before the amplitudes of every stored vector.
const RECORD_PREFIX_BYTES: usize = 40;

/// Errors raised by the CIS reader.
#[derive(Error, Debug)]
pub enum CisError {
    /// IO error, including a truncated amplitude file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Missing or malformed log information
    #[error("Parse error: {0}")]
    Parse(String),
    /// Log and amplitude file disagree
    #[error("Number of orbitals in {file} not consistent with the log: {detail}")]
    Inconsistent {
        /// Amplitude file
        file: String,
        /// What differed
        detail: String,
    },
    /// Spin adaptation failed
    #[error("Spin adaptation error: {0}")]
    Spin(#[from] SpinError),
    /// More frozen orbitals than doubly occupied ones
    #[error("{frozen} frozen core orbitals requested but the reference has only {occupied} doubly occupied orbitals")]
    FrozenCoreTooLarge {
        /// Requested frozen core
        frozen: usize,
        /// Doubly occupied orbitals of the reference
        occupied: usize,
    },
}

type Result<T> = std::result::Result<T, CisError>;

lazy_static! {
    static ref NBASIS_RE: Regex = Regex::new(r"Number of basis functions\s+\.\.\.\s*(\d+)").unwrap();
    static ref CIS_RANGE_RE: Regex =
        Regex::new(r"Orbitals\s+(\d+)\s*\.+\s*(\d+)\s*->\s*(\d+)\s*\.+\s*(\d+)").unwrap();
    static ref HFTYP_RE: Regex = Regex::new(r"HFTyp\s+\.+\s*(\S+)").unwrap();
    static ref SCF_ENERGY_RE: Regex = Regex::new(r"^\s*Total Energy\s*:\s*(-?\d+\.\d+)\s*Eh").unwrap();
    static ref FSPE_RE: Regex = Regex::new(r"FINAL SINGLE POINT ENERGY\s+(-?\d+\.\d+)").unwrap();
    static ref EXCITED_RE: Regex =
        Regex::new(r"^\s*STATE\s+(\d+):\s+E=\s+(-?\d+\.\d+)\s+au\s+(-?\d+\.\d+)\s+eV").unwrap();
    static ref ORBITAL_RE: Regex =
        Regex::new(r"^\s*\d+\s+(\d+\.\d+)\s+(-?\d+\.\d+)\s+(-?\d+\.\d+)\s*$").unwrap();
}

/// Occupied/virtual counts per spin used by the CIS calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CisOrbitals {
    /// Frozen-core orbitals excluded from the excitation space
    pub n_frozen: usize,
    /// Active occupied alpha orbitals
    pub n_occ_alpha: usize,
    /// Virtual alpha orbitals
    pub n_virt_alpha: usize,
    /// Active occupied beta orbitals
    pub n_occ_beta: usize,
    /// Virtual beta orbitals
    pub n_virt_beta: usize,
}

impl CisOrbitals {
    /// Counts from the electron number when the log has no CIS ranges.
    pub fn from_electrons(
        n_basis: usize,
        nuclear_charge: i64,
        charge: i64,
        multiplicity: u32,
    ) -> Result<Self> {
        let nelec = (nuclear_charge - charge) as f64;
        let unpaired = (multiplicity as f64 - 1.0) / 2.0;
        let n_alpha = (nelec / 2.0 + unpaired) as i64;
        let n_beta = (nelec / 2.0 - unpaired) as i64;
        if n_beta < 0 || n_alpha as usize > n_basis {
            return Err(CisError::Parse(format!(
                "{} electrons with multiplicity {} do not fit in {} basis functions",
                nelec, multiplicity, n_basis
            )));
        }
        Ok(Self {
            n_frozen: 0,
            n_occ_alpha: n_alpha as usize,
            n_virt_alpha: n_basis - n_alpha as usize,
            n_occ_beta: n_beta as usize,
            n_virt_beta: n_basis - n_beta as usize,
        })
    }

    /// Length of the alpha block of the reference (frozen core included).
    pub fn alpha_len(&self) -> usize {
        self.n_frozen + self.n_occ_alpha + self.n_virt_alpha
    }

    /// Orbitals occupied in both spin blocks of the reference.
    pub fn doubly_occupied(&self) -> usize {
        self.n_frozen + self.n_occ_alpha.min(self.n_occ_beta)
    }

    /// Single-determinant reference for these counts.
    pub fn reference(&self, restricted: bool) -> ReferenceDeterminant {
        if restricted {
            ReferenceDeterminant::restricted(self.n_frozen + self.n_occ_alpha, self.n_virt_alpha)
        } else {
            ReferenceDeterminant::unrestricted(
                self.n_frozen + self.n_occ_alpha,
                self.n_virt_alpha,
                self.n_frozen + self.n_occ_beta,
                self.n_virt_beta,
            )
        }
    }
}

/// What the ORCA log of a SCF/TDDFT job tells about the CIS data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CisLogInfo {
    /// Number of basis functions
    pub n_basis: Option<usize>,
    /// False for UHF/UKS references
    pub restricted: bool,
    /// Orbital ranges of the CIS block, when printed
    pub orbitals: Option<CisOrbitals>,
    /// Last SCF total energy (Eh)
    pub scf_energy: Option<f64>,
    /// Excitation energies (eV) in root order
    pub excitation_energies_ev: Vec<f64>,
    /// Occupied alpha orbital energies (eV) of the last `ORBITAL ENERGIES` block;
    /// all occupied orbitals for a restricted reference
    pub occupied_alpha_ev: Vec<f64>,
    /// Occupied beta orbital energies (eV); empty for a restricted reference
    pub occupied_beta_ev: Vec<f64>,
}

/// Where the orbital-energy scan of [`parse_cis_log`] is.
#[derive(Debug, Clone, Copy, PartialEq)]
enum OrbitalBlock {
    Outside,
    Alpha,
    Beta,
}

fn range_counts(line: &str) -> Option<(usize, usize, usize)> {
    let caps = CIS_RANGE_RE.captures(line)?;
    let v: Vec<usize> = (1..=4).filter_map(|i| caps[i].parse().ok()).collect();
    if v.len() != 4 || v[1] + 1 < v[0] || v[3] + 1 < v[2] {
        return None;
    }
    Some((v[0], v[1] - v[0] + 1, v[3] - v[2] + 1))
}

/// Parses an ORCA log for the data the CIS reader needs.
pub fn parse_cis_log(text: &str) -> Result<CisLogInfo> {
    let lines: Vec<&str> = text.lines().collect();
    let mut info = CisLogInfo {
        restricted: true,
        ..Default::default()
    };
    let mut fspe = None;
    let mut seen_roots = std::collections::BTreeSet::new();
    let mut orbital_block = OrbitalBlock::Outside;

    for (i, line) in lines.iter().enumerate() {
        if line.trim() == "ORBITAL ENERGIES" {
            // Only the last SCF cycle counts
            orbital_block = OrbitalBlock::Alpha;
            info.occupied_alpha_ev.clear();
            info.occupied_beta_ev.clear();
            continue;
        }
        if orbital_block != OrbitalBlock::Outside {
            let trimmed = line.trim();
            if let Some(caps) = ORBITAL_RE.captures(line) {
                let occupation: f64 = caps[1].parse().unwrap_or(0.0);
                if occupation > 0.0 {
                    if let Ok(ev) = caps[3].parse::<f64>() {
                        match orbital_block {
                            OrbitalBlock::Beta => info.occupied_beta_ev.push(ev),
                            _ => info.occupied_alpha_ev.push(ev),
                        }
                    }
                }
                continue;
            }
            if trimmed.contains("SPIN DOWN ORBITALS") {
                orbital_block = OrbitalBlock::Beta;
                continue;
            }
            if trimmed.is_empty()
                || trimmed.starts_with("---")
                || trimmed.starts_with("NO ")
                || trimmed.contains("SPIN UP ORBITALS")
            {
                continue;
            }
            // Any other line closes the table and is parsed normally
            orbital_block = OrbitalBlock::Outside;
        }
        if let Some(caps) = NBASIS_RE.captures(line) {
            info.n_basis = caps[1].parse().ok();
        }
        if let Some(caps) = HFTYP_RE.captures(line) {
            info.restricted = &caps[1] == "RHF";
        }
        if let Some(caps) = SCF_ENERGY_RE.captures(line) {
            info.scf_energy = caps[1].parse().ok();
        }
        if let Some(caps) = FSPE_RE.captures(line) {
            fspe = caps[1].parse().ok();
        }
        if let Some(caps) = EXCITED_RE.captures(line) {
            let root: usize = caps[1].parse().unwrap_or(0);
            // Later blocks (e.g. NTO or SOC printouts) repeat the roots
            if seen_roots.insert(root) {
                if let Ok(ev) = caps[3].parse::<f64>() {
                    info.excitation_energies_ev.push(ev);
                }
            }
        }
        if line.contains("Orbital ranges used for CIS calculation:") {
            let alpha = lines.get(i + 1).and_then(|l| range_counts(l));
            let beta = lines.get(i + 2).and_then(|l| range_counts(l));
            match alpha {
                Some((n_frozen, n_occ_alpha, n_virt_alpha)) => {
                    let (n_occ_beta, n_virt_beta) = match beta {
                        Some((_, o, v)) if !info.restricted => (o, v),
                        _ => (n_occ_alpha, n_virt_alpha),
                    };
                    info.orbitals = Some(CisOrbitals {
                        n_frozen,
                        n_occ_alpha,
                        n_virt_alpha,
                        n_occ_beta,
                        n_virt_beta,
                    });
                }
                None => {
                    return Err(CisError::Parse(format!(
                        "Could not read CIS orbital ranges after line {}",
                        i + 1
                    )))
                }
            }
        }
    }
    if info.scf_energy.is_none() {
        info.scf_energy = fspe;
    }
    Ok(info)
}

/// Reads and parses an ORCA log file.
pub fn read_cis_log(path: &Path) -> Result<CisLogInfo> {
    parse_cis_log(&fs::read_to_string(path)?)
}

impl CisLogInfo {
    /// Koopmans MO ionization energies (eV): negated occupied orbital
    /// energies, ascending, per spin. The beta list stays empty for a
    /// restricted reference.
    pub fn mo_ips(&self) -> (Vec<f64>, Vec<f64>) {
        let negated = |energies: &[f64]| {
            let mut ips: Vec<f64> = energies.iter().map(|e| -e).collect();
            ips.sort_by(|a, b| a.total_cmp(b));
            ips
        };
        let beta = if self.restricted {
            Vec::new()
        } else {
            negated(&self.occupied_beta_ev)
        };
        (negated(&self.occupied_alpha_ev), beta)
    }

    /// Orbital counts from the log, or from the electron count.
    pub fn orbitals_or_from_electrons(
        &self,
        nuclear_charge: i64,
        charge: i64,
        multiplicity: u32,
    ) -> Result<CisOrbitals> {
        if let Some(orbitals) = self.orbitals {
            return Ok(orbitals);
        }
        let n_basis = self.n_basis.ok_or_else(|| {
            CisError::Parse(
                "Neither CIS orbital ranges nor the number of basis functions found in the log"
                    .to_string(),
            )
        })?;
        debug!("No CIS orbital ranges in log; deriving occupations from the electron count");
        CisOrbitals::from_electrons(n_basis, nuclear_charge, charge, multiplicity)
    }
}

/// The eight-integer header of the amplitude file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CisHeader {
    /// Number of stored vectors
    pub nvec: usize,
    /// First and last alpha occupied orbital
    pub alpha_occ: (usize, usize),
    /// First and last alpha virtual orbital
    pub alpha_virt: (usize, usize),
    /// First and last beta occupied orbital
    pub beta_occ: (usize, usize),
    /// First and last beta virtual orbital
    pub beta_virt: (usize, usize),
}

impl CisHeader {
    fn read<B: ByteOrder, R: Read>(reader: &mut R) -> Result<Self> {
        let nvec = reader.read_i32::<B>()?;
        let mut h = [0i32; 8];
        for v in h.iter_mut() {
            *v = reader.read_i32::<B>()?;
        }
        if nvec < 0 || h.iter().any(|&x| x < 0) {
            return Err(CisError::Parse(format!(
                "Negative entries in CIS header: nvec={}, header={:?}",
                nvec, h
            )));
        }
        let u = |i: usize| h[i] as usize;
        Ok(Self {
            nvec: nvec as usize,
            alpha_occ: (u(0), u(1)),
            alpha_virt: (u(2), u(3)),
            beta_occ: (u(4), u(5)),
            beta_virt: (u(6), u(7)),
        })
    }

    fn span(range: (usize, usize)) -> usize {
        (range.1 + 1).saturating_sub(range.0)
    }

    fn check(&self, orbitals: &CisOrbitals, restricted: bool, file: &str) -> Result<()> {
        let mut pairs = vec![
            ("alpha occupied", orbitals.n_occ_alpha, Self::span(self.alpha_occ)),
            ("alpha virtual", orbitals.n_virt_alpha, Self::span(self.alpha_virt)),
        ];
        if !restricted {
            pairs.push(("beta occupied", orbitals.n_occ_beta, Self::span(self.beta_occ)));
            pairs.push(("beta virtual", orbitals.n_virt_beta, Self::span(self.beta_virt)));
        }
        for (name, log, header) in pairs {
            if log != header {
                return Err(CisError::Inconsistent {
                    file: file.to_string(),
                    detail: format!("{} orbitals: log {} vs file {}", name, log, header),
                });
            }
        }
        Ok(())
    }
}

/// Amplitudes of one root keyed by excitation.
pub type CisAmplitudes = BTreeMap<SingleExcitation, f64>;

fn read_block<B: ByteOrder, R: Read>(
    reader: &mut R,
    occ: (usize, usize),
    virt: (usize, usize),
    spin: Spin,
    into: &mut CisAmplitudes,
    combine: bool,
) -> Result<()> {
    for iocc in occ.0..=occ.1 {
        for ivirt in virt.0..=virt.1 {
            let value = reader.read_f64::<B>()?;
            let key = SingleExcitation {
                occ: iocc,
                virt: ivirt,
                spin,
            };
            if combine {
                let entry = into.entry(key).or_insert(0.0);
                *entry = (*entry + value) / 2.0;
            } else {
                into.insert(key, value);
            }
        }
    }
    Ok(())
}

fn read_vector<B: ByteOrder, R: Read>(
    reader: &mut R,
    header: &CisHeader,
    restricted: bool,
    into: &mut CisAmplitudes,
    combine: bool,
) -> Result<()> {
    let mut prefix = [0u8; RECORD_PREFIX_BYTES];
    reader.read_exact(&mut prefix)?;
    read_block::<B, R>(reader, header.alpha_occ, header.alpha_virt, Spin::Alpha, into, combine)?;
    if !restricted {
        read_block::<B, R>(reader, header.beta_occ, header.beta_virt, Spin::Beta, into, combine)?;
    }
    Ok(())
}

/// Reads the header and the first `nroots` roots from an amplitude stream.
///
/// With `tda == false` each root is stored as two consecutive vectors that
/// are averaged.
pub fn read_cis_amplitudes<B: ByteOrder, R: Read>(
    reader: &mut R,
    restricted: bool,
    tda: bool,
    nroots: usize,
) -> Result<(CisHeader, Vec<CisAmplitudes>)> {
    let header = CisHeader::read::<B, R>(reader)?;
    let on_file = if tda { header.nvec } else { header.nvec / 2 };
    if nroots > on_file {
        return Err(CisError::Parse(format!(
            "{} roots requested but the CIS file holds {}",
            nroots, on_file
        )));
    }

    let mut roots = Vec::with_capacity(nroots);
    for _ in 0..nroots {
        let mut amplitudes = CisAmplitudes::new();
        read_vector::<B, R>(reader, &header, restricted, &mut amplitudes, false)?;
        if !tda {
            read_vector::<B, R>(reader, &header, restricted, &mut amplitudes, true)?;
        }
        roots.push(amplitudes);
    }
    Ok((header, roots))
}

/// Removes `n_frozen` core orbitals from each spin block.
///
/// Returns `None` (with a warning) when an excitation touches the frozen core
/// or the core does not fit into the determinant.
pub fn strip_frozen_core(
    det: &Determinant,
    n_frozen: usize,
    restricted: bool,
    alpha_len: usize,
) -> Option<Determinant> {
    if n_frozen == 0 {
        return Some(det.clone());
    }
    let codes = det.codes();
    let fits = if restricted {
        n_frozen <= codes.len()
    } else {
        n_frozen <= alpha_len && alpha_len + n_frozen <= codes.len()
    };
    if !fits {
        warn!(
            "Frozen core of {} orbitals does not fit into determinant {}. Skipping determinant",
            n_frozen, det
        );
        return None;
    }
    let intact = if restricted {
        codes[..n_frozen].iter().all(|&c| c == OccupationCode::Doubly)
    } else {
        codes[..n_frozen].iter().all(|&c| c == OccupationCode::Alpha)
            && codes[alpha_len..alpha_len + n_frozen]
                .iter()
                .all(|&c| c == OccupationCode::Beta)
    };
    if !intact {
        warn!("Non-occupied orbital inside frozen core! Skipping determinant {}", det);
        return None;
    }
    if restricted {
        Some(det.without(0..n_frozen))
    } else {
        let beta_stripped = det.without(alpha_len..alpha_len + n_frozen);
        Some(beta_stripped.without(0..n_frozen))
    }
}

/// Settings for turning CIS amplitudes into state vectors.
#[derive(Debug, Clone)]
pub struct CisExtraction {
    /// Multiplicity of the states
    pub multiplicity: u32,
    /// Closed-shell reference
    pub restricted: bool,
    /// Core orbitals removed from every determinant
    pub frozen_core: usize,
    /// Discarded-norm budget applied to each root before spin expansion
    pub wfthres: f64,
}

impl CisExtraction {
    /// Fails when the frozen core reaches beyond the doubly occupied orbitals.
    pub fn check_frozen_core(&self, orbitals: &CisOrbitals) -> Result<()> {
        let occupied = orbitals.doubly_occupied();
        if self.frozen_core > occupied {
            return Err(CisError::FrozenCoreTooLarge {
                frozen: self.frozen_core,
                occupied,
            });
        }
        Ok(())
    }

    /// The reference state vector `{reference: 1.0}` with the SCF energy.
    pub fn reference_state(&self, orbitals: &CisOrbitals, scf_energy: f64) -> Result<StateVector> {
        self.check_frozen_core(orbitals)?;
        let reference = orbitals.reference(self.restricted);
        let det = strip_frozen_core(
            &reference.determinant(),
            self.frozen_core,
            self.restricted,
            orbitals.alpha_len(),
        )
        .ok_or_else(|| CisError::Parse("Reference determinant has a broken frozen core".to_string()))?;
        let mut state = StateVector::new(self.multiplicity, 0, scf_energy);
        state.coefficients.insert(det, 1.0);
        Ok(state)
    }

    /// Builds one state vector per root: truncate, spin-expand, strip core.
    pub fn excited_states(
        &self,
        orbitals: &CisOrbitals,
        roots: Vec<CisAmplitudes>,
        energies: &[f64],
    ) -> Result<Vec<StateVector>> {
        if energies.len() < roots.len() {
            return Err(CisError::Parse(format!(
                "{} CIS roots but only {} excitation energies",
                roots.len(),
                energies.len()
            )));
        }
        self.check_frozen_core(orbitals)?;
        let adaptation = SpinAdaptation::for_reference(self.multiplicity, self.restricted)?;
        let adapter = SpinAdapter::new(adaptation, orbitals.reference(self.restricted))?;

        let mut states = Vec::with_capacity(roots.len());
        for (i, mut amplitudes) in roots.into_iter().enumerate() {
            let summary = truncate(&mut amplitudes, self.wfthres);
            let mut state = StateVector::new(self.multiplicity, i + 1, energies[i]);
            for (excitation, c) in amplitudes {
                for (det, value) in adapter.expand(excitation, c)? {
                    if let Some(stripped) =
                        strip_frozen_core(&det, self.frozen_core, self.restricted, orbitals.alpha_len())
                    {
                        state.coefficients.insert(stripped, value);
                    }
                }
            }
            debug!(
                "CIS root {}: {} determinants after removing {} small amplitudes",
                i + 1,
                state.len(),
                summary.removed
            );
            states.push(state);
        }
        Ok(states)
    }
}

/// Everything needed to read a TDDFT final-state block.
#[derive(Debug, Clone)]
pub struct TddftBlock {
    /// Reference (ΔSCF) state followed by the excited roots
    pub states: Vec<StateVector>,
    /// SCF energy of the reference (Eh)
    pub scf_energy: f64,
    /// Excitation energies of the roots (eV)
    pub excitation_energies_ev: Vec<f64>,
}

/// Reads a TDDFT final state: log metadata plus `nroots` roots from the CIS file.
pub fn read_tddft_block(
    log_path: &Path,
    cis_path: &Path,
    extraction: &CisExtraction,
    nuclear_charge: i64,
    charge: i64,
    tda: bool,
    nroots: usize,
) -> Result<TddftBlock> {
    info!(
        "Reading CIS determinants for multiplicity {} from {}",
        extraction.multiplicity,
        cis_path.display()
    );
    let log = read_cis_log(log_path)?;
    let scf_energy = log.scf_energy.ok_or_else(|| {
        CisError::Parse(format!("No SCF energy found in {}", log_path.display()))
    })?;
    let orbitals = log.orbitals_or_from_electrons(nuclear_charge, charge, extraction.multiplicity)?;

    let mut reader = BufReader::new(File::open(cis_path)?);
    let (header, roots) = read_cis_amplitudes::<NativeEndian, _>(&mut reader, extraction.restricted, tda, nroots)?;
    if log.orbitals.is_some() {
        header.check(&orbitals, extraction.restricted, &cis_path.display().to_string())?;
    }

    let excitation_energies_ev: Vec<f64> = log.excitation_energies_ev.iter().take(nroots).copied().collect();
    let energies: Vec<f64> = excitation_energies_ev
        .iter()
        .map(|ev| scf_energy + ev / HARTREE_TO_EV)
        .collect();

    let mut states = vec![extraction.reference_state(&orbitals, scf_energy)?];
    states.extend(extraction.excited_states(&orbitals, roots, &energies)?);
    Ok(TddftBlock {
        states,
        scf_energy,
        excitation_energies_ev,
    })
}

/// Reads the single-determinant reference of an initial SCF state.
pub fn read_single_reference(
    log_path: &Path,
    extraction: &CisExtraction,
    nuclear_charge: i64,
    charge: i64,
) -> Result<StateVector> {
    let log = read_cis_log(log_path)?;
    let scf_energy = log.scf_energy.ok_or_else(|| {
        CisError::Parse(format!("No SCF energy found in {}", log_path.display()))
    })?;
    let orbitals = log.orbitals_or_from_electrons(nuclear_charge, charge, extraction.multiplicity)?;
    extraction.reference_state(&orbitals, scf_energy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Cursor;

    fn write_cis(header: [i32; 8], vectors: &[Vec<f64>]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_i32::<LittleEndian>(vectors.len() as i32).unwrap();
        for h in header {
            buf.write_i32::<LittleEndian>(h).unwrap();
        }
        for v in vectors {
            buf.extend_from_slice(&[0u8; RECORD_PREFIX_BYTES]);
            for x in v {
                buf.write_f64::<LittleEndian>(*x).unwrap();
            }
        }
        buf
    }

    const LOG: &str = "\
Number of basis functions                   ...     4
Hartree-Fock type      HFTyp           .... RHF
Total Energy       :          -10.00000000 Eh           -272.11 eV
Orbital ranges used for CIS calculation:
 Operator 0:  Orbitals   0...  1  ->   2...  3
STATE  1:  E=   0.100000 au      2.721 eV    21947.5 cm**-1
STATE  2:  E=   0.200000 au      5.442 eV    43895.0 cm**-1
STATE  1:  E=   0.100000 au      2.721 eV    21947.5 cm**-1
FINAL SINGLE POINT ENERGY       -9.9
";

    #[test]
    fn test_parse_log() {
        let info = parse_cis_log(LOG).unwrap();
        assert_eq!(info.n_basis, Some(4));
        assert!(info.restricted);
        assert_eq!(info.scf_energy, Some(-10.0));
        assert_eq!(info.excitation_energies_ev, vec![2.721, 5.442]);
        let orbitals = info.orbitals.unwrap();
        assert_eq!(orbitals.n_frozen, 0);
        assert_eq!(orbitals.n_occ_alpha, 2);
        assert_eq!(orbitals.n_virt_alpha, 2);
    }

    const UHF_ORBITALS: &str = "\
Hartree-Fock type      HFTyp           .... UHF
ORBITAL ENERGIES
----------------
                 SPIN UP ORBITALS
  NO   OCC          E(Eh)            E(eV) 
   0   1.0000     -99.000000     -2693.9274 

Total SCF iterations not converged yet
----------------
ORBITAL ENERGIES
----------------
                 SPIN UP ORBITALS
  NO   OCC          E(Eh)            E(eV) 
   0   1.0000     -20.600000      -560.5546 
   1   1.0000      -0.700000       -19.0480 
   2   0.0000       0.100000         2.7211 

                 SPIN DOWN ORBITALS
  NO   OCC          E(Eh)            E(eV) 
   0   1.0000     -20.500000      -557.8339 
   1   0.0000       0.050000         1.3606 

********************************
";

    #[test]
    fn test_orbital_energies_last_block() {
        let info = parse_cis_log(UHF_ORBITALS).unwrap();
        assert!(!info.restricted);
        assert_eq!(info.occupied_alpha_ev, vec![-560.5546, -19.0480]);
        assert_eq!(info.occupied_beta_ev, vec![-557.8339]);
        let (alpha, beta) = info.mo_ips();
        assert_eq!(alpha, vec![19.0480, 560.5546]);
        assert_eq!(beta, vec![557.8339]);
    }

    #[test]
    fn test_restricted_mo_ips_have_no_beta() {
        let log = "\
Hartree-Fock type      HFTyp           .... RHF
ORBITAL ENERGIES
----------------

  NO   OCC          E(Eh)            E(eV) 
   0   2.0000     -20.550908      -559.2209 
   1   2.0000      -0.500000       -13.6057 
   2   0.0000       0.200000         5.4423 

Total Energy       :          -76.00000000 Eh
";
        let info = parse_cis_log(log).unwrap();
        let (alpha, beta) = info.mo_ips();
        assert_eq!(alpha, vec![13.6057, 559.2209]);
        assert!(beta.is_empty());
        assert_eq!(info.scf_energy, Some(-76.0));
    }

    #[test]
    fn test_occupations_from_electrons() {
        // 9 electrons, doublet
        let o = CisOrbitals::from_electrons(10, 10, 1, 2).unwrap();
        assert_eq!((o.n_occ_alpha, o.n_occ_beta), (5, 4));
        assert_eq!((o.n_virt_alpha, o.n_virt_beta), (5, 6));
        assert!(CisOrbitals::from_electrons(2, 10, 0, 1).is_err());
    }

    #[test]
    fn test_read_tda_restricted() {
        // occ 0..=1, virt 2..=3: four amplitudes per root
        let bytes = write_cis(
            [0, 1, 2, 3, 0, 1, 2, 3],
            &[vec![0.9, 0.1, 0.0, -0.4], vec![0.0, 0.0, 1.0, 0.0]],
        );
        let (header, roots) =
            read_cis_amplitudes::<LittleEndian, _>(&mut Cursor::new(bytes), true, true, 2).unwrap();
        assert_eq!(header.nvec, 2);
        assert_eq!(roots.len(), 2);
        let key = SingleExcitation {
            occ: 1,
            virt: 3,
            spin: Spin::Alpha,
        };
        assert_eq!(roots[0][&key], -0.4);
    }

    #[test]
    fn test_read_full_tddft_averages() {
        let bytes = write_cis([0, 0, 1, 1, 0, 0, 1, 1], &[vec![0.6], vec![0.2]]);
        let (_, roots) =
            read_cis_amplitudes::<LittleEndian, _>(&mut Cursor::new(bytes), true, false, 1).unwrap();
        assert!((roots[0].values().next().unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_too_many_roots_requested() {
        let bytes = write_cis([0, 0, 1, 1, 0, 0, 1, 1], &[vec![0.6]]);
        assert!(read_cis_amplitudes::<LittleEndian, _>(&mut Cursor::new(bytes), true, true, 2).is_err());
    }

    #[test]
    fn test_singlet_states_with_truncation() {
        let orbitals = CisOrbitals {
            n_frozen: 0,
            n_occ_alpha: 2,
            n_virt_alpha: 2,
            n_occ_beta: 2,
            n_virt_beta: 2,
        };
        let extraction = CisExtraction {
            multiplicity: 1,
            restricted: true,
            frozen_core: 0,
            wfthres: 0.05,
        };
        let mut amplitudes = CisAmplitudes::new();
        let exc = |occ, virt| SingleExcitation {
            occ,
            virt,
            spin: Spin::Alpha,
        };
        amplitudes.insert(exc(1, 2), 0.98);
        amplitudes.insert(exc(0, 3), 0.1);
        let states = extraction
            .excited_states(&orbitals, vec![amplitudes], &[-9.9])
            .unwrap();
        // The 0.1 amplitude (norm 0.01) is dropped, the main one expands to two dets
        assert_eq!(states[0].len(), 2);
        assert_eq!(states[0].root, 1);
        let reference = extraction.reference_state(&orbitals, -10.0).unwrap();
        assert_eq!(
            reference.coefficients.keys().next().unwrap().to_string(),
            "ddee"
        );
    }

    #[test]
    fn test_frozen_core_strip() {
        let det = Determinant::parse("ddbae").unwrap();
        assert_eq!(
            strip_frozen_core(&det, 1, true, 5).unwrap().to_string(),
            "dbae"
        );
        let broken = Determinant::parse("bdaee").unwrap();
        assert!(strip_frozen_core(&broken, 1, true, 5).is_none());

        // Unrestricted: alpha block "aae", beta block "bbe"
        let det = Determinant::parse("aaebbe").unwrap();
        assert_eq!(
            strip_frozen_core(&det, 1, false, 3).unwrap().to_string(),
            "aebe"
        );
        let broken = Determinant::parse("eaabbe").unwrap();
        assert!(strip_frozen_core(&broken, 1, false, 3).is_none());
    }

    #[test]
    fn test_frozen_core_larger_than_determinant() {
        let det = Determinant::parse("dd").unwrap();
        assert!(strip_frozen_core(&det, 3, true, 2).is_none());
        let det = Determinant::parse("aabb").unwrap();
        assert!(strip_frozen_core(&det, 2, false, 3).is_none());
        assert!(strip_frozen_core(&det, 4, false, 2).is_none());
    }

    #[test]
    fn test_extraction_rejects_oversized_core() {
        let orbitals = CisOrbitals {
            n_frozen: 0,
            n_occ_alpha: 2,
            n_virt_alpha: 2,
            n_occ_beta: 1,
            n_virt_beta: 3,
        };
        let mut extraction = CisExtraction {
            multiplicity: 2,
            restricted: false,
            frozen_core: 1,
            wfthres: 0.0,
        };
        let reference = extraction.reference_state(&orbitals, -1.0).unwrap();
        assert_eq!(reference.coefficients.keys().next().unwrap().to_string(), "aeeeee");

        extraction.frozen_core = 2;
        assert!(matches!(
            extraction.reference_state(&orbitals, -1.0),
            Err(CisError::FrozenCoreTooLarge { frozen: 2, occupied: 1 })
        ));
        assert!(matches!(
            extraction.excited_states(&orbitals, vec![CisAmplitudes::new()], &[-0.9]),
            Err(CisError::FrozenCoreTooLarge { .. })
        ));
    }
}
