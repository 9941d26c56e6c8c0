//! Reading CI vectors from ORCA CASSCF and MRCI/SORCI output.
//!
//! Both readers are line-by-line state machines over the text output. They
//! share the orbital partition block
//!
//! ```text
//! Determined orbital ranges:
//!    Internal       0 -    3 (   4 orbitals)
//!    Active         4 -    7 (   4 orbitals)
//!    External       8 -   41 (  34 orbitals)
//! Number of rotation parameters ...
//! ```
//!
//! and feed every configuration line through the [`decoder`](crate::decoder).
//!
//! # CASSCF
//!
//! Determinants are collected once `Extended CI Printing` or
//! `Spin-Determinant CI Printing` has been seen, per `ROOT k: E= ...` state,
//! with the multiplicity taken from the preceding
//! `CAS-SCF STATES FOR BLOCK ... MULT= m` header. Only active-space
//! configurations appear here.
//!
//! # MRCI / SORCI
//!
//! Each `CI-BLOCK` is built for the multiplicity of its `Building a CAS` line.
//! The final states follow `Unselected CSF estimate:` (for SORCI only after the
//! `S O R C I (DDCI3-STEP)` banner). A CFG line carries the hole and particle
//! indices for the determinant lines under it:
//!
//! ```text
//!    0.00312 : CFG h 2h 3[220110]p 12p 14
//!           [22ud0u]   -0.04012
//! ```
//!
//! # CFG-only states
//!
//! ORCA does not always print the determinant of a closed-shell CFG. Such a
//! CFG is turned into its determinant with coefficient `sqrt(weight)`; a state
//! with no determinant lines at all is rebuilt from every CFG the same way.
//! Both cases are logged as warnings and marked on the [`StateVector`].

use crate::civector::{MultiplicityBlock, StateVector};
use crate::decoder::{self, Amplitude, DecodeError, ExcitationRecord};
use crate::occupation::OccupationCode;
use crate::partition::{OrbitalPartition, PartitionError};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading CI output.
#[derive(Error, Debug)]
pub enum OutputParseError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Missing or malformed output section
    #[error("Parse error: {0}")]
    Parse(String),
    /// Configuration could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Orbital ranges are inconsistent
    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),
    /// Output written by an ORCA version whose MRCI printing is not usable
    #[error("MRCI determinant read does not work for ORCA {0} and older (found {1})")]
    UnsupportedVersion(String, String),
}

type Result<T> = std::result::Result<T, OutputParseError>;

lazy_static! {
    static ref RANGE_RE: Regex =
        Regex::new(r"^\s*(Internal|Active|External)\s+(-?\d+)\s*-\s*(-?\d+)\s*\(\s*(\d+)\s+orbitals?\s*\)")
            .unwrap();
    static ref CAS_BLOCK_RE: Regex = Regex::new(r"CAS-SCF STATES FOR BLOCK\s+\d+\s+MULT=\s*(\d+)").unwrap();
    static ref ROOT_RE: Regex = Regex::new(r"^\s*ROOT\s+(\d+)\s*:\s*E=\s*(\S+)").unwrap();
    static ref MRCI_STATE_RE: Regex = Regex::new(r"^\s*STATE\s+(\d+)\s*:\s*Energy=\s*(\S+)").unwrap();
    static ref TOTAL_ORBITALS_RE: Regex = Regex::new(r"Total number of orbitals\s+\.\.\.\s*(\d+)").unwrap();
    static ref VERSION_RE: Regex = Regex::new(r"Program Version (\d+)\.(\d+)\.(\d+)").unwrap();
    static ref MRCI_CFG_RE: Regex =
        Regex::new(r"^\s*(\S+)\s*:?\s*CFG\s*([^\[]*)\[([0-9]+)\](.*)$").unwrap();
}

/// Last ORCA version whose MRCI determinant printing cannot be read.
const LAST_UNSUPPORTED_VERSION: (u32, u32, u32) = (4, 2, 1);

/// CI vectors and orbital partition read from one output file.
#[derive(Debug, Clone)]
pub struct CiOutput {
    /// Orbital partition of the calculation
    pub partition: OrbitalPartition,
    /// States grouped by multiplicity
    pub blocks: BTreeMap<u32, MultiplicityBlock>,
}

impl CiOutput {
    /// Block of one multiplicity.
    pub fn block(&self, multiplicity: u32) -> Option<&MultiplicityBlock> {
        self.blocks.get(&multiplicity)
    }

    /// Multiplicities found, ascending.
    pub fn multiplicities(&self) -> Vec<u32> {
        self.blocks.keys().copied().collect()
    }
}

/// Collects the `Determined orbital ranges:` block.
#[derive(Debug, Default)]
struct RangeReader {
    active_block: bool,
    internal: Option<i64>,
    active: Option<i64>,
    external: Option<i64>,
    external_first: Option<usize>,
}

impl RangeReader {
    fn feed(&mut self, line: &str) {
        if line.contains("Determined orbital ranges:") {
            self.active_block = true;
            return;
        }
        if line.contains("Number of rotation parameters") {
            self.active_block = false;
            return;
        }
        if !self.active_block {
            return;
        }
        if let Some(caps) = RANGE_RE.captures(line) {
            let count = caps[4].parse::<i64>().ok();
            match &caps[1] {
                "Internal" => self.internal = count,
                "Active" => self.active = count,
                _ => {
                    self.external = count;
                    self.external_first = caps[2].parse::<usize>().ok();
                }
            }
        }
    }

    fn partition(&self) -> Result<OrbitalPartition> {
        match (self.internal, self.active, self.external) {
            (Some(i), Some(a), Some(e)) => {
                let partition = OrbitalPartition::new(i, a, e)?;
                if let Some(first) = self.external_first {
                    if first != partition.external_first() && partition.n_external() > 0 {
                        return Err(OutputParseError::Parse(format!(
                            "External orbitals start at {} but internal+active is {}",
                            first,
                            partition.external_first()
                        )));
                    }
                }
                Ok(partition)
            }
            _ => Err(OutputParseError::Parse(
                "No 'Determined orbital ranges:' block found. Check that the output is a complete ORCA CASSCF/MRCI run"
                    .to_string(),
            )),
        }
    }
}

/// A state being filled in, plus its CFG records for the CFG-only fallback.
struct PendingState {
    vector: StateVector,
    configurations: Vec<ExcitationRecord>,
}

impl PendingState {
    fn new(multiplicity: u32, root: usize, energy: f64) -> Self {
        Self {
            vector: StateVector::new(multiplicity, root, energy),
            configurations: Vec::new(),
        }
    }

    /// Records a CFG line; a closed-shell CFG becomes a determinant right away.
    fn add_configuration(&mut self, record: ExcitationRecord, partition: &OrbitalPartition) -> Result<()> {
        if decoder::is_closed_shell_cfg(&record.active_codes) {
            warn!("Found CFG with no singly occupied orbital. Determinant is probably not printed; converting CFG weight");
            self.vector.insert(decoder::decode(&record, partition)?);
        }
        self.configurations.push(record);
        Ok(())
    }

    fn finish(mut self, partition: &OrbitalPartition) -> Result<StateVector> {
        if self.vector.is_empty() && !self.configurations.is_empty() {
            warn!(
                "No determinant output found for root {} (mult {}). Rebuilding the state from {} CFGs",
                self.vector.root,
                self.vector.multiplicity,
                self.configurations.len()
            );
            for record in &self.configurations {
                self.vector.insert(decoder::decode(record, partition)?);
            }
        }
        debug!(
            "State mult {} root {}: E = {:.10} Eh, {} determinants, norm {:.6}",
            self.vector.multiplicity,
            self.vector.root,
            self.vector.energy,
            self.vector.len(),
            self.vector.norm()
        );
        Ok(self.vector)
    }
}

/// Parses `[2ud0]` (or `CFG[2110]` for CFGs) into codes.
fn bracket_codes(token: &str, cfg: bool) -> Result<Vec<OccupationCode>> {
    let inner: String = token
        .replace("CFG", "")
        .chars()
        .filter(|c| *c != '[' && *c != ']')
        .collect();
    inner
        .chars()
        .map(|c| {
            let code = if cfg {
                OccupationCode::from_orca_cfg(c)
            } else {
                OccupationCode::from_orca_det(c)
            };
            code.ok_or_else(|| {
                OutputParseError::Parse(format!("Unknown occupation '{}' in '{}'", c, token))
            })
        })
        .collect()
}

fn parse_f64(token: &str, line: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| OutputParseError::Parse(format!("Expected a number, found '{}' in line: {}", token, line.trim())))
}

/// Determinant line: first token is the bracket, last token the coefficient.
fn determinant_line(line: &str) -> Option<(&str, &str)> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    let last = tokens.last()?;
    if first.starts_with('[') && first.ends_with(']') {
        Some((first, last))
    } else {
        None
    }
}

fn push_state(
    blocks: &mut BTreeMap<u32, MultiplicityBlock>,
    state: Option<PendingState>,
    partition: &OrbitalPartition,
) -> Result<()> {
    if let Some(pending) = state {
        let vector = pending.finish(partition)?;
        blocks
            .entry(vector.multiplicity)
            .or_insert_with(|| MultiplicityBlock::new(vector.multiplicity))
            .states
            .push(vector);
    }
    Ok(())
}

/// Reads CASSCF CI vectors from an ORCA output file.
pub fn read_casscf_output(path: &Path) -> Result<CiOutput> {
    info!("Reading CASSCF determinants from {}", path.display());
    parse_casscf(&fs::read_to_string(path)?)
}

/// Parses CASSCF CI vectors from ORCA output text.
pub fn parse_casscf(text: &str) -> Result<CiOutput> {
    let mut ranges = RangeReader::default();
    let mut partition: Option<OrbitalPartition> = None;
    let mut blocks = BTreeMap::new();
    let mut mult: Option<u32> = None;
    let mut in_dets = false;
    let mut state: Option<PendingState> = None;

    for line in text.lines() {
        ranges.feed(line);

        if line.contains("SA-CASSCF TRANSITION ENERGIES") || line.contains("DENSITY MATRIX") {
            in_dets = false;
        }

        if in_dets {
            let part = match partition {
                Some(p) => p,
                None => {
                    let p = ranges.partition()?;
                    partition = Some(p);
                    p
                }
            };

            if let Some(caps) = ROOT_RE.captures(line) {
                let m = mult.ok_or_else(|| {
                    OutputParseError::Parse("ROOT line found before any CAS-SCF STATES block".to_string())
                })?;
                push_state(&mut blocks, state.take(), &part)?;
                let root = caps[1]
                    .parse::<usize>()
                    .map_err(|_| OutputParseError::Parse(format!("Bad root in line: {}", line.trim())))?;
                let energy = parse_f64(&caps[2], line)?;
                state = Some(PendingState::new(m, root, energy));
            } else if line.contains('[') {
                let current = match state.as_mut() {
                    Some(s) => s,
                    None => continue,
                };
                if line.contains("CFG") {
                    let mut tokens = line.split_whitespace();
                    let (first, last) = match (tokens.next(), tokens.last()) {
                        (Some(f), Some(l)) => (f, l),
                        _ => continue,
                    };
                    let codes = bracket_codes(first, true)?;
                    let weight = parse_f64(last, line)?;
                    current.add_configuration(
                        ExcitationRecord::active_only(codes, Amplitude::Weight(weight)),
                        &part,
                    )?;
                } else if let Some((bracket, coefficient)) = determinant_line(line) {
                    let codes = bracket_codes(bracket, false)?;
                    let record = ExcitationRecord::active_only(
                        codes,
                        Amplitude::Coefficient(parse_f64(coefficient, line)?),
                    );
                    current.vector.insert(decoder::decode(&record, &part)?);
                }
            }
        }

        if let Some(caps) = CAS_BLOCK_RE.captures(line) {
            if let Some(part) = partition {
                push_state(&mut blocks, state.take(), &part)?;
            }
            mult = caps[1].parse::<u32>().ok();
            debug!("CAS-SCF block with multiplicity {:?}", mult);
            in_dets = false;
        }
        if line.contains("  Extended CI Printing (values > TPrintWF)")
            || line.contains("  Spin-Determinant CI Printing")
        {
            in_dets = true;
        }
    }

    let partition = match partition {
        Some(p) => p,
        None => ranges.partition()?,
    };
    push_state(&mut blocks, state.take(), &partition)?;

    if blocks.is_empty() {
        return Err(OutputParseError::Parse(
            "No CASSCF determinants found. Check that the job used 'PrintWF det' or extended CI printing"
                .to_string(),
        ));
    }
    Ok(CiOutput { partition, blocks })
}

/// Hole indices of an MRCI CFG: `h---h---`, `h---h 3` or `h 2h 3`.
fn parse_holes(text: &str) -> Result<Vec<usize>> {
    text.replace("---", "")
        .replace('h', " ")
        .split_whitespace()
        .map(|t| {
            t.parse::<usize>()
                .map_err(|_| OutputParseError::Parse(format!("Bad hole index '{}' in '{}'", t, text)))
        })
        .collect()
}

/// Particle indices of an MRCI CFG: `p 12` or `p 12p 14`.
fn parse_particles(text: &str) -> Result<Vec<usize>> {
    text.replace('p', " ")
        .split_whitespace()
        .map(|t| {
            t.parse::<usize>()
                .map_err(|_| OutputParseError::Parse(format!("Bad particle index '{}' in '{}'", t, text)))
        })
        .collect()
}

fn check_version(line: &str) -> Result<()> {
    if let Some(caps) = VERSION_RE.captures(line) {
        let version: Vec<u32> = (1..=3).filter_map(|i| caps[i].parse::<u32>().ok()).collect();
        if version.len() == 3 && (version[0], version[1], version[2]) <= LAST_UNSUPPORTED_VERSION {
            let (a, b, c) = LAST_UNSUPPORTED_VERSION;
            return Err(OutputParseError::UnsupportedVersion(
                format!("{}.{}.{}", a, b, c),
                format!("{}.{}.{}", version[0], version[1], version[2]),
            ));
        }
    }
    Ok(())
}

/// Reads MRCI (or SORCI when `sorci` is set) CI vectors from an ORCA output file.
pub fn read_mrci_output(path: &Path, sorci: bool) -> Result<CiOutput> {
    info!(
        "Reading {} determinants from {}",
        if sorci { "SORCI" } else { "MRCI" },
        path.display()
    );
    parse_mrci(&fs::read_to_string(path)?, sorci)
}

/// Parses MRCI/SORCI CI vectors from ORCA output text.
pub fn parse_mrci(text: &str, sorci: bool) -> Result<CiOutput> {
    let mut ranges = RangeReader::default();
    let mut partition: Option<OrbitalPartition> = None;
    let mut total_orbitals: Option<usize> = None;
    let mut blocks = BTreeMap::new();
    let mut final_part = !sorci;
    let mut in_dets = false;
    let mut mult: Option<u32> = None;
    let mut state: Option<PendingState> = None;
    let mut holes: Vec<usize> = Vec::new();
    let mut particles: Vec<usize> = Vec::new();

    for line in text.lines() {
        check_version(line)?;
        ranges.feed(line);

        if let Some(caps) = TOTAL_ORBITALS_RE.captures(line) {
            total_orbitals = caps[1].parse::<usize>().ok();
        }
        if line.contains("TRANSITION ENERGIES")
            || line.contains("DENSITY MATRIX")
            || line.contains("DENSITY GENERATION")
        {
            in_dets = false;
        }
        if line.contains("          CI-BLOCK") {
            // Reference-space CI of a new block must not be read
            in_dets = false;
        }
        if line.contains("Building a CAS") {
            mult = line
                .split_whitespace()
                .last()
                .and_then(|t| t.parse::<u32>().ok());
        }

        if in_dets {
            let part = match partition {
                Some(p) => p,
                None => {
                    let p = ranges.partition()?;
                    if let Some(total) = total_orbitals {
                        if total != p.total() {
                            return Err(OutputParseError::Parse(format!(
                                "Orbital ranges cover {} orbitals but output reports {}",
                                p.total(),
                                total
                            )));
                        }
                    }
                    partition = Some(p);
                    p
                }
            };

            if let Some(caps) = MRCI_CFG_RE.captures(line) {
                holes = parse_holes(&caps[2])?;
                particles = parse_particles(&caps[4])?;
                let weight = parse_f64(&caps[1], line)?;
                let codes = bracket_codes(&caps[3], true)?;
                if let Some(current) = state.as_mut() {
                    current.add_configuration(
                        ExcitationRecord {
                            holes: holes.clone(),
                            particles: particles.clone(),
                            active_codes: codes,
                            amplitude: Amplitude::Weight(weight),
                        },
                        &part,
                    )?;
                }
            } else if let Some(caps) = MRCI_STATE_RE.captures(line) {
                let m = mult.ok_or_else(|| {
                    OutputParseError::Parse("STATE line found before any 'Building a CAS' line".to_string())
                })?;
                push_state(&mut blocks, state.take(), &part)?;
                let root = caps[1]
                    .parse::<usize>()
                    .map_err(|_| OutputParseError::Parse(format!("Bad root in line: {}", line.trim())))?;
                state = Some(PendingState::new(m, root, parse_f64(&caps[2], line)?));
                holes.clear();
                particles.clear();
            } else if let Some((bracket, coefficient)) = determinant_line(line) {
                if let Some(current) = state.as_mut() {
                    let record = ExcitationRecord {
                        holes: holes.clone(),
                        particles: particles.clone(),
                        active_codes: bracket_codes(bracket, false)?,
                        amplitude: Amplitude::Coefficient(parse_f64(coefficient, line)?),
                    };
                    current.vector.insert(decoder::decode(&record, &part)?);
                }
            }
        }

        if final_part && line.contains("Unselected CSF estimate:") {
            in_dets = true;
        }
        if line.contains("S O R C I (DDCI3-STEP)") {
            final_part = true;
        }
    }

    let partition = match partition {
        Some(p) => p,
        None => ranges.partition()?,
    };
    push_state(&mut blocks, state.take(), &partition)?;

    if blocks.is_empty() {
        return Err(OutputParseError::Parse(
            "No MRCI determinants found. Check that determinant printing was requested in the %mrci block"
                .to_string(),
        ));
    }
    Ok(CiOutput { partition, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASSCF_OUT: &str = "\
Determined orbital ranges:
   Internal       0 -    1 (   2 orbitals)
   Active         2 -    4 (   3 orbitals)
   External       5 -    6 (   2 orbitals)
Number of rotation parameters ...     10

CAS-SCF STATES FOR BLOCK  1 MULT= 2 NROOTS= 2

  Spin-Determinant CI Printing
ROOT   0:  E=     -75.5000000000 Eh
   CFG[210]     0.98000
      [2u0]    0.98995
ROOT   1:  E=     -75.2000000000 Eh
   CFG[120]     0.90000
      [u20]   -0.94868
CAS-SCF STATES FOR BLOCK  2 MULT= 4 NROOTS= 1

  Extended CI Printing (values > TPrintWF)
ROOT   0:  E=     -75.0000000000 Eh
   CFG[111]     1.00000
      [uuu]    1.00000

SA-CASSCF TRANSITION ENERGIES
";

    #[test]
    fn test_casscf_blocks() {
        let out = parse_casscf(CASSCF_OUT).unwrap();
        assert_eq!(out.partition.total(), 7);
        assert_eq!(out.multiplicities(), vec![2, 4]);

        let doublets = out.block(2).unwrap();
        assert_eq!(doublets.len(), 2);
        assert_eq!(doublets.energies(), vec![-75.5, -75.2]);
        let first = &doublets.states[0];
        let (det, c) = first.coefficients.iter().next().unwrap();
        assert_eq!(det.to_string(), "dddaeee");
        assert!((c - 0.98995).abs() < 1e-12);
        assert!(!first.is_lossy());

        let quartet = &out.block(4).unwrap().states[0];
        assert_eq!(quartet.coefficients.len(), 1);
    }

    #[test]
    fn test_casscf_cfg_only_state() {
        let text = "\
Determined orbital ranges:
   Internal       0 -    0 (   1 orbitals)
   Active         1 -    2 (   2 orbitals)
   External       3 -    3 (   1 orbitals)
Number of rotation parameters ...     4
CAS-SCF STATES FOR BLOCK  1 MULT= 1 NROOTS= 1
  Extended CI Printing (values > TPrintWF)
ROOT   0:  E=     -10.0000000000 Eh
   CFG[20]     0.64000
   CFG[02]     0.36000
DENSITY MATRIX
";
        let out = parse_casscf(text).unwrap();
        let state = &out.block(1).unwrap().states[0];
        assert!(state.is_lossy());
        assert_eq!(state.len(), 2);
        let dets: Vec<String> = state.coefficients.keys().map(|d| d.to_string()).collect();
        assert!(dets.contains(&"ddee".to_string()));
        assert!(dets.contains(&"dede".to_string()));
        assert!((state.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_ranges() {
        let err = parse_casscf("nothing here\n").unwrap_err();
        assert!(matches!(err, OutputParseError::Parse(_)));
    }

    const MRCI_OUT: &str = "\
                           Program Version 5.0.4 -  RELEASE  -
Determined orbital ranges:
   Internal       0 -    1 (   2 orbitals)
   Active         2 -    3 (   2 orbitals)
   External       4 -    5 (   2 orbitals)
Number of rotation parameters ...     10
Total number of orbitals            ...     6
          CI-BLOCK  1
Building a CAS(1,2) for multiplicity    2
Unselected CSF estimate:
STATE   0:  Energy=    -40.100000000 Eh RefWeight=   0.9500  0.00 eV
   0.90000 : CFG h---h---[10]
          [u0]   -0.94868
   0.05000 : CFG h---h 1[120]
          [d20]    0.22361
   0.01000 : CFG h 0h 1[111011]p 4p 5
          [udu0ud]    0.07071
   0.00400 : CFG h 1h 1[20]p 5p 5
DENSITY GENERATION
";

    #[test]
    fn test_mrci_cases() {
        let out = parse_mrci(MRCI_OUT, false).unwrap();
        assert_eq!(out.partition.total(), 6);
        let state = &out.block(2).unwrap().states[0];
        assert_eq!(state.energy, -40.1);
        let dets: BTreeMap<String, f64> = state
            .coefficients
            .iter()
            .map(|(d, c)| (d.to_string(), *c))
            .collect();
        assert_eq!(dets.len(), 4);
        // Reference configuration
        assert_eq!(dets["ddaeee"], -0.94868);
        // One hole: front code goes to orbital 1
        assert_eq!(dets["dbdeee"], 0.22361);
        // Two holes, two particles: last code to the last particle
        assert_eq!(dets["abaeab"], 0.07071);
        // Double hole and double particle from a closed-shell CFG
        assert!((dets["dedeed"] - 0.004f64.sqrt()).abs() < 1e-12);
        assert!(state.is_lossy());
    }

    #[test]
    fn test_sorci_skips_first_part() {
        let text = MRCI_OUT.replace(
            "Unselected CSF estimate:",
            "Unselected CSF estimate:\nSTATE   9:  Energy=  -1.0 Eh",
        );
        // Without the DDCI3 banner nothing is final
        assert!(parse_mrci(&text, true).is_err());
        let with_banner = format!("S O R C I (DDCI3-STEP)\n{}", text);
        let out = parse_mrci(&with_banner, true).unwrap();
        assert_eq!(out.block(2).unwrap().states[0].root, 9);
    }

    #[test]
    fn test_old_version_rejected() {
        let text = MRCI_OUT.replace("5.0.4", "4.2.1");
        assert!(matches!(
            parse_mrci(&text, false),
            Err(OutputParseError::UnsupportedVersion(_, _))
        ));
    }

    #[test]
    fn test_hole_particle_tokens() {
        assert_eq!(parse_holes("h---h---").unwrap(), Vec::<usize>::new());
        assert_eq!(parse_holes("h---h 3").unwrap(), vec![3]);
        assert_eq!(parse_holes("h 2h 3").unwrap(), vec![2, 3]);
        assert_eq!(parse_particles("p 12p 14").unwrap(), vec![12, 14]);
        assert_eq!(parse_particles("").unwrap(), Vec::<usize>::new());
    }
}
