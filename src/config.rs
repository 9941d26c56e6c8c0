//! Configuration structures for dysonpes job input files.
//!
//! This module defines the values a job needs:
//!
//! - [`JobConfig`]: Main configuration structure with all parameters
//! - [`CiMethod`]: How the final (and initial) states were computed
//! - [`InitialStateSpec`]: Output files of the neutral/initial state
//! - [`FinalStateSpec`]: Output files of one ionized multiplicity
//!
//! Configuration is parsed from input files (see [`parser`](crate::parser))
//! or created programmatically.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unit conversion constant: Hartree to eV
pub const HARTREE_TO_EV: f64 = 27.211386245988;

/// Default memory for the overlap program (MB)
pub const DEFAULT_WFOVERLAP_MEMORY: u64 = 40000;

/// Method that produced the state vectors.
///
/// | Method | State vectors from |
/// |--------|--------------------|
/// | `Casscf` | CASSCF determinant printing |
/// | `Mrci` | MRCI CFG/determinant printing |
/// | `Sorci` | SORCI (DDCI3 step) printing |
/// | `Tddft` | Packed CIS file plus SCF reference |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CiMethod {
    /// CASSCF
    Casscf,
    /// MRCI
    Mrci,
    /// SORCI
    Sorci,
    /// ΔSCF plus TDDFT/TDA
    Tddft,
}

impl CiMethod {
    /// Parses the method keyword used in input files and on the command line.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_lowercase().as_str() {
            "casscf" | "cas" => Some(CiMethod::Casscf),
            "mrci" => Some(CiMethod::Mrci),
            "sorci" => Some(CiMethod::Sorci),
            "tddft" | "tda" => Some(CiMethod::Tddft),
            _ => None,
        }
    }

    /// True for the methods read from CI text tables.
    pub fn is_ci(self) -> bool {
        !matches!(self, CiMethod::Tddft)
    }
}

/// Output files of the initial (un-ionized) state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialStateSpec {
    /// ORCA output file
    pub output: PathBuf,
    /// ORCA `.gbw` file
    pub gbw: PathBuf,
    /// Spin multiplicity
    pub multiplicity: u32,
    /// Molecular charge
    pub charge: i64,
}

/// Output files of one ionized multiplicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStateSpec {
    /// Spin multiplicity
    pub multiplicity: u32,
    /// ORCA output file
    pub output: PathBuf,
    /// ORCA `.gbw` file
    pub gbw: PathBuf,
    /// Packed CIS amplitude file (TDDFT only)
    pub cis: Option<PathBuf>,
}

/// Complete configuration of a dysonpes job.
///
/// # Required Fields
///
/// - `method`
/// - `initial.output`, `initial.gbw`, `initial.multiplicity`
/// - at least one entry in `final_states`
/// - `nuclear_charge` for TDDFT jobs whose logs lack CIS orbital ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// How the states were computed
    pub method: CiMethod,
    /// Initial state
    pub initial: InitialStateSpec,
    /// Ionized states, one entry per multiplicity
    pub final_states: Vec<FinalStateSpec>,
    /// Total nuclear charge of the molecule
    pub nuclear_charge: i64,
    /// Path to the wfoverlap executable
    pub wfoverlap: String,
    /// Memory for wfoverlap (MB)
    pub memory: u64,
    /// Discarded-norm budget for CI vector truncation (0 keeps all)
    pub wfthres: f64,
    /// Number of frozen core orbitals
    pub frozen_core: usize,
    /// TDDFT run used the Tamm-Dancoff approximation
    pub tda: bool,
    /// Number of TDDFT roots per final multiplicity (`None` reads all)
    pub nroots: Option<usize>,
    /// Directory holding one overlap subdirectory per multiplicity
    pub work_dir: PathBuf,
    /// ORCA directory containing `orca_fragovl` (empty uses `PATH`)
    pub orca_dir: String,
    /// Compute Dyson norms (otherwise only IPs are reported, norms zero)
    pub dyson: bool,
    /// Remove intermediate overlap files afterwards
    pub cleanup: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            method: CiMethod::Tddft,
            initial: InitialStateSpec::default(),
            final_states: Vec::new(),
            nuclear_charge: 0,
            wfoverlap: "wfoverlap.x".to_string(),
            memory: DEFAULT_WFOVERLAP_MEMORY,
            wfthres: 0.0,
            frozen_core: 0,
            tda: true,
            nroots: None,
            work_dir: PathBuf::from("."),
            orca_dir: String::new(),
            dyson: true,
            cleanup: false,
        }
    }
}

impl JobConfig {
    /// Working directory of the overlap run for `multiplicity`.
    pub fn overlap_dir(&self, multiplicity: u32) -> PathBuf {
        self.work_dir.join(format!("mult{}", multiplicity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_keywords() {
        assert_eq!(CiMethod::from_keyword("CASSCF"), Some(CiMethod::Casscf));
        assert_eq!(CiMethod::from_keyword("sorci"), Some(CiMethod::Sorci));
        assert_eq!(CiMethod::from_keyword("tda"), Some(CiMethod::Tddft));
        assert_eq!(CiMethod::from_keyword("ccsd"), None);
        assert!(!CiMethod::Tddft.is_ci());
    }

    #[test]
    fn test_overlap_dir_per_multiplicity() {
        let config = JobConfig {
            work_dir: PathBuf::from("/tmp/job"),
            ..Default::default()
        };
        assert_eq!(config.overlap_dir(2), PathBuf::from("/tmp/job/mult2"));
        assert_eq!(config.memory, 40000);
    }
}
