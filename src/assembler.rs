//! Pairing of final-state energies, ionization energies and Dyson norms.
//!
//! Every final multiplicity contributes a [`FinalBlock`] with one energy,
//! one IP and one state-type tag per state. [`assemble`] concatenates the
//! blocks in the same order the determinant files were written and pairs
//! them with the concatenated Dyson norms. A length mismatch means the
//! root-to-norm alignment is broken and is never padded or truncated here.
//!
//! Results are printed as a table and saved to `PES-Results.txt`:
//!
//! ```text
//! [Results]
//! IPs : [12.6,14.2]
//! Dyson-norms : [0.91,0.87]
//! MOs_alpha : [12.1,15.8]
//! MOs_beta : []
//! ```
//!
//! `MOs_alpha`/`MOs_beta` hold Koopmans MO ionization energies of the
//! initial state (negated occupied orbital energies). They are only known
//! for SCF initial states and are empty otherwise.

use crate::config::HARTREE_TO_EV;
use configparser::ini::Ini;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default result file name.
pub const RESULTS_FILE: &str = "PES-Results.txt";

/// Errors raised while assembling or reading results.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// IP and Dyson-norm lists differ in length
    #[error("List of Dyson norms ({norms}) not the same size as list of IPs ({ips})")]
    AlignmentMismatch {
        /// Number of IPs
        ips: usize,
        /// Number of Dyson norms
        norms: usize,
    },
    /// Malformed result file
    #[error("Invalid result file: {0}")]
    Results(String),
    /// JSON list in the result file
    #[error("Invalid list in result file: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, AssemblyError>;

/// How a state was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    /// Single-determinant SCF (ΔSCF) state
    Scf,
    /// TDDFT state in the Tamm-Dancoff approximation
    Tda,
    /// Full TDDFT state
    Tddft,
    /// CASSCF/MRCI root
    Ci,
    /// IP-EOM-CCSD state
    Eom,
    /// Coupled-cluster reference
    Ccsd,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            StateKind::Scf => "SCF",
            StateKind::Tda => "TDA",
            StateKind::Tddft => "TDDFT",
            StateKind::Ci => "CI",
            StateKind::Eom => "EOM",
            StateKind::Ccsd => "CCSD",
        };
        f.pad(tag)
    }
}

/// Converts a total energy to an ionization energy in eV.
pub fn ionization_energy(energy: f64, initial_energy: f64) -> f64 {
    (energy - initial_energy) * HARTREE_TO_EV
}

/// States of one final multiplicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalBlock {
    /// Spin multiplicity
    pub multiplicity: u32,
    /// Total energies (Eh)
    pub energies: Vec<f64>,
    /// Ionization energies (eV)
    pub ips: Vec<f64>,
    /// State type of each state
    pub kinds: Vec<StateKind>,
    /// TDDFT excitation energy of each state (eV), when known
    pub excitation_energies_ev: Vec<Option<f64>>,
}

impl FinalBlock {
    /// CI roots with total energies.
    pub fn from_ci(multiplicity: u32, energies: &[f64], initial_energy: f64) -> Self {
        Self {
            multiplicity,
            energies: energies.to_vec(),
            ips: energies.iter().map(|&e| ionization_energy(e, initial_energy)).collect(),
            kinds: vec![StateKind::Ci; energies.len()],
            excitation_energies_ev: vec![None; energies.len()],
        }
    }

    /// ΔSCF state followed by the TDDFT roots built on it.
    pub fn from_tddft(
        multiplicity: u32,
        scf_energy: f64,
        excitation_energies_ev: &[f64],
        initial_energy: f64,
        tda: bool,
    ) -> Self {
        let excited = if tda { StateKind::Tda } else { StateKind::Tddft };
        let mut energies = vec![scf_energy];
        energies.extend(excitation_energies_ev.iter().map(|ev| scf_energy + ev / HARTREE_TO_EV));
        let mut kinds = vec![StateKind::Scf];
        kinds.extend(std::iter::repeat(excited).take(excitation_energies_ev.len()));
        let mut excitations = vec![None];
        excitations.extend(excitation_energies_ev.iter().map(|&ev| Some(ev)));
        Self {
            multiplicity,
            ips: energies.iter().map(|&e| ionization_energy(e, initial_energy)).collect(),
            energies,
            kinds,
            excitation_energies_ev: excitations,
        }
    }

    /// EOM-IP states, where the IPs are computed directly.
    pub fn from_eom(multiplicity: u32, ips: &[f64], initial_energy: f64) -> Self {
        Self {
            multiplicity,
            energies: ips.iter().map(|ip| initial_energy + ip / HARTREE_TO_EV).collect(),
            ips: ips.to_vec(),
            kinds: vec![StateKind::Eom; ips.len()],
            excitation_energies_ev: vec![None; ips.len()],
        }
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.ips.len()
    }

    /// True when the block has no states.
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }
}

/// One ionized state in the final table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DysonResult {
    /// Multiplicity of the ionized state
    pub multiplicity: u32,
    /// Total energy (Eh)
    pub energy: f64,
    /// Ionization energy (eV)
    pub ionization_energy: f64,
    /// Dyson norm, or the singles-amplitude proxy for EOM
    pub dyson_norm: f64,
    /// State type
    pub kind: StateKind,
    /// TDDFT excitation energy (eV)
    pub excitation_energy_ev: Option<f64>,
}

/// Initial state and all ionized states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PesResults {
    /// Multiplicity of the initial state
    pub initial_multiplicity: u32,
    /// Energy of the initial state (Eh)
    pub initial_energy: f64,
    /// Type of the initial state
    pub initial_kind: StateKind,
    /// Ionized states in (multiplicity, root) order
    pub states: Vec<DysonResult>,
    /// Koopmans MO-IPs (eV) of the alpha orbitals of the initial state
    #[serde(default)]
    pub mo_ips_alpha: Vec<f64>,
    /// Koopmans MO-IPs (eV) of the beta orbitals (unrestricted only)
    #[serde(default)]
    pub mo_ips_beta: Vec<f64>,
}

/// Contents of a `PES-Results.txt` file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultsFile {
    /// Ionization energies (eV)
    pub ips: Vec<f64>,
    /// Dyson norms, aligned with `ips`
    pub dyson_norms: Vec<f64>,
    /// Alpha MO-IPs (eV)
    pub mos_alpha: Vec<f64>,
    /// Beta MO-IPs (eV)
    pub mos_beta: Vec<f64>,
}

/// Concatenates `blocks` and pairs them with `norms`.
pub fn assemble(
    initial_multiplicity: u32,
    initial_energy: f64,
    initial_kind: StateKind,
    blocks: &[FinalBlock],
    norms: &[f64],
) -> Result<PesResults> {
    let n_ips: usize = blocks.iter().map(FinalBlock::len).sum();
    if n_ips != norms.len() {
        return Err(AssemblyError::AlignmentMismatch {
            ips: n_ips,
            norms: norms.len(),
        });
    }

    let mut norms = norms.iter();
    let mut states = Vec::with_capacity(n_ips);
    for block in blocks {
        for i in 0..block.len() {
            states.push(DysonResult {
                multiplicity: block.multiplicity,
                energy: block.energies[i],
                ionization_energy: block.ips[i],
                dyson_norm: norms.next().copied().unwrap_or_default(),
                kind: block.kinds[i],
                excitation_energy_ev: block.excitation_energies_ev.get(i).copied().flatten(),
            });
        }
    }
    info!("Assembled {} ionized states", states.len());

    Ok(PesResults {
        initial_multiplicity,
        initial_energy,
        initial_kind,
        states,
        mo_ips_alpha: Vec::new(),
        mo_ips_beta: Vec::new(),
    })
}

impl PesResults {
    /// Attaches the Koopmans MO-IPs of the initial state.
    pub fn with_mo_ips(mut self, alpha: Vec<f64>, beta: Vec<f64>) -> Self {
        self.mo_ips_alpha = alpha;
        self.mo_ips_beta = beta;
        self
    }

    /// All ionization energies (eV).
    pub fn ips(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.ionization_energy).collect()
    }

    /// All Dyson norms.
    pub fn dyson_norms(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.dyson_norm).collect()
    }

    /// Human-readable result table.
    pub fn table(&self) -> String {
        let mut out = String::new();
        out.push_str("Initial state:\n");
        out.push_str(&format!("{:>6} {:>7} {:^20} {:^5}\n", "State no.", "Mult", "TotalE (Eh)", "State-type"));
        out.push_str(&format!(
            "{:>6} {:>7} {:20.11} {:>8}\n\n",
            0, self.initial_multiplicity, self.initial_energy, self.initial_kind
        ));

        let with_excitation = self.states.iter().any(|s| s.excitation_energy_ev.is_some());
        out.push_str("Final ionized states:\n");
        out.push_str(&format!(
            "{:>6} {:>7} {:^20} {:8} {:10} {:>7}",
            "State no.", "Mult", "TotalE (Eh)", "IE (eV)", "Dyson-norm", "State-type"
        ));
        if with_excitation {
            out.push_str(&format!(" {:>15}", "TDDFT Exc.E. (eV)"));
        }
        out.push('\n');
        for (i, s) in self.states.iter().enumerate() {
            out.push_str(&format!(
                "{:>6} {:>7} {:20.11} {:>10.3} {:>10.5} {:>10}",
                i, s.multiplicity, s.energy, s.ionization_energy, s.dyson_norm, s.kind
            ));
            if let Some(ev) = s.excitation_energy_ev {
                out.push_str(&format!(" {:>15.3}", ev));
            }
            out.push('\n');
        }
        if !self.mo_ips_alpha.is_empty() {
            out.push_str(&format!("\nMO-IPs (alpha), eV: {:.3?}\n", self.mo_ips_alpha));
            if !self.mo_ips_beta.is_empty() {
                out.push_str(&format!("MO-IPs (beta), eV: {:.3?}\n", self.mo_ips_beta));
            }
        }
        out
    }

    /// Contents of `PES-Results.txt`.
    pub fn results_file_content(&self) -> Result<String> {
        Ok(format!(
            "[Results]\nIPs : {}\nDyson-norms : {}\nMOs_alpha : {}\nMOs_beta : {}\n",
            serde_json::to_string(&self.ips())?,
            serde_json::to_string(&self.dyson_norms())?,
            serde_json::to_string(&self.mo_ips_alpha)?,
            serde_json::to_string(&self.mo_ips_beta)?
        ))
    }

    /// Writes `PES-Results.txt` (or any other path).
    pub fn write_results_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.results_file_content()?)?;
        info!("IPs and Dyson norms written to {}", path.display());
        Ok(())
    }
}

fn results_list(ini: &Ini, key: &str) -> Result<Vec<f64>> {
    let value = ini
        .get("Results", key)
        .ok_or_else(|| AssemblyError::Results(format!("missing {} in [Results]", key)))?;
    Ok(serde_json::from_str(&value)?)
}

/// Parses a result file. All four lists are required.
pub fn parse_results_file(content: &str) -> Result<ResultsFile> {
    let mut ini = Ini::new();
    ini.read(content.to_string()).map_err(AssemblyError::Results)?;
    let results = ResultsFile {
        ips: results_list(&ini, "IPs")?,
        dyson_norms: results_list(&ini, "Dyson-norms")?,
        mos_alpha: results_list(&ini, "MOs_alpha")?,
        mos_beta: results_list(&ini, "MOs_beta")?,
    };
    if results.ips.len() != results.dyson_norms.len() {
        return Err(AssemblyError::AlignmentMismatch {
            ips: results.ips.len(),
            norms: results.dyson_norms.len(),
        });
    }
    Ok(results)
}

/// Reads a result file written by an earlier run.
pub fn read_results_file(path: &Path) -> Result<ResultsFile> {
    info!("Reading file {} ...", path.display());
    parse_results_file(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ci_block_ips() {
        let block = FinalBlock::from_ci(2, &[-99.5, -99.4], -100.0);
        assert!((block.ips[0] - 0.5 * HARTREE_TO_EV).abs() < 1e-9);
        assert!((block.ips[1] - 0.6 * HARTREE_TO_EV).abs() < 1e-9);
        assert_eq!(block.kinds, vec![StateKind::Ci; 2]);
    }

    #[test]
    fn test_tddft_block() {
        let block = FinalBlock::from_tddft(2, -99.5, &[2.0, 3.0], -100.0, true);
        assert_eq!(block.len(), 3);
        assert_eq!(block.kinds, vec![StateKind::Scf, StateKind::Tda, StateKind::Tda]);
        let delta_scf = 0.5 * HARTREE_TO_EV;
        assert!((block.ips[0] - delta_scf).abs() < 1e-9);
        assert!((block.ips[1] - (delta_scf + 2.0)).abs() < 1e-9);
        assert!((block.ips[2] - (delta_scf + 3.0)).abs() < 1e-9);
        assert_eq!(block.excitation_energies_ev[0], None);
    }

    #[test]
    fn test_eom_block_energies() {
        let block = FinalBlock::from_eom(2, &[HARTREE_TO_EV], -100.0);
        assert!((block.energies[0] + 99.0).abs() < 1e-12);
    }

    #[test]
    fn test_alignment_mismatch_is_fatal() {
        let blocks = [FinalBlock::from_ci(2, &[-99.5, -99.4], -100.0)];
        let err = assemble(1, -100.0, StateKind::Scf, &blocks, &[0.9]).unwrap_err();
        assert!(matches!(err, AssemblyError::AlignmentMismatch { ips: 2, norms: 1 }));
    }

    #[test]
    fn test_assemble_keeps_block_order() {
        let blocks = [
            FinalBlock::from_ci(2, &[-99.5, -99.4], -100.0),
            FinalBlock::from_ci(4, &[-99.0], -100.0),
        ];
        let results = assemble(1, -100.0, StateKind::Scf, &blocks, &[0.9, 0.8, 0.1]).unwrap();
        let mults: Vec<u32> = results.states.iter().map(|s| s.multiplicity).collect();
        assert_eq!(mults, vec![2, 2, 4]);
        assert_eq!(results.dyson_norms(), vec![0.9, 0.8, 0.1]);
        let table = results.table();
        assert!(table.contains("Final ionized states:"));
        assert!(table.contains("CI"));
    }

    #[test]
    fn test_results_file_round_trip() {
        let blocks = [FinalBlock::from_ci(2, &[-99.5], -100.0)];
        let results = assemble(1, -100.0, StateKind::Scf, &blocks, &[0.75])
            .unwrap()
            .with_mo_ips(vec![12.5, 18.25], vec![13.0]);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RESULTS_FILE);
        results.write_results_file(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[Results]\nIPs : ["));
        assert!(content.contains("MOs_alpha : [12.5,18.25]\nMOs_beta : [13.0]\n"));
        let file = read_results_file(&path).unwrap();
        assert!((file.ips[0] - 0.5 * HARTREE_TO_EV).abs() < 1e-9);
        assert_eq!(file.dyson_norms, vec![0.75]);
        assert_eq!(file.mos_alpha, vec![12.5, 18.25]);
        assert_eq!(file.mos_beta, vec![13.0]);
        assert!(results.table().contains("MO-IPs (beta), eV: [13.000]"));
    }

    #[test]
    fn test_reads_python_style_lists() {
        let file = parse_results_file(
            "[Results]\nIPs : [12.5, 14.0]\nDyson-norms : [0.9, 0.8]\nMOs_alpha : [11.0]\nMOs_beta : []\n",
        )
        .unwrap();
        assert_eq!(file.ips, vec![12.5, 14.0]);
        assert_eq!(file.dyson_norms, vec![0.9, 0.8]);
        assert_eq!(file.mos_alpha, vec![11.0]);
        assert!(file.mos_beta.is_empty());
    }

    #[test]
    fn test_results_file_needs_mo_lists() {
        let err = parse_results_file("[Results]\nIPs : [12.5]\nDyson-norms : [0.9]\n").unwrap_err();
        assert!(err.to_string().contains("MOs_alpha"));
    }
}
