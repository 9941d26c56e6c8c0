//! End-to-end photoelectron-spectrum job.
//!
//! 1. Read the initial state vector (first root of the initial CI block, or
//!    the SCF reference determinant for TDDFT).
//! 2. Read every final multiplicity block, derive its IPs and build its
//!    determinant table.
//! 3. Read AO overlap and MO coefficients through `orca_fragovl`.
//! 4. Run the overlap program once per final multiplicity in
//!    `<work_dir>/mult<m>`.
//! 5. Pair IPs with Dyson norms, print the table and write
//!    `PES-Results.txt`.
//!
//! Blocks are processed in `*FINAL` order, and the same order is used for
//! IPs and norms.

use crate::assembler::{self, AssemblyError, FinalBlock, PesResults, StateKind, RESULTS_FILE};
use crate::cis::{self, CisError, CisExtraction};
use crate::civector::{CiVectorError, DeterminantTable, StateVector};
use crate::cleanup::CleanupManager;
use crate::config::{CiMethod, JobConfig};
use crate::io::{FileFormatError, GbwReader, MoCoefficients};
use crate::naming::FileNaming;
use crate::orca_output::{self, CiOutput, OutputParseError};
use crate::validation::{self, ValidationError};
use crate::wfoverlap::{self, OverlapError, OverlapJob, OverlapProgram};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Any failure of a job.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid job
    #[error("{0}")]
    Validation(#[from] ValidationError),
    /// CASSCF/MRCI output
    #[error(transparent)]
    Output(#[from] OutputParseError),
    /// CIS/TDDFT data
    #[error(transparent)]
    Cis(#[from] CisError),
    /// Determinant tables
    #[error(transparent)]
    CiVector(#[from] CiVectorError),
    /// AO/MO files
    #[error(transparent)]
    Files(#[from] FileFormatError),
    /// Overlap driver
    #[error(transparent)]
    Overlap(#[from] OverlapError),
    /// Result assembly
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    /// Result JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A multiplicity block is absent from an output file
    #[error("No states with multiplicity {multiplicity} in {file}")]
    MissingBlock {
        /// Requested multiplicity
        multiplicity: u32,
        /// Searched file
        file: String,
    },
}

type Result<T> = std::result::Result<T, WorkflowError>;

/// Initial state: its vector, energy and reference type.
#[derive(Debug, Clone)]
pub struct InitialState {
    /// State vector written to `dets_init`
    pub state: StateVector,
    /// Total energy (Eh)
    pub energy: f64,
    /// Closed-shell orbitals
    pub restricted: bool,
    /// Type reported in the result table
    pub kind: StateKind,
    /// Koopmans MO-IPs (eV) per spin; only known for SCF initial states
    pub mo_ips: (Vec<f64>, Vec<f64>),
}

/// One final multiplicity ready for the overlap run.
#[derive(Debug, Clone)]
pub struct PreparedBlock {
    /// Energies, IPs and tags
    pub block: FinalBlock,
    /// Determinants of all states of the block
    pub table: DeterminantTable,
    /// Orbital file of the block
    pub gbw: PathBuf,
    /// Closed-shell orbitals
    pub restricted: bool,
}

/// A configured job.
pub struct Workflow<'a> {
    config: &'a JobConfig,
    naming: FileNaming,
    overlap: &'a dyn OverlapProgram,
    gbw_reader: &'a dyn GbwReader,
    ci_outputs: BTreeMap<PathBuf, CiOutput>,
}

impl<'a> Workflow<'a> {
    /// Creates a job; nothing is read until [`Workflow::run`].
    pub fn new(
        config: &'a JobConfig,
        naming: FileNaming,
        overlap: &'a dyn OverlapProgram,
        gbw_reader: &'a dyn GbwReader,
    ) -> Self {
        Self {
            config,
            naming,
            overlap,
            gbw_reader,
            ci_outputs: BTreeMap::new(),
        }
    }

    fn ci_output(&mut self, path: &Path) -> Result<&CiOutput> {
        if !self.ci_outputs.contains_key(path) {
            let output = match self.config.method {
                CiMethod::Casscf => orca_output::read_casscf_output(path)?,
                CiMethod::Mrci => orca_output::read_mrci_output(path, false)?,
                CiMethod::Sorci => orca_output::read_mrci_output(path, true)?,
                CiMethod::Tddft => {
                    return Err(OutputParseError::Parse("TDDFT outputs have no CI tables".to_string()).into())
                }
            };
            self.ci_outputs.insert(path.to_path_buf(), output);
        }
        self.ci_outputs
            .get(path)
            .ok_or_else(|| OutputParseError::Parse(format!("{} was not read", path.display())).into())
    }

    fn ci_states(&mut self, path: &Path, multiplicity: u32) -> Result<Vec<StateVector>> {
        let block = self
            .ci_output(path)?
            .block(multiplicity)
            .ok_or_else(|| WorkflowError::MissingBlock {
                multiplicity,
                file: path.display().to_string(),
            })?;
        let mut states = block.states.clone();
        self.finish_ci_states(&mut states);
        Ok(states)
    }

    /// MRCI multiplicity filter, frozen core and truncation for CI states.
    fn finish_ci_states(&self, states: &mut [StateVector]) {
        for state in states.iter_mut() {
            if matches!(self.config.method, CiMethod::Mrci | CiMethod::Sorci) {
                state.retain_multiplicity();
            }
            if self.config.frozen_core > 0 {
                strip_core(state, self.config.frozen_core);
            }
            state.truncate(self.config.wfthres);
            if state.is_lossy() {
                warn!(
                    "State {} (mult {}) contains {} determinant(s) reconstructed from CFG weights",
                    state.root,
                    state.multiplicity,
                    state.reconstructed.len()
                );
            }
        }
    }

    fn extraction(&self, multiplicity: u32, restricted: bool) -> CisExtraction {
        CisExtraction {
            multiplicity,
            restricted,
            frozen_core: self.config.frozen_core,
            wfthres: self.config.wfthres,
        }
    }

    /// Reads the initial state.
    pub fn initial_state(&mut self) -> Result<InitialState> {
        let config = self.config;
        let spec = &config.initial;
        if self.config.method.is_ci() {
            let output = spec.output.clone();
            let states = self.ci_states(&output, spec.multiplicity)?;
            let state = states.into_iter().next().ok_or_else(|| WorkflowError::MissingBlock {
                multiplicity: spec.multiplicity,
                file: output.display().to_string(),
            })?;
            info!("Initial state: mult {} root {} E = {:.10} Eh", state.multiplicity, state.root, state.energy);
            Ok(InitialState {
                energy: state.energy,
                state,
                restricted: true,
                kind: StateKind::Ci,
                mo_ips: (Vec::new(), Vec::new()),
            })
        } else {
            let log = cis::read_cis_log(&spec.output)?;
            let extraction = self.extraction(spec.multiplicity, log.restricted);
            let state = cis::read_single_reference(
                &spec.output,
                &extraction,
                self.config.nuclear_charge,
                spec.charge,
            )?;
            info!("Initial state: mult {} SCF E = {:.10} Eh", state.multiplicity, state.energy);
            let mo_ips = log.mo_ips();
            if mo_ips.0.is_empty() {
                warn!("No orbital energies in {}; MO-IPs will be empty", spec.output.display());
            } else {
                info!("MO-IPs (alpha), eV: {:?}", mo_ips.0);
                info!("MO-IPs (beta), eV: {:?}", mo_ips.1);
            }
            Ok(InitialState {
                energy: state.energy,
                state,
                restricted: log.restricted,
                kind: StateKind::Scf,
                mo_ips,
            })
        }
    }

    /// Reads all final multiplicity blocks.
    pub fn final_blocks(&mut self, initial_energy: f64) -> Result<Vec<PreparedBlock>> {
        let specs = self.config.final_states.clone();
        let mut blocks = Vec::with_capacity(specs.len());
        for spec in &specs {
            let prepared = if self.config.method.is_ci() {
                let states = self.ci_states(&spec.output, spec.multiplicity)?;
                let energies: Vec<f64> = states.iter().map(|s| s.energy).collect();
                PreparedBlock {
                    block: FinalBlock::from_ci(spec.multiplicity, &energies, initial_energy),
                    table: DeterminantTable::from_states(&states)?,
                    gbw: spec.gbw.clone(),
                    restricted: true,
                }
            } else {
                let cis_path = spec.cis.clone().ok_or_else(|| {
                    CisError::Parse(format!("No CIS file for multiplicity {}", spec.multiplicity))
                })?;
                let log = cis::read_cis_log(&spec.output)?;
                let nroots = self.config.nroots.unwrap_or(log.excitation_energies_ev.len());
                let tddft = cis::read_tddft_block(
                    &spec.output,
                    &cis_path,
                    &self.extraction(spec.multiplicity, log.restricted),
                    self.config.nuclear_charge,
                    self.config.initial.charge + 1,
                    self.config.tda,
                    nroots,
                )?;
                PreparedBlock {
                    block: FinalBlock::from_tddft(
                        spec.multiplicity,
                        tddft.scf_energy,
                        &tddft.excitation_energies_ev,
                        initial_energy,
                        self.config.tda,
                    ),
                    table: DeterminantTable::from_states(&tddft.states)?,
                    gbw: spec.gbw.clone(),
                    restricted: log.restricted,
                }
            };
            info!(
                "Final states mult {}: {} states, {} determinants, IPs (eV) {:?}",
                spec.multiplicity,
                prepared.block.len(),
                prepared.table.ndets(),
                prepared.block.ips
            );
            blocks.push(prepared);
        }
        Ok(blocks)
    }

    fn save_tables(&self, initial: &DeterminantTable, blocks: &[PreparedBlock]) -> Result<()> {
        fs::create_dir_all(&self.config.work_dir)?;
        initial.write(&self.config.work_dir.join(self.naming.dets_initial()))?;
        for prepared in blocks {
            prepared
                .table
                .write(&self.config.work_dir.join(self.naming.dets_final(prepared.block.multiplicity)))?;
        }
        Ok(())
    }

    /// Runs the overlap program for every block and returns the combined norms.
    fn dyson_norms(
        &self,
        initial: &InitialState,
        dets_initial: &DeterminantTable,
        blocks: &[PreparedBlock],
    ) -> Result<Vec<f64>> {
        let total: usize = blocks.iter().map(|b| b.block.len()).sum();
        if !self.config.dyson {
            return Ok(vec![0.0; total]);
        }

        let initial_fragovl = self.gbw_reader.fragovl(&self.config.initial.gbw)?;
        let ao_overlap = initial_fragovl.overlap_matrix()?;
        let mos_initial = initial_fragovl.mo_coefficients(initial.restricted)?;

        let mut mos_cache: BTreeMap<(PathBuf, bool), MoCoefficients> = BTreeMap::new();
        let mut norms = Vec::with_capacity(total);
        for prepared in blocks {
            let key = (prepared.gbw.clone(), prepared.restricted);
            if !mos_cache.contains_key(&key) {
                let mos = self.gbw_reader.fragovl(&prepared.gbw)?.mo_coefficients(prepared.restricted)?;
                mos_cache.insert(key.clone(), mos);
            }
            let mos_final = mos_cache.get(&key).ok_or_else(|| {
                FileFormatError::Parse(format!("MO coefficients of {} missing", prepared.gbw.display()))
            })?;

            let dir = self.config.overlap_dir(prepared.block.multiplicity);
            OverlapJob {
                ao_overlap: &ao_overlap,
                mos_initial: &mos_initial,
                mos_final,
                dets_initial,
                dets_final: &prepared.table,
                frozen_core: self.config.frozen_core,
            }
            .write(&dir)?;
            info!(
                "Running the overlap program for final states with multiplicity {}",
                prepared.block.multiplicity
            );
            norms.extend(wfoverlap::dyson_norms(self.overlap, &dir, prepared.block.len()));
        }
        Ok(norms)
    }

    /// Runs the whole job.
    pub fn run(&mut self) -> Result<PesResults> {
        validation::provide_user_guidance(self.config);

        let initial = self.initial_state()?;
        let blocks = self.final_blocks(initial.energy)?;
        let dets_initial = DeterminantTable::from_states(std::slice::from_ref(&initial.state))?;
        self.save_tables(&dets_initial, &blocks)?;

        let norms = self.dyson_norms(&initial, &dets_initial, &blocks)?;
        let final_blocks: Vec<FinalBlock> = blocks.iter().map(|b| b.block.clone()).collect();
        let results = assembler::assemble(
            initial.state.multiplicity,
            initial.energy,
            initial.kind,
            &final_blocks,
            &norms,
        )?
        .with_mo_ips(initial.mo_ips.0.clone(), initial.mo_ips.1.clone());

        info!("FINAL RESULTS\n{}", results.table());
        results.write_results_file(&self.config.work_dir.join(RESULTS_FILE))?;
        fs::write(
            self.config.work_dir.join(self.naming.summary_json()),
            serde_json::to_string_pretty(&results)?,
        )?;

        let cleanup = CleanupManager::new(self.config.cleanup);
        for prepared in &blocks {
            let dir = self.config.overlap_dir(prepared.block.multiplicity);
            if let Err(e) = cleanup.cleanup_directory(&dir) {
                warn!("Cleanup of {} failed: {}", dir.display(), e);
            }
        }
        Ok(results)
    }
}

/// Removes the first `n_frozen` (doubly occupied) orbitals from every
/// determinant of a closed-shell CI state.
fn strip_core(state: &mut StateVector, n_frozen: usize) {
    let coefficients = std::mem::take(&mut state.coefficients);
    let reconstructed = std::mem::take(&mut state.reconstructed);
    for (det, c) in coefficients {
        if det.len() < n_frozen {
            warn!("Determinant {} is shorter than the frozen core", det);
            continue;
        }
        if let Some(stripped) = cis::strip_frozen_core(&det, n_frozen, true, det.len()) {
            if reconstructed.contains(&det) {
                state.reconstructed.insert(stripped.clone());
            }
            state.coefficients.insert(stripped, c);
        }
    }
    debug!("Frozen core removed from state {} (mult {})", state.root, state.multiplicity);
}

/// Decodes one CI output and writes the determinant file of one multiplicity.
pub fn write_determinants(
    output: &Path,
    method: CiMethod,
    multiplicity: u32,
    destination: &Path,
) -> Result<DeterminantTable> {
    let ci = match method {
        CiMethod::Casscf => orca_output::read_casscf_output(output)?,
        CiMethod::Mrci => orca_output::read_mrci_output(output, false)?,
        CiMethod::Sorci => orca_output::read_mrci_output(output, true)?,
        CiMethod::Tddft => {
            return Err(OutputParseError::Parse(
                "Determinant extraction from text output needs a CASSCF, MRCI or SORCI output".to_string(),
            )
            .into())
        }
    };
    let block = ci.block(multiplicity).ok_or_else(|| WorkflowError::MissingBlock {
        multiplicity,
        file: output.display().to_string(),
    })?;
    let mut table = DeterminantTable::from_states(&block.states)?;
    if method != CiMethod::Casscf {
        table.retain_multiplicity(multiplicity);
    }
    table.write(destination)?;
    info!(
        "Wrote {} determinants for {} states to {}",
        table.ndets(),
        table.nstates(),
        destination.display()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occupation::Determinant;

    #[test]
    fn test_strip_core_keeps_flags() {
        let mut state = StateVector::new(1, 0, -1.0);
        let a = Determinant::parse("ddae").unwrap();
        let b = Determinant::parse("dabd").unwrap();
        let broken = Determinant::parse("adbd").unwrap();
        state.coefficients.insert(a.clone(), 0.9);
        state.coefficients.insert(b.clone(), 0.3);
        state.coefficients.insert(broken, 0.1);
        state.reconstructed.insert(b);

        strip_core(&mut state, 1);
        assert_eq!(state.len(), 2);
        assert_eq!(state.coefficients[&Determinant::parse("dae").unwrap()], 0.9);
        assert!(state.reconstructed.contains(&Determinant::parse("abd").unwrap()));
    }
}
