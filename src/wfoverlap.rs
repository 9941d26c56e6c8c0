//! Driver for the external `wfoverlap` program.
//!
//! One overlap run is made per final-state multiplicity, each in its own
//! working directory. The directory receives
//!
//! - `AO_overl`: AO overlap matrix
//! - `mos_init` / `mos_final`: MO coefficients of the initial and final states
//! - `dets_init` / `dets_final`: determinant files
//! - `wfovl.inp`: the key=value control file
//!
//! The program is run as `<wfoverlap> -m <memory> -f wfovl.inp`; its standard
//! output and error are captured to `wfovl.out`. Dyson norms are read from the
//! `<PsiA` lines printed before the `Dyson orbitals in reference` section.
//!
//! A failed run is not fatal: the norms are replaced by zeros (with a
//! warning) so the ionization energies can still be reported.

use crate::civector::{CiVectorError, DeterminantTable};
use crate::io::{self, FileFormatError, MoCoefficients};
use log::{debug, info, warn};
use nalgebra::DMatrix;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// AO overlap file name.
pub const AO_OVERLAP_FILE: &str = "AO_overl";
/// Initial-state MO file name.
pub const MOS_INITIAL_FILE: &str = "mos_init";
/// Final-state MO file name.
pub const MOS_FINAL_FILE: &str = "mos_final";
/// Initial-state determinant file name.
pub const DETS_INITIAL_FILE: &str = "dets_init";
/// Final-state determinant file name.
pub const DETS_FINAL_FILE: &str = "dets_final";
/// Control file name.
pub const INPUT_FILE: &str = "wfovl.inp";
/// Captured program output.
pub const OUTPUT_FILE: &str = "wfovl.out";

/// Errors raised by the overlap driver.
#[derive(Error, Debug)]
pub enum OverlapError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Writing matrix files failed
    #[error(transparent)]
    Files(#[from] FileFormatError),
    /// Writing determinant files failed
    #[error(transparent)]
    Determinants(#[from] CiVectorError),
    /// The program could not be started or exited with an error
    #[error("wfoverlap failed: {0}")]
    ExternalToolFailure(String),
    /// Unreadable program output
    #[error("Parse error in wfoverlap output: {0}")]
    Parse(String),
}

type Result<T> = std::result::Result<T, OverlapError>;

/// Everything written into one overlap working directory.
#[derive(Debug, Clone, Copy)]
pub struct OverlapJob<'a> {
    /// AO overlap matrix
    pub ao_overlap: &'a DMatrix<f64>,
    /// MO coefficients of the initial state
    pub mos_initial: &'a MoCoefficients,
    /// MO coefficients of the final states
    pub mos_final: &'a MoCoefficients,
    /// Initial-state determinants
    pub dets_initial: &'a DeterminantTable,
    /// Final-state determinants
    pub dets_final: &'a DeterminantTable,
    /// Core MOs left out of the MO files
    pub frozen_core: usize,
}

impl OverlapJob<'_> {
    /// Writes the five data files into `dir`, creating it if needed.
    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        io::write_ao_overlap(self.ao_overlap, &dir.join(AO_OVERLAP_FILE))?;
        io::write_mo_file(self.mos_initial, self.frozen_core, &dir.join(MOS_INITIAL_FILE))?;
        io::write_mo_file(self.mos_final, self.frozen_core, &dir.join(MOS_FINAL_FILE))?;
        self.dets_initial.write(&dir.join(DETS_INITIAL_FILE))?;
        self.dets_final.write(&dir.join(DETS_FINAL_FILE))?;
        debug!("Overlap files written to {}", dir.display());
        Ok(())
    }
}

/// Dyson norms and orbital coefficients read from `wfovl.out`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DysonOutput {
    /// One norm per final state, in determinant-file order
    pub norms: Vec<f64>,
    /// Last field of every `MO` line of the Dyson-orbital section
    pub orbital_coefficients: Vec<f64>,
}

fn last_float(line: &str) -> Result<f64> {
    let token = line
        .split_whitespace()
        .last()
        .ok_or_else(|| OverlapError::Parse(format!("Empty line '{}'", line)))?;
    token
        .parse::<f64>()
        .map_err(|_| OverlapError::Parse(format!("Expected a number at the end of '{}'", line.trim())))
}

/// Parses the text printed by wfoverlap.
pub fn parse_dyson_output(text: &str) -> Result<DysonOutput> {
    let mut output = DysonOutput::default();
    let mut in_orbitals = false;
    for line in text.lines() {
        if in_orbitals {
            if line.contains("MO") {
                output.orbital_coefficients.push(last_float(line)?);
            }
        } else if line.contains("<PsiA ") {
            output.norms.push(last_float(line)?);
        }
        if line.contains("Dyson orbitals in reference") {
            in_orbitals = true;
        }
    }
    Ok(output)
}

/// Interface to an overlap program working in a given directory.
pub trait OverlapProgram {
    /// Writes the control file into `dir`.
    fn write_input(&self, dir: &Path) -> Result<()>;

    /// Runs the program in `dir` and waits for it.
    fn run(&self, dir: &Path) -> Result<()>;

    /// Reads the results from `dir`.
    fn read_output(&self, dir: &Path) -> Result<DysonOutput>;
}

/// The wfoverlap program.
#[derive(Debug, Clone)]
pub struct WfOverlap {
    /// Path to the executable
    pub command: PathBuf,
    /// Memory passed with `-m`, in MB
    pub memory_mb: u64,
}

impl WfOverlap {
    /// Creates a driver for `command` with `memory_mb` of memory.
    pub fn new(command: impl Into<PathBuf>, memory_mb: u64) -> Self {
        Self {
            command: command.into(),
            memory_mb,
        }
    }

    /// Contents of `wfovl.inp`.
    pub fn input_content() -> String {
        [
            format!("mix_aoovl={}", AO_OVERLAP_FILE),
            format!("a_mo={}", MOS_FINAL_FILE),
            format!("b_mo={}", MOS_INITIAL_FILE),
            format!("a_det={}", DETS_FINAL_FILE),
            format!("b_det={}", DETS_INITIAL_FILE),
            "a_mo_read=0".to_string(),
            "b_mo_read=0".to_string(),
            "ao_read=0".to_string(),
            "moprint=1".to_string(),
        ]
        .join("\n")
            + "\n"
    }
}

impl OverlapProgram for WfOverlap {
    fn write_input(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join(INPUT_FILE), Self::input_content())?;
        Ok(())
    }

    fn run(&self, dir: &Path) -> Result<()> {
        info!(
            "Running {} -m {} -f {} in {} (may take a while)",
            self.command.display(),
            self.memory_mb,
            INPUT_FILE,
            dir.display()
        );
        let output = Command::new(&self.command)
            .arg("-m")
            .arg(self.memory_mb.to_string())
            .arg("-f")
            .arg(INPUT_FILE)
            .current_dir(dir)
            .output()
            .map_err(|e| {
                OverlapError::ExternalToolFailure(format!("Could not start {}: {}", self.command.display(), e))
            })?;

        let mut captured = output.stdout;
        captured.extend_from_slice(&output.stderr);
        fs::write(dir.join(OUTPUT_FILE), &captured)?;

        if !output.status.success() {
            return Err(OverlapError::ExternalToolFailure(format!(
                "{} exited with {}, see {}",
                self.command.display(),
                output.status,
                dir.join(OUTPUT_FILE).display()
            )));
        }
        Ok(())
    }

    fn read_output(&self, dir: &Path) -> Result<DysonOutput> {
        parse_dyson_output(&fs::read_to_string(dir.join(OUTPUT_FILE))?)
    }
}

/// Runs `program` in `dir` and returns exactly `expected` Dyson norms.
///
/// Any failure, and an empty or short norm list, is logged and padded with
/// zeros. Extra norms are kept so the caller's alignment check sees them.
pub fn dyson_norms(program: &dyn OverlapProgram, dir: &Path, expected: usize) -> Vec<f64> {
    let result = program
        .write_input(dir)
        .and_then(|_| program.run(dir))
        .and_then(|_| program.read_output(dir));

    let mut norms = match result {
        Ok(output) => {
            if !output.orbital_coefficients.is_empty() {
                debug!(
                    "Dyson orbital coefficients ({}): {:?}",
                    output.orbital_coefficients.len(),
                    output.orbital_coefficients
                );
            }
            output.norms
        }
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    };

    if norms.len() < expected {
        warn!(
            "Got {} Dyson norms from {} but expected {}. Setting the missing norms to zero and continuing",
            norms.len(),
            dir.display(),
            expected
        );
        norms.resize(expected, 0.0);
    }
    info!("Dyson norms ({}): {:?}", norms.len(), norms);
    norms
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WFOVL_OUT: &str = "\
 Dyson norms:
 <PsiA  1|     PsiB  1>     0.912345678
 <PsiA  2|     PsiB  1>     0.004500000
 Dyson orbitals in reference |1> basis
 <PsiA  1|     PsiB  1>     9.9
  MO   1     0.95
  MO   2    -0.12
";

    #[test]
    fn test_parse_dyson_output() {
        let out = parse_dyson_output(WFOVL_OUT).unwrap();
        assert_eq!(out.norms, vec![0.912345678, 0.0045]);
        assert_eq!(out.orbital_coefficients, vec![0.95, -0.12]);
    }

    #[test]
    fn test_input_file() {
        let text = WfOverlap::input_content();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "mix_aoovl=AO_overl");
        assert_eq!(lines[1], "a_mo=mos_final");
        assert_eq!(lines[4], "b_det=dets_init");
        assert_eq!(lines.last(), Some(&"moprint=1"));
    }

    #[test]
    fn test_missing_program_gives_zero_norms() {
        let dir = TempDir::new().unwrap();
        let program = WfOverlap::new(dir.path().join("no-such-wfoverlap"), 1000);
        let norms = dyson_norms(&program, dir.path(), 3);
        assert_eq!(norms, vec![0.0; 3]);
        assert!(dir.path().join(INPUT_FILE).exists());
    }

    struct ShortOutput;

    impl OverlapProgram for ShortOutput {
        fn write_input(&self, _dir: &Path) -> Result<()> {
            Ok(())
        }
        fn run(&self, _dir: &Path) -> Result<()> {
            Ok(())
        }
        fn read_output(&self, _dir: &Path) -> Result<DysonOutput> {
            Ok(DysonOutput {
                norms: vec![0.8],
                orbital_coefficients: Vec::new(),
            })
        }
    }

    #[test]
    fn test_short_norm_list_is_padded() {
        let dir = TempDir::new().unwrap();
        assert_eq!(dyson_norms(&ShortOutput, dir.path(), 2), vec![0.8, 0.0]);
    }
}
