//! File I/O for the overlap inputs: AO overlap and MO coefficients.
//!
//! Both come from `orca_fragovl <gbw> <gbw>`, which prints the AO overlap
//! matrix and the MO coefficient matrices of the two fragments as blocks of
//! six columns:
//!
//! ```text
//! FRAGMENT-FRAGMENT OVERLAP MATRIX
//! --------------------------------
//!                   0          1          2          3          4          5
//!       0       1.000000   0.236704   0.000000   0.000000   0.000000   0.038405
//!       1       0.236704   1.000000   0.000000   0.000000   0.000000   0.386138
//! ...
//! ```
//!
//! Each block is one column-header line followed by NAO rows. The MO block
//! uses fixed-width fields (16 characters after an 11-character row prefix
//! that widens with the AO index) because neighbouring values may touch.
//!
//! The written files follow the formats read by wfoverlap:
//!
//! - `AO_overl`: `NAO NAO`, then one row per line as `% .7e`
//! - `mos_*`: the `2mocoef` header, MO coefficients as `% .12e` three per
//!   line, and a zero `orbocc` block

use log::{debug, info};
use nalgebra::DMatrix;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Columns per printed block.
const NBLOCK: usize = 6;
/// Row prefix width of the MO block for AO indices below 1000.
const MO_PREFIX: usize = 11;
/// Width of one MO coefficient field.
const MO_FIELD: usize = 16;

/// Errors raised while producing overlap input files.
#[derive(Error, Debug)]
pub enum FileFormatError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Unexpected orca_fragovl output
    #[error("Parse error: {0}")]
    Parse(String),
    /// orca_fragovl could not be run
    #[error("orca_fragovl failed: {0}")]
    Calculation(String),
}

type Result<T> = std::result::Result<T, FileFormatError>;

/// Formats `x` like C's `% .{precision}e`: leading space for non-negative
/// values and a signed exponent with at least two digits.
pub fn format_sci(x: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, x);
    let (mantissa, exponent) = match raw.split_once('e') {
        Some(parts) => parts,
        None => return raw,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let lead = if x.is_sign_negative() { "" } else { " " };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{}e{}{:02}", lead, mantissa, sign, exponent.abs())
}

/// Parsed text output of `orca_fragovl`.
#[derive(Debug, Clone)]
pub struct FragovlOutput {
    lines: Vec<String>,
    nao: usize,
}

/// MO coefficients, one row per MO and one column per AO.
#[derive(Debug, Clone, PartialEq)]
pub struct MoCoefficients {
    /// Alpha (or restricted) MOs
    pub alpha: DMatrix<f64>,
    /// Beta MOs of an unrestricted calculation
    pub beta: Option<DMatrix<f64>>,
}

impl FragovlOutput {
    /// Wraps the output text; NAO is read from the last printed row index.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        let last = lines
            .iter()
            .rev()
            .find_map(|l| l.split_whitespace().next())
            .ok_or_else(|| FileFormatError::Parse("orca_fragovl output is empty".to_string()))?;
        let nao = last
            .parse::<usize>()
            .map_err(|_| FileFormatError::Parse(format!("Could not read NAO from last row '{}'", last)))?
            + 1;
        debug!("orca_fragovl output with {} AOs", nao);
        Ok(Self { lines, nao })
    }

    /// Number of atomic orbitals.
    pub fn nao(&self) -> usize {
        self.nao
    }

    fn find(&self, title: &str) -> Result<usize> {
        self.lines
            .iter()
            .position(|l| l.contains(title))
            .ok_or_else(|| FileFormatError::Parse(format!("'{}' not found in orca_fragovl output", title)))
    }

    fn line(&self, index: usize) -> Result<&str> {
        self.lines
            .get(index)
            .map(|s| s.as_str())
            .ok_or_else(|| FileFormatError::Parse(format!("orca_fragovl output ends before line {}", index + 1)))
    }

    /// AO overlap matrix, in printed row/column order.
    pub fn overlap_matrix(&self) -> Result<DMatrix<f64>> {
        let start = self.find("FRAGMENT-FRAGMENT OVERLAP MATRIX")?;
        let nao = self.nao;
        let mut s = DMatrix::<f64>::zeros(nao, nao);
        for col in 0..nao {
            let block = col / NBLOCK;
            let field = col % NBLOCK + 1;
            for row in 0..nao {
                let line = self.line(start + block * (nao + 1) + row + 3)?;
                let token = line.split_whitespace().nth(field).ok_or_else(|| {
                    FileFormatError::Parse(format!("Overlap row {} has no column {}", row, col))
                })?;
                s[(row, col)] = parse_value(token)?;
            }
        }
        Ok(s)
    }

    /// Reads one MO matrix whose first data row is at line `first`.
    /// Returns the matrix and the index of the last line read.
    fn mo_block(&self, first: usize) -> Result<(DMatrix<f64>, usize)> {
        let nao = self.nao;
        let mut c = DMatrix::<f64>::zeros(nao, nao);
        let mut last = first;
        for imo in 0..nao {
            let block = imo / NBLOCK;
            let column = imo % NBLOCK;
            for iao in 0..nao {
                let shift = iao.to_string().len().saturating_sub(3);
                last = first + block * (nao + 1) + iao;
                let line = self.line(last)?;
                let begin = MO_PREFIX + shift + column * MO_FIELD;
                let field = line.get(begin..begin + MO_FIELD).ok_or_else(|| {
                    FileFormatError::Parse(format!("MO row {} too short for MO {}", iao, imo))
                })?;
                c[(imo, iao)] = parse_value(field.trim())?;
            }
        }
        Ok((c, last))
    }

    /// MO coefficients of fragment A. The beta block follows the alpha block
    /// after a single header line.
    pub fn mo_coefficients(&self, restricted: bool) -> Result<MoCoefficients> {
        let start = self.find("FRAGMENT A MOs MATRIX")? + 3;
        let (alpha, last) = self.mo_block(start)?;
        let beta = if restricted {
            None
        } else {
            Some(self.mo_block(last + 2)?.0)
        };
        Ok(MoCoefficients { alpha, beta })
    }
}

fn parse_value(token: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .map_err(|_| FileFormatError::Parse(format!("Expected a number, found '{}'", token)))
}

/// Renders the `AO_overl` file.
pub fn format_ao_overlap(s: &DMatrix<f64>) -> String {
    let mut content = format!("{} {}\n", s.nrows(), s.ncols());
    for row in s.row_iter() {
        for value in row.iter() {
            content.push_str(&format_sci(*value, 7));
            content.push(' ');
        }
        content.push('\n');
    }
    content
}

/// Writes the `AO_overl` file.
pub fn write_ao_overlap(s: &DMatrix<f64>, path: &Path) -> Result<()> {
    fs::write(path, format_ao_overlap(s))?;
    Ok(())
}

/// Appends the rows of `c` from `skip` on, three values per line.
fn push_mos(content: &mut String, c: &DMatrix<f64>, skip: usize) {
    for imo in skip..c.nrows() {
        for (i, value) in c.row(imo).iter().enumerate() {
            if i > 0 && i % 3 == 0 {
                content.push('\n');
            }
            content.push_str(&format_sci(*value, 12));
            content.push(' ');
        }
        if c.ncols() > 0 {
            content.push('\n');
        }
    }
}

/// Renders a `mos_*` file, dropping the first `frozen_core` MOs of each spin.
pub fn format_mo_file(mos: &MoCoefficients, frozen_core: usize) -> String {
    let nao = mos.alpha.ncols();
    let per_spin = mos.alpha.nrows().saturating_sub(frozen_core);
    let nmo = match mos.beta {
        Some(_) => 2 * per_spin,
        None => per_spin,
    };

    let mut content = format!(
        "2mocoef\nheader\n 1\nMO-coefficients from Orca\n 1\n {}   {}\n a\nmocoef\n(*)\n",
        nao, nmo
    );
    push_mos(&mut content, &mos.alpha, frozen_core);
    if let Some(beta) = &mos.beta {
        push_mos(&mut content, beta, frozen_core);
    }
    content.push_str("orbocc\n(*)\n");
    for i in 0..nmo {
        if i > 0 && i % 3 == 0 {
            content.push('\n');
        }
        content.push_str(&format_sci(0.0, 12));
        content.push(' ');
    }
    content
}

/// Writes a `mos_*` file.
pub fn write_mo_file(mos: &MoCoefficients, frozen_core: usize, path: &Path) -> Result<()> {
    fs::write(path, format_mo_file(mos, frozen_core))?;
    Ok(())
}

/// Source of the `orca_fragovl` printout for a `.gbw` file.
pub trait GbwReader {
    /// Returns the parsed printout of `gbw` against itself.
    fn fragovl(&self, gbw: &Path) -> Result<FragovlOutput>;
}

/// Runs ORCA's `orca_fragovl` utility.
#[derive(Debug, Clone)]
pub struct FragovlInterface {
    /// Path to the `orca_fragovl` executable
    pub command: PathBuf,
}

impl FragovlInterface {
    /// Uses `orca_fragovl` from the given ORCA directory, or from `PATH`
    /// when the directory is empty.
    pub fn new(orca_dir: &str) -> Self {
        let command = if orca_dir.is_empty() {
            PathBuf::from("orca_fragovl")
        } else {
            Path::new(orca_dir).join("orca_fragovl")
        };
        Self { command }
    }
}

impl GbwReader for FragovlInterface {
    /// Runs `orca_fragovl gbw gbw` and parses its standard output.
    fn fragovl(&self, gbw: &Path) -> Result<FragovlOutput> {
        info!("Running {} on {}", self.command.display(), gbw.display());
        let output = Command::new(&self.command).arg(gbw).arg(gbw).output().map_err(|e| {
            FileFormatError::Calculation(format!(
                "Could not start {}: {}. Check that the ORCA directory is set correctly",
                self.command.display(),
                e
            ))
        })?;
        if !output.status.success() {
            return Err(FileFormatError::Calculation(format!(
                "{} exited with {} for {}",
                self.command.display(),
                output.status,
                gbw.display()
            )));
        }
        FragovlOutput::parse(&String::from_utf8_lossy(&output.stdout))
    }
}
