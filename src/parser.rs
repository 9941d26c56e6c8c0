//! Input file parsing for dysonpes jobs.
//!
//! Job input files use `key = value` parameters plus one `*FINAL` section
//! terminated with `*`. Lines starting with `#` are comments.
//!
//! # Input File Format
//!
//! ```text
//! # Photoelectron spectrum of H2O from CASSCF
//! method = casscf
//! initial_output = h2o_neutral.out
//! initial_gbw = h2o_neutral.gbw
//! initial_mult = 1
//! initial_charge = 0
//! nuclear_charge = 10
//! wfoverlap = /opt/wfoverlap/bin/wfoverlap.x
//! memory = 40000
//! wfthres = 0.0
//! frozencore = 1
//!
//! *FINAL
//! 2 h2o_cation.out h2o_cation.gbw
//! 4 h2o_cation.out h2o_cation.gbw
//! *
//! ```
//!
//! Each `*FINAL` line is `mult output gbw [cis]`. The CIS file is required
//! for TDDFT jobs and ignored otherwise.
//!
//! ## Parameters
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `method` | `casscf`, `mrci`, `sorci` or `tddft` | `tddft` |
//! | `initial_output`, `initial_gbw` | Initial-state files | required |
//! | `initial_mult`, `initial_charge` | Initial-state multiplicity and charge | 1, 0 |
//! | `nuclear_charge` | Total nuclear charge | 0 |
//! | `wfoverlap`, `memory` | Overlap program and its memory (MB) | settings |
//! | `wfthres` | Truncation budget | 0 |
//! | `frozencore` | Frozen core orbitals | 0 |
//! | `tda` | TDDFT used TDA | true |
//! | `nroots` | TDDFT roots per multiplicity | all |
//! | `work_dir` | Overlap working directory | `.` |
//! | `fragovl` | ORCA directory with `orca_fragovl` | settings |
//! | `dyson` | Compute Dyson norms | true |
//! | `cleanup` | Remove overlap files afterwards | settings |

use crate::config::{CiMethod, FinalStateSpec, JobConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Error type for parsing operations.
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O error when reading files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Parse error with descriptive message
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Type alias for parse operation results
type Result<T> = std::result::Result<T, ParseError>;

/// Parses a job input file with built-in defaults.
///
/// # Arguments
///
/// * `path` - Path to the job input file
///
/// # Returns
///
/// Returns the parsed [`JobConfig`], or a `ParseError` if the file cannot
/// be read or a value is malformed.
pub fn parse_input(path: &Path) -> Result<JobConfig> {
    parse_input_with(path, JobConfig::default())
}

/// Parses a job input file on top of `base` (usually seeded from settings).
pub fn parse_input_with(path: &Path, base: JobConfig) -> Result<JobConfig> {
    let content = fs::read_to_string(path)?;
    parse_input_str(&content, base)
}

/// Parses job input text on top of `base`.
pub fn parse_input_str(content: &str, base: JobConfig) -> Result<JobConfig> {
    let mut config = base;
    let mut in_final = false;

    for (lineno, line) in content.lines().enumerate() {
        // Everything after '#' is a comment
        let trimmed = line.split('#').next().unwrap_or("").trim();
        if trimmed.is_empty() {
            continue;
        }

        let lower = trimmed.to_lowercase();
        if lower.starts_with("*final") {
            in_final = true;
            continue;
        } else if trimmed == "*" {
            in_final = false;
            continue;
        }

        if in_final {
            config.final_states.push(parse_final_line(trimmed, lineno + 1)?);
        } else if trimmed.contains('=') {
            parse_parameter(trimmed, &mut config)?;
        } else {
            return Err(ParseError::Parse(format!(
                "Line {}: expected 'key = value', found '{}'",
                lineno + 1,
                trimmed
            )));
        }
    }

    if in_final {
        return Err(ParseError::Parse("*FINAL section is not terminated with '*'".into()));
    }
    Ok(config)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ParseError::Parse(format!("Invalid value '{}' for {}", value, key)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ParseError::Parse(format!("Invalid boolean '{}' for {}", value, key))),
    }
}

fn parse_final_line(line: &str, lineno: usize) -> Result<FinalStateSpec> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 || parts.len() > 4 {
        return Err(ParseError::Parse(format!(
            "Line {}: *FINAL entries are 'mult output gbw [cis]', found '{}'",
            lineno, line
        )));
    }
    Ok(FinalStateSpec {
        multiplicity: parse_value("final multiplicity", parts[0])?,
        output: PathBuf::from(parts[1]),
        gbw: PathBuf::from(parts[2]),
        cis: parts.get(3).map(PathBuf::from),
    })
}

fn parse_parameter(line: &str, config: &mut JobConfig) -> Result<()> {
    let parts: Vec<&str> = line.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Ok(());
    }

    let key = parts[0].trim().to_lowercase();
    let value = parts[1].trim();

    match key.as_str() {
        "method" => {
            config.method = CiMethod::from_keyword(value)
                .ok_or_else(|| ParseError::Parse(format!("Unknown method '{}'", value)))?;
        }
        "initial_output" => config.initial.output = PathBuf::from(value),
        "initial_gbw" => config.initial.gbw = PathBuf::from(value),
        "initial_mult" => config.initial.multiplicity = parse_value(&key, value)?,
        "initial_charge" => config.initial.charge = parse_value(&key, value)?,
        "nuclear_charge" => config.nuclear_charge = parse_value(&key, value)?,
        "wfoverlap" => config.wfoverlap = value.to_string(),
        "memory" => config.memory = parse_value(&key, value)?,
        "wfthres" => config.wfthres = parse_value(&key, value)?,
        "frozencore" => config.frozen_core = parse_value(&key, value)?,
        "tda" => config.tda = parse_bool(&key, value)?,
        "nroots" => config.nroots = Some(parse_value(&key, value)?),
        "work_dir" => config.work_dir = PathBuf::from(value),
        "fragovl" => config.orca_dir = value.to_string(),
        "dyson" => config.dyson = parse_bool(&key, value)?,
        "cleanup" => config.cleanup = parse_bool(&key, value)?,
        _ => log::warn!("Ignoring unknown parameter '{}'", key),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_survive_empty_input() {
        let config = parse_input_str("# nothing\n", JobConfig::default()).unwrap();
        assert_eq!(config.memory, 40000);
        assert!(config.final_states.is_empty());
    }

    #[test]
    fn test_final_section_with_cis() {
        let input = "method = TDDFT\n*FINAL\n2 cat.out cat.gbw cat.cis\n*\n";
        let config = parse_input_str(input, JobConfig::default()).unwrap();
        assert_eq!(config.method, CiMethod::Tddft);
        assert_eq!(config.final_states[0].cis, Some(PathBuf::from("cat.cis")));
    }

    #[test]
    fn test_unterminated_final_section() {
        let err = parse_input_str("*FINAL\n2 a.out a.gbw\n", JobConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not terminated"));
    }

    #[test]
    fn test_inline_comments() {
        let input = "method = sorci # MRCI variant\ncleanup = yes#tidy\n";
        let config = parse_input_str(input, JobConfig::default()).unwrap();
        assert_eq!(config.method, CiMethod::Sorci);
        assert!(config.cleanup);
    }

    #[test]
    fn test_bad_number() {
        assert!(parse_input_str("memory = lots\n", JobConfig::default()).is_err());
    }
}
