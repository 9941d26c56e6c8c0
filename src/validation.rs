//! Job validation for dysonpes.
//!
//! Everything that can be checked before any file is parsed is checked here,
//! so a long overlap run never dies halfway on a missing file. Errors carry
//! a category, a message and a suggestion for fixing the input.

use crate::config::{CiMethod, JobConfig};
use log::{info, warn};
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error with user guidance.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Error category for programmatic handling
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// A referenced input file does not exist
    MissingFile,
    /// Invalid configuration parameters
    InvalidConfiguration,
    /// An external program could not be found
    MissingDependencies,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn invalid(message: String, suggestion: &str) -> ValidationError {
    ValidationError {
        category: ErrorCategory::InvalidConfiguration,
        message,
        suggestion: Some(suggestion.to_string()),
    }
}

fn require_file(path: &Path, what: &str) -> ValidationResult<()> {
    if path.as_os_str().is_empty() {
        return Err(invalid(
            format!("No {} given", what),
            "Add the file to the job input",
        ));
    }
    if !path.is_file() {
        return Err(ValidationError {
            category: ErrorCategory::MissingFile,
            message: format!("{} '{}' does not exist", what, path.display()),
            suggestion: Some("Check the path relative to the directory dysonpes is started from".to_string()),
        });
    }
    Ok(())
}

/// Resolves an executable given as a path or as a name on `PATH`.
pub fn find_executable(command: &str) -> Option<PathBuf> {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(command))
            .find(|candidate| candidate.is_file())
    })
}

/// Validates a job before it runs.
///
/// Checks that at least one final multiplicity is given (each at most
/// once), that all referenced files exist, that TDDFT jobs name a CIS file
/// per multiplicity, that the numeric parameters make sense and that
/// wfoverlap can be found when Dyson norms are requested.
pub fn validate_job(config: &JobConfig) -> ValidationResult<()> {
    validate_parameters(config)?;
    validate_files(config)?;
    if config.dyson && find_executable(&config.wfoverlap).is_none() {
        return Err(ValidationError {
            category: ErrorCategory::MissingDependencies,
            message: format!("wfoverlap executable '{}' does NOT exist", config.wfoverlap),
            suggestion: Some(
                "Set 'wfoverlap' in the job input or 'command' in the [wfoverlap] section of dysonpes_config.cfg, or set 'dyson = false' to report IPs only"
                    .to_string(),
            ),
        });
    }
    Ok(())
}

fn validate_parameters(config: &JobConfig) -> ValidationResult<()> {
    if config.final_states.is_empty() {
        return Err(invalid(
            "No final (ionized) states given".to_string(),
            "Add a *FINAL section with one 'mult output gbw [cis]' line per multiplicity",
        ));
    }
    let mut seen = BTreeSet::new();
    for state in &config.final_states {
        if state.multiplicity == 0 {
            return Err(invalid(
                "Final-state multiplicity must be at least 1".to_string(),
                "Multiplicities are 2S+1, e.g. 2 for a doublet",
            ));
        }
        if !seen.insert(state.multiplicity) {
            return Err(invalid(
                format!("Final multiplicity {} given more than once", state.multiplicity),
                "List each multiplicity once in the *FINAL section",
            ));
        }
    }
    if config.initial.multiplicity == 0 {
        return Err(invalid(
            "Initial-state multiplicity must be at least 1".to_string(),
            "Set 'initial_mult' in the job input",
        ));
    }
    if !config.wfthres.is_finite() || config.wfthres < 0.0 {
        return Err(invalid(
            format!("wfthres must be a non-negative number, got {}", config.wfthres),
            "Use 0 to keep every determinant",
        ));
    }
    if config.nuclear_charge > 0 {
        let electrons = config.nuclear_charge - config.initial.charge;
        let doubly_occupied = (electrons - (config.initial.multiplicity as i64 - 1)).max(0) / 2;
        if config.frozen_core as i64 >= doubly_occupied {
            return Err(invalid(
                format!(
                    "frozencore = {} leaves no doubly occupied orbital to ionize ({} in the initial state)",
                    config.frozen_core, doubly_occupied
                ),
                "Freeze only core orbitals, e.g. frozencore = 1 for second-row atoms",
            ));
        }
    }
    if config.memory == 0 {
        return Err(invalid(
            "wfoverlap memory must be positive".to_string(),
            "Set 'memory' in MB, e.g. memory = 40000",
        ));
    }
    Ok(())
}

fn validate_files(config: &JobConfig) -> ValidationResult<()> {
    require_file(&config.initial.output, "Initial-state output file")?;
    require_file(&config.initial.gbw, "Initial-state gbw file")?;
    for state in &config.final_states {
        require_file(&state.output, "Final-state output file")?;
        require_file(&state.gbw, "Final-state gbw file")?;
        if config.method == CiMethod::Tddft {
            match &state.cis {
                Some(cis) => require_file(cis, "CIS file")?,
                None => {
                    return Err(invalid(
                        format!("TDDFT final state with multiplicity {} has no CIS file", state.multiplicity),
                        "Append the .cis file to the *FINAL line: 'mult output gbw cis'",
                    ))
                }
            }
        }
    }
    Ok(())
}

/// Logs hints for settings that are valid but probably not intended.
pub fn provide_user_guidance(config: &JobConfig) {
    if config.wfthres > 0.1 {
        warn!(
            "wfthres = {} discards a large part of each CI vector; Dyson norms will be underestimated",
            config.wfthres
        );
    }
    if config.method.is_ci() && config.final_states.iter().any(|s| s.cis.is_some()) {
        warn!("CIS files are only read for TDDFT jobs and will be ignored");
    }
    if !config.dyson {
        info!("Dyson norms disabled: only ionization energies will be reported");
    }
    if config.frozen_core > 0 {
        info!(
            "{} frozen core orbital(s) removed from MO and determinant files",
            config.frozen_core
        );
    }
}
