use crate::config::{CiMethod, DEFAULT_WFOVERLAP_MEMORY};
use std::fs;
use std::path::{Path, PathBuf};

/// Template generator for dysonpes job input files
///
/// Generates the job input template for `method`. The `*FINAL` lines show
/// the files the method needs; every optional keyword is listed with its
/// default.
pub fn generate_job_template(method: CiMethod) -> String {
    let (keyword, final_lines, tddft_block) = match method {
        CiMethod::Casscf => ("casscf", "2 cation_d.out cation_d.gbw\n4 cation_q.out cation_q.gbw", ""),
        CiMethod::Mrci => ("mrci", "2 cation_d.out cation_d.gbw", ""),
        CiMethod::Sorci => ("sorci", "2 cation_d.out cation_d.gbw", ""),
        CiMethod::Tddft => (
            "tddft",
            "2 cation_d.out cation_d.gbw cation_d.cis",
            r#"
# This subset is only read for TDDFT jobs.
nuclear_charge = 0 # total nuclear charge; needed when the CIS file lacks orbital ranges
tda = true # the TDDFT run used the Tamm-Dancoff approximation
#nroots = 10 # roots per final multiplicity; all roots of the output by default
"#,
        ),
    };

    format!(
        r#"# This subset is required. It names the calculations of the initial state.
method = {keyword} # casscf, mrci, sorci or tddft
initial_output = neutral.out
initial_gbw = neutral.gbw
initial_mult = 1
initial_charge = 0
{tddft_block}
# This subset is optional. Shown here are the default values.
wfthres = 0 # squared norm truncation may discard from each CI vector; 0 keeps all determinants
frozencore = 0 # frozen core orbitals removed from MO and determinant files
dyson = true # false reports ionization energies only
cleanup = false # remove wfoverlap intermediates afterwards
work_dir = .

# External programs. Defaults come from dysonpes_config.cfg when present.
#wfoverlap = wfoverlap.x
#memory = {memory}
#fragovl = /opt/orca6

# One line per ionized multiplicity: mult output gbw{cis_hint}
*FINAL
{final_lines}
*
"#,
        keyword = keyword,
        tddft_block = tddft_block,
        memory = DEFAULT_WFOVERLAP_MEMORY,
        cis_hint = if method == CiMethod::Tddft { " cis" } else { "" },
        final_lines = final_lines,
    )
}

/// Write template to file
pub fn write_template_to_file<P: AsRef<Path>>(
    template: &str,
    output_path: P,
) -> Result<(), Box<dyn std::error::Error>> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(output_path, template)?;
    Ok(())
}

/// Get default output filename for a template: `<stem>.inp`
pub fn get_default_output_path<P: AsRef<Path>>(requested: P) -> PathBuf {
    let requested = requested.as_ref();
    if requested.extension().is_some() {
        return requested.to_path_buf();
    }
    let stem = requested
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("template");

    requested.with_file_name(format!("{}.inp", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_input_str;
    use crate::config::JobConfig;

    #[test]
    fn test_templates_parse() {
        for method in [CiMethod::Casscf, CiMethod::Mrci, CiMethod::Sorci, CiMethod::Tddft] {
            let config = parse_input_str(&generate_job_template(method), JobConfig::default()).unwrap();
            assert_eq!(config.method, method);
            assert_eq!(config.initial.multiplicity, 1);
            assert!(!config.final_states.is_empty());
            assert_eq!(config.final_states[0].cis.is_some(), method == CiMethod::Tddft);
        }
    }

    #[test]
    fn test_get_default_output_path() {
        let path = get_default_output_path(Path::new("h2o"));
        assert_eq!(path.to_str().unwrap(), "h2o.inp");

        let path = get_default_output_path(Path::new("/path/to/job.in"));
        assert_eq!(path.to_str().unwrap(), "/path/to/job.in");
    }
}
