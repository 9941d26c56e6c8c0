use dysonpes::config::{CiMethod, JobConfig};
use dysonpes::parser::{parse_input, parse_input_with};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_parse_casscf_job() {
    let input = r#"
# H2O photoelectron spectrum
method = casscf
initial_output = neutral.out
initial_gbw = neutral.gbw
initial_mult = 1
initial_charge = 0
nuclear_charge = 10
wfoverlap = /opt/wfoverlap/wfoverlap.x
memory = 2000
wfthres = 0.001
frozencore = 1
work_dir = pes_work

*FINAL
2 cation.out cation.gbw
4 cation.out cation.gbw
*
"#;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.inp");
    let mut file = File::create(&path).unwrap();
    write!(file, "{}", input).unwrap();

    let config = parse_input(&path).unwrap();
    assert_eq!(config.method, CiMethod::Casscf);
    assert_eq!(config.initial.output, PathBuf::from("neutral.out"));
    assert_eq!(config.initial.multiplicity, 1);
    assert_eq!(config.nuclear_charge, 10);
    assert_eq!(config.memory, 2000);
    assert_eq!(config.wfthres, 0.001);
    assert_eq!(config.frozen_core, 1);
    assert_eq!(config.final_states.len(), 2);
    assert_eq!(config.final_states[1].multiplicity, 4);
    assert!(config.final_states[0].cis.is_none());
    assert_eq!(config.overlap_dir(4), PathBuf::from("pes_work/mult4"));
}

#[test]
fn test_input_overrides_base() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.inp");
    std::fs::write(&path, "method = sorci\ncleanup = true\n").unwrap();

    let base = JobConfig {
        wfoverlap: "/from/settings/wfoverlap.x".to_string(),
        memory: 1234,
        ..Default::default()
    };
    let config = parse_input_with(&path, base).unwrap();
    assert_eq!(config.method, CiMethod::Sorci);
    assert!(config.cleanup);
    assert_eq!(config.wfoverlap, "/from/settings/wfoverlap.x");
    assert_eq!(config.memory, 1234);
}

#[test]
fn test_rejects_bad_final_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.inp");
    std::fs::write(&path, "*FINAL\n2 only_output.out\n*\n").unwrap();
    assert!(parse_input(&path).is_err());
}

#[test]
fn test_rejects_unknown_method() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.inp");
    std::fs::write(&path, "method = ccsd(t)\n").unwrap();
    let err = parse_input(&path).unwrap_err();
    assert!(err.to_string().contains("Unknown method"));
}
