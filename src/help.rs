//! Built-in help for dysonpes
//!
//! This module documents the job-input keywords, the supported methods and
//! typical command lines. It is printed by `dysonpes --help [topic]`.

use std::collections::BTreeMap;

/// Category for organizing keywords in the help system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeywordCategory {
    /// Keywords every job needs.
    Required,
    /// Keywords controlling CI vector handling.
    CiVectors,
    /// Keywords specific to ΔSCF/TDDFT jobs.
    TdDft,
    /// Keywords for the external programs.
    Program,
    /// Output and housekeeping.
    Output,
}

/// Documentation entry for a single job-input keyword.
#[derive(Debug, Clone)]
pub struct Keyword {
    /// The name of the keyword (e.g., "method", "wfthres").
    pub name: &'static str,
    /// The category to which this keyword belongs.
    pub category: KeywordCategory,
    /// A brief description of what the keyword does.
    pub description: &'static str,
    /// The default value of the keyword, if applicable.
    pub default_value: Option<&'static str>,
    /// An example of how to use the keyword in an input file.
    pub example: Option<&'static str>,
    /// Indicates whether the keyword is required for a job.
    pub required: bool,
}

/// Information about a method whose states dysonpes can read.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// The keyword used for `method`.
    pub name: &'static str,
    /// Single- or multireference.
    pub category: &'static str,
    /// A brief description.
    pub description: &'static str,
    /// Files each `*FINAL` line must name.
    pub files: &'static str,
}

/// All keyword documentation
pub const KEYWORDS: &[Keyword] = &[
    Keyword {
        name: "method",
        category: KeywordCategory::Required,
        description: "How the states were computed: casscf, mrci, sorci or tddft",
        default_value: Some("tddft"),
        example: Some("method = casscf"),
        required: true,
    },
    Keyword {
        name: "initial_output",
        category: KeywordCategory::Required,
        description: "ORCA output file of the initial (un-ionized) state",
        default_value: None,
        example: Some("initial_output = neutral.out"),
        required: true,
    },
    Keyword {
        name: "initial_gbw",
        category: KeywordCategory::Required,
        description: "ORCA .gbw file of the initial state",
        default_value: None,
        example: Some("initial_gbw = neutral.gbw"),
        required: true,
    },
    Keyword {
        name: "initial_mult",
        category: KeywordCategory::Required,
        description: "Spin multiplicity of the initial state",
        default_value: None,
        example: Some("initial_mult = 1"),
        required: true,
    },
    Keyword {
        name: "initial_charge",
        category: KeywordCategory::Required,
        description: "Molecular charge of the initial state; final states carry one more",
        default_value: Some("0"),
        example: Some("initial_charge = 0"),
        required: false,
    },
    Keyword {
        name: "*FINAL",
        category: KeywordCategory::Required,
        description: "Section with one 'mult output gbw [cis]' line per ionized multiplicity, closed by '*'",
        default_value: None,
        example: Some("*FINAL\n             2 cation_d.out cation_d.gbw\n             4 cation_q.out cation_q.gbw\n             *"),
        required: true,
    },
    Keyword {
        name: "wfthres",
        category: KeywordCategory::CiVectors,
        description: "Squared-norm budget that CI vector truncation may discard (0 keeps every determinant)",
        default_value: Some("0"),
        example: Some("wfthres = 0.0001"),
        required: false,
    },
    Keyword {
        name: "frozencore",
        category: KeywordCategory::CiVectors,
        description: "Number of frozen core orbitals removed from MO and determinant files",
        default_value: Some("0"),
        example: Some("frozencore = 1"),
        required: false,
    },
    Keyword {
        name: "nuclear_charge",
        category: KeywordCategory::TdDft,
        description: "Total nuclear charge; used when the CIS file does not fix the occupied orbitals",
        default_value: Some("0"),
        example: Some("nuclear_charge = 10"),
        required: false,
    },
    Keyword {
        name: "tda",
        category: KeywordCategory::TdDft,
        description: "The TDDFT run used the Tamm-Dancoff approximation",
        default_value: Some("true"),
        example: Some("tda = false"),
        required: false,
    },
    Keyword {
        name: "nroots",
        category: KeywordCategory::TdDft,
        description: "Number of TDDFT roots per final multiplicity",
        default_value: Some("all roots in the output"),
        example: Some("nroots = 10"),
        required: false,
    },
    Keyword {
        name: "wfoverlap",
        category: KeywordCategory::Program,
        description: "Path to the wfoverlap executable",
        default_value: Some("wfoverlap.x (or [wfoverlap] command)"),
        example: Some("wfoverlap = /opt/sharc/bin/wfoverlap.x"),
        required: false,
    },
    Keyword {
        name: "memory",
        category: KeywordCategory::Program,
        description: "Memory passed to wfoverlap in MB",
        default_value: Some("40000"),
        example: Some("memory = 8000"),
        required: false,
    },
    Keyword {
        name: "fragovl",
        category: KeywordCategory::Program,
        description: "ORCA directory holding orca_fragovl (empty searches PATH)",
        default_value: Some("\"\" (or [orca] fragovl)"),
        example: Some("fragovl = /opt/orca6"),
        required: false,
    },
    Keyword {
        name: "dyson",
        category: KeywordCategory::Output,
        description: "Compute Dyson norms; when false only IPs are reported and norms are zero",
        default_value: Some("true"),
        example: Some("dyson = false"),
        required: false,
    },
    Keyword {
        name: "work_dir",
        category: KeywordCategory::Output,
        description: "Directory for results and the per-multiplicity overlap directories",
        default_value: Some("."),
        example: Some("work_dir = pes"),
        required: false,
    },
    Keyword {
        name: "cleanup",
        category: KeywordCategory::Output,
        description: "Remove wfoverlap intermediates after the norms are read",
        default_value: Some("false (or [cleanup] enabled)"),
        example: Some("cleanup = true"),
        required: false,
    },
];

/// Methods dysonpes reads states from.
pub const METHODS: &[MethodInfo] = &[
    MethodInfo {
        name: "casscf",
        category: "Multireference",
        description: "CASSCF determinant printing (PrintWF det); one block per multiplicity",
        files: "mult output gbw",
    },
    MethodInfo {
        name: "mrci",
        category: "Multireference",
        description: "MRCI CFG or determinant printing; CFG-only states fall back to sqrt(weight)",
        files: "mult output gbw",
    },
    MethodInfo {
        name: "sorci",
        category: "Multireference",
        description: "SORCI, read from the final DDCI3 step",
        files: "mult output gbw",
    },
    MethodInfo {
        name: "tddft",
        category: "Single reference",
        description: "ΔSCF reference plus TDDFT/TDA roots from the packed CIS file",
        files: "mult output gbw cis",
    },
];

/// Print global help
pub fn print_global_help() {
    println!("dysonpes - Dyson norms and ionization energies for photoelectron spectra");
    println!();
    println!("USAGE:");
    println!("    dysonpes [OPTIONS] <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    <input_file>");
    println!("                        Run the job described by the input file");
    println!();
    println!("    ci <input_file> [method]");
    println!("                        Create a job input template for casscf, mrci, sorci or tddft");
    println!();
    println!("    ci dysonpes_config.cfg");
    println!("                        Create a configuration template file");
    println!();
    println!("    dets <output> <casscf|mrci|sorci> <mult> <dets_file>");
    println!("                        Decode one CI output into a wfoverlap determinant file");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help [topic]   Show help. Topics: ci, keywords, methods, examples");
    println!();
    println!("CONFIGURATION FILE:");
    println!("    dysonpes uses 'dysonpes_config.cfg' for program defaults.");
    println!("    Create template:     dysonpes ci dysonpes_config.cfg");
    println!("    Files are applied in this order, later ones overriding earlier ones:");
    println!("      - /etc/dysonpes/dysonpes_config.cfg (system)");
    println!("      - ~/.config/dysonpes/dysonpes_config.cfg (user)");
    println!("      - ./dysonpes_config.cfg (local)");
    println!("    Keywords in the job input override the configuration file.");
    println!();
    println!("EXAMPLES:");
    println!("    Create template:     dysonpes ci h2o.inp casscf");
    println!("    Run a job:           dysonpes h2o.inp > h2o.log");
    println!("    Decode one output:   dysonpes dets cation.out mrci 2 dets_cation");
    println!("    View keywords:       dysonpes --help keywords");
    println!();
}

/// Print help for 'ci' command
pub fn print_ci_help() {
    println!("Create Input Template (ci) Command");
    println!("═════════════════════════════════════");
    println!();
    println!("USAGE:");
    println!("    dysonpes ci <input_file> [method]");
    println!("    dysonpes ci dysonpes_config.cfg");
    println!();
    println!("DESCRIPTION:");
    println!("    Writes a job input template with every keyword and its default.");
    println!("    The *FINAL section lists the files each method expects.");
    println!("    Existing files are never overwritten.");
    println!();
    println!("ARGUMENTS:");
    println!("    <input_file>         Template to create (required)");
    println!("    [method]             casscf, mrci, sorci or tddft (default: tddft)");
    println!();
}

/// Print keyword reference
pub fn print_keyword_help() {
    println!("KEYWORD REFERENCE");
    println!("═══════════════════════════════════════════════════════════════════════");
    println!();

    let mut categories: BTreeMap<KeywordCategory, Vec<&Keyword>> = BTreeMap::new();
    for keyword in KEYWORDS {
        categories.entry(keyword.category).or_default().push(keyword);
    }

    for (category, keywords) in categories {
        print_category_header(category);
        println!();

        for keyword in keywords {
            print_keyword(keyword);
            println!();
        }
        println!();
    }
}

/// Print method reference
pub fn print_method_help() {
    println!("METHOD REFERENCE");
    println!("═══════════════════════════════════════════════════════════════════════");
    println!();

    for method in METHODS {
        println!("{} ({})", method.name, method.category);
        println!("    {}", method.description);
        println!("    *FINAL line: {}", method.files);
        println!();
    }

    println!("OCCUPATION CODES");
    println!("{}", "─".repeat(76));
    println!();
    println!("    Determinant files use one character per orbital:");
    println!("    e = empty, a = alpha, b = beta, d = doubly occupied");
    println!();
}

/// Print example usages
pub fn print_examples() {
    println!("USAGE EXAMPLES");
    println!("═══════════════════════════════════════════════════════════════════════");
    println!();
    println!("1. CASSCF job with doublet and quartet cations:");
    println!();
    println!("method = casscf");
    println!("initial_output = h2o.out");
    println!("initial_gbw = h2o.gbw");
    println!("initial_mult = 1");
    println!("wfthres = 0.0001");
    println!("*FINAL");
    println!("2 h2o+_d.out h2o+_d.gbw");
    println!("4 h2o+_q.out h2o+_q.gbw");
    println!("*");
    println!();
    println!("2. TDDFT job (SCF plus TDA roots of the cation):");
    println!();
    println!("method = tddft");
    println!("initial_output = h2o.out");
    println!("initial_gbw = h2o.gbw");
    println!("initial_mult = 1");
    println!("nuclear_charge = 10");
    println!("nroots = 5");
    println!("*FINAL");
    println!("2 h2o+.out h2o+.gbw h2o+.cis");
    println!("*");
    println!();
    println!("RESULTS");
    println!("{}", "─".repeat(76));
    println!();
    println!("    PES-Results.txt      IPs and Dyson norms as JSON lists");
    println!("    <input>_results.json Full result table");
    println!("    mult<m>/             wfoverlap files of each final multiplicity");
    println!();
}

fn print_category_header(category: KeywordCategory) {
    let title = match category {
        KeywordCategory::Required => "REQUIRED PARAMETERS",
        KeywordCategory::CiVectors => "CI VECTOR PARAMETERS",
        KeywordCategory::TdDft => "TD-DFT PARAMETERS",
        KeywordCategory::Program => "PROGRAM COMMANDS",
        KeywordCategory::Output => "OUTPUT PARAMETERS",
    };
    println!("{}", title);
    println!("{}", "─".repeat(76));
}

fn print_keyword(keyword: &Keyword) {
    let required_str = if keyword.required { " [REQUIRED]" } else { "" };

    println!("{}{}", keyword.name, required_str);
    println!("    {}", keyword.description);

    if let Some(default) = keyword.default_value {
        println!("    Default: {}", default);
    }

    if let Some(example) = keyword.example {
        println!("    Example: {}", example);
    }
}

/// Looks up a keyword by name, ignoring case.
pub fn find_keyword(name: &str) -> Option<&'static Keyword> {
    KEYWORDS.iter().find(|k| k.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CiMethod;

    #[test]
    fn test_every_method_keyword_parses() {
        for method in METHODS {
            assert!(CiMethod::from_keyword(method.name).is_some(), "{}", method.name);
        }
    }

    #[test]
    fn test_find_keyword() {
        assert!(find_keyword("WFTHRES").is_some());
        assert!(find_keyword("nprocs").is_none());
    }

    #[test]
    fn test_documented_keywords_are_accepted() {
        // Every documented plain keyword must parse without being reported unknown.
        let input = "method = casscf\ninitial_output = a\ninitial_gbw = b\ninitial_mult = 1\n\
initial_charge = 0\nwfthres = 0\nfrozencore = 0\nnuclear_charge = 0\ntda = true\nnroots = 2\n\
wfoverlap = w\nmemory = 10\nfragovl = o\ndyson = true\nwork_dir = .\ncleanup = false\n";
        let config = crate::parser::parse_input_str(input, Default::default()).unwrap();
        assert_eq!(config.nroots, Some(2));
        let plain = KEYWORDS.iter().filter(|k| !k.name.starts_with('*')).count();
        assert_eq!(plain, input.lines().count());
    }
}
