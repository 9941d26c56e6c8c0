//! dysonpes Command-Line Interface
//!
//! This module contains the main entry point for dysonpes and handles
//! command-line argument parsing, help system integration, and dispatch to
//! the library workflow.
//!
//! # Usage
//!
//! 1. **Job** (`dysonpes <input_file>`): computes IPs and Dyson norms
//! 2. **Input Creation** (`dysonpes ci <input_file> [method]`): writes a job template
//! 3. **Determinants** (`dysonpes dets <output> <method> <mult> <dets_file>`):
//!    decodes one CI output into a wfoverlap determinant file
//!
//! # Help System
//!
//! - `dysonpes --help` - General help
//! - `dysonpes --help keywords` - All input file keywords
//! - `dysonpes --help methods` - Supported methods
//! - `dysonpes --help examples` - Example inputs
//! - `dysonpes ci --help` - Input creation help

use dysonpes::assembler::RESULTS_FILE;
use dysonpes::config::{CiMethod, JobConfig};
use dysonpes::io::FragovlInterface;
use dysonpes::naming::FileNaming;
use dysonpes::settings::{SettingsManager, SETTINGS_FILE};
use dysonpes::wfoverlap::WfOverlap;
use dysonpes::workflow::{self, Workflow};
use dysonpes::{parser, template_generator, validation};
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

fn main() {
    let settings = match SettingsManager::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading {}: {}", SETTINGS_FILE, e);
            process::exit(1);
        }
    };

    let level = log::LevelFilter::from_str(&settings.logging().level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .target(env_logger::Target::Stdout)
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    check_help_flags(&args);

    let command = &args[1];

    match command.as_str() {
        "ci" => {
            if args.len() < 3 {
                eprintln!("Error: Missing file argument");
                eprintln!("Usage:");
                eprintln!("  {} ci <input_file> [method]   - Create job input template", args[0]);
                eprintln!("  {} ci {}   - Create settings template", args[0], SETTINGS_FILE);
                process::exit(1);
            }

            let file_arg = &args[2];

            if file_arg == SETTINGS_FILE {
                match run_create_settings_template() {
                    Ok(()) => {
                        println!("✓ Settings template created successfully!");
                        println!("  Output file: {}", SETTINGS_FILE);
                        println!("\nNext steps:");
                        println!("  1. Set the wfoverlap command and memory");
                        println!("  2. Point [orca] fragovl to your ORCA directory");
                        println!("  3. The settings will be automatically loaded by dysonpes");
                    }
                    Err(e) => {
                        eprintln!("Error creating settings template: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                match run_create_input(Path::new(file_arg), args.get(3).map(String::as_str)) {
                    Ok(output_file) => {
                        println!("✓ Template input file created successfully!");
                        println!("  Output file: {}", output_file.display());
                        println!("\nNext steps:");
                        println!("  1. Fill in the initial-state files and multiplicity");
                        println!("  2. List one *FINAL line per ionized multiplicity");
                        println!("  3. Run dysonpes: {} {}", args[0], output_file.display());
                    }
                    Err(e) => {
                        eprintln!("Error creating template: {}", e);
                        process::exit(1);
                    }
                }
            }
        }
        "dets" => {
            if args.len() < 6 {
                eprintln!("Error: Missing arguments");
                eprintln!("Usage: {} dets <output> <casscf|mrci|sorci> <mult> <dets_file>", args[0]);
                process::exit(1);
            }
            if let Err(e) = run_write_determinants(&args[2], &args[3], &args[4], &args[5]) {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        _ => {
            if !command.starts_with('-') {
                let input_path = Path::new(&args[1]);
                match run_job(input_path, &settings) {
                    Ok(()) => println!("\n****dysonpes finished normally****"),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                eprintln!("Error: Unknown command: {}", command);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }
}

/// Check for help flags and print appropriate help
fn check_help_flags(args: &[String]) {
    use dysonpes::help::*;

    if args.len() >= 3 && (args[1] == "--help" || args[1] == "-h") {
        match args[2].as_str() {
            "ci" => print_ci_help(),
            "keywords" => print_keyword_help(),
            "methods" => print_method_help(),
            "examples" => print_examples(),
            _ => print_global_help(),
        }
        process::exit(0);
    }

    if args.len() == 2 && (args[1] == "--help" || args[1] == "-h") {
        print_global_help();
        process::exit(0);
    }

    if args.len() >= 3 && args[1] == "ci" && (args[2] == "--help" || args[2] == "-h") {
        print_ci_help();
        process::exit(0);
    }
}

/// Prints usage information to stderr.
fn print_usage(program_name: &str) {
    eprintln!("dysonpes - Dyson norms and ionization energies for photoelectron spectra");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} <input_file>", program_name);
    eprintln!("                    Compute IPs and Dyson norms for the job input");
    eprintln!();
    eprintln!("  {} ci <input_file> [method]", program_name);
    eprintln!("                    Create a job input template (casscf, mrci, sorci, tddft)");
    eprintln!();
    eprintln!("  {} ci {}", program_name, SETTINGS_FILE);
    eprintln!("                    Create a settings template file for configuration");
    eprintln!();
    eprintln!("  {} dets <output> <casscf|mrci|sorci> <mult> <dets_file>", program_name);
    eprintln!("                    Decode one CI output into a determinant file");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} ci h2o.inp casscf", program_name);
    eprintln!("  {} h2o.inp", program_name);
    eprintln!("  {} --help keywords", program_name);
}

/// Creates a job input template.
///
/// # Errors
///
/// Returns an error if the method is unknown, the output file already
/// exists, or it cannot be written.
fn run_create_input(requested: &Path, method: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let method = match method {
        Some(keyword) => CiMethod::from_keyword(keyword).ok_or_else(|| {
            format!("Unknown method '{}'. Supported methods: casscf, mrci, sorci, tddft", keyword)
        })?,
        None => CiMethod::Tddft,
    };

    let output_path = template_generator::get_default_output_path(requested);
    if output_path.exists() {
        return Err(format!(
            "{} already exists. Please remove it first or choose a different name.",
            output_path.display()
        )
        .into());
    }

    let template_content = template_generator::generate_job_template(method);
    template_generator::write_template_to_file(&template_content, &output_path)?;

    Ok(output_path)
}

/// Creates a dysonpes_config.cfg template file in the current directory.
///
/// # Errors
///
/// Returns an error if the file already exists or cannot be written.
fn run_create_settings_template() -> Result<(), Box<dyn std::error::Error>> {
    let settings_path = Path::new(SETTINGS_FILE);

    if settings_path.exists() {
        return Err(format!(
            "{} already exists. Please remove it first or choose a different location.",
            SETTINGS_FILE
        )
        .into());
    }

    SettingsManager::create_template(settings_path)?;

    Ok(())
}

fn run_write_determinants(
    output: &str,
    method: &str,
    multiplicity: &str,
    destination: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let method = CiMethod::from_keyword(method)
        .filter(|m| m.is_ci())
        .ok_or_else(|| format!("Unknown CI method '{}'. Supported methods: casscf, mrci, sorci", method))?;
    let multiplicity: u32 = multiplicity
        .parse()
        .map_err(|_| format!("Invalid multiplicity '{}'", multiplicity))?;

    workflow::write_determinants(Path::new(output), method, multiplicity, Path::new(destination))?;
    Ok(())
}

/// Prints the job parameters and where the site defaults came from.
fn print_configuration(config: &JobConfig, settings: &SettingsManager, print_level: u32) {
    println!("{}", "=".repeat(76));
    println!("CONFIGURATION AND SETTINGS");
    println!("{}", "=".repeat(76));
    println!();
    println!("Settings Configuration:");
    println!("  Source: {}", settings.config_source());
    println!();

    println!("Input File Parameters:");
    println!("  Method:                     {:?}", config.method);
    println!("  Initial output:             {}", config.initial.output.display());
    println!("  Initial gbw:                {}", config.initial.gbw.display());
    println!("  Initial multiplicity:       {}", config.initial.multiplicity);
    println!("  Initial charge:             {}", config.initial.charge);
    for state in &config.final_states {
        print!(
            "  Final mult {:<3}             {} {}",
            state.multiplicity,
            state.output.display(),
            state.gbw.display()
        );
        match &state.cis {
            Some(cis) => println!(" {}", cis.display()),
            None => println!(),
        }
    }
    println!("  wfthres:                    {}", config.wfthres);
    println!("  Frozen core:                {}", config.frozen_core);
    if config.method == CiMethod::Tddft {
        println!("  Nuclear charge:             {}", config.nuclear_charge);
        println!("  TDA:                        {}", config.tda);
        match config.nroots {
            Some(n) => println!("  Roots:                      {}", n),
            None => println!("  Roots:                      all"),
        }
    }
    println!("  Dyson norms:                {}", config.dyson);
    println!("  wfoverlap:                  {} (-m {})", config.wfoverlap, config.memory);
    println!("  Work directory:             {}", config.work_dir.display());

    if print_level >= 2 {
        let s = settings.settings();
        println!("\nConfiguration File Settings ({}):", SETTINGS_FILE);
        println!("  wfoverlap command:          {}", s.wfoverlap.command);
        println!("  wfoverlap memory:           {}", s.wfoverlap.memory);
        println!("  ORCA fragovl directory:     {}", s.orca.fragovl);
        println!("  wfthres:                    {}", s.general.wfthres);
        println!("  Logging level:              {}", s.logging.level);
        println!("  Cleanup enabled:            {}", s.cleanup.enabled);
    }

    println!();
    println!("{}", "=".repeat(76));
    println!();
}

/// Runs a job: parse, validate, decode, overlap and assemble.
///
/// # Errors
///
/// Returns an error if the input cannot be parsed or validated, or if any
/// state file cannot be decoded. A failing wfoverlap run is not an error;
/// its norms are reported as zero.
fn run_job(input_path: &Path, settings: &SettingsManager) -> Result<(), Box<dyn std::error::Error>> {
    println!("**** dysonpes: Dyson norms for photoelectron spectra ****");
    println!("              Version {}\n", env!("CARGO_PKG_VERSION"));

    let config = parser::parse_input_with(input_path, settings.job_defaults())?;

    let print_level = settings.settings().general.print_level;
    if print_level >= 1 {
        print_configuration(&config, settings, print_level);
    }

    validation::validate_job(&config)?;

    let overlap = WfOverlap::new(&config.wfoverlap, config.memory);
    let fragovl = FragovlInterface::new(&config.orca_dir);
    let naming = FileNaming::new(input_path);
    let results = Workflow::new(&config, naming, &overlap, &fragovl).run()?;

    println!(
        "{} final states written to {}",
        results.states.len(),
        config.work_dir.join(RESULTS_FILE).display()
    );
    Ok(())
}
