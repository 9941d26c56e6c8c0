#![warn(missing_docs)]

//! dysonpes - Dyson norms and ionization energies for photoelectron spectra
//!
//! dysonpes turns ORCA calculations of an initial (neutral) state and a set of
//! ionized final states into the input of the `wfoverlap` program, runs it,
//! and pairs the resulting Dyson norms with the ionization energies.
//!
//! # Overview
//!
//! The photoionization intensity of a final state is proportional to the
//! squared norm of its Dyson orbital with the initial state. Computing it
//! needs, for both sides:
//!
//! - the CI vectors, written as determinant strings over `e`/`a`/`b`/`d`
//! - the MO coefficients
//! - the AO overlap between the two sets of orbitals
//!
//! # Pipeline
//!
//! 1. **Decoding**: ORCA prints CASSCF and MRCI configurations relative to an
//!    internal/active/external orbital partition. [`decoder`] expands every
//!    hole/particle record into a full occupation string.
//! 2. **CIS expansion**: TDDFT/TDA roots come from the packed `.cis` file and
//!    are spin-adapted into determinants by [`spin`] and [`cis`].
//! 3. **Truncation**: [`truncate`] drops the smallest coefficients while the
//!    discarded squared norm stays below `wfthres`.
//! 4. **Overlap inputs**: [`io`] converts `orca_fragovl` output into the AO
//!    overlap and MO files; [`civector`] writes the determinant tables.
//! 5. **Dyson norms**: [`wfoverlap`] runs the external program per final
//!    multiplicity and parses its output.
//! 6. **Assembly**: [`assembler`] computes `IP = (E - E0) * 27.211386245988`
//!    and writes `PES-Results.txt`.
//!
//! [`workflow`] drives the whole job from a parsed [`config::JobConfig`].
//!
//! # Quick Start
//!
//! ```no_run
//! use dysonpes::io::FragovlInterface;
//! use dysonpes::naming::FileNaming;
//! use dysonpes::parser::parse_input;
//! use dysonpes::wfoverlap::WfOverlap;
//! use dysonpes::workflow::Workflow;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let input = Path::new("h2o.inp");
//!     let config = parse_input(input)?;
//!
//!     let overlap = WfOverlap::new(&config.wfoverlap, config.memory);
//!     let fragovl = FragovlInterface::new(&config.orca_dir);
//!     let results = Workflow::new(&config, FileNaming::new(input), &overlap, &fragovl).run()?;
//!
//!     println!("{}", results.table());
//!     Ok(())
//! }
//! ```
//!
//! # Supported Methods
//!
//! | Method | State vectors | Final-state energies |
//! |--------|---------------|----------------------|
//! | CASSCF | Determinant printing | CI roots |
//! | MRCI/SORCI | CFG or determinant printing | CI roots |
//! | ΔSCF + TDDFT/TDA | Packed `.cis` file | SCF, then SCF + excitation |
//!
//! # Determinant Strings
//!
//! One character per orbital: `e` empty, `a` alpha, `b` beta, `d` doubly
//! occupied. See [`occupation`].

/// Pairing of energies, IPs and Dyson norms
pub mod assembler;
pub mod cis;
pub mod civector;
/// Removal of overlap intermediates
pub mod cleanup;
pub mod config;
pub mod decoder;
/// Built-in help system
pub mod help;
pub mod io;
/// Dynamic file naming based on input file basename
pub mod naming;
pub mod occupation;
pub mod orca_output;
pub mod parser;
pub mod partition;
/// Configuration management system
pub mod settings;
pub mod spin;
/// Job input templates
pub mod template_generator;
pub mod truncate;
/// Job validation
pub mod validation;
pub mod wfoverlap;
pub mod workflow;

pub use config::JobConfig;
pub use occupation::{Determinant, OccupationCode};
