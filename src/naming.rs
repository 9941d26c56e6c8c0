//! File naming based on the job input basename.
//!
//! Results that outlive the overlap working directories are prefixed with
//! the input basename, so several jobs can share one directory.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use dysonpes::naming::FileNaming;
//!
//! let naming = FileNaming::new(Path::new("h2o_pes.inp"));
//! assert_eq!(naming.summary_json(), "h2o_pes_results.json");
//! assert_eq!(naming.dets_final(2), "h2o_pes_dets_final_mult2");
//! ```

use std::path::Path;

/// Manages file naming based on the input file basename.
#[derive(Debug, Clone)]
pub struct FileNaming {
    basename: String,
}

impl FileNaming {
    /// Creates a new FileNaming instance from an input file path.
    ///
    /// The file stem is the basename; `dysonpes_job` is used when the path
    /// has none.
    pub fn new(input_path: &Path) -> Self {
        let basename = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dysonpes_job")
            .to_string();

        Self { basename }
    }

    /// Returns the basename used for file naming
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// JSON dump of the full result table.
    ///
    /// Format: `{basename}_results.json`
    pub fn summary_json(&self) -> String {
        format!("{}_results.json", self.basename)
    }

    /// Copy of the initial-state determinant file.
    ///
    /// Format: `{basename}_dets_init`
    pub fn dets_initial(&self) -> String {
        format!("{}_dets_init", self.basename)
    }

    /// Copy of the final-state determinant file of one multiplicity.
    ///
    /// Format: `{basename}_dets_final_mult{mult}`
    pub fn dets_final(&self, multiplicity: u32) -> String {
        format!("{}_dets_final_mult{}", self.basename, multiplicity)
    }
}
