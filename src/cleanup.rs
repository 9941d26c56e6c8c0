//! Removal of overlap intermediates.
//!
//! Each overlap working directory holds large intermediate files (the AO
//! overlap matrix, MO coefficient files, determinant files and the
//! wfoverlap input/output). Once the Dyson norms are read they can be
//! removed. Only the known intermediate names are touched; everything else
//! in the directory is preserved.
//!
//! ```ini
//! [cleanup]
//! # Remove overlap intermediates after the run (default: false)
//! enabled = true
//! ```
//!
//! Cleanup failures are logged and never interrupt the workflow.

use crate::wfoverlap::{
    AO_OVERLAP_FILE, DETS_FINAL_FILE, DETS_INITIAL_FILE, INPUT_FILE, MOS_FINAL_FILE, MOS_INITIAL_FILE,
    OUTPUT_FILE,
};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during cleanup operations.
#[derive(Error, Debug)]
pub enum CleanupError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid path error
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for cleanup operations
pub type Result<T> = std::result::Result<T, CleanupError>;

/// Files written by an overlap run. `memlog` is created by wfoverlap itself.
pub const OVERLAP_INTERMEDIATES: [&str; 8] = [
    AO_OVERLAP_FILE,
    DETS_FINAL_FILE,
    DETS_INITIAL_FILE,
    "memlog",
    INPUT_FILE,
    OUTPUT_FILE,
    MOS_FINAL_FILE,
    MOS_INITIAL_FILE,
];

/// Removes overlap intermediates from working directories.
#[derive(Debug, Clone)]
pub struct CleanupManager {
    enabled: bool,
}

impl CleanupManager {
    /// Creates a cleanup manager; a disabled one never deletes anything.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether cleanup is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Removes the overlap intermediates in `directory`.
    ///
    /// # Returns
    ///
    /// The removed files. A missing directory removes nothing; a path that
    /// is not a directory is an error.
    pub fn cleanup_directory(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        if !self.enabled {
            debug!("Cleanup is disabled, skipping directory: {}", directory.display());
            return Ok(Vec::new());
        }
        if !directory.exists() {
            debug!("Directory does not exist, skipping: {}", directory.display());
            return Ok(Vec::new());
        }
        if !directory.is_dir() {
            return Err(CleanupError::InvalidPath(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        let mut removed = Vec::new();
        for name in OVERLAP_INTERMEDIATES {
            let path = directory.join(name);
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Cleaned up file: {}", path.display());
                    removed.push(path);
                }
                Err(e) => warn!("Failed to remove file {}: {}", path.display(), e),
            }
        }
        info!(
            "Cleanup completed in {}: {} files deleted",
            directory.display(),
            removed.len()
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_removes_only_intermediates() {
        let dir = TempDir::new().unwrap();
        for name in ["AO_overl", "wfovl.out", "mos_init", "keep_me.out"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let removed = CleanupManager::new(true).cleanup_directory(dir.path()).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(dir.path().join("keep_me.out").exists());
        assert!(!dir.path().join("AO_overl").exists());
    }

    #[test]
    fn test_cleanup_disabled() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("AO_overl"), "x").unwrap();
        let removed = CleanupManager::new(false).cleanup_directory(dir.path()).unwrap();
        assert!(removed.is_empty());
        assert!(dir.path().join("AO_overl").exists());
    }

    #[test]
    fn test_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("AO_overl");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            CleanupManager::new(true).cleanup_directory(&file),
            Err(CleanupError::InvalidPath(_))
        ));
    }
}
