//! Program settings for dysonpes.
//!
//! Site-wide defaults (where wfoverlap lives, how much memory it gets,
//! where ORCA is installed) are read from INI files so job inputs stay
//! short. Files are loaded in order, later ones overriding earlier ones:
//!
//! 1. System configuration (`/etc/dysonpes/dysonpes_config.cfg`)
//! 2. User configuration (`~/.config/dysonpes/dysonpes_config.cfg`)
//! 3. Local configuration (`./dysonpes_config.cfg`)
//!
//! Built-in defaults fill whatever none of them set.
//!
//! # Configuration File Format
//!
//! ```ini
//! [wfoverlap]
//! command = /opt/wfoverlap/bin/wfoverlap.x
//! memory = 40000
//!
//! [orca]
//! fragovl = /opt/orca
//!
//! [general]
//! wfthres = 0.0
//! print_level = 0
//!
//! [logging]
//! level = info
//!
//! [cleanup]
//! enabled = false
//! ```

use crate::config::{JobConfig, DEFAULT_WFOVERLAP_MEMORY};
use configparser::ini::Ini;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file name.
pub const SETTINGS_FILE: &str = "dysonpes_config.cfg";

/// Errors that can occur during configuration loading and processing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading configuration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// INI parsing error
    #[error("INI parsing error: {0}")]
    IniParse(String),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

type Section = HashMap<String, Option<String>>;

/// All program settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Overlap program
    pub wfoverlap: WfOverlapSettings,
    /// ORCA utilities
    pub orca: OrcaSettings,
    /// General settings
    pub general: GeneralSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
    /// Cleanup configuration
    pub cleanup: CleanupSettings,
}

/// `[wfoverlap]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WfOverlapSettings {
    /// Executable (default: "wfoverlap.x" on `PATH`)
    pub command: String,
    /// Memory in MB (default: 40000)
    pub memory: u64,
}

impl Default for WfOverlapSettings {
    fn default() -> Self {
        Self {
            command: "wfoverlap.x".to_string(),
            memory: DEFAULT_WFOVERLAP_MEMORY,
        }
    }
}

/// `[orca]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OrcaSettings {
    /// Directory containing `orca_fragovl` (default: empty, use `PATH`)
    pub fragovl: String,
}

/// `[general]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GeneralSettings {
    /// Default truncation budget (default: 0, keep everything)
    pub wfthres: f64,
    /// 0 = quiet, 1 = print the job configuration, 2 = also print these settings
    pub print_level: u32,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level (default: "info")
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[cleanup]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CleanupSettings {
    /// Remove overlap intermediates after a run (default: false)
    pub enabled: bool,
}

/// Configuration manager that handles loading and accessing program settings.
pub struct SettingsManager {
    settings: Settings,
    config_source: String,
}

impl SettingsManager {
    /// Loads settings from the system, user and local files.
    pub fn load() -> Result<Self, ConfigError> {
        let mut paths = Vec::new();
        paths.extend(Self::get_system_config_path());
        paths.extend(Self::get_user_config_path());
        paths.push(PathBuf::from(SETTINGS_FILE));
        let manager = Self::load_from_paths(&paths);
        info!("Configuration loaded from: {}", manager.config_source);
        Ok(manager)
    }

    /// Loads settings from `paths` in order. Missing files are skipped and
    /// unreadable ones are reported and skipped.
    pub fn load_from_paths(paths: &[PathBuf]) -> Self {
        let mut settings = Settings::default();
        let mut config_source = "built-in defaults".to_string();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_config(path, &settings) {
                Ok(loaded) => {
                    settings = loaded;
                    config_source = path.display().to_string();
                    debug!("Loaded configuration from: {}", path.display());
                }
                Err(e) => warn!("Failed to load config from {}: {}", path.display(), e),
            }
        }

        Self {
            settings,
            config_source,
        }
    }

    /// Returns the source of the loaded configuration.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Gets a reference to the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Gets the logging settings.
    pub fn logging(&self) -> &LoggingSettings {
        &self.settings.logging
    }

    /// Seeds a job configuration with the site defaults.
    pub fn job_defaults(&self) -> JobConfig {
        JobConfig {
            wfoverlap: self.settings.wfoverlap.command.clone(),
            memory: self.settings.wfoverlap.memory,
            orca_dir: self.settings.orca.fragovl.clone(),
            wfthres: self.settings.general.wfthres,
            cleanup: self.settings.cleanup.enabled,
            ..Default::default()
        }
    }

    /// Loads one INI file on top of `base`.
    fn load_config(path: &Path, base: &Settings) -> Result<Settings, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_config(&content, base)
    }

    /// Parses INI text on top of `base`.
    pub fn parse_config(content: &str, base: &Settings) -> Result<Settings, ConfigError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|e| ConfigError::IniParse(format!("Failed to parse INI: {}", e)))?;

        let mut settings = base.clone();
        let map = ini.get_map_ref();

        if let Some(section) = map.get("wfoverlap") {
            Self::parse_wfoverlap(section, &mut settings.wfoverlap)?;
        }
        if let Some(section) = map.get("orca") {
            if let Some(Some(fragovl)) = section.get("fragovl") {
                settings.orca.fragovl = fragovl.clone();
            }
        }
        if let Some(section) = map.get("general") {
            Self::parse_general(section, &mut settings.general)?;
        }
        if let Some(section) = map.get("logging") {
            if let Some(Some(level)) = section.get("level") {
                settings.logging.level = level.clone();
            }
        }
        if let Some(section) = map.get("cleanup") {
            if let Some(Some(enabled)) = section.get("enabled") {
                settings.cleanup.enabled = enabled.parse().map_err(|_| {
                    ConfigError::InvalidValue(format!("Invalid enabled value: {}", enabled))
                })?;
            }
        }

        Ok(settings)
    }

    fn parse_wfoverlap(section: &Section, wfoverlap: &mut WfOverlapSettings) -> Result<(), ConfigError> {
        if let Some(Some(command)) = section.get("command") {
            wfoverlap.command = command.clone();
        }
        if let Some(Some(memory)) = section.get("memory") {
            wfoverlap.memory = memory
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("Invalid memory: {}", memory)))?;
        }
        Ok(())
    }

    fn parse_general(section: &Section, general: &mut GeneralSettings) -> Result<(), ConfigError> {
        if let Some(Some(wfthres)) = section.get("wfthres") {
            general.wfthres = wfthres
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("Invalid wfthres: {}", wfthres)))?;
        }
        if let Some(Some(print_level)) = section.get("print_level") {
            general.print_level = print_level.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("Invalid print_level: {}", print_level))
            })?;
        }
        Ok(())
    }

    /// Gets the system configuration file path.
    fn get_system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            Some(PathBuf::from("/etc/dysonpes").join(SETTINGS_FILE))
        }
        #[cfg(windows)]
        {
            std::env::var("PROGRAMDATA")
                .ok()
                .map(|pd| PathBuf::from(pd).join("dysonpes").join(SETTINGS_FILE))
        }
    }

    /// Gets the user configuration file path.
    fn get_user_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config").join("dysonpes").join(SETTINGS_FILE))
        }
        #[cfg(windows)]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|appdata| PathBuf::from(appdata).join("dysonpes").join(SETTINGS_FILE))
        }
    }

    /// Writes a commented settings file with the built-in defaults.
    pub fn create_template(path: &Path) -> Result<(), ConfigError> {
        fs::write(path, Self::generate_template_content())?;
        info!("Created settings template at: {}", path.display());
        Ok(())
    }

    /// Generates the content of a settings template.
    pub fn generate_template_content() -> String {
        let defaults = Settings::default();
        format!(
            r#"# dysonpes configuration file
#
# Loaded in order, later files overriding earlier ones:
#
# 1. /etc/dysonpes/{file}
# 2. ~/.config/dysonpes/{file}
# 3. ./{file}
#
# Values given in a job input file override these.

[wfoverlap]
# wfoverlap executable (full path or name on PATH)
command = {command}

# Memory passed with -m, in MB
memory = {memory}

[orca]
# ORCA directory containing orca_fragovl (empty: use PATH)
fragovl = {fragovl}

[general]
# Discarded-norm budget for CI vector truncation (0 keeps everything)
wfthres = {wfthres}

# 0 = quiet, 1 = print the job configuration, 2 = also print these settings
print_level = {print_level}

[logging]
# debug, info, warn or error
level = {level}

[cleanup]
# Remove AO_overl, mos_*, dets_* and wfovl.* after the run
enabled = {cleanup}
"#,
            file = SETTINGS_FILE,
            command = defaults.wfoverlap.command,
            memory = defaults.wfoverlap.memory,
            fragovl = defaults.orca.fragovl,
            wfthres = defaults.general.wfthres,
            print_level = defaults.general.print_level,
            level = defaults.logging.level,
            cleanup = defaults.cleanup.enabled,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_parses_to_defaults() {
        let content = SettingsManager::generate_template_content();
        let settings = SettingsManager::parse_config(&content, &Settings::default()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_later_files_override() {
        let dir = TempDir::new().unwrap();
        let system = dir.path().join("system.cfg");
        let local = dir.path().join("local.cfg");
        fs::write(&system, "[wfoverlap]\ncommand = /opt/wf.x\nmemory = 1000\n[cleanup]\nenabled = true\n").unwrap();
        fs::write(&local, "[wfoverlap]\nmemory = 2000\n").unwrap();

        let manager = SettingsManager::load_from_paths(&[system, dir.path().join("missing.cfg"), local.clone()]);
        let settings = manager.settings();
        assert_eq!(settings.wfoverlap.command, "/opt/wf.x");
        assert_eq!(settings.wfoverlap.memory, 2000);
        assert!(settings.cleanup.enabled);
        assert_eq!(manager.config_source(), local.display().to_string());

        let job = manager.job_defaults();
        assert_eq!(job.wfoverlap, "/opt/wf.x");
        assert_eq!(job.memory, 2000);
        assert!(job.cleanup);
    }

    #[test]
    fn test_invalid_value() {
        let err = SettingsManager::parse_config("[general]\nwfthres = tiny\n", &Settings::default());
        assert!(matches!(err, Err(ConfigError::InvalidValue(_))));
    }
}
