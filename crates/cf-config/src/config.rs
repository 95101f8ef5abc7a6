//! Layered YAML configuration.
//!
//! Settings load in a fixed order, later layers overriding earlier ones:
//! the embedded defaults, the file named by `CASEFLOWRC_SYSTEM`, the user's
//! `~/.caseflow.yaml`, the file named by `CASEFLOWRC`, and finally a
//! `caseflow.yaml` in the working directory. Nested mappings merge key by
//! key; every other value is replaced wholesale.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

pub const RC_FILENAME: &str = "caseflow.yaml";
const RC_SYSTEM_VAR: &str = "CASEFLOWRC_SYSTEM";
const RC_FILE_VAR: &str = "CASEFLOWRC";

const DEFAULT_CONFIG: &str = include_str!("default_config.yaml");

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingCfg,
    pub solver: SolverCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingCfg {
    pub log_to_file: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingCfg {
    fn default() -> Self {
        LoggingCfg {
            log_to_file: false,
            log_file: None,
        }
    }
}

/// Solver installation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverCfg {
    /// Root directory searched for `caelus-*` installations when no
    /// explicit versions are configured.
    pub root: Option<PathBuf>,
    /// Version selected when none is requested; `latest` picks the highest.
    pub default: String,
    pub versions: Vec<SolverVersionCfg>,
}

impl Default for SolverCfg {
    fn default() -> Self {
        SolverCfg {
            root: None,
            default: "latest".to_string(),
            versions: Vec::new(),
        }
    }
}

/// One configured solver installation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverVersionCfg {
    pub version: String,
    /// Install directory; defaults to `<root>/caelus-<version>`.
    pub path: Option<PathBuf>,
    pub mpi_root: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all standard locations.
    pub fn load() -> ConfigResult<Self> {
        let files = search_cfg_files();
        if files.is_empty() {
            tracing::debug!("no configuration files found; using defaults");
        } else {
            tracing::debug!(?files, "loading configuration");
        }
        Self::from_layers(&files)
    }

    /// Load the embedded defaults plus an explicit list of override files.
    pub fn from_layers(files: &[PathBuf]) -> ConfigResult<Self> {
        let mut merged: serde_yaml::Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        for path in files {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)?;
            merge_values(&mut merged, layer);
        }
        Ok(serde_yaml::from_value(merged)?)
    }

    /// Root directory searched for solver installs.
    pub fn solver_root(&self) -> ConfigResult<PathBuf> {
        if let Some(root) = &self.solver.root {
            return Ok(root.clone());
        }
        dirs::home_dir()
            .map(|h| h.join("Caelus"))
            .ok_or(ConfigError::MissingHome)
    }
}

/// Return the configuration files that exist, in merge order.
pub fn search_cfg_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(sys_rc) = env::var_os(RC_SYSTEM_VAR) {
        push_if_exists(&mut files, PathBuf::from(sys_rc));
    }
    if let Some(home) = dirs::home_dir() {
        push_if_exists(&mut files, home.join(format!(".{}", RC_FILENAME)));
    }
    if let Some(env_rc) = env::var_os(RC_FILE_VAR) {
        push_if_exists(&mut files, PathBuf::from(env_rc));
    }
    if let Ok(cwd) = env::current_dir() {
        push_if_exists(&mut files, cwd.join(RC_FILENAME));
    }
    files
}

fn push_if_exists(files: &mut Vec<PathBuf>, path: PathBuf) {
    if path.exists() {
        files.push(path);
    }
}

/// Merge `other` into `base`: mappings merge recursively, everything else
/// replaces.
fn merge_values(base: &mut serde_yaml::Value, other: serde_yaml::Value) {
    match (base, other) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(other_map)) => {
            for (key, value) in other_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_values(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
