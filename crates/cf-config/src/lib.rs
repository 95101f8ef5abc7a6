//! cf-config: layered user configuration and solver environment discovery.
//!
//! Configuration is plain YAML merged from fixed locations (system file,
//! home directory, environment override, working directory). The `env`
//! module turns the configured or discovered solver installations into
//! process environments suitable for launching solver executables.

pub mod config;
pub mod env;

pub use config::{search_cfg_files, Config, LoggingCfg, SolverCfg, SolverVersionCfg};
pub use env::{discover_versions, resolve_env, SolverEnv};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("No solver installations found (searched {0})")]
    NoVersions(std::path::PathBuf),

    #[error("Unknown solver version requested: {0}")]
    UnknownVersion(String),

    #[error("Cannot determine home directory")]
    MissingHome,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
