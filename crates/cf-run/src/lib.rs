//! cf-run: case execution.
//!
//! Everything between the input files and the solver process lives here:
//! the subprocess runner with MPI support, case-directory utilities
//! (clone/clean/discovery), the YAML task workflow engine, the per-case
//! simulation state machine, and the parametric run manager that fans a
//! template out into a matrix of cases.

pub mod case;
pub mod cmd;
pub mod core;
pub mod parametric;
pub mod tasks;

pub use case::{RunConfig, RunFlags, SimStatus, Simulation, SolveOpts, SolverOpts};
pub use cmd::SolverCmd;
pub use core::{
    clean_case, clone_case, find_case_dirs, is_case_dir, proc_dir_count, CleanOptions,
    CloneOptions,
};
pub use parametric::{ParametricRun, SetupOpts, SimOptions};
pub use tasks::{Task, TaskFile, TaskRunner};

pub type RunResult<T> = Result<T, RunError>;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Cannot find {kind}: {path}")]
    NotFound {
        kind: &'static str,
        path: std::path::PathBuf,
    },

    #[error("Refusing to overwrite existing directory: {0}")]
    AlreadyExists(std::path::PathBuf),

    #[error("Command '{command}' failed with exit status {status}")]
    Execution { command: String, status: i32 },

    #[error("Task {index} ({kind}) failed: {source}")]
    Task {
        index: usize,
        kind: &'static str,
        source: Box<RunError>,
    },

    #[error("Invalid run settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Dict(#[from] cf_dict::DictError),

    #[error(transparent)]
    Config(#[from] cf_config::ConfigError),

    #[error(transparent)]
    Post(#[from] cf_post::PostError),

    #[error("Malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Malformed state file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bad wildcard pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
