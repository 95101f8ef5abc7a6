//! cf-post: solver log analysis.
//!
//! Extracts residual time histories and completion/failure markers from
//! solver output, persists processed data under the case's `logs/`
//! directory for cheap re-reads, and renders residual convergence plots.

pub mod logs;
pub mod plots;

pub use logs::{LogProcessor, LogState, ResidualSample, SolverLog};
pub use plots::render_residual_plot;

pub type PostResult<T> = Result<T, PostError>;

#[derive(thiserror::Error, Debug)]
pub enum PostError {
    #[error("Cannot find log file: {0}")]
    LogNotFound(std::path::PathBuf),

    #[error("No processed log data in {0}; process a log file first")]
    NoState(std::path::PathBuf),

    #[error("Unknown field '{field}'. Available fields: {available:?}")]
    UnknownField {
        field: String,
        available: Vec<String>,
    },

    #[error("Plot rendering failed: {0}")]
    Plot(String),

    #[error("Malformed log state: {0}")]
    State(#[from] serde_json::Error),

    #[error("Bad log pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
