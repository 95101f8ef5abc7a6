//! cf-dict: reader/writer for the solver's dictionary input-file format.
//!
//! Contains:
//! - lexer (tokens for the curly-brace dictionary grammar)
//! - parser (single-pass recursive descent, `#include` resolution)
//! - value (ordered dictionary type and tagged value variants)
//! - printer (formatted serialization with the standard file banner)
//! - dictfile (typed views over known input files with validated setters)

pub mod dictfile;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod value;

pub use dictfile::{
    BlockMeshDict, ChangeDictionaryDict, ControlDict, DecomposeParDict, DictFile, FvSchemes,
    FvSolution, LesProperties, RasProperties, SimControls, TransportProperties,
    TurbulenceProperties,
};
pub use parser::{parse_file, parse_str};
pub use value::{Dictionary, Dimensions, Field, FieldType, Value};

pub type DictResult<T> = Result<T, DictError>;

#[derive(thiserror::Error, Debug)]
pub enum DictError {
    #[error("Syntax error: {msg} [{file}:{line}]")]
    Syntax {
        msg: String,
        file: String,
        line: usize,
    },

    #[error("Duplicate key '{key}' [{file}:{line}]")]
    DuplicateKey {
        key: String,
        file: String,
        line: usize,
    },

    #[error("Cannot resolve include file: {path} [{file}:{line}]")]
    IncludeNotFound {
        path: String,
        file: String,
        line: usize,
    },

    #[error("Invalid value '{value}' for key '{key}'. Valid options are: {allowed:?}")]
    Validation {
        key: String,
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("Cannot find file: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
