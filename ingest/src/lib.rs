//! Benchmark records and the parsers that turn bench output into them.

pub mod model;
pub mod parser;

pub use model::{Bench, BenchmarkRun, Commit, Person, ValidationError};
pub use parser::{parse, Tool};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No benchmark result was found in the output")]
    NoBenches,
    #[error("Tool '{0}' is not supported")]
    UnsupportedTool(String),
    #[error("Failed to deserialize bench list")]
    Json(#[from] serde_json::Error),
    #[error("Bench is invalid")]
    Invalid(#[from] ValidationError),
}
