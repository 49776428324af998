//! Error types for flight-analytics

use thiserror::Error;

/// Fatal errors: any of these ends the run.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file missing, unreadable or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Unreachable host, bad URI or failed authentication
    #[error("connection error: {0}")]
    Connection(#[source] mongodb::error::Error),

    /// Failure while running a pipeline or pulling its results
    #[error("query error: {0}")]
    Query(#[source] mongodb::error::Error),

    /// The in-process evaluator hit an operator or value it cannot handle
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Fixture file could not be turned into flight records
    #[error("fixture error: {0}")]
    Fixture(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-row formatting failure. Reported inline, never fatal.
#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("field `{path}` cannot be read: `{segment}` is not a document")]
    NotADocument { path: String, segment: String },
}
