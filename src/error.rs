//! Crate error type

use thiserror::Error;

/// Errors surfaced by session construction and sink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A filter pattern failed to compile
    #[error("invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Sink I/O failure (open, header write, mark, close)
    #[error("trace sink I/O: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
