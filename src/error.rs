// Cap and cycle rejections are Decision values, not errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Transition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: u64) -> Self {
        Error::NotFound { kind, id }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
