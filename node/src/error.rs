//! Core error hierarchy shared by ring, file, and transport operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChordError {
    #[error("transport failure contacting {0}: {1}")]
    Transport(String, String),

    #[error("transport call to {0} timed out")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("routing invariant violated: {0}")]
    Internal(String),
}

pub type ChordResult<T> = Result<T, ChordError>;
