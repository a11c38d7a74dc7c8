//! Error taxonomy shared by the registry and the service layer.
//!
//! `NotFound` and `Empty` are expected outcomes that front ends translate into
//! distinct transport signals. `Io` and `Decode` are real failures and are
//! surfaced to the immediate caller without retry.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// The key is unknown and creation was not requested.
    #[error("Section not found: {0}")]
    NotFound(String),

    /// The key is known but its stack holds no messages.
    #[error("Section is empty: {0}")]
    Empty(String),

    /// The registry was closed, or the handle was released by `remove`/`clean`.
    #[error("Registry is closed")]
    Closed,

    /// Underlying storage failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed escaped file name, corrupt stack file or malformed header blob.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl StackError {
    pub fn decode(reason: impl std::fmt::Display) -> Self {
        Self::Decode(reason.to_string())
    }

    /// True for the two recoverable "nothing to return" outcomes.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Empty(_))
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(format!("header blob: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
