//! Error types for the core library.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Segment or owner counts (or other hash parameters) are unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Segment index outside `[0, num_segments)`.
    #[error("Invalid segment {segment}: consistent hash has {num_segments} segments")]
    InvalidSegment { segment: usize, num_segments: usize },

    /// Caller contract violation (duplicate member, unknown node, bad weight).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }

    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
