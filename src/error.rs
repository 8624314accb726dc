//! Error type shared by every processing operation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range parameters, detected before any computation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A numerical capability (wavelet basis, window, store format) is not available.
    #[error("missing capability: {0}")]
    MissingCapability(String),

    /// A compressed payload whose contents disagree with its declared shape.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Text input (matrix, header file) that could not be parsed.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A background job ended without reporting a result (it panicked).
    #[error("job '{0}' failed: {1}")]
    Job(String, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for building an [`Error::InvalidArgument`].
pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidArgument(msg.into())
}
