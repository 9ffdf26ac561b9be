//! Error types for the RSocket engine.
//!
//! Every failure in the engine is expressed as an [`RSocketError`].
//! Errors are scoped to a single stream wherever possible: a bad
//! item, a failing source or a remote `ERROR` frame terminates the
//! stream it belongs to and nothing else.  Only transport level
//! failures (I/O errors, unparseable frames) tear down the whole
//! connection.

use thiserror::Error;

/// Errors raised by the engine, its streams and its configuration.
#[derive(Debug, Error)]
pub enum RSocketError {
    /// An item was produced while the subscription had no
    /// outstanding credit.
    #[error("demand violation: item produced with no outstanding credit")]
    DemandViolation,

    /// A peer asked for a non-positive or unparseable number of items.
    #[error("invalid request-n: {0}")]
    InvalidRequestN(String),

    /// The local item source failed while being pulled.
    #[error("source failed: {0}")]
    Source(String),

    /// The remote peer terminated the stream with an `ERROR` frame.
    #[error("remote error: {0}")]
    Remote(String),

    /// The local handler refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("connection closed")]
    ConnectionClosed,

    /// The other direction of the same stream failed and took this
    /// one down with it.
    #[error("stream aborted: {0}")]
    Aborted(String),

    /// The stream was cancelled before it produced an outcome.
    #[error("stream cancelled")]
    Cancelled,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame body of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("invalid base64 in frame: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl RSocketError {
    /// Build a [`RSocketError::Source`] from anything printable.
    pub fn source_failed<E: std::fmt::Display>(err: E) -> Self {
        RSocketError::Source(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RSocketError>;
