use std::io;
use thiserror::Error;

/// Reasons a received frame could not be decoded.
///
/// These are link noise rather than faults: the driver drops such frames
/// without changing state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("unknown message tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("truncated {kind} frame: expected {expected} bytes, got {actual}")]
    Truncated {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Custom error types for the traffic-light protocol
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Link error: {0}")]
    Link(String),

    #[error("Timer error: {0}")]
    Timer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Election error: {0}")]
    Election(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Error::Encode(msg.into())
    }

    /// Creates a new link error
    pub fn link(msg: impl Into<String>) -> Self {
        Error::Link(msg.into())
    }

    /// Creates a new timer error
    pub fn timer(msg: impl Into<String>) -> Self {
        Error::Timer(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new election error
    pub fn election(msg: impl Into<String>) -> Self {
        Error::Election(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// True for errors caused by a malformed frame on the link
    pub fn is_link_noise(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}
