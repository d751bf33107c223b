//! Error types for slipstream-netcode

use thiserror::Error;

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected at startup
    #[error("Configuration error: {0}")]
    Config(#[from] slipstream_core::Error),

    /// Wire encoding or decoding failed
    #[error("Wire format error: {0}")]
    Wire(#[from] bincode::Error),

    /// State does not match the declared channel layout
    #[error("Channel layout mismatch: expected {expected} channels, got {got}")]
    ChannelLayout { expected: usize, got: usize },

    /// Channel has the wrong number of components
    #[error("Channel '{channel}' expects {expected} values, got {got}")]
    ChannelShape {
        channel: String,
        expected: usize,
        got: usize,
    },

    /// The session has been closed
    #[error("Session closed")]
    SessionClosed,

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
