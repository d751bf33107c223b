//! Error types for slipstream-core
//!
//! Everything here is a configuration error: raised while a session is
//! being set up, never from the per-tick paths.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing quantization threshold for channel '{0}'")]
    MissingThreshold(String),

    #[error("Invalid quantization threshold for '{channel}': {value}")]
    InvalidThreshold { channel: String, value: f32 },

    #[error("Duplicate channel declaration: {0}")]
    DuplicateChannel(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
