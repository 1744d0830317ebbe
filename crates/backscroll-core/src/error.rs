//! Error types for the backscroll-core crate

use std::io;
use thiserror::Error;

/// Result type alias for backscroll-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for backscroll-core
#[derive(Error, Debug)]
pub enum Error {
    /// Message store query failures; never retried here
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Event channel closed while the controller loop was running
    #[error("Channel error: {0}")]
    ChannelClosed(String),
}
