//! Error types.

use thiserror::Error;

/// Errors that can occur while reading input or loading configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte source is exhausted and nothing is buffered.
    #[error("end of input stream")]
    EndOfStream,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML error.
    #[error("TOML error: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

/// Result type for key router operations.
pub type Result<T> = std::result::Result<T, Error>;
