//! CLI-specific error types and exit codes.

use flashtalk_core::{SettingsError, TransportError};
use flashtalk_engine::EngineError;
use flashtalk_stream::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid settings, from any source.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings file could not be read.
    #[error("IO error: {0}")]
    Io(String),

    /// The backend could not be reached or refused the request.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The generation ended in an error.
    #[error("Generation failed: {0}")]
    Generation(String),
}

impl CliError {
    /// Map error to an exit code (see sysexits.h).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,     // EX_CONFIG
            Self::Io(_) => 74,         // EX_IOERR
            Self::Backend(_) => 69,    // EX_UNAVAILABLE
            Self::Generation(_) => 1,
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<TransportError> for CliError {
    fn from(err: TransportError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<StreamError> for CliError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::InvalidBaseUrl { .. } => Self::Config(err.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::EmptyPrompt => Self::Config(err.to_string()),
            EngineError::Init(e) => e.into(),
            EngineError::Stream(e) => e.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
