//! Error types for qlens

use thiserror::Error;

/// Core error type for qlens operations
#[derive(Error, Debug)]
pub enum QlensError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("External source error: {0}")]
    ExternalSource(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Loop error: {0}")]
    Loop(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl QlensError {
    /// Returns false for errors that must abort startup.
    ///
    /// Everything raised while the engine is running is downgraded to a
    /// skipped data point or a logged loop iteration.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::ConfigParse(_))
    }

    /// Returns true if the error came from an external collaborator call
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::ExternalSource(_) | Self::Timeout(_) | Self::NotSupported(_)
        )
    }
}

/// Result type alias for qlens operations
pub type Result<T> = std::result::Result<T, QlensError>;
