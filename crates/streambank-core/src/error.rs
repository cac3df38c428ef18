//! Error types for StreamBank Core

use crate::types::PipelineErrorKind;
use thiserror::Error;

/// Result type alias for catalog and playback operations
pub type Result<T> = std::result::Result<T, Error>;

/// StreamBank error types
#[derive(Error, Debug)]
pub enum Error {
    // Playlist errors
    #[error("Failed to parse playlist: {0}")]
    ManifestParse(String),

    #[error("Invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    // Catalog errors
    #[error("Stream unavailable: {category}[{index}]")]
    NotFound { category: String, index: usize },

    #[error("Unknown stream id: {0}")]
    UnknownEntry(String),

    // Playback errors
    #[error("Pipeline error: {kind} (fatal: {fatal})")]
    Pipeline { kind: PipelineErrorKind, fatal: bool },

    #[error("No source available: primary and all backup URLs failed")]
    SourcesExhausted,

    #[error("No alternative sources available")]
    NoAlternativeSource,

    #[error("Adaptive streaming is not supported and native playback is unavailable")]
    UnsupportedEnvironment,

    #[error("Playback session is closed")]
    SessionClosed,

    // Source loading errors
    #[error("Failed to fetch {location}")]
    SourceFetch {
        location: String,
        source: reqwest::Error,
    },

    #[error("HTTP {status} while fetching {location}")]
    HttpStatus { location: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::ManifestParse(msg.into())
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Pipeline { fatal, .. } => !fatal,
            Error::NotFound { .. }
            | Error::UnknownEntry(_)
            | Error::NoAlternativeSource
            | Error::SourceFetch { .. }
            | Error::HttpStatus { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this error should be shown to the user as a terminal playback failure
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::SourcesExhausted | Error::UnsupportedEnvironment)
    }

    /// Returns the error code for logs and notifications
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::Json(_) => "MANIFEST_JSON",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::UnknownEntry(_) => "UNKNOWN_ENTRY",
            Error::Pipeline { .. } => "PIPELINE",
            Error::SourcesExhausted => "SOURCES_EXHAUSTED",
            Error::NoAlternativeSource => "NO_ALTERNATIVE",
            Error::UnsupportedEnvironment => "UNSUPPORTED",
            Error::SessionClosed => "SESSION_CLOSED",
            Error::SourceFetch { .. } => "SOURCE_FETCH",
            Error::HttpStatus { .. } => "HTTP_STATUS",
            Error::Io(_) => "IO",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors() {
        assert!(Error::SourcesExhausted.is_terminal());
        assert!(Error::UnsupportedEnvironment.is_terminal());
        assert!(!Error::NotFound { category: "tv".into(), index: 3 }.is_terminal());
    }

    #[test]
    fn test_pipeline_recoverable_only_when_not_fatal() {
        let soft = Error::Pipeline { kind: PipelineErrorKind::Network, fatal: false };
        let hard = Error::Pipeline { kind: PipelineErrorKind::Network, fatal: true };
        assert!(soft.is_recoverable());
        assert!(!hard.is_recoverable());
        assert_eq!(hard.error_code(), "PIPELINE");
    }

    #[test]
    fn test_not_found_message() {
        let err = Error::NotFound { category: "radio".into(), index: 7 };
        assert_eq!(err.to_string(), "Stream unavailable: radio[7]");
    }
}
