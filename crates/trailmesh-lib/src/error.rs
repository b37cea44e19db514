use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for the trailmesh library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
///
/// Every variant carries owned strings so errors can be cloned and shared
/// between callers that were coalesced onto the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Waypoints or network payload were malformed.
    #[error("invalid input: {message}")]
    Validation { message: String },

    /// No network graph is loaded, or a fetch failed before any response.
    #[error("routing network unavailable: {message}")]
    NetworkUnavailable { message: String },

    /// Search found nothing and no safe direct fallback applies.
    #[error("no path found: {message}")]
    NoPath { message: String },

    /// A remote routing service returned a failure or an unparsable payload.
    #[error("{service} request failed: {message}")]
    RemoteService { service: String, message: String },

    /// The remote service failed and so did the offline fallback.
    #[error("remote routing failed ({primary}); offline fallback also failed ({fallback})")]
    FallbackExhausted {
        primary: Box<Error>,
        fallback: Box<Error>,
    },

    /// Raised when reading or parsing a network file fails.
    #[error("failed to load network from {path}: {message}")]
    NetworkLoad { path: PathBuf, message: String },

    /// Raised when configuration could not be parsed.
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn no_path(message: impl Into<String>) -> Self {
        Error::NoPath {
            message: message.into(),
        }
    }

    pub(crate) fn remote(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RemoteService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::NetworkUnavailable { .. } => "network_unavailable",
            Error::NoPath { .. } => "no_path",
            Error::RemoteService { .. } => "remote_service",
            Error::FallbackExhausted { .. } => "fallback_exhausted",
            Error::NetworkLoad { .. } => "network_load",
            Error::Config { .. } => "config",
        }
    }
}
