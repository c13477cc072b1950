//! # Error Types
//!
//! Classified errors for pipeline hosting. Library code returns [`Error`]
//! via `thiserror`; the server maps each kind to an HTTP status.

/// Top-level error type for all Tempest operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required credentials or settings absent at construction time.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The retrieval dependency signalled throttling.
    #[error("search rate limit exceeded, try again in a few moments")]
    RateLimited,

    /// The worker reported success but no article artifact was found.
    #[error("article resolution failed: {message}")]
    Resolution { message: String },

    /// Any other failure raised during pipeline execution.
    #[error("pipeline failed during {stage}: {message}")]
    Pipeline { stage: String, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error from any displayable message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a resolution error from any displayable message.
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution {
            message: msg.into(),
        }
    }

    /// Create a pipeline error with the stage that was running.
    pub fn pipeline(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Whether this error is the retrieval throttling condition.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}
