//! Error types for pipeline operations.

use thiserror::Error;

/// Errors that can occur while analyzing a document.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller-supplied input is malformed or missing required fields.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message.
        message: String,
    },

    /// An agent's underlying model or engine call failed.
    #[error("{stage} stage degraded: {message}")]
    StageDegraded {
        /// Name of the stage that degraded.
        stage: &'static str,
        /// Error message.
        message: String,
    },

    /// Outbound network call failed or timed out.
    #[error("Network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// Image data could not be decoded or processed.
    #[error("Image error: {message}")]
    Image {
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },
}

impl PipelineError {
    /// Check if this error is recovered inside the owning agent.
    ///
    /// Recoverable errors fold into conservative stage defaults and never
    /// abort the pipeline.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StageDegraded { .. } | Self::Network { .. } | Self::Image { .. }
        )
    }

    /// Check if this error must be surfaced to the caller before the
    /// pipeline runs.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
