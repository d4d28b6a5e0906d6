//! Error types for Horizon Trellis.
//!
//! Store operations never return errors: a mutation that cannot be applied is
//! a logged no-op. These types cover construction, configuration and the
//! rejection of asynchronous values.

use horizon_trellis_dom::DomError;

/// Result type alias for Horizon Trellis operations.
pub type Result<T> = std::result::Result<T, TrellisError>;

/// The main error type for Horizon Trellis.
#[derive(Debug, thiserror::Error)]
pub enum TrellisError {
    /// Building or parsing the document failed.
    #[error("Document error: {0}")]
    Dom(#[from] DomError),

    /// A configuration file could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// The rejection of a pending computed or asynchronously set value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Computation rejected: {message}")]
pub struct ComputeError {
    message: String,
}

impl ComputeError {
    /// Create a rejection with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The rejection message.
    pub fn message(&self) -> &str {
        &self.message
    }
}
