//! Error Types
//!
//! Only hard failures live here. Decode, validation, tool-execution and
//! turn-exhaustion outcomes are reported through [`crate::RunResult`].

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider call exceeded its timeout
    #[error("Provider timed out after {0}s")]
    Timeout(u64),

    /// Malformed tool registration (empty or duplicate name, bad metadata)
    #[error("Tool contract violation: {0}")]
    Contract(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Check if error is retryable.
    ///
    /// The engine itself never retries; callers wrapping a run may.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Timeout(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::Timeout(_) => "The AI service took too long to respond.".into(),
            Self::Contract(msg) => format!("A tool is registered incorrectly: {msg}"),
            Self::Config(msg) => format!("Invalid configuration: {msg}"),
        }
    }
}
