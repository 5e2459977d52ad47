//! Error types for parley.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all session manager operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session disposed: {conversation_id}")]
    Disposed { conversation_id: String },

    #[error("Agent handle error ({conversation_id}): {message}")]
    AgentHandle {
        conversation_id: String,
        message: String,
    },

    #[error("Persistence error ({conversation_id}): {message}")]
    Persistence {
        conversation_id: String,
        message: String,
    },

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Operation panicked: {0}")]
    Panicked(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl ParleyError {
    /// Create a disposed error for a conversation.
    pub fn disposed(conversation_id: impl Into<String>) -> Self {
        Self::Disposed {
            conversation_id: conversation_id.into(),
        }
    }

    /// Create an agent handle error for a conversation.
    pub fn agent(conversation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentHandle {
            conversation_id: conversation_id.into(),
            message: message.into(),
        }
    }

    /// Create a persistence gateway error for a conversation.
    pub fn persistence(conversation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            conversation_id: conversation_id.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::Disposed { .. } => ErrorCategory::Lifecycle,
            Self::AgentHandle { .. } => ErrorCategory::Agent,
            Self::Persistence { .. } | Self::Io(_) => ErrorCategory::Persistence,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Operation(_) | Self::Panicked(_) => ErrorCategory::Operation,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether retrying the action that produced this error may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Lifecycle | ErrorCategory::Persistence
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Lifecycle | ErrorCategory::Persistence => RecoverySuggestion::RetryAction,
            ErrorCategory::Agent => RecoverySuggestion::RestartSession,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Operation => RecoverySuggestion::RetryAction,
            _ => RecoverySuggestion::ReportIssue,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposed_display_names_conversation() {
        let err = ParleyError::disposed("conv-1");
        assert_eq!(err.to_string(), "Session disposed: conv-1");
        assert!(err.is_transient());
    }

    #[test]
    fn agent_errors_suggest_restart() {
        let err = ParleyError::agent("conv-2", "socket closed");
        assert_eq!(err.category(), ErrorCategory::Agent);
        assert_eq!(err.recovery_suggestion(), RecoverySuggestion::RestartSession);
        assert!(!err.is_transient());
    }

    #[test]
    fn io_errors_count_as_persistence() {
        let err: ParleyError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.category(), ErrorCategory::Persistence);
    }
}
