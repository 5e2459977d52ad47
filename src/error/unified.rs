//! Error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The session was disposed or evicted before the action ran.
    Lifecycle,
    Agent,
    Persistence,
    Operation,
    Configuration,
    Serialization,
    Unknown,
}

/// Suggested recovery action for the layer above the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryAction,
    RestartSession,
    CheckConfiguration,
    ReportIssue,
}
