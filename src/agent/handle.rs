//! Agent handle and factory contracts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::transport::TransportRef;
use crate::error::Result;
use crate::types::{ChatMessage, SessionMode};

/// Receives incremental output while an agent run is in progress.
pub type OutputSink = Arc<dyn Fn(String) + Send + Sync>;

/// Async callback that resolves a credential when an agent handle is built.
///
/// # Example
///
/// ```ignore
/// let auth: AuthProvider =
///     Arc::new(|| async { Ok::<_, ParleyError>("sk-rotated".to_string()) }.boxed());
/// ```
pub type AuthProvider =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// Input for one agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentPrompt {
    pub text: String,
}

impl AgentPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Result of one agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    /// Final reply text.
    pub reply: String,
    /// The conversation's full message list after the run, handed to the persistence gateway.
    pub messages: Vec<ChatMessage>,
}

/// What a factory needs to know to build an agent for one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSessionConfig {
    pub conversation_id: String,
    pub mode: SessionMode,
    /// Prior history; non-empty only when a session is rebuilt from a preserved snapshot.
    pub history: Vec<ChatMessage>,
}

/// Opaque resource that talks to an AI provider on behalf of one session.
///
/// The session manager only ever calls these two methods.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Run one operation. `sink` receives incremental output.
    async fn run(&self, prompt: AgentPrompt, sink: OutputSink) -> Result<AgentOutcome>;

    /// Release the underlying resources. Called at most once per handle.
    async fn dispose(&self) -> Result<()>;
}

/// Builds agent handles for new sessions.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(
        &self,
        transport: TransportRef,
        config: &AgentSessionConfig,
        auth: Option<AuthProvider>,
    ) -> Result<Box<dyn AgentHandle>>;
}
