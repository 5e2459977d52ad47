//! Convenience re-exports for common use.

pub use crate::agent::{
    AgentFactory, AgentHandle, AgentOutcome, AgentPrompt, AgentSessionConfig, AuthProvider,
    NullTransport, OutputSink, Transport, TransportEvent, TransportRef,
};
pub use crate::config::SessionManagerConfig;
pub use crate::error::{ParleyError, Result};
pub use crate::persistence::{InMemoryPersistence, PersistenceGateway};
pub use crate::session::{
    LifecycleEvent, OperationContext, Session, SessionInfo, SessionManager, SweepReport,
    SweeperHandle,
};
pub use crate::types::{Capability, ChatMessage, Conversation, PreservedState, Role, SessionMode};
