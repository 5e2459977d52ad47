//! Contracts for the external agent handle and the front-end transport.

pub mod handle;
pub mod transport;

pub use handle::{
    AgentFactory, AgentHandle, AgentOutcome, AgentPrompt, AgentSessionConfig, AuthProvider,
    OutputSink,
};
pub use transport::{NullTransport, Transport, TransportCell, TransportEvent, TransportRef};
