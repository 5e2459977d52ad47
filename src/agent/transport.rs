//! Front-end transport reference shared by all sessions.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Update pushed to the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// Incremental agent output.
    Output { conversation_id: String, text: String },
    /// An agent run finished.
    Completed { conversation_id: String },
}

/// Connection to a front end (webview, socket, ...). Opaque to the session manager.
pub trait Transport: Send + Sync {
    fn post(&self, event: TransportEvent) -> Result<()>;
}

pub type TransportRef = Arc<dyn Transport>;

/// Transport that drops everything; for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn post(&self, _event: TransportEvent) -> Result<()> {
        Ok(())
    }
}

/// Swappable holder for the current transport.
///
/// Operations read the cell when they start running, so a swap reaches every operation
/// dispatched afterwards but leaves running ones on the old reference.
pub struct TransportCell {
    current: RwLock<TransportRef>,
}

impl TransportCell {
    pub fn new(transport: TransportRef) -> Self {
        Self {
            current: RwLock::new(transport),
        }
    }

    pub fn current(&self) -> TransportRef {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the transport, returning the previous one.
    pub fn replace(&self, transport: TransportRef) -> TransportRef {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, transport)
    }
}

impl std::fmt::Debug for TransportCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportCell").field("current", &"..").finish()
    }
}
