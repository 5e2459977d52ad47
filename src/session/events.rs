//! Lifecycle notifications broadcast by the session manager.

use serde::{Deserialize, Serialize};

use crate::types::SessionMode;

/// Events beyond this capacity make slow subscribers lag.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something happened to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Created {
        conversation_id: String,
        mode: SessionMode,
    },
    Restored {
        conversation_id: String,
        mode: SessionMode,
    },
    /// Removed to make room for a new session.
    Evicted { conversation_id: String },
    /// Removed by the inactivity sweep.
    Expired { conversation_id: String },
    /// Removed by an explicit dispose, bulk dispose or restart.
    Disposed { conversation_id: String },
    TransportUpdated,
}

impl LifecycleEvent {
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::Created {
                conversation_id, ..
            }
            | Self::Restored {
                conversation_id, ..
            }
            | Self::Evicted { conversation_id }
            | Self::Expired { conversation_id }
            | Self::Disposed { conversation_id } => Some(conversation_id),
            Self::TransportUpdated => None,
        }
    }
}

/// Result of a bulk cleanup (eviction sweep or dispose-all).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions removed and disposed cleanly.
    pub disposed: Vec<String>,
    /// Sessions removed whose agent handle failed to dispose (conversation id, error message).
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.disposed.is_empty() && self.failed.is_empty()
    }
}

/// Result of [`SessionManager::restore_all`](super::SessionManager::restore_all).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub failed: Vec<(String, String)>,
}
