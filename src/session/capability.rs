//! Per-conversation capability bookkeeping.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::types::Capability;

/// Maps a conversation id to the capabilities registered for it, in registration order.
///
/// Registration appends and never replaces: two capabilities with the same name coexist.
/// It does not check that a session exists for the conversation.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<String, Vec<Capability>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conversation_id: &str, capability: Capability) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(conversation_id.to_string())
            .or_default()
            .push(capability);
    }

    /// Registered capabilities, or an empty list for an unknown conversation.
    pub fn get(&self, conversation_id: &str) -> Vec<Capability> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Exact, case-sensitive name match.
    pub fn has(&self, conversation_id: &str, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .is_some_and(|caps| caps.iter().any(|cap| cap.name == name))
    }

    pub fn clear(&self, conversation_id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conversation_id);
    }
}
