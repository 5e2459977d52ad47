//! In-process conversation store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::PersistenceGateway;
use crate::error::Result;
use crate::types::{ChatMessage, Conversation};

/// Keeps conversations in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    pub fn len(&self) -> usize {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryPersistence {
    async fn save_conversation(
        &self,
        conversation_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Conversation> {
        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation::new(conversation_id, Vec::new()));
        conversation.messages = messages;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned())
    }

    async fn restore_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        Ok(self
            .get_conversation(conversation_id)
            .await?
            .unwrap_or_else(|| Conversation::new(conversation_id, Vec::new())))
    }
}
