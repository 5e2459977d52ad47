//! Persistence gateway contract.
//!
//! Storage format and file I/O live behind [`PersistenceGateway`]; the session manager only
//! calls it.

pub mod memory;

pub use memory::InMemoryPersistence;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatMessage, Conversation};

/// Durable conversation storage used by the session manager.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Store the full message list for a conversation.
    async fn save_conversation(
        &self,
        conversation_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Conversation>;

    /// Look up a stored conversation.
    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Bring a conversation's history back so a rebuilt agent can see it.
    async fn restore_conversation(&self, conversation_id: &str) -> Result<Conversation>;
}
