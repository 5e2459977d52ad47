//! Snapshot and restore of sessions across a transport reconnect.

use std::sync::Arc;

use futures::future::join_all;

use super::entry::Session;
use super::events::{LifecycleEvent, RestoreReport};
use super::manager::SessionManager;
use crate::error::Result;
use crate::types::PreservedState;

impl SessionManager {
    /// Snapshot one live session. `None` if the conversation has no session.
    ///
    /// Does not count as an access. `message_count` is the length of the persisted history,
    /// or 0 when persistence has nothing or fails.
    pub async fn preserve_state(&self, conversation_id: &str) -> Option<PreservedState> {
        let session = self.inner.registry.get(conversation_id)?;
        Some(self.snapshot_session(&session).await)
    }

    /// Snapshot every live session.
    pub async fn preserve_all(&self) -> Vec<PreservedState> {
        let sessions = self.inner.registry.snapshot();
        let states = join_all(sessions.iter().map(|s| self.snapshot_session(s))).await;
        tracing::debug!(sessions = states.len(), "Preserved session state");
        states
    }

    /// Recreate (or reuse) the session described by `state`.
    ///
    /// History is restored through the persistence gateway first; if that fails nothing is
    /// created. An existing session keeps its mode and only gains the preserved capabilities it
    /// does not already have, so restoring twice does not duplicate them.
    pub async fn restore_state(&self, state: &PreservedState) -> Result<Arc<Session>> {
        let conversation_id = state.conversation_id.as_str();
        let conversation = self
            .inner
            .persistence
            .restore_conversation(conversation_id)
            .await?;
        let restored_messages = conversation.len();

        let acquired = self
            .acquire(conversation_id, state.mode, conversation.messages)
            .await?;

        for capability in &state.capabilities {
            if acquired.created
                || !self
                    .inner
                    .capabilities
                    .has(conversation_id, &capability.name)
            {
                self.inner
                    .capabilities
                    .register(conversation_id, capability.clone());
            }
        }

        let mode = acquired.session.mode();
        if mode != state.mode {
            tracing::debug!(
                conversation_id,
                preserved = %state.mode,
                current = %mode,
                "Session already live in another mode; keeping it"
            );
        }
        tracing::info!(
            conversation_id,
            mode = %mode,
            messages = restored_messages,
            capabilities = state.capabilities.len(),
            created = acquired.created,
            "Session restored"
        );
        self.emit(LifecycleEvent::Restored {
            conversation_id: conversation_id.to_string(),
            mode,
        });

        Ok(acquired.session)
    }

    /// Restore each snapshot in order. A failure is logged and recorded; the rest still run.
    pub async fn restore_all(&self, states: &[PreservedState]) -> RestoreReport {
        let mut report = RestoreReport::default();
        for state in states {
            match self.restore_state(state).await {
                Ok(_) => report.restored.push(state.conversation_id.clone()),
                Err(e) => {
                    tracing::warn!(
                        conversation_id = %state.conversation_id,
                        error = %e,
                        "Failed to restore session; continuing"
                    );
                    report
                        .failed
                        .push((state.conversation_id.clone(), e.to_string()));
                }
            }
        }
        report
    }

    async fn snapshot_session(&self, session: &Session) -> PreservedState {
        let conversation_id = session.conversation_id();
        let message_count = match self.inner.persistence.get_conversation(conversation_id).await {
            Ok(conversation) => conversation.map_or(0, |c| c.len()),
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    error = %e,
                    "Could not read conversation while preserving state"
                );
                0
            }
        };

        PreservedState {
            conversation_id: conversation_id.to_string(),
            mode: session.mode(),
            message_count,
            capabilities: self.inner.capabilities.get(conversation_id),
        }
    }
}
