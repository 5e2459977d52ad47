//! Capacity and inactivity eviction rules.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::entry::Session;
use crate::config::SessionManagerConfig;

/// Decides which sessions have to go.
///
/// Victim selection is a linear scan over live sessions. That is fine for the tens of sessions
/// a host keeps; a heap keyed by last access would be needed for thousands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_active_sessions: usize,
    pub inactivity_timeout: Duration,
}

impl EvictionPolicy {
    pub fn from_config(config: &SessionManagerConfig) -> Self {
        Self {
            max_active_sessions: config.max_active_sessions,
            inactivity_timeout: config.inactivity_timeout,
        }
    }

    /// Whether inserting one more session next to `count` live ones needs a slot freed first.
    pub fn at_capacity(&self, count: usize) -> bool {
        count >= self.max_active_sessions
    }

    /// Least recently used session. Ties go to the earliest created, then to the smaller
    /// conversation id, so the choice is deterministic.
    pub fn select_lru<'a, I>(&self, sessions: I) -> Option<&'a Arc<Session>>
    where
        I: IntoIterator<Item = &'a Arc<Session>>,
    {
        sessions.into_iter().min_by(|a, b| {
            a.last_access()
                .cmp(&b.last_access())
                .then_with(|| a.created_at().cmp(&b.created_at()))
                .then_with(|| a.conversation_id().cmp(b.conversation_id()))
        })
    }

    /// Idle strictly longer than the inactivity timeout.
    pub fn is_expired(&self, session: &Session, now: Instant) -> bool {
        session.idle_for(now) > self.inactivity_timeout
    }

    /// Conversation ids of every expired session.
    pub fn expired<'a, I>(&self, sessions: I, now: Instant) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Arc<Session>>,
    {
        sessions
            .into_iter()
            .filter(|session| self.is_expired(session, now))
            .map(|session| session.conversation_id().to_string())
            .collect()
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::from_config(&SessionManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::agent::{
        AgentHandle, AgentOutcome, AgentPrompt, NullTransport, OutputSink, TransportCell,
    };
    use crate::types::SessionMode;

    struct IdleAgent;

    #[async_trait]
    impl AgentHandle for IdleAgent {
        async fn run(
            &self,
            _prompt: AgentPrompt,
            _sink: OutputSink,
        ) -> crate::error::Result<AgentOutcome> {
            Ok(AgentOutcome {
                reply: String::new(),
                messages: Vec::new(),
            })
        }

        async fn dispose(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn session(conversation_id: &str) -> Arc<Session> {
        let transport = Arc::new(TransportCell::new(Arc::new(NullTransport)));
        Arc::new(Session::spawn(
            conversation_id,
            SessionMode::Chat,
            Arc::new(IdleAgent),
            transport,
        ))
    }

    fn policy(max_active_sessions: usize, inactivity_timeout: Duration) -> EvictionPolicy {
        EvictionPolicy {
            max_active_sessions,
            inactivity_timeout,
        }
    }

    #[test]
    fn capacity_is_reached_at_the_limit() {
        let policy = policy(2, Duration::from_secs(1));
        assert!(!policy.at_capacity(1));
        assert!(policy.at_capacity(2));
    }

    #[tokio::test(start_paused = true)]
    async fn lru_prefers_oldest_access() {
        let a = session("a");
        tokio::time::advance(Duration::from_millis(5)).await;
        let b = session("b");
        tokio::time::advance(Duration::from_millis(5)).await;
        a.touch();

        let sessions = vec![a, b];
        let victim = EvictionPolicy::default().select_lru(&sessions).unwrap();

        assert_eq!(victim.conversation_id(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn lru_ties_break_on_conversation_id() {
        let sessions = vec![session("b"), session("a")];
        let victim = EvictionPolicy::default().select_lru(&sessions).unwrap();
        assert_eq!(victim.conversation_id(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_strictly_past_the_timeout() {
        let policy = policy(4, Duration::from_millis(100));
        let sessions = vec![session("a")];
        let created = Instant::now();

        assert!(policy
            .expired(&sessions, created + Duration::from_millis(100))
            .is_empty());
        assert_eq!(
            policy.expired(&sessions, created + Duration::from_millis(101)),
            vec!["a".to_string()]
        );
    }
}
