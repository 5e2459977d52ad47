//! A live session: one agent handle, its operation queue and LRU bookkeeping.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use super::executor::SerialExecutor;
use crate::agent::{AgentHandle, TransportCell, TransportRef};
use crate::error::Result;
use crate::types::SessionMode;

/// What an operation sees when it runs on a session's queue.
#[derive(Clone)]
pub struct OperationContext {
    pub conversation_id: String,
    pub mode: SessionMode,
    pub agent: Arc<dyn AgentHandle>,
    /// The transport current at the moment this operation started.
    pub transport: TransportRef,
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("conversation_id", &self.conversation_id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// One active conversation's agent instance.
///
/// Created only by the session manager. A session recreated for the same conversation after
/// disposal is a different object with a different [`instance_id`](Self::instance_id).
pub struct Session {
    conversation_id: String,
    mode: SessionMode,
    instance_id: Uuid,
    created_at: Instant,
    created_at_utc: DateTime<Utc>,
    last_access: Arc<Mutex<Instant>>,
    agent: Arc<dyn AgentHandle>,
    executor: SerialExecutor<OperationContext>,
    disposed: AtomicBool,
}

impl Session {
    pub(crate) fn spawn(
        conversation_id: impl Into<String>,
        mode: SessionMode,
        agent: Arc<dyn AgentHandle>,
        transport: Arc<TransportCell>,
    ) -> Self {
        let conversation_id = conversation_id.into();
        let now = Instant::now();
        let last_access = Arc::new(Mutex::new(now));

        let context = {
            let conversation_id = conversation_id.clone();
            let agent = agent.clone();
            move || OperationContext {
                conversation_id: conversation_id.clone(),
                mode,
                agent: agent.clone(),
                transport: transport.current(),
            }
        };
        let on_complete = {
            let last_access = last_access.clone();
            move || touch(&last_access)
        };
        let executor = SerialExecutor::spawn(conversation_id.clone(), context, on_complete);

        Self {
            conversation_id,
            mode,
            instance_id: Uuid::new_v4(),
            created_at: now,
            created_at_utc: Utc::now(),
            last_access,
            agent,
            executor,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Identity of this particular instance.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Wall-clock creation time, for display.
    pub fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at_utc
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since the last access.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access())
    }

    /// Operations waiting behind the running one.
    pub fn queued_operations(&self) -> usize {
        self.executor.queued()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Submit an operation to this session's queue and wait for its result.
    ///
    /// See [`SerialExecutor::enqueue`] for ordering and failure semantics.
    pub async fn enqueue<T, Op, Fut>(&self, op: Op) -> Result<T>
    where
        T: Send + 'static,
        Op: FnOnce(OperationContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.executor.enqueue(op).await
    }

    pub(crate) fn touch(&self) {
        touch(&self.last_access);
    }

    /// Tear down the queue and release the agent handle.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub(crate) async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.executor.close();
        self.agent.dispose().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("conversation_id", &self.conversation_id)
            .field("mode", &self.mode)
            .field("instance_id", &self.instance_id)
            .field("queued_operations", &self.queued_operations())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

fn touch(last_access: &Mutex<Instant>) {
    *last_access.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
}
