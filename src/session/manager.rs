//! SessionManager: the façade that owns every agent session.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bon::bon;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use super::capability::CapabilityRegistry;
use super::entry::{OperationContext, Session};
use super::events::{LifecycleEvent, SweepReport, EVENT_CHANNEL_CAPACITY};
use super::eviction::EvictionPolicy;
use super::executor::panic_message;
use super::registry::{Acquired, SessionRegistry};
use crate::agent::{
    AgentFactory, AgentOutcome, AgentPrompt, AgentSessionConfig, AuthProvider, OutputSink,
    TransportCell, TransportEvent, TransportRef,
};
use crate::config::SessionManagerConfig;
use crate::error::Result;
use crate::persistence::PersistenceGateway;
use crate::types::{Capability, ChatMessage, SessionMode};

/// Point-in-time view of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub conversation_id: String,
    pub instance_id: Uuid,
    pub mode: SessionMode,
    pub created_at: DateTime<Utc>,
    pub idle_for: Duration,
    pub queued_operations: usize,
}

pub(super) struct Inner {
    pub(super) config: SessionManagerConfig,
    pub(super) registry: SessionRegistry,
    pub(super) capabilities: CapabilityRegistry,
    pub(super) factory: Arc<dyn AgentFactory>,
    pub(super) persistence: Arc<dyn PersistenceGateway>,
    pub(super) transport: Arc<TransportCell>,
    pub(super) auth: Option<AuthProvider>,
    pub(super) events: broadcast::Sender<LifecycleEvent>,
}

/// Owns every live session: creation, per-conversation serialization, capacity-bounded
/// eviction, capability bookkeeping and snapshot/restore across a transport reconnect.
///
/// Cheap to clone; clones share the same sessions.
///
/// # Example
///
/// ```ignore
/// let manager = SessionManager::builder()
///     .factory(Arc::new(MyAgentFactory::new()))
///     .persistence(Arc::new(InMemoryPersistence::new()))
///     .transport(Arc::new(NullTransport))
///     .build()?;
///
/// let outcome = manager.send_message("conv-1", SessionMode::Chat, "Hello").await?;
/// ```
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<Inner>,
}

#[bon]
impl SessionManager {
    /// Create a manager. Fails if `config` does not validate.
    #[builder]
    pub fn new(
        #[builder(default)] config: SessionManagerConfig,
        factory: Arc<dyn AgentFactory>,
        persistence: Arc<dyn PersistenceGateway>,
        transport: TransportRef,
        auth: Option<AuthProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = SessionRegistry::new(EvictionPolicy::from_config(&config));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                capabilities: CapabilityRegistry::new(),
                factory,
                persistence,
                transport: Arc::new(TransportCell::new(transport)),
                auth,
                events,
            }),
        })
    }
}

impl SessionManager {
    pub fn config(&self) -> &SessionManagerConfig {
        &self.inner.config
    }

    /// Return the session for `conversation_id`, creating it if needed.
    ///
    /// `mode` only matters for a new session; an existing one keeps its original mode. Creating
    /// a session at capacity evicts the least recently used one first.
    pub async fn get_or_create(
        &self,
        conversation_id: &str,
        mode: SessionMode,
    ) -> Result<Arc<Session>> {
        self.acquire(conversation_id, mode, Vec::new())
            .await
            .map(|acquired| acquired.session)
    }

    /// Look up a session without counting it as an access.
    pub fn get(&self, conversation_id: &str) -> Option<Arc<Session>> {
        self.inner.registry.get(conversation_id)
    }

    pub fn has(&self, conversation_id: &str) -> bool {
        self.inner.registry.has(conversation_id)
    }

    pub fn count(&self) -> usize {
        self.inner.registry.count()
    }

    /// Live sessions ordered by conversation id.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let mut infos: Vec<SessionInfo> = self
            .inner
            .registry
            .snapshot()
            .iter()
            .map(|session| SessionInfo {
                conversation_id: session.conversation_id().to_string(),
                instance_id: session.instance_id(),
                mode: session.mode(),
                created_at: session.created_at_utc(),
                idle_for: session.idle_for(now),
                queued_operations: session.queued_operations(),
            })
            .collect();
        infos.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        infos
    }

    /// Subscribe to lifecycle events. Only events sent after subscribing are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// Run `op` on the conversation's queue, creating the session if needed.
    pub async fn execute<T, Op, Fut>(
        &self,
        conversation_id: &str,
        mode: SessionMode,
        op: Op,
    ) -> Result<T>
    where
        T: Send + 'static,
        Op: FnOnce(OperationContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let session = self.get_or_create(conversation_id, mode).await?;
        session.enqueue(op).await
    }

    /// Send a user message through the conversation's agent.
    ///
    /// Incremental output goes to the transport current when the operation starts. The
    /// resulting history is saved through the persistence gateway; a failed save is logged and
    /// the reply is still returned.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        mode: SessionMode,
        text: impl Into<String>,
    ) -> Result<AgentOutcome> {
        let prompt = AgentPrompt::new(text);
        let persistence = self.inner.persistence.clone();

        self.execute(conversation_id, mode, move |ctx| async move {
            let outcome = ctx.agent.run(prompt, output_sink(&ctx)).await?;

            if let Err(e) = persistence
                .save_conversation(&ctx.conversation_id, outcome.messages.clone())
                .await
            {
                tracing::warn!(
                    conversation_id = %ctx.conversation_id,
                    error = %e,
                    "Failed to save conversation; continuing"
                );
            }
            post(
                &ctx,
                TransportEvent::Completed {
                    conversation_id: ctx.conversation_id.clone(),
                },
            );

            Ok(outcome)
        })
        .await
    }

    /// Dispose one conversation's session.
    ///
    /// Returns `Ok(false)` when there was nothing to dispose. An error from the agent handle's
    /// disposal is returned to the caller; the session is removed either way.
    pub async fn dispose(&self, conversation_id: &str) -> Result<bool> {
        let Some(session) = self.inner.registry.remove(conversation_id) else {
            return Ok(false);
        };
        self.inner.capabilities.clear(conversation_id);

        let result = session.dispose().await;
        self.emit(LifecycleEvent::Disposed {
            conversation_id: conversation_id.to_string(),
        });
        result?;

        tracing::info!(conversation_id, sessions = self.count(), "Session disposed");
        Ok(true)
    }

    /// Dispose every session. Never fails; individual disposal errors are logged and reported.
    pub async fn dispose_all(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for session in self.inner.registry.drain() {
            let conversation_id = session.conversation_id().to_string();
            self.inner.capabilities.clear(&conversation_id);

            match self.dispose_quietly(&session, "dispose_all").await {
                Ok(()) => report.disposed.push(conversation_id.clone()),
                Err(message) => report.failed.push((conversation_id.clone(), message)),
            }
            self.emit(LifecycleEvent::Disposed { conversation_id });
        }
        if !report.is_empty() {
            tracing::info!(
                disposed = report.disposed.len(),
                failed = report.failed.len(),
                "Disposed all sessions"
            );
        }
        report
    }

    /// Dispose the conversation's session and immediately build a replacement in the same mode.
    ///
    /// Queued operations on the old session fail with `Disposed`; one already running is left
    /// to finish. A disposal failure of the old agent handle is logged and does not stop the
    /// restart. Returns `Ok(None)` if the conversation has no session.
    pub async fn abort_and_restart(&self, conversation_id: &str) -> Result<Option<Arc<Session>>> {
        let Some(old) = self.inner.registry.remove(conversation_id) else {
            return Ok(None);
        };
        self.inner.capabilities.clear(conversation_id);

        let _ = self.dispose_quietly(&old, "restart").await;
        self.emit(LifecycleEvent::Disposed {
            conversation_id: conversation_id.to_string(),
        });
        tracing::info!(conversation_id, mode = %old.mode(), "Restarting session");

        self.get_or_create(conversation_id, old.mode()).await.map(Some)
    }

    /// Dispose every session idle for longer than the inactivity timeout.
    ///
    /// A failing disposal is logged and recorded; the sweep carries on with the rest.
    pub async fn sweep_inactive(&self) -> SweepReport {
        let policy = self.inner.registry.policy().clone();
        let candidates = policy.expired(&self.inner.registry.snapshot(), Instant::now());

        let mut report = SweepReport::default();
        for conversation_id in candidates {
            // Re-check under the registry lock: the session may have been used since.
            let Some(session) = self
                .inner
                .registry
                .remove_if(&conversation_id, |s| policy.is_expired(s, Instant::now()))
            else {
                continue;
            };
            self.inner.capabilities.clear(&conversation_id);
            tracing::info!(
                conversation_id = %conversation_id,
                idle_ms = session.idle_for(Instant::now()).as_millis() as u64,
                "Disposing inactive session"
            );

            match self.dispose_quietly(&session, "inactivity").await {
                Ok(()) => report.disposed.push(conversation_id.clone()),
                Err(message) => report.failed.push((conversation_id.clone(), message)),
            }
            self.emit(LifecycleEvent::Expired { conversation_id });
        }
        report
    }

    /// Append a capability to the conversation's list. Does not require a live session.
    pub fn register_capability(&self, conversation_id: &str, capability: Capability) {
        tracing::debug!(conversation_id, capability = %capability.name, "Registering capability");
        self.inner.capabilities.register(conversation_id, capability);
    }

    /// Registered capabilities in order; empty for an unknown conversation.
    pub fn get_capabilities(&self, conversation_id: &str) -> Vec<Capability> {
        self.inner.capabilities.get(conversation_id)
    }

    /// Whether a capability with exactly this name is registered.
    pub fn query_capability(&self, conversation_id: &str, name: &str) -> bool {
        self.inner.capabilities.has(conversation_id, name)
    }

    /// Swap the front-end transport for all operations dispatched from now on.
    pub fn update_transport(&self, transport: TransportRef) {
        self.inner.transport.replace(transport);
        tracing::info!(sessions = self.count(), "Transport reference updated");
        self.emit(LifecycleEvent::TransportUpdated);
    }

    // -- Internal helpers --

    pub(super) async fn acquire(
        &self,
        conversation_id: &str,
        mode: SessionMode,
        history: Vec<ChatMessage>,
    ) -> Result<Acquired> {
        let acquired = self
            .inner
            .registry
            .get_or_create(conversation_id, || {
                self.build_session(conversation_id, mode, history)
            })
            .await?;

        for victim in &acquired.evicted {
            self.inner.capabilities.clear(victim.conversation_id());
        }
        for victim in &acquired.evicted {
            tracing::info!(
                conversation_id = victim.conversation_id(),
                incoming = conversation_id,
                "Evicting least recently used session"
            );
            let _ = self.dispose_quietly(victim, "eviction").await;
            self.emit(LifecycleEvent::Evicted {
                conversation_id: victim.conversation_id().to_string(),
            });
        }

        if acquired.created {
            tracing::info!(
                conversation_id,
                mode = %mode,
                sessions = self.count(),
                "Session created"
            );
            self.emit(LifecycleEvent::Created {
                conversation_id: conversation_id.to_string(),
                mode,
            });
        }
        Ok(acquired)
    }

    async fn build_session(
        &self,
        conversation_id: &str,
        mode: SessionMode,
        history: Vec<ChatMessage>,
    ) -> Result<Session> {
        let config = AgentSessionConfig {
            conversation_id: conversation_id.to_string(),
            mode,
            history,
        };
        let agent = self
            .inner
            .factory
            .create(self.inner.transport.current(), &config, self.inner.auth.clone())
            .await?;

        Ok(Session::spawn(
            conversation_id,
            mode,
            Arc::from(agent),
            self.inner.transport.clone(),
        ))
    }

    /// Dispose without propagating: errors and panics are logged and returned as text.
    async fn dispose_quietly(
        &self,
        session: &Session,
        reason: &'static str,
    ) -> std::result::Result<(), String> {
        match AssertUnwindSafe(session.dispose()).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(
                    conversation_id = session.conversation_id(),
                    reason,
                    error = %e,
                    "Session disposal failed; continuing"
                );
                Err(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    conversation_id = session.conversation_id(),
                    reason,
                    panic = %message,
                    "Agent handle panicked during disposal; continuing"
                );
                Err(format!("agent handle panicked: {message}"))
            }
        }
    }

    pub(super) fn emit(&self, event: LifecycleEvent) {
        let _ = self.inner.events.send(event);
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.inner.config)
            .field("sessions", &self.count())
            .finish_non_exhaustive()
    }
}

fn output_sink(ctx: &OperationContext) -> OutputSink {
    let transport = ctx.transport.clone();
    let conversation_id = ctx.conversation_id.clone();
    Arc::new(move |text: String| {
        let event = TransportEvent::Output {
            conversation_id: conversation_id.clone(),
            text,
        };
        if let Err(e) = transport.post(event) {
            tracing::debug!(conversation_id = %conversation_id, error = %e, "Transport rejected output");
        }
    })
}

fn post(ctx: &OperationContext, event: TransportEvent) {
    if let Err(e) = ctx.transport.post(event) {
        tracing::debug!(conversation_id = %ctx.conversation_id, error = %e, "Transport rejected event");
    }
}
