//! Shared test helpers: scripted agent handles, a recording transport and a failing store.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use parley::prelude::*;

/// State shared by every agent a [`FakeFactory`] builds.
#[derive(Default)]
pub struct AgentLog {
    pub created: AtomicUsize,
    pub configs: Mutex<Vec<AgentSessionConfig>>,
    /// Credentials resolved through the auth provider, one per construction that had one.
    pub credentials: Mutex<Vec<String>>,
    /// Conversation ids, in disposal order.
    pub disposed: Mutex<Vec<String>>,
    /// `start:<conversation>:<text>` / `end:<conversation>:<text>` entries.
    pub events: Mutex<Vec<String>>,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl AgentLog {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> Vec<String> {
        self.disposed.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

/// Agent that echoes its prompt after an optional delay.
///
/// Prompt `"fail"` returns an error and prompt `"panic"` panics.
pub struct FakeAgent {
    conversation_id: String,
    history: Mutex<Vec<ChatMessage>>,
    delay: Duration,
    fail_dispose: bool,
    log: Arc<AgentLog>,
}

#[async_trait]
impl AgentHandle for FakeAgent {
    async fn run(&self, prompt: AgentPrompt, sink: OutputSink) -> parley::error::Result<AgentOutcome> {
        let tag = format!("{}:{}", self.conversation_id, prompt.text);
        self.log.events.lock().unwrap().push(format!("start:{tag}"));
        let running = self.log.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_running.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.log.running.fetch_sub(1, Ordering::SeqCst);
        self.log.events.lock().unwrap().push(format!("end:{tag}"));

        match prompt.text.as_str() {
            "fail" => return Err(ParleyError::agent(&self.conversation_id, "scripted failure")),
            "panic" => panic!("scripted panic"),
            _ => {}
        }

        let reply = format!("echo: {}", prompt.text);
        sink(reply.clone());

        let mut history = self.history.lock().unwrap();
        history.push(ChatMessage::user(&prompt.text));
        history.push(ChatMessage::assistant(&reply));
        Ok(AgentOutcome {
            reply,
            messages: history.clone(),
        })
    }

    async fn dispose(&self) -> parley::error::Result<()> {
        self.log
            .disposed
            .lock()
            .unwrap()
            .push(self.conversation_id.clone());
        if self.fail_dispose {
            return Err(ParleyError::agent(&self.conversation_id, "dispose failed"));
        }
        Ok(())
    }
}

/// Builds [`FakeAgent`]s and records what it was asked for.
#[derive(Default)]
pub struct FakeFactory {
    pub log: Arc<AgentLog>,
    delay: Duration,
    fail_create: Mutex<HashSet<String>>,
    fail_dispose: Mutex<HashSet<String>>,
    stall_create: Mutex<HashMap<String, Duration>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every agent run sleeps for `delay` before replying.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_create_for(&self, conversation_id: &str) {
        self.fail_create
            .lock()
            .unwrap()
            .insert(conversation_id.to_string());
    }

    /// Building the agent for `conversation_id` sleeps for `stall` first.
    pub fn stall_create_for(&self, conversation_id: &str, stall: Duration) {
        self.stall_create
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), stall);
    }

    pub fn fail_dispose_for(&self, conversation_id: &str) {
        self.fail_dispose
            .lock()
            .unwrap()
            .insert(conversation_id.to_string());
    }
}

#[async_trait]
impl AgentFactory for FakeFactory {
    async fn create(
        &self,
        _transport: TransportRef,
        config: &AgentSessionConfig,
        auth: Option<AuthProvider>,
    ) -> parley::error::Result<Box<dyn AgentHandle>> {
        if self.fail_create.lock().unwrap().contains(&config.conversation_id) {
            return Err(ParleyError::agent(
                &config.conversation_id,
                "factory refused",
            ));
        }
        let stall = self
            .stall_create
            .lock()
            .unwrap()
            .get(&config.conversation_id)
            .copied();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        if let Some(auth) = auth {
            let credential = auth().await?;
            self.log.credentials.lock().unwrap().push(credential);
        }
        self.log.created.fetch_add(1, Ordering::SeqCst);
        self.log.configs.lock().unwrap().push(config.clone());

        Ok(Box::new(FakeAgent {
            conversation_id: config.conversation_id.clone(),
            history: Mutex::new(config.history.clone()),
            delay: self.delay,
            fail_dispose: self
                .fail_dispose
                .lock()
                .unwrap()
                .contains(&config.conversation_id),
            log: self.log.clone(),
        }))
    }
}

/// Transport that keeps every event it is handed.
#[derive(Default)]
pub struct RecordingTransport {
    pub events: Mutex<Vec<TransportEvent>>,
}

impl RecordingTransport {
    pub fn events(&self) -> Vec<TransportEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn post(&self, event: TransportEvent) -> parley::error::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Persistence gateway whose every call fails.
#[derive(Default)]
pub struct FailingPersistence;

#[async_trait]
impl PersistenceGateway for FailingPersistence {
    async fn save_conversation(
        &self,
        conversation_id: &str,
        _messages: Vec<ChatMessage>,
    ) -> parley::error::Result<Conversation> {
        Err(ParleyError::persistence(conversation_id, "disk full"))
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> parley::error::Result<Option<Conversation>> {
        Err(ParleyError::persistence(conversation_id, "disk unreadable"))
    }

    async fn restore_conversation(
        &self,
        conversation_id: &str,
    ) -> parley::error::Result<Conversation> {
        Err(ParleyError::persistence(conversation_id, "disk unreadable"))
    }
}

pub fn config(max_active_sessions: usize, inactivity_timeout: Duration) -> SessionManagerConfig {
    SessionManagerConfig::builder()
        .max_active_sessions(max_active_sessions)
        .inactivity_timeout(inactivity_timeout)
        .build()
}

/// Manager over a fresh [`FakeFactory`], in-memory persistence and a recording transport.
pub struct Harness {
    pub manager: SessionManager,
    pub factory: Arc<FakeFactory>,
    pub persistence: Arc<InMemoryPersistence>,
    pub transport: Arc<RecordingTransport>,
}

impl Harness {
    pub fn new(config: SessionManagerConfig) -> Self {
        Self::with_factory(config, FakeFactory::new())
    }

    pub fn with_factory(config: SessionManagerConfig, factory: FakeFactory) -> Self {
        let factory = Arc::new(factory);
        let persistence = Arc::new(InMemoryPersistence::new());
        let transport = Arc::new(RecordingTransport::default());
        let manager = SessionManager::builder()
            .config(config)
            .factory(factory.clone())
            .persistence(persistence.clone())
            .transport(transport.clone())
            .build()
            .unwrap();
        Self {
            manager,
            factory,
            persistence,
            transport,
        }
    }

    pub fn log(&self) -> &AgentLog {
        &self.factory.log
    }
}

/// Drain every event currently buffered on a lifecycle receiver.
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
