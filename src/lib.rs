//! Parley: session manager for conversational AI agents.
//!
//! Keeps one agent instance per conversation, runs each conversation's operations strictly in
//! order, bounds the number of live sessions with LRU eviction, and preserves session state
//! across a front-end transport reconnect.
//!
//! # Quick Start
//!
//! ```ignore
//! use parley::prelude::*;
//!
//! let manager = SessionManager::builder()
//!     .factory(Arc::new(MyAgentFactory::new()))
//!     .persistence(Arc::new(InMemoryPersistence::new()))
//!     .transport(Arc::new(NullTransport))
//!     .build()?;
//!
//! let outcome = manager.send_message("conv-1", SessionMode::Chat, "Hello!").await?;
//! println!("{}", outcome.reply);
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod persistence;
pub mod prelude;
pub mod session;
pub mod types;
