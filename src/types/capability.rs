//! Capability descriptors and preserved session snapshots.

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::SessionMode;

/// A named, described set of tools a session exposes for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct Capability {
    #[builder(into)]
    pub name: String,
    #[builder(into, default)]
    pub description: String,
    #[builder(default)]
    pub tools: Vec<String>,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tools: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }
}

/// Detached snapshot of a session, enough to rebuild an equivalent one later.
///
/// Holds no reference to the live session; serializable so a host can stash it across a
/// transport teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreservedState {
    pub conversation_id: String,
    pub mode: SessionMode,
    pub message_count: usize,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}
