//! Session mode.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What a session's agent is set up to do. Fixed for the lifetime of a session.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Chat,
    Build,
    Feedback,
}
