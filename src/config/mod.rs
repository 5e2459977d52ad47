//! Configuration for the session manager (layered: code > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

/// Default upper bound on live sessions.
pub const DEFAULT_MAX_ACTIVE_SESSIONS: usize = 10;

/// Default idle time after which a session is swept.
pub const DEFAULT_INACTIVITY_TIMEOUT_MS: u64 = 300_000;

const ENV_MAX_ACTIVE_SESSIONS: &str = "PARLEY_MAX_ACTIVE_SESSIONS";
const ENV_INACTIVITY_TIMEOUT_MS: &str = "PARLEY_INACTIVITY_TIMEOUT_MS";

/// Resource limits governing the session manager.
///
/// ```
/// use std::time::Duration;
/// use parley::config::SessionManagerConfig;
///
/// let config = SessionManagerConfig::builder()
///     .max_active_sessions(4)
///     .inactivity_timeout(Duration::from_secs(60))
///     .build();
/// assert_eq!(config.max_active_sessions, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionManagerConfig {
    /// Upper bound on live sessions; reaching it triggers LRU eviction.
    #[builder(default = DEFAULT_MAX_ACTIVE_SESSIONS)]
    pub max_active_sessions: usize,
    /// Sessions idle for longer than this are disposed by the inactivity sweep.
    #[builder(default = Duration::from_millis(DEFAULT_INACTIVITY_TIMEOUT_MS))]
    #[serde(rename = "inactivity_timeout_ms", with = "duration_ms")]
    pub inactivity_timeout: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: DEFAULT_MAX_ACTIVE_SESSIONS,
            inactivity_timeout: Duration::from_millis(DEFAULT_INACTIVITY_TIMEOUT_MS),
        }
    }
}

impl SessionManagerConfig {
    /// Defaults overridden by `PARLEY_*` environment variables (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let config = Self::default().with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Resolve the full layered config: file (when it exists) then environment.
    ///
    /// With `path == None` the platform default from [`default_path`](Self::default_path) is
    /// tried.
    pub fn load_layered(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let base = match path {
            Some(ref p) if p.exists() => Self::load(p)?,
            _ => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Platform config location, e.g. `~/.config/parley/sessions.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "parley")
            .map(|dirs| dirs.config_dir().join("sessions.toml"))
    }

    /// Reject limits that would make the manager unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_active_sessions == 0 {
            return Err(ParleyError::Configuration(
                "max_active_sessions must be at least 1".into(),
            ));
        }
        if self.inactivity_timeout.is_zero() {
            return Err(ParleyError::Configuration(
                "inactivity_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_MAX_ACTIVE_SESSIONS) {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.max_active_sessions = value,
                Err(e) => tracing::warn!(
                    var = ENV_MAX_ACTIVE_SESSIONS,
                    value = %raw,
                    error = %e,
                    "Ignoring unparsable environment override"
                ),
            }
        }
        if let Ok(raw) = std::env::var(ENV_INACTIVITY_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.inactivity_timeout = Duration::from_millis(ms),
                Err(e) => tracing::warn!(
                    var = ENV_INACTIVITY_TIMEOUT_MS,
                    value = %raw,
                    error = %e,
                    "Ignoring unparsable environment override"
                ),
            }
        }
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
