//! Process-wide control-plane configuration.
//!
//! Loaded once at startup (TOML file, then `DYNSEC_*` environment overrides) and
//! passed by value into connectors, executors and provisioners. Nothing reads
//! configuration from a global.
//!
//! ```toml
//! [broker]
//! host = "mosquitto"
//! port = 1883
//!
//! [admin]
//! username = "dynsec-admin"
//! password = "change-me"
//!
//! [timeouts]
//! subscribe_ms = 5000
//! response_ms = 10000
//! ```

use crate::error::{DynSecError, WaitStage};
use crate::timeout::TimeoutPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default request channel of the dynamic-security plugin.
pub const DEFAULT_REQUEST_TOPIC: &str = "$CONTROL/dynamic-security/v1";
/// Default response channel of the dynamic-security plugin.
pub const DEFAULT_RESPONSE_TOPIC: &str = "$CONTROL/dynamic-security/v1/response";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynSecConfig {
    /// Broker endpoint.
    pub broker: BrokerEndpoint,
    /// Administrative control-plane identity.
    pub admin: AdminCredentials,
    /// Control-plane channels.
    pub topics: ControlTopics,
    /// Bounded waits per session.
    pub timeouts: Timeouts,
    /// Unique-name generation.
    pub generation: Generation,
}

/// Where the broker lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerEndpoint {
    /// Hostname or IP.
    pub host: String,
    /// MQTT port.
    pub port: u16,
    /// MQTT keep-alive in seconds.
    pub keep_alive_secs: u64,
    /// Prefix for per-session client ids; a random suffix is appended.
    pub client_id_prefix: String,
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            keep_alive_secs: 60,
            client_id_prefix: "dynsec".into(),
        }
    }
}

/// Administrative identity allowed to publish on the control channel.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminCredentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request and response channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlTopics {
    /// Commands are published here.
    pub request: String,
    /// Responses arrive here.
    pub response: String,
}

impl Default for ControlTopics {
    fn default() -> Self {
        Self { request: DEFAULT_REQUEST_TOPIC.into(), response: DEFAULT_RESPONSE_TOPIC.into() }
    }
}

/// Session wait limits in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait for the subscribe ack before publishing.
    pub subscribe_ms: u64,
    /// Wait for the response after publishing.
    pub response_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { subscribe_ms: 5_000, response_ms: 10_000 }
    }
}

impl Timeouts {
    /// Policy bounding the subscribe-ack wait.
    pub fn subscribe_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::new(WaitStage::Subscribe, Duration::from_millis(self.subscribe_ms.max(1)))
    }

    /// Policy bounding the response wait.
    pub fn response_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::new(WaitStage::Response, Duration::from_millis(self.response_ms.max(1)))
    }
}

/// Lengths and attempt bounds for generated identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Generation {
    /// Attempts before `GenerationExhausted`.
    pub max_attempts: usize,
    /// Topic namespace length.
    pub namespace_len: usize,
    /// Broker username length.
    pub username_len: usize,
    /// Broker password length.
    pub password_len: usize,
}

impl Default for Generation {
    fn default() -> Self {
        Self { max_attempts: 1_000, namespace_len: 6, username_len: 20, password_len: 30 }
    }
}

impl DynSecConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self, DynSecError> {
        let cfg: Self = toml::from_str(raw).map_err(|e| DynSecError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a TOML file, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DynSecError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DynSecError::Config(format!("{}: {e}", path.display())))?;
        let mut cfg: Self = toml::from_str(&raw).map_err(|e| DynSecError::Config(e.to_string()))?;
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides only.
    pub fn from_env() -> Result<Self, DynSecError> {
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `DYNSEC_*` overrides from a lookup function.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DynSecError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DYNSEC_BROKER_HOST") {
            self.broker.host = v;
        }
        if let Some(v) = lookup("DYNSEC_BROKER_PORT") {
            self.broker.port = parse_env("DYNSEC_BROKER_PORT", &v)?;
        }
        if let Some(v) = lookup("DYNSEC_ADMIN_USER") {
            self.admin.username = v;
        }
        if let Some(v) = lookup("DYNSEC_ADMIN_PASSWORD") {
            self.admin.password = v;
        }
        if let Some(v) = lookup("DYNSEC_SUBSCRIBE_TIMEOUT_MS") {
            self.timeouts.subscribe_ms = parse_env("DYNSEC_SUBSCRIBE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("DYNSEC_RESPONSE_TIMEOUT_MS") {
            self.timeouts.response_ms = parse_env("DYNSEC_RESPONSE_TIMEOUT_MS", &v)?;
        }
        Ok(())
    }

    /// Reject values that would make sessions unusable.
    pub fn validate(&self) -> Result<(), DynSecError> {
        if self.broker.host.trim().is_empty() {
            return Err(DynSecError::Config("broker.host must not be empty".into()));
        }
        if self.admin.username.trim().is_empty() {
            return Err(DynSecError::Config("admin.username must not be empty".into()));
        }
        if self.topics.request.is_empty() || self.topics.response.is_empty() {
            return Err(DynSecError::Config("control topics must not be empty".into()));
        }
        if self.timeouts.subscribe_ms == 0 || self.timeouts.response_ms == 0 {
            return Err(DynSecError::Config("timeouts must be > 0".into()));
        }
        let g = &self.generation;
        if g.max_attempts == 0 {
            return Err(DynSecError::Config("generation.max_attempts must be > 0".into()));
        }
        if g.namespace_len == 0 || g.username_len == 0 || g.password_len == 0 {
            return Err(DynSecError::Config("generated lengths must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, DynSecError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| DynSecError::Config(format!("{key}: {e}")))
}
