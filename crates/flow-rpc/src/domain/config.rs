//! Client configuration with validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

/// Default channel path appended to the origin.
pub const DEFAULT_PATH: &str = "/rpc";

/// Default seconds before a pending request is failed.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default period of the timeout sweeper.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;

/// Minimum number of sweeper ticks inside one timeout window.
pub const SWEEPS_PER_TIMEOUT: u32 = 4;

/// Client configuration.
///
/// `origin` has no default: the endpoint must always be named explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Channel path, appended to `origin`. Empty disables `connect()`.
    pub path: String,
    /// Client-assigned identifier used in logs and lifecycle events.
    pub id: String,
    /// Seconds before a pending request is failed with a timeout.
    #[serde(rename = "timeout")]
    pub timeout_secs: u64,
    /// Base address of the transport endpoint.
    pub origin: String,
    /// Transport-specific connection arguments, passed through untouched.
    pub args: Value,
    /// Inbound message tracing.
    pub trace: TraceLevel,
    /// Period of the timeout sweeper in milliseconds.
    pub sweep_interval_ms: u64,
    /// Lifecycle broadcast capacity.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PATH.to_string(),
            id: uuid::Uuid::new_v4().simple().to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            origin: String::new(),
            args: Value::Object(Default::default()),
            trace: TraceLevel::Off,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            event_capacity: flow_events::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Configuration for `origin` with every other field defaulted.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FLOW_RPC_ORIGIN`: Endpoint origin (required by `validate`)
    /// - `FLOW_RPC_PATH`: Channel path (default: /rpc)
    /// - `FLOW_RPC_ID`: Client id (default: random)
    /// - `FLOW_RPC_TIMEOUT`: Timeout in seconds (default: 30)
    /// - `FLOW_RPC_TRACE`: 0, 1 or 2 (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            origin: env::var("FLOW_RPC_ORIGIN").unwrap_or_default(),
            path: env::var("FLOW_RPC_PATH").unwrap_or(defaults.path),
            id: env::var("FLOW_RPC_ID").unwrap_or(defaults.id),
            timeout_secs: env::var("FLOW_RPC_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            trace: env::var("FLOW_RPC_TRACE")
                .ok()
                .and_then(|v| v.parse::<u8>().ok())
                .and_then(|v| TraceLevel::try_from(v).ok())
                .unwrap_or(defaults.trace),
            ..defaults
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origin.is_empty() {
            return Err(ConfigError::MissingOrigin);
        }

        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "timeout cannot be 0".into(),
            ));
        }

        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval_ms cannot be 0".into(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity cannot be 0".into()));
        }

        Ok(())
    }

    /// Full endpoint handed to the transport.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.origin, self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Effective sweeper period.
    ///
    /// Capped at a quarter of the timeout so an unanswered request fails
    /// within `timeout + timeout / 4` even with short timeouts.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms).min(self.timeout() / SWEEPS_PER_TIMEOUT)
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: TraceLevel) -> Self {
        self.trace = trace;
        self
    }
}

/// How much of each inbound message is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TraceLevel {
    /// Nothing
    #[default]
    Off,
    /// Subject only
    Subjects,
    /// Subject and data
    Full,
}

impl TryFrom<u8> for TraceLevel {
    type Error = ConfigError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Off),
            1 => Ok(Self::Subjects),
            2 => Ok(Self::Full),
            other => Err(ConfigError::InvalidTrace(other)),
        }
    }
}

impl From<TraceLevel> for u8 {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => 0,
            TraceLevel::Subjects => 1,
            TraceLevel::Full => 2,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No origin configured
    #[error("origin is required")]
    MissingOrigin,
    /// Path does not start with '/'
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Trace level outside 0..=2
    #[error("invalid trace level: {0}")]
    InvalidTrace(u8),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
