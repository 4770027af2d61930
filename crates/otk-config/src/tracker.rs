//! Typed view of the tracker configuration.
//!
//! ```yaml
//! api:
//!   rest_base_url: "https://api.example.com"
//!   push_base_url: "wss://ws.example.com"
//!   credential_env: "OTK_API_TOKEN"   # env var NAME, never the token
//! timing:
//!   safety_delay_ms: 5000
//!   poll_period_ms: 5000
//!   backoff_base_ms: 2000
//!   max_push_failures: 3
//!   connect_timeout_ms: 10000
//!   queue_capacity: 256
//! daemon:
//!   bind_addr: "127.0.0.1:8899"
//!   heartbeat_ms: 1000
//! ```

use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_CREDENTIAL_ENV: &str = "OTK_API_TOKEN";

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base of the pull endpoint; the order lives at `{rest_base_url}/orders/{id}`.
    pub rest_base_url: String,
    /// Base of the event stream; the order stream is `{push_base_url}/orders/{id}`.
    pub push_base_url: String,
    /// Name of the environment variable holding the bearer credential.
    pub credential_env: String,
}

// ---------------------------------------------------------------------------
// TimingConfig
// ---------------------------------------------------------------------------

/// Session-scoped timers. All of them are torn down together on dispose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Delay after session start before the safety timer starts polling.
    pub safety_delay: Duration,
    /// Period of the recurring full-state poll.
    pub poll_period: Duration,
    /// Reconnect delay for attempt `n` is `backoff_base * n`.
    pub backoff_base: Duration,
    /// Consecutive push failures after which the listener gives up.
    pub max_push_failures: u32,
    /// Upper bound on establishing one push connection.
    pub connect_timeout: Duration,
    /// Capacity of the session's merge queue.
    pub queue_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            safety_delay: Duration::from_millis(5_000),
            poll_period: Duration::from_millis(5_000),
            backoff_base: Duration::from_millis(2_000),
            max_push_failures: 3,
            connect_timeout: Duration::from_millis(10_000),
            queue_capacity: 256,
        }
    }
}

impl TimingConfig {
    /// Delay before reconnect attempt following the `failures`-th
    /// consecutive failure (1-based). Grows linearly.
    pub fn reconnect_delay(&self, failures: u32) -> Duration {
        self.backoff_base.saturating_mul(failures.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.poll_period.is_zero() {
            bail!("CONFIG_INVALID /timing/poll_period_ms must be > 0");
        }
        if self.max_push_failures == 0 {
            bail!("CONFIG_INVALID /timing/max_push_failures must be >= 1");
        }
        if self.connect_timeout.is_zero() {
            bail!("CONFIG_INVALID /timing/connect_timeout_ms must be > 0");
        }
        if self.queue_capacity == 0 {
            bail!("CONFIG_INVALID /timing/queue_capacity must be >= 1");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub api: ApiConfig,
    pub timing: TimingConfig,
}

impl TrackerConfig {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let Some(rest_base_url) = read_str_at(config, "/api/rest_base_url") else {
            bail!("CONFIG_MISSING /api/rest_base_url");
        };
        let Some(push_base_url) = read_str_at(config, "/api/push_base_url") else {
            bail!("CONFIG_MISSING /api/push_base_url");
        };
        let credential_env = read_str_at(config, "/api/credential_env")
            .unwrap_or_else(|| DEFAULT_CREDENTIAL_ENV.to_string());

        let d = TimingConfig::default();
        let timing = TimingConfig {
            safety_delay: read_ms_at(config, "/timing/safety_delay_ms")?.unwrap_or(d.safety_delay),
            poll_period: read_ms_at(config, "/timing/poll_period_ms")?.unwrap_or(d.poll_period),
            backoff_base: read_ms_at(config, "/timing/backoff_base_ms")?.unwrap_or(d.backoff_base),
            max_push_failures: match read_u64_at(config, "/timing/max_push_failures")? {
                Some(n) => u32::try_from(n)
                    .map_err(|_| anyhow::anyhow!("CONFIG_INVALID /timing/max_push_failures"))?,
                None => d.max_push_failures,
            },
            connect_timeout: read_ms_at(config, "/timing/connect_timeout_ms")?
                .unwrap_or(d.connect_timeout),
            queue_capacity: match read_u64_at(config, "/timing/queue_capacity")? {
                Some(n) => usize::try_from(n)
                    .map_err(|_| anyhow::anyhow!("CONFIG_INVALID /timing/queue_capacity"))?,
                None => d.queue_capacity,
            },
        };
        timing.validate()?;

        Ok(Self {
            api: ApiConfig {
                rest_base_url,
                push_base_url,
                credential_env,
            },
            timing,
        })
    }
}

// ---------------------------------------------------------------------------
// DaemonConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// `None` leaves the choice to the daemon (env var, then its default).
    pub bind_addr: Option<String>,
    pub heartbeat: Duration,
}

impl DaemonConfig {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        Ok(Self {
            bind_addr: read_str_at(config, "/daemon/bind_addr"),
            heartbeat: read_ms_at(config, "/daemon/heartbeat_ms")?
                .unwrap_or(Duration::from_secs(1)),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Non-blank string at `pointer`, trimmed.
pub(crate) fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_u64_at(config: &Value, pointer: &str) -> Result<Option<u64>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(Some(n)),
            None => bail!("CONFIG_INVALID {pointer} must be a non-negative integer, got {v}"),
        },
    }
}

fn read_ms_at(config: &Value, pointer: &str) -> Result<Option<Duration>> {
    Ok(read_u64_at(config, pointer)?.map(Duration::from_millis))
}
