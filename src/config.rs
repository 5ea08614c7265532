use anyhow::{Context, bail};
use serde::Deserialize;
use std::time::Duration;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json` (or the path given
// as the first CLI argument).
//
// It defines:
// - The listeners to run (one per exchange stream)
// - Where normalized events go
// - Optional debug configuration
//
// NOTE:
// - API secrets are NOT stored here, only the names of the
//   environment variables holding them.
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listener definitions; each enabled entry runs independently
    pub listeners: Vec<ListenerConfig>,

    /// Event sink
    #[serde(default)]
    pub sink: SinkConfig,

    /// Period of the metrics summary log line (0 = off)
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

fn default_metrics_interval() -> u64 {
    60
}

impl Config {
    /// Rejects configurations that would run but could never work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.listeners.iter().any(|l| l.enabled) {
            bail!("no enabled listeners");
        }

        for listener in self.listeners.iter().filter(|l| l.enabled) {
            listener
                .validate()
                .with_context(|| format!("listener `{}`", listener.name))?;
        }

        if let SinkConfig::Redis { stream, .. } = &self.sink {
            if stream.is_empty() {
                bail!("redis sink needs a stream name");
            }
        }

        Ok(())
    }

    pub fn raw_logging(&self) -> bool {
        self.debug
            .as_ref()
            .and_then(|d| d.raw)
            .unwrap_or(false)
    }
}

// ------------------------------------------------------------
// Listener configuration
// ------------------------------------------------------------
//
// One WebSocket stream on one exchange.
//
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerConfig {
    /// Exchange identifier ("gateio", "mexc")
    pub name: String,

    /// Enables or disables this listener at runtime
    pub enabled: bool,

    pub subscription: SubscriptionConfig,

    /// Overrides the adapter's default WebSocket endpoint
    pub ws_url: Option<String>,

    /// Overrides the default REST base URL (session endpoints)
    pub rest_url: Option<String>,

    /// Required for exchanges that need a session token
    pub credentials: Option<CredentialsConfig>,

    #[serde(default)]
    pub timing: TimingConfig,
}

impl ListenerConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.subscription.channel.is_empty() {
            bail!("subscription channel is empty");
        }
        self.timing.validate()
    }
}

// ------------------------------------------------------------
// Subscription
// ------------------------------------------------------------
//
// Static channel + instrument pair. Instruments are written in
// internal form (BASE/QUOTE); adapters convert them.
//
// Private account channels (MEXC) are account-wide, so the
// instrument may be left empty.
//
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub channel: String,

    #[serde(default)]
    pub instrument: String,
}

// ------------------------------------------------------------
// Credentials
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

fn default_api_key_env() -> String {
    "ACCESS_KEY".to_string()
}

fn default_secret_key_env() -> String {
    "SECRET_KEY".to_string()
}

// ------------------------------------------------------------
// Timing
// ------------------------------------------------------------
//
// All connection-lifecycle intervals. Defaults:
//
// - transport ping every 20s
// - Gate.io app ping every 30s
// - listen key renewed every 30min (60min server expiry)
// - constant 5s reconnect delay
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub heartbeat_interval_secs: u64,

    pub app_ping_interval_secs: u64,

    /// Max silence before the session is declared dead (0 = never)
    pub pong_timeout_secs: u64,

    /// Server-side session token expiry
    pub token_ttl_secs: u64,

    pub renew_interval_secs: u64,

    pub request_timeout_secs: u64,

    pub connect_timeout_secs: u64,

    pub reconnect_delay_secs: u64,

    /// Upper bound for exponential growth; equal to the base delay
    /// means a constant delay
    pub reconnect_max_delay_secs: u64,

    pub reconnect_jitter: bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 20,
            app_ping_interval_secs: 30,
            pong_timeout_secs: 60,
            token_ttl_secs: 3600,
            renew_interval_secs: 1800,
            request_timeout_secs: 10,
            connect_timeout_secs: 10,
            reconnect_delay_secs: 5,
            reconnect_max_delay_secs: 5,
            reconnect_jitter: false,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let non_zero = [
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("app_ping_interval_secs", self.app_ping_interval_secs),
            ("renew_interval_secs", self.renew_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("reconnect_delay_secs", self.reconnect_delay_secs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                bail!("{} must be greater than zero", field);
            }
        }

        // Renewal must land before expiry even if the request hangs
        // for the full timeout.
        if self.renew_interval_secs + self.request_timeout_secs >= self.token_ttl_secs {
            bail!(
                "renew_interval_secs ({}) + request_timeout_secs ({}) must be below token_ttl_secs ({})",
                self.renew_interval_secs,
                self.request_timeout_secs,
                self.token_ttl_secs
            );
        }

        if self.reconnect_max_delay_secs < self.reconnect_delay_secs {
            bail!("reconnect_max_delay_secs must be >= reconnect_delay_secs");
        }

        if self.pong_timeout_secs != 0 && self.pong_timeout_secs <= self.heartbeat_interval_secs {
            bail!("pong_timeout_secs must exceed heartbeat_interval_secs");
        }

        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn app_ping_interval(&self) -> Duration {
        Duration::from_secs(self.app_ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Option<Duration> {
        (self.pong_timeout_secs > 0).then(|| Duration::from_secs(self.pong_timeout_secs))
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ------------------------------------------------------------
// Sink configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// One human-readable line per event on stdout
    #[default]
    Console,

    /// XADD into a redis stream
    Redis {
        url: String,

        stream: String,

        #[serde(default = "default_redis_maxlen")]
        maxlen: usize,
    },
}

fn default_redis_maxlen() -> usize {
    100_000
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Log every raw inbound frame at debug level
    pub raw: Option<bool>,
}
