//! Monitor Configuration
//!
//! Loaded once at startup from environment variables (and a `.env` file when present).
//! Everything here is read-only once the monitor starts consuming the stream.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, U256};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::signatures::SignatureTable;

/// Default delay before reconnecting after a stream failure
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Default connect/handshake timeout
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10000;

/// Default per-transaction lookup timeout
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 3000;

/// Default per-sink alert queue capacity
pub const DEFAULT_ALERT_QUEUE_CAPACITY: usize = 256;

/// Largest accepted per-sink alert queue capacity
pub const MAX_ALERT_QUEUE_CAPACITY: usize = 65536;

/// Default time allowed for sinks to drain on shutdown
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 2000;

/// Default large-value threshold, in native units
pub const DEFAULT_LARGE_VALUE_THRESHOLD: &str = "10";

/// Default liquidity-removal minimum, in native units
pub const DEFAULT_LIQUIDITY_REMOVAL_MIN: &str = "1";

/// Default Redis channel for alerts
pub const DEFAULT_REDIS_CHANNEL: &str = "risk_alerts";

/// Environment variables holding lookup RPC endpoints, in failover order
pub const RPC_URL_VARS: &[&str] = &[
    "BSC_MAINNET_RPC_1",
    "BSC_MAINNET_RPC_2",
    "BSC_MAINNET_RPC_3",
    "BSC_MAINNET_RPC_4",
    "QUICKNODE_BSC_RPC",
    "ALCHEMY_BSC_RPC",
    "INFURA_BSC_RPC",
];

/// Template values left in a copied `.env`; treated as unset
const PLACEHOLDER_RPC_URLS: &[&str] = &[
    "your-quicknode-bsc-endpoint",
    "your-alchemy-bsc-endpoint",
    "your-infura-bsc-endpoint",
];

/// Errors that make the monitor refuse to start
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid router address: {0}")]
    InvalidRouter(String),

    #[error("Signature table is empty")]
    EmptySignatureTable,

    #[error("Invalid method selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid signature table: {0}")]
    SignatureTable(String),

    #[error("Invalid amount for {name}: {value}")]
    InvalidAmount { name: &'static str, value: String },

    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Parse a native-currency amount ("10", "1.5") into wei
pub fn parse_native_amount(name: &'static str, value: &str) -> Result<U256, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(ConfigError::InvalidAmount {
            name,
            value: value.to_string(),
        });
    }
    parse_ether(trimmed).map_err(|_| ConfigError::InvalidAmount {
        name,
        value: value.to_string(),
    })
}

/// Classification thresholds and the watched router
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Router address being watched
    pub router: Address,
    /// Selector table used by the decoder
    pub signatures: SignatureTable,
    /// Values strictly above this (in wei) are large transactions
    pub large_value_threshold: U256,
    /// Liquidity removals strictly above this (in wei) are flagged
    pub liquidity_removal_min: U256,
}

impl ThresholdConfig {
    /// Build a validated threshold config
    pub fn new(
        router: Address,
        signatures: SignatureTable,
        large_value_threshold: U256,
        liquidity_removal_min: U256,
    ) -> Result<Self, ConfigError> {
        if router == Address::ZERO {
            return Err(ConfigError::InvalidRouter(format!("{:#x}", router)));
        }
        if signatures.is_empty() {
            return Err(ConfigError::EmptySignatureTable);
        }
        Ok(Self {
            router,
            signatures,
            large_value_threshold,
            liquidity_removal_min,
        })
    }

    /// Build from string settings, thresholds in native units
    pub fn from_settings(
        router: &str,
        signatures: SignatureTable,
        large_value_threshold: &str,
        liquidity_removal_min: &str,
    ) -> Result<Self, ConfigError> {
        let router = parse_router(router)?;
        let large = parse_native_amount("LARGE_VALUE_THRESHOLD", large_value_threshold)?;
        let removal = parse_native_amount("LIQUIDITY_REMOVAL_MIN", liquidity_removal_min)?;
        Self::new(router, signatures, large, removal)
    }
}

fn parse_router(router: &str) -> Result<Address, ConfigError> {
    let trimmed = router.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing("PANCAKE_ROUTER_V2"));
    }
    Address::from_str(trimmed).map_err(|_| ConfigError::InvalidRouter(trimmed.to_string()))
}

/// Streaming endpoint, lookup endpoints and reconnection policy
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Websocket URL for the pending-transaction subscription
    pub ws_url: String,
    /// JSON-RPC URLs for transaction lookups, in failover order
    pub rpc_urls: Vec<String>,
    /// Delay before the first reconnection attempt in milliseconds
    pub reconnect_delay_ms: u64,
    /// Maximum reconnection delay in milliseconds (equal to the base delay for constant backoff)
    pub max_reconnect_delay_ms: u64,
    /// Connect and subscription handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-transaction lookup timeout in milliseconds
    pub lookup_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            rpc_urls: Vec::new(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    /// Create a config for the given endpoints with default timings
    pub fn new(ws_url: impl Into<String>, rpc_urls: Vec<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            rpc_urls,
            ..Default::default()
        }
    }

    /// Calculate backoff delay after `attempt` consecutive failures.
    /// Doubles from the base delay and caps at the maximum; retries never stop.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .reconnect_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(10)));
        Duration::from_millis(delay_ms.min(self.max_reconnect_delay_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ws_url.trim().is_empty() {
            return Err(ConfigError::Missing("BSC_WEBSOCKET_URL"));
        }
        if self.rpc_urls.is_empty() {
            return Err(ConfigError::Missing("BSC_MAINNET_RPC_1"));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid("RECONNECT_DELAY_MS must be positive".to_string()));
        }
        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(ConfigError::Invalid(
                "RECONNECT_MAX_DELAY_MS must not be below RECONNECT_DELAY_MS".to_string(),
            ));
        }
        Ok(())
    }
}

/// Alert queue settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Capacity of each sink's queue; the oldest alert is dropped when full.
    /// Rounded up to the next power of two by the underlying broadcast channel.
    pub queue_capacity: usize,
    /// Time allowed for sinks to drain on shutdown in milliseconds
    pub flush_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_ALERT_QUEUE_CAPACITY,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
        }
    }
}

impl DispatchConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Optional alert sinks
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub redis_url: Option<String>,
    pub redis_channel: String,
    pub webhook_url: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_channel: DEFAULT_REDIS_CHANNEL.to_string(),
            webhook_url: None,
        }
    }
}

/// Full monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub thresholds: ThresholdConfig,
    pub connection: ConnectionConfig,
    pub dispatch: DispatchConfig,
    pub sinks: SinkConfig,
}

impl MonitorConfig {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let signatures = match get("SIGNATURE_TABLE_PATH") {
            Some(path) => SignatureTable::from_file(&path)?,
            None => SignatureTable::pancake_v2(),
        };

        let router = get("PANCAKE_ROUTER_V2").ok_or(ConfigError::Missing("PANCAKE_ROUTER_V2"))?;
        let thresholds = ThresholdConfig::from_settings(
            &router,
            signatures,
            &get("LARGE_VALUE_THRESHOLD").unwrap_or_else(|| DEFAULT_LARGE_VALUE_THRESHOLD.to_string()),
            &get("LIQUIDITY_REMOVAL_MIN").unwrap_or_else(|| DEFAULT_LIQUIDITY_REMOVAL_MIN.to_string()),
        )?;

        let reconnect_delay_ms = parse_number(&get, "RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS)?;
        let connection = ConnectionConfig {
            ws_url: get("BSC_WEBSOCKET_URL").ok_or(ConfigError::Missing("BSC_WEBSOCKET_URL"))?,
            rpc_urls: RPC_URL_VARS
                .iter()
                .filter_map(|var| get(*var))
                .filter(|url| !PLACEHOLDER_RPC_URLS.contains(&url.as_str()))
                .collect(),
            reconnect_delay_ms,
            max_reconnect_delay_ms: parse_number(&get, "RECONNECT_MAX_DELAY_MS", reconnect_delay_ms)?,
            connect_timeout_ms: parse_number(&get, "CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)?,
            lookup_timeout_ms: parse_number(&get, "LOOKUP_TIMEOUT_MS", DEFAULT_LOOKUP_TIMEOUT_MS)?,
        };
        connection.validate()?;

        let dispatch = DispatchConfig {
            queue_capacity: parse_number(&get, "ALERT_QUEUE_CAPACITY", DEFAULT_ALERT_QUEUE_CAPACITY)?,
            flush_timeout_ms: parse_number(&get, "ALERT_FLUSH_TIMEOUT_MS", DEFAULT_FLUSH_TIMEOUT_MS)?,
        };
        if dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid("ALERT_QUEUE_CAPACITY must be positive".to_string()));
        }
        if dispatch.queue_capacity > MAX_ALERT_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "ALERT_QUEUE_CAPACITY must not exceed {}",
                MAX_ALERT_QUEUE_CAPACITY
            )));
        }

        let sinks = SinkConfig {
            redis_url: get("REDIS_URL"),
            redis_channel: get("REDIS_CHANNEL").unwrap_or_else(|| DEFAULT_REDIS_CHANNEL.to_string()),
            webhook_url: get("ALERT_WEBHOOK_URL"),
        };

        Ok(Self {
            thresholds,
            connection,
            dispatch,
            sinks,
        })
    }
}

fn parse_number<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        None => Ok(default),
    }
}
