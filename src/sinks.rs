//! Alert Sinks
//!
//! Destinations for risk alerts. The dispatcher drives each sink from its own
//! worker, so a slow or failing sink never stalls another.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::alert::Alert;
use crate::config::SinkConfig;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while delivering an alert
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook returned status {0}")]
    Status(u16),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),
}

/// A destination for risk alerts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> String;

    /// Deliver one alert
    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError>;
}

/// Writes alerts to the log at warn level
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> String {
        "log".to_string()
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        warn!(
            tx_hash = %alert.tx_hash,
            risk_type = alert.category.as_str(),
            risk_level = alert.severity.as_str(),
            from = %alert.from,
            value = %alert.value_native(),
            method = %alert.method,
            "RISK ALERT"
        );
        Ok(())
    }
}

/// Publishes alerts as JSON on a Redis pub/sub channel
pub struct RedisSink {
    connection: MultiplexedConnection,
    channel: String,
}

impl RedisSink {
    pub fn new(connection: MultiplexedConnection, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: channel.into(),
        }
    }

    /// Open a multiplexed connection and build the sink
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self, SinkError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(connection, channel))
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl AlertSink for RedisSink {
    fn name(&self) -> String {
        format!("redis:{}", self.channel)
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        let json = alert.to_message().to_json()?;
        // Clones share one underlying socket
        let mut connection = self.connection.clone();
        let _subscribers: i64 = connection.publish(&self.channel, &json).await?;
        Ok(())
    }
}

/// POSTs alerts as JSON to an HTTP endpoint
pub struct WebhookSink {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookSink {
    pub fn new(url: reqwest::Url) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> String {
        format!("webhook:{}", self.url.host_str().unwrap_or("unknown"))
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&alert.to_message())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Log sink always; Redis and webhook when configured
pub async fn build_sinks(config: &SinkConfig) -> Result<Vec<Arc<dyn AlertSink>>, SinkError> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];

    if let Some(url) = &config.redis_url {
        let sink = RedisSink::connect(url, config.redis_channel.clone()).await?;
        info!(channel = %sink.channel(), "Redis alert sink connected");
        sinks.push(Arc::new(sink));
    }

    if let Some(url) = &config.webhook_url {
        let parsed: reqwest::Url = url.parse().map_err(|_| SinkError::InvalidUrl(url.clone()))?;
        let sink = WebhookSink::new(parsed)?;
        info!(sink = %sink.name(), "Webhook alert sink configured");
        sinks.push(Arc::new(sink));
    }

    Ok(sinks)
}
