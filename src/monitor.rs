//! Connection Manager
//!
//! Owns the pending-transaction subscription. Each notified hash is resolved through
//! the ledger, decoded, classified, and flagged verdicts are handed to the alert
//! dispatcher without waiting on delivery.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Streaming
//!      ^              |             |             |
//!      +--------------+-------------+-------------+   (error, after backoff)
//!
//! any state -> Stopped   (cancellation)
//! ```

use alloy::primitives::TxHash;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alert::Alert;
use crate::classifier::{classify, RiskVerdict};
use crate::config::{ConfigError, ConnectionConfig, ThresholdConfig};
use crate::decoder::{decode, decode_transaction, PendingTransaction};
use crate::dispatcher::AlertHandle;
use crate::ledger::{LedgerClient, LedgerError, StreamConnection, TxLookup};
use crate::protocol::{parse_ack, parse_notification, subscribe_request, unsubscribe_request, Inbound, SubscriptionId};
use crate::sinks::SinkError;

/// Top-level errors: the only ones that leave the process
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Subscription lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Acknowledged, no notification yet
    Subscribed,
    Streaming,
    /// Terminal, after cancellation
    Stopped,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline counters
#[derive(Debug, Default)]
pub struct MonitorStats {
    notifications: AtomicU64,
    resolved: AtomicU64,
    not_found: AtomicU64,
    lookup_failures: AtomicU64,
    decode_failures: AtomicU64,
    malformed: AtomicU64,
    flagged: AtomicU64,
    reconnects: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Pending-transaction notifications received
    pub notifications: u64,
    /// Transactions decoded and classified
    pub resolved: u64,
    pub not_found: u64,
    pub lookup_failures: u64,
    pub decode_failures: u64,
    pub malformed: u64,
    pub flagged: u64,
    pub reconnects: u64,
}

impl MonitorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            flagged: self.flagged.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Health/status query handle; cheap to clone and usable after the monitor stops
#[derive(Debug, Clone)]
pub struct StatusHandle {
    state: watch::Receiver<ConnectionState>,
    stats: Arc<MonitorStats>,
}

impl StatusHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait until the monitor reaches `target`. Returns false if the monitor is
    /// gone without ever reaching it.
    pub async fn wait_for_state(&mut self, target: ConnectionState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Wait for the next state change
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }
}

/// The subscription loop
pub struct Monitor<L> {
    ledger: L,
    thresholds: Arc<ThresholdConfig>,
    connection: ConnectionConfig,
    alerts: AlertHandle,
    state: watch::Sender<ConnectionState>,
    stats: Arc<MonitorStats>,
    next_request_id: u64,
    /// Consecutive failed sessions; reset once a subscription is acknowledged
    failures: u32,
}

impl<L: LedgerClient> Monitor<L> {
    pub fn new(ledger: L, thresholds: Arc<ThresholdConfig>, connection: ConnectionConfig, alerts: AlertHandle) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            ledger,
            thresholds,
            connection,
            alerts,
            state,
            stats: Arc::new(MonitorStats::default()),
            next_request_id: 1,
            failures: 0,
        }
    }

    pub fn status(&self) -> StatusHandle {
        StatusHandle {
            state: self.state.subscribe(),
            stats: self.stats.clone(),
        }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Run until `cancel` fires. Transport failures are retried forever with backoff;
    /// on cancellation the active subscription is torn down before returning.
    pub async fn run(mut self, cancel: CancellationToken) -> StatsSnapshot {
        info!(
            router = %self.thresholds.router,
            signatures = self.thresholds.signatures.len(),
            "Starting mempool monitor"
        );

        while !cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting);

            match self.session(&cancel).await {
                Ok(()) => break,
                Err(e) => {
                    error!(error = %e, "Subscription lost");
                    self.set_state(ConnectionState::Disconnected);
                    MonitorStats::incr(&self.stats.reconnects);

                    let delay = self.connection.backoff_delay(self.failures);
                    self.failures = self.failures.saturating_add(1);
                    info!(delay_ms = delay.as_millis() as u64, attempt = self.failures, "Reconnecting after backoff");

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ConnectionState::Stopped);
        let stats = self.stats.snapshot();
        info!(
            notifications = stats.notifications,
            resolved = stats.resolved,
            flagged = stats.flagged,
            "Mempool monitor stopped"
        );
        stats
    }

    /// One connection lifetime. `Ok` means cancelled and torn down; `Err` means retry.
    async fn session(&mut self, cancel: &CancellationToken) -> Result<(), LedgerError> {
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            connected = self.ledger.connect() => Some(connected),
        };
        let Some(connected) = connected else {
            return Ok(());
        };
        let mut stream = connected?;

        let request_id = self.take_request_id();
        let handshake = tokio::time::timeout(
            self.connection.connect_timeout(),
            handshake(stream.as_mut(), request_id),
        );
        let acked = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            acked = handshake => Some(acked),
        };

        let subscription = match acked {
            None => {
                close_quietly(stream.as_mut()).await;
                return Ok(());
            }
            Some(Err(_elapsed)) => {
                close_quietly(stream.as_mut()).await;
                return Err(LedgerError::Timeout(self.connection.connect_timeout_ms));
            }
            Some(Ok(Err(e))) => {
                close_quietly(stream.as_mut()).await;
                return Err(e);
            }
            Some(Ok(Ok(subscription))) => subscription,
        };

        self.failures = 0;
        self.set_state(ConnectionState::Subscribed);
        info!(subscription = %subscription, "Subscribed to pending transactions");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = stream.next_text() => Some(next),
            };
            let text = match next {
                None => {
                    self.teardown(stream.as_mut(), &subscription).await;
                    return Ok(());
                }
                Some(Some(Ok(text))) => text,
                Some(Some(Err(e))) => {
                    close_quietly(stream.as_mut()).await;
                    return Err(e);
                }
                Some(None) => return Err(LedgerError::Closed),
            };

            let hash = match parse_notification(&text, &subscription) {
                Ok(Inbound::PendingTransaction(hash)) => hash,
                Ok(Inbound::Ignored) => {
                    debug!("Ignoring non-notification message");
                    continue;
                }
                Err(e) => {
                    MonitorStats::incr(&self.stats.malformed);
                    warn!(error = %e, "Skipping malformed notification");
                    continue;
                }
            };

            MonitorStats::incr(&self.stats.notifications);
            if *self.state.borrow() == ConnectionState::Subscribed {
                self.set_state(ConnectionState::Streaming);
            }

            let resolved = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = self.resolve(hash) => true,
            };
            if !resolved {
                self.teardown(stream.as_mut(), &subscription).await;
                return Ok(());
            }
        }
    }

    /// Lookup, decode and classify one notified hash. Failures stay here.
    async fn resolve(&self, hash: TxHash) {
        let raw = match self.ledger.fetch_transaction(hash).await {
            Ok(TxLookup::Found(raw)) => raw,
            Ok(TxLookup::NotFound) => {
                MonitorStats::incr(&self.stats.not_found);
                debug!(tx_hash = %hash, "Transaction not found, likely mined or dropped");
                return;
            }
            Err(e) => {
                MonitorStats::incr(&self.stats.lookup_failures);
                warn!(tx_hash = %hash, error = %e, "Transaction lookup failed");
                return;
            }
        };

        match decode_transaction(&raw) {
            Ok(tx) => {
                self.process_transaction(&tx);
            }
            Err(e) => {
                MonitorStats::incr(&self.stats.decode_failures);
                warn!(tx_hash = %hash, reason = %e, "Dropping undecodable transaction");
            }
        }
    }

    /// Decode, classify and, if flagged, queue an alert. Never waits on delivery.
    pub fn process_transaction(&self, tx: &PendingTransaction) -> RiskVerdict {
        let decoded = decode(&tx.input, &self.thresholds.signatures);
        let verdict = classify(tx, &decoded, &self.thresholds);
        MonitorStats::incr(&self.stats.resolved);

        if let Some(alert) = Alert::from_verdict(tx, &decoded, &verdict) {
            MonitorStats::incr(&self.stats.flagged);
            info!(
                tx_hash = %verdict.tx_hash,
                category = verdict.category.as_str(),
                severity = verdict.severity.as_str(),
                method = decoded.method_name(),
                "Transaction flagged"
            );
            self.alerts.submit(alert);
        } else {
            debug!(tx_hash = %verdict.tx_hash, method = decoded.method_name(), "Transaction clear");
        }

        verdict
    }

    /// Explicitly end the subscription so the remote frees the slot
    async fn teardown(&mut self, stream: &mut dyn StreamConnection, subscription: &SubscriptionId) {
        let request = unsubscribe_request(self.take_request_id(), subscription);
        let unsubscribe = async {
            stream.send_text(request).await?;
            stream.close().await
        };

        match tokio::time::timeout(self.connection.connect_timeout(), unsubscribe).await {
            Ok(Ok(())) => info!(subscription = %subscription, "Unsubscribed and closed connection"),
            Ok(Err(e)) => warn!(error = %e, "Unsubscribe failed"),
            Err(_) => warn!("Unsubscribe timed out"),
        }
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
        }
    }
}

/// Send the subscribe request and validate the first reply as its acknowledgement
async fn handshake(stream: &mut dyn StreamConnection, request_id: u64) -> Result<SubscriptionId, LedgerError> {
    stream.send_text(subscribe_request(request_id)).await?;
    match stream.next_text().await {
        Some(Ok(text)) => Ok(parse_ack(&text, request_id)?),
        Some(Err(e)) => Err(e),
        None => Err(LedgerError::Closed),
    }
}

async fn close_quietly(stream: &mut dyn StreamConnection) {
    if let Err(e) = stream.close().await {
        debug!(error = %e, "Error closing connection");
    }
}
