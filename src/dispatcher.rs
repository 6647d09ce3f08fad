//! Alert Dispatcher
//!
//! Fans alerts out to every configured sink. Each sink reads from its own bounded
//! queue in its own task; when a sink falls behind, its oldest pending alerts are
//! overwritten and a warning records how many were lost. Submitting never blocks
//! the monitor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alert::Alert;
use crate::config::{DispatchConfig, MAX_ALERT_QUEUE_CAPACITY};
use crate::sinks::AlertSink;

/// Delivery counters shared by all sink workers
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of `DispatchStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Alerts overwritten in a full sink queue, summed over sinks
    pub dropped: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable submit side of the dispatcher
#[derive(Clone)]
pub struct AlertHandle {
    sender: broadcast::Sender<Alert>,
    stats: Arc<DispatchStats>,
}

impl AlertHandle {
    /// Queue an alert for every sink. Never blocks; returns false if no sink is running.
    pub fn submit(&self, alert: Alert) -> bool {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(alert) {
            Ok(_) => true,
            Err(_) => {
                debug!("No alert sinks running, alert discarded");
                false
            }
        }
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }
}

/// Owns the sink workers
pub struct AlertDispatcher {
    handle: AlertHandle,
    workers: Vec<JoinHandle<()>>,
    flush_timeout: std::time::Duration,
}

impl AlertDispatcher {
    /// Start one worker per sink
    pub fn spawn(sinks: Vec<Arc<dyn AlertSink>>, config: &DispatchConfig) -> Self {
        // Rounded up to a power of two by the channel
        let capacity = config.queue_capacity.clamp(1, MAX_ALERT_QUEUE_CAPACITY);
        let (sender, _) = broadcast::channel(capacity);
        let stats = Arc::new(DispatchStats::default());

        let workers = sinks
            .into_iter()
            .map(|sink| {
                // Subscribe before spawning so no alert submitted after `spawn` is missed
                let receiver = sender.subscribe();
                tokio::spawn(run_sink(sink, receiver, stats.clone()))
            })
            .collect::<Vec<_>>();

        info!(sinks = workers.len(), capacity, "Alert dispatcher started");

        Self {
            handle: AlertHandle { sender, stats },
            workers,
            flush_timeout: config.flush_timeout(),
        }
    }

    pub fn handle(&self) -> AlertHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.handle.stats()
    }

    /// Close the queues and give sinks until the flush timeout to drain.
    /// Workers still running after that are aborted. Every other `AlertHandle`
    /// must already be dropped for the queues to close.
    pub async fn shutdown(self) -> DispatchSnapshot {
        let AlertDispatcher {
            handle,
            mut workers,
            flush_timeout,
        } = self;
        let stats = handle.stats.clone();
        drop(handle);

        let drain = async {
            for worker in workers.iter_mut() {
                let _ = worker.await;
            }
        };

        if tokio::time::timeout(flush_timeout, drain).await.is_err() {
            warn!(timeout_ms = flush_timeout.as_millis() as u64, "Alert sinks did not drain in time, aborting");
            for worker in &workers {
                worker.abort();
            }
        }

        let snapshot = stats.snapshot();
        info!(
            delivered = snapshot.delivered,
            failed = snapshot.failed,
            dropped = snapshot.dropped,
            "Alert dispatcher stopped"
        );
        snapshot
    }
}

async fn run_sink(sink: Arc<dyn AlertSink>, mut receiver: broadcast::Receiver<Alert>, stats: Arc<DispatchStats>) {
    let name = sink.name();
    loop {
        match receiver.recv().await {
            Ok(alert) => match sink.deliver(&alert).await {
                Ok(()) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(sink = %name, tx_hash = %alert.tx_hash, error = %e, "Alert delivery failed");
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                stats.dropped.fetch_add(skipped, Ordering::Relaxed);
                warn!(sink = %name, dropped = skipped, "Alert queue full, dropped oldest alerts");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!(sink = %name, "Alert sink worker exiting");
}
