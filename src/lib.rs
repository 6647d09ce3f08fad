//! RiskWatch Mempool Monitor Library
//!
//! This crate watches pending transactions sent to a DEX router, classifies each
//! one by risk pattern (large transfer, liquidity removal), and dispatches alerts
//! to log, Redis and webhook sinks.

pub mod alert;
pub mod classifier;
pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod ledger;
pub mod monitor;
pub mod node;
pub mod protocol;
pub mod signatures;
pub mod sinks;

// Re-export commonly used types
pub use alert::{Alert, AlertMessage};
pub use classifier::{classify, RiskCategory, RiskVerdict, Severity};
pub use config::{ConfigError, ConnectionConfig, DispatchConfig, MonitorConfig, SinkConfig, ThresholdConfig};
pub use decoder::{decode, decode_transaction, DecodedCall, PendingTransaction};
pub use dispatcher::{AlertDispatcher, AlertHandle};
pub use ledger::{LedgerClient, LedgerError, RawTransaction, StreamConnection, TxLookup};
pub use monitor::{ConnectionState, Monitor, MonitorError, StatusHandle};
pub use node::NodeClient;
pub use signatures::{MethodKind, MethodSignature, SignatureTable};
pub use sinks::{AlertSink, LogSink, RedisSink, SinkError, WebhookSink};
