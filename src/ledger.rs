//! Ledger Capability
//!
//! The monitor talks to the node only through these traits, so tests can script
//! streams, lookups and failures without a live endpoint. `node::NodeClient` is the
//! production implementation.

use alloy::primitives::TxHash;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Errors raised by the ledger capability
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream closed by remote")]
    Closed,

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Subscription failed: {0}")]
    Subscription(#[from] ProtocolError),

    #[error("Lookup failed: {0}")]
    Lookup(String),
}

/// Transaction fields as returned by `eth_getTransactionByHash`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    pub input: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub max_fee_per_gas: Option<String>,
}

/// Outcome of a transaction-detail lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLookup {
    Found(RawTransaction),
    /// The node no longer knows the hash (already mined or dropped)
    NotFound,
}

/// A live text-message stream to the node
#[async_trait]
pub trait StreamConnection: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<(), LedgerError>;

    /// Next text frame; `None` once the remote has closed the stream
    async fn next_text(&mut self) -> Option<Result<String, LedgerError>>;

    /// Close the stream, releasing the connection slot on the remote
    async fn close(&mut self) -> Result<(), LedgerError>;
}

/// Subscribe and fetch-transaction capability
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Open a fresh streaming connection
    async fn connect(&self) -> Result<Box<dyn StreamConnection>, LedgerError>;

    /// Resolve full transaction detail for a pending hash
    async fn fetch_transaction(&self, hash: TxHash) -> Result<TxLookup, LedgerError>;
}
