//! Subscription Wire Protocol
//!
//! JSON-RPC framing for `eth_subscribe("newPendingTransactions")`: building the
//! subscribe/unsubscribe requests, validating the acknowledgement and reading
//! notifications.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use thiserror::Error;

pub const SUBSCRIBE_METHOD: &str = "eth_subscribe";
pub const UNSUBSCRIBE_METHOD: &str = "eth_unsubscribe";
pub const NOTIFICATION_METHOD: &str = "eth_subscription";

/// Topic for pending transaction hashes
pub const PENDING_TRANSACTIONS_TOPIC: &str = "newPendingTransactions";

/// Errors in subscription messages
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Subscription rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Acknowledgement carries no subscription id")]
    MissingSubscriptionId,

    #[error("Acknowledgement id {got} does not match request id {expected}")]
    UnexpectedResponseId { expected: u64, got: String },
}

/// Handle returned by the node for an active subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<NotificationParams>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: String,
    result: Value,
}

/// A message read from an established subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A newly observed pending transaction
    PendingTransaction(TxHash),
    /// Anything else (responses to other requests, other subscriptions)
    Ignored,
}

/// Build the subscribe request
pub fn subscribe_request(id: u64) -> String {
    encode(id, SUBSCRIBE_METHOD, json!([PENDING_TRANSACTIONS_TOPIC]))
}

/// Build the unsubscribe request for an active subscription
pub fn unsubscribe_request(id: u64, subscription: &SubscriptionId) -> String {
    encode(id, UNSUBSCRIBE_METHOD, json!([subscription.0]))
}

fn encode(id: u64, method: &str, params: Value) -> String {
    let request = Request {
        jsonrpc: "2.0",
        id,
        method,
        params,
    };
    // Serializing a struct of strings and a Value cannot fail
    serde_json::to_string(&request).unwrap_or_default()
}

/// Validate the acknowledgement to a subscribe request.
/// An error-shaped response is a failed subscription, not success.
pub fn parse_ack(text: &str, request_id: u64) -> Result<SubscriptionId, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if let Some(error) = envelope.error {
        return Err(ProtocolError::Rejected {
            code: error.code,
            message: error.message,
        });
    }

    match &envelope.id {
        Some(id) if id.as_u64() == Some(request_id) => {}
        Some(id) => {
            return Err(ProtocolError::UnexpectedResponseId {
                expected: request_id,
                got: id.to_string(),
            })
        }
        None => return Err(ProtocolError::MissingSubscriptionId),
    }

    match envelope.result {
        Some(Value::String(id)) if !id.is_empty() => Ok(SubscriptionId(id)),
        _ => Err(ProtocolError::MissingSubscriptionId),
    }
}

/// Read one message from an established subscription
pub fn parse_notification(text: &str, subscription: &SubscriptionId) -> Result<Inbound, ProtocolError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if envelope.method.as_deref() != Some(NOTIFICATION_METHOD) {
        return Ok(Inbound::Ignored);
    }

    let params = envelope
        .params
        .ok_or_else(|| ProtocolError::Malformed("notification without params".to_string()))?;

    if params.subscription != subscription.0 {
        return Ok(Inbound::Ignored);
    }

    // Some nodes push full transaction objects instead of bare hashes
    let hash = match &params.result {
        Value::String(hash) => hash.as_str(),
        Value::Object(tx) => tx
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("transaction object without hash".to_string()))?,
        other => return Err(ProtocolError::Malformed(format!("unexpected result: {}", other))),
    };

    TxHash::from_str(hash)
        .map(Inbound::PendingTransaction)
        .map_err(|_| ProtocolError::Malformed(format!("invalid transaction hash: {}", hash)))
}
