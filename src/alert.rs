//! Risk Alerts
//!
//! An `Alert` is a flagged verdict plus the transaction context a consumer needs to
//! act on it. `AlertMessage` is its JSON form, shared by every sink.

use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::classifier::{RiskCategory, RiskVerdict, Severity};
use crate::decoder::{DecodedCall, PendingTransaction};

/// A flagged transaction ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub tx_hash: TxHash,
    pub category: RiskCategory,
    pub severity: Severity,
    pub from: Address,
    pub to: Option<Address>,
    /// Value in wei
    pub value: U256,
    pub method: String,
    pub method_id: Option<String>,
    pub gas_price: u128,
    /// Unix timestamp in milliseconds when the verdict was produced
    pub timestamp: u64,
}

impl Alert {
    /// Build an alert for a flagged verdict. Returns `None` when the verdict is clear.
    pub fn from_verdict(tx: &PendingTransaction, decoded: &DecodedCall, verdict: &RiskVerdict) -> Option<Self> {
        if !verdict.flagged {
            return None;
        }

        Some(Alert {
            tx_hash: verdict.tx_hash,
            category: verdict.category,
            severity: verdict.severity,
            from: tx.from,
            to: tx.to,
            value: verdict.value,
            method: decoded.method_name().to_string(),
            method_id: decoded.selector_hex(),
            gas_price: tx.gas_price,
            timestamp: current_timestamp_millis(),
        })
    }

    /// Value in whole native units (e.g. "12.5")
    pub fn value_native(&self) -> String {
        format_native(self.value)
    }

    pub fn to_message(&self) -> AlertMessage {
        AlertMessage {
            timestamp: self.timestamp,
            tx_hash: format_hash(self.tx_hash),
            from: format_address(self.from),
            to: self.to.map(format_address).unwrap_or_default(),
            value: format_value(self.value),
            value_native: self.value_native(),
            risk_type: self.category,
            risk_level: self.severity,
            method: self.method.clone(),
            method_id: self.method_id.clone().unwrap_or_default(),
            gas_price: self.gas_price.to_string(),
        }
    }
}

/// Alert wire format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    /// Transaction hash with 0x prefix
    pub tx_hash: String,
    pub from: String,
    /// Empty string for contract creation
    pub to: String,
    /// Value in wei as decimal string
    pub value: String,
    /// Value in whole native units
    pub value_native: String,
    pub risk_type: RiskCategory,
    pub risk_level: Severity,
    /// Human-readable method name, "transfer" or "unknown"
    pub method: String,
    /// Selector with 0x prefix, empty for plain transfers
    pub method_id: String,
    /// Gas price in wei as decimal string
    pub gas_price: String,
}

impl AlertMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Get current timestamp in milliseconds
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

pub fn format_address(address: Address) -> String {
    format!("{:#x}", address)
}

pub fn format_hash(hash: TxHash) -> String {
    format!("{:#x}", hash)
}

/// Format a U256 value as decimal string
pub fn format_value(value: U256) -> String {
    value.to_string()
}

/// Format a wei amount in whole native units, without trailing zeros
pub fn format_native(value: U256) -> String {
    let formatted = format_ether(value);
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{}.{}", whole, fraction)
            }
        }
        None => formatted,
    }
}
