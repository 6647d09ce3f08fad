//! Risk Classifier
//!
//! Maps a decoded pending transaction and the configured thresholds to a verdict.
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. recipient is not the watched router → not flagged
//! 2. liquidity removal above the removal minimum → `liquidity_removal` / critical
//! 3. value above the large-value threshold → `large_transaction` / high
//! 4. otherwise → not flagged

use alloy::primitives::{TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::decoder::{DecodedCall, PendingTransaction};

/// Risk category of a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    LargeTransaction,
    LiquidityRemoval,
    None,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::LargeTransaction => "large_transaction",
            RiskCategory::LiquidityRemoval => "liquidity_removal",
            RiskCategory::None => "none",
        }
    }
}

/// Verdict severity, ordered `Low < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Classification result for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskVerdict {
    pub tx_hash: TxHash,
    pub flagged: bool,
    pub category: RiskCategory,
    pub severity: Severity,
    /// Value observed, in wei
    pub value: U256,
}

impl RiskVerdict {
    fn clear(tx: &PendingTransaction) -> Self {
        Self {
            tx_hash: tx.hash,
            flagged: false,
            category: RiskCategory::None,
            severity: Severity::Low,
            value: tx.value,
        }
    }

    fn flagged(tx: &PendingTransaction, category: RiskCategory, severity: Severity) -> Self {
        Self {
            tx_hash: tx.hash,
            flagged: true,
            category,
            severity,
            value: tx.value,
        }
    }
}

/// Classify a decoded transaction. Pure: identical inputs give identical verdicts.
pub fn classify(tx: &PendingTransaction, decoded: &DecodedCall, cfg: &ThresholdConfig) -> RiskVerdict {
    if tx.to != Some(cfg.router) {
        return RiskVerdict::clear(tx);
    }

    if tx.value.is_zero() {
        return RiskVerdict::clear(tx);
    }

    if decoded.is_liquidity_removal() && tx.value > cfg.liquidity_removal_min {
        return RiskVerdict::flagged(tx, RiskCategory::LiquidityRemoval, Severity::Critical);
    }

    if tx.value > cfg.large_value_threshold {
        return RiskVerdict::flagged(tx, RiskCategory::LargeTransaction, Severity::High);
    }

    RiskVerdict::clear(tx)
}
