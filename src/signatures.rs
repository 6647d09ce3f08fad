//! Router Method Signatures
//!
//! Maps 4-byte method selectors to method names and their risk-relevant kind.
//! The table is supplied by configuration; `SignatureTable::pancake_v2()` is the
//! default for the PancakeSwap V2 router.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::config::{expand_path, ConfigError};

/// What a router method does, as far as risk classification cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Any token swap through the router
    Swap,
    /// Withdrawal of pooled liquidity
    LiquidityRemoval,
    /// Known method with no special meaning for the classifier
    Other,
}

/// A named router method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Human-readable method name (e.g., "removeLiquidityETH")
    pub name: String,
    /// Method kind
    pub kind: MethodKind,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Selector lookup table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureTable {
    methods: HashMap<[u8; 4], MethodSignature>,
}

impl SignatureTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// PancakeSwap V2 router: six swaps and two liquidity removals
    pub fn pancake_v2() -> Self {
        let mut table = Self::new();
        table.insert([0x38, 0xed, 0x17, 0x39], MethodSignature::new("swapExactTokensForTokens", MethodKind::Swap));
        table.insert([0x88, 0x03, 0xdb, 0xee], MethodSignature::new("swapTokensForExactTokens", MethodKind::Swap));
        table.insert([0x7f, 0xf3, 0x6a, 0xb5], MethodSignature::new("swapExactETHForTokens", MethodKind::Swap));
        table.insert([0x4a, 0x25, 0xd9, 0x4a], MethodSignature::new("swapTokensForExactETH", MethodKind::Swap));
        table.insert([0x18, 0xcb, 0xaf, 0xe5], MethodSignature::new("swapExactTokensForETH", MethodKind::Swap));
        table.insert([0xfb, 0x3b, 0xdb, 0x41], MethodSignature::new("swapETHForExactTokens", MethodKind::Swap));
        table.insert([0x02, 0x75, 0x1c, 0xec], MethodSignature::new("removeLiquidity", MethodKind::LiquidityRemoval));
        table.insert([0xaf, 0x29, 0x79, 0xeb], MethodSignature::new("removeLiquidityETH", MethodKind::LiquidityRemoval));
        table
    }

    /// Parse a table from JSON of the form
    /// `{"0x38ed1739": {"name": "swapExactTokensForTokens", "kind": "swap"}}`
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, MethodSignature> = serde_json::from_str(json)
            .map_err(|e| ConfigError::SignatureTable(e.to_string()))?;

        let mut table = Self::new();
        for (selector, signature) in raw {
            table.insert(parse_selector(&selector)?, signature);
        }
        Ok(table)
    }

    /// Load a JSON table from disk (a leading `~/` is expanded)
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let expanded = expand_path(path);
        let json = std::fs::read_to_string(Path::new(&expanded))
            .map_err(|e| ConfigError::SignatureTable(format!("{}: {}", expanded, e)))?;
        Self::from_json(&json)
    }

    /// Add or replace a selector
    pub fn insert(&mut self, selector: [u8; 4], signature: MethodSignature) {
        self.methods.insert(selector, signature);
    }

    /// Look up a selector
    pub fn get(&self, selector: &[u8; 4]) -> Option<&MethodSignature> {
        self.methods.get(selector)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Parse a selector string ("0x02751cec" or "02751cec") into 4 bytes
pub fn parse_selector(selector: &str) -> Result<[u8; 4], ConfigError> {
    let digits = selector.strip_prefix("0x").unwrap_or(selector);
    let bytes = hex::decode(digits).map_err(|_| ConfigError::InvalidSelector(selector.to_string()))?;
    <[u8; 4]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::InvalidSelector(selector.to_string()))
}

/// Format a selector as hex with 0x prefix
pub fn selector_hex(selector: &[u8; 4]) -> String {
    format!("0x{}", hex::encode(selector))
}
