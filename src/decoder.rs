//! Transaction Decoder
//!
//! Two steps turn node output into something the classifier can judge:
//! `decode_transaction` validates the raw lookup fields into a `PendingTransaction`,
//! and `decode` maps its calldata to a `DecodedCall` using the configured signature table.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use std::str::FromStr;
use thiserror::Error;

use crate::ledger::RawTransaction;
use crate::signatures::{selector_hex, MethodKind, MethodSignature, SignatureTable};

/// Method name reported for payloads that carry no call
pub const PLAIN_TRANSFER: &str = "transfer";

/// Method name reported for selectors missing from the signature table
pub const UNKNOWN_METHOD: &str = "unknown";

/// Errors that can occur while validating transaction fields
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Negative {field}: {value}")]
    NegativeValue { field: &'static str, value: String },

    #[error("Gas price does not fit in 128 bits: {0}")]
    GasPriceOverflow(String),
}

/// A pending transaction as observed from the node. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// Transaction hash
    pub hash: TxHash,
    /// Sender address
    pub from: Address,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Transaction value in wei
    pub value: U256,
    /// Transaction input data (calldata)
    pub input: Bytes,
    /// Gas price (legacy) or max fee per gas (EIP-1559)
    pub gas_price: u128,
}

/// How a selector resolved against the signature table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMethod {
    Known(MethodSignature),
    Unknown,
}

/// Method-level description of a transaction's calldata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCall {
    /// Payload shorter than a selector: a plain value transfer
    PlainTransfer,
    /// Payload with a selector
    Method {
        selector: [u8; 4],
        method: ResolvedMethod,
    },
}

impl DecodedCall {
    /// Human-readable method name ("transfer", the table name, or "unknown")
    pub fn method_name(&self) -> &str {
        match self {
            DecodedCall::PlainTransfer => PLAIN_TRANSFER,
            DecodedCall::Method {
                method: ResolvedMethod::Known(signature),
                ..
            } => &signature.name,
            DecodedCall::Method {
                method: ResolvedMethod::Unknown,
                ..
            } => UNKNOWN_METHOD,
        }
    }

    pub fn selector(&self) -> Option<[u8; 4]> {
        match self {
            DecodedCall::PlainTransfer => None,
            DecodedCall::Method { selector, .. } => Some(*selector),
        }
    }

    /// Get the selector as a hex string with 0x prefix
    pub fn selector_hex(&self) -> Option<String> {
        self.selector().map(|s| selector_hex(&s))
    }

    pub fn kind(&self) -> Option<MethodKind> {
        match self {
            DecodedCall::Method {
                method: ResolvedMethod::Known(signature),
                ..
            } => Some(signature.kind),
            _ => None,
        }
    }

    pub fn is_swap(&self) -> bool {
        self.kind() == Some(MethodKind::Swap)
    }

    pub fn is_liquidity_removal(&self) -> bool {
        self.kind() == Some(MethodKind::LiquidityRemoval)
    }
}

/// Decode calldata into a method-level description. Total: never fails.
pub fn decode(payload: &[u8], signatures: &SignatureTable) -> DecodedCall {
    match extract_method_id(payload) {
        None => DecodedCall::PlainTransfer,
        Some(selector) => {
            let method = match signatures.get(&selector) {
                Some(signature) => ResolvedMethod::Known(signature.clone()),
                None => ResolvedMethod::Unknown,
            };
            DecodedCall::Method { selector, method }
        }
    }
}

/// Validate raw lookup fields into a `PendingTransaction`
pub fn decode_transaction(raw: &RawTransaction) -> Result<PendingTransaction, DecodeError> {
    let hash = TxHash::from_str(raw.hash.trim()).map_err(|_| DecodeError::InvalidField {
        field: "hash",
        value: raw.hash.clone(),
    })?;
    let from = parse_address("from", &raw.from)?;
    let to = match raw.to.as_deref() {
        Some(to) if !to.trim().is_empty() => Some(parse_address("to", to)?),
        _ => None,
    };
    let value = parse_quantity("value", &raw.value)?;
    let input = Bytes::from(hex_to_bytes(&raw.input)?);

    let gas_price = match raw.gas_price.as_deref().or(raw.max_fee_per_gas.as_deref()) {
        Some(price) => {
            let price = parse_quantity("gasPrice", price)?;
            u128::try_from(price).map_err(|_| DecodeError::GasPriceOverflow(price.to_string()))?
        }
        None => 0,
    };

    Ok(PendingTransaction {
        hash,
        from,
        to,
        value,
        input,
        gas_price,
    })
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, DecodeError> {
    Address::from_str(value.trim()).map_err(|_| DecodeError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Parse an unsigned quantity in 0x-hex or decimal form. A sign is rejected, not wrapped.
pub fn parse_quantity(field: &'static str, value: &str) -> Result<U256, DecodeError> {
    let trimmed = value.trim();
    if trimmed.starts_with('-') {
        return Err(DecodeError::NegativeValue {
            field,
            value: value.to_string(),
        });
    }
    let invalid = || DecodeError::InvalidField {
        field,
        value: value.to_string(),
    };
    let (digits, radix) = match trimmed.strip_prefix("0x") {
        Some(digits) => (digits, 16),
        None => (trimmed, 10),
    };
    // from_str_radix reads an empty string as zero
    if digits.is_empty() {
        return Err(invalid());
    }
    U256::from_str_radix(digits, radix).map_err(|_| invalid())
}

/// Extract method ID from transaction input data
///
/// # Arguments
/// * `input` - The transaction input/calldata
///
/// # Returns
/// `Some([u8; 4])` if input has at least 4 bytes, `None` otherwise
pub fn extract_method_id(input: &[u8]) -> Option<[u8; 4]> {
    if input.len() < 4 {
        return None;
    }
    let mut method_id = [0u8; 4];
    method_id.copy_from_slice(&input[..4]);
    Some(method_id)
}

/// Parse a hex string to bytes (with or without 0x prefix)
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = hex_str.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}
