use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: &'static str },

    #[error("fraud score {0} is outside 0..=100")]
    InvalidFraudScore(u16),

    #[error("unknown entry kind: {0}")]
    InvalidEntryKind(String),

    #[error("unknown discrepancy kind: {0}")]
    InvalidDiscrepancyKind(String),
}
