//! Error types for threshold Schnorr operations

use crate::mpc::Exclusion;
use serde_json::error::Category;
use thiserror::Error;

/// Result type alias for threshold Schnorr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during key generation, resharing or signing
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid party configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough qualified partners survived the run
    #[error(
        "Insufficient partners: required {required}, got {actual}{}",
        format_exclusions(.excluded)
    )]
    InsufficientPartners {
        required: usize,
        actual: usize,
        excluded: Vec<Exclusion>,
    },

    /// Partners excluded this party itself; it holds no usable result
    #[error("Excluded by partners in {round}: {reason}")]
    SelfExcluded { round: String, reason: String },

    /// Fewer shares than the threshold were supplied for reconstruction
    #[error("Insufficient shares: required {required}, got {actual}")]
    InsufficientShares { required: usize, actual: usize },

    /// Two shares carry the same index, interpolation is undefined
    #[error("Duplicate share index: {0}")]
    DuplicateIndex(String),

    /// Encoded point is malformed or not on the curve
    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    /// Encoded scalar is malformed
    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),

    /// Encoded signature is malformed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Persisted key address does not match its public key
    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: String, actual: String },

    /// Round payload failed validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Network collaborator error
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed input data, such as a persisted key or an address
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_exclusions(excluded: &[Exclusion]) -> String {
    if excluded.is_empty() {
        return String::new();
    }
    let list: Vec<String> = excluded.iter().map(|e| e.to_string()).collect();
    format!(" (excluded: {})", list.join("; "))
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Io => Error::Serialization(e.to_string()),
            Category::Syntax | Category::Data | Category::Eof => {
                Error::Deserialization(e.to_string())
            }
        }
    }
}
