//! Error types for script construction, redemption and assembly

use thiserror::Error;

use crate::node::NodeError;

#[derive(Error, Debug)]
pub enum HashLockError {
    #[error("Push of {len} bytes exceeds the {max}-byte element limit")]
    InvalidPushLength { len: usize, max: usize },

    #[error("Invalid {what} length: expected {expected}, got {actual}")]
    InvalidParameterLength {
        what: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Branch mismatch: {0}")]
    BranchMismatch(String),

    #[error("Excessive fee suspected: {fee} sat at {fee_rate} sat/vB exceeds {max_fee_rate} sat/vB")]
    ExcessiveFeeSuspected {
        fee: u64,
        fee_rate: u64,
        max_fee_rate: u64,
    },

    #[error("Conservation violation: outputs {outputs} exceed inputs {inputs}")]
    ConservationViolation { inputs: u64, outputs: u64 },

    #[error("Malformed script: {0}")]
    MalformedScript(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),
}

pub type Result<T> = std::result::Result<T, HashLockError>;
