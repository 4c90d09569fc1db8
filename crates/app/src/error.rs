//! Error types
//!
//! Transaction rejections are [`ResultCode`]s, not errors. What remains here
//! is either fatal (the lifecycle was misused or committed state could not be
//! persisted) or a recoverable forwarding failure on the submission path.

use bft_ledger::EngineError;
use bft_types::ResultCode;

/// The process must stop: continuing risks diverging from other replicas
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("{call} is not legal while the block lifecycle is {state}")]
    ProtocolViolation {
        call: &'static str,
        state: &'static str,
    },

    #[error("begin_block height {height} does not exceed committed height {committed}")]
    HeightNotIncreasing { height: u64, committed: u64 },

    #[error("begin_block timestamp {timestamp} precedes committed timestamp {committed}")]
    TimestampRegressed { timestamp: u64, committed: u64 },

    #[error("end_block height {got} does not match open block height {open}")]
    HeightMismatch { open: u64, got: u64 },

    #[error("execution engine failure: {0}")]
    Engine(#[from] EngineError),
}

/// Forwarding to the consensus engine failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("consensus engine did not acknowledge within {0:?}")]
    Timeout(std::time::Duration),

    #[error("consensus engine rejected the transaction (code {code}): {log}")]
    Rejected { code: u32, log: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of a failed local submission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Pool admission rejected the transaction; nothing was forwarded
    #[error("transaction rejected: {0}")]
    Rejected(ResultCode),

    /// Admitted locally, but forwarding failed; retry with `forward`
    #[error("transaction admitted locally but not forwarded: {0}")]
    Forwarding(#[from] ForwardError),
}
