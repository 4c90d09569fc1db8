//! BFT App - block lifecycle between a BFT consensus engine and the ledger
//!
//! This crate provides:
//! - The five-call lifecycle controller (check, begin, deliver, end, commit)
//! - Pool admission against a speculative check view
//! - Block execution against a per-block deliver view
//! - Forwarding of locally submitted transactions to the consensus engine

pub mod application;
pub mod bridge;
pub mod check;
pub mod consensus_client;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod validation;

#[cfg(test)]
mod tests;

pub use application::{AppInfo, Application, CommitResponse, CommittedBlock};
pub use bridge::{SubmissionBridge, DEFAULT_FORWARD_TIMEOUT};
pub use check::{CheckState, PoolValidator};
pub use consensus_client::{BroadcastTxResult, ConsensusClient, RpcConsensusClient, SubmitAck};
pub use error::{FatalError, ForwardError, SubmitError};
pub use executor::{BlockExecutor, PendingBlock};
pub use lifecycle::LifecycleState;
