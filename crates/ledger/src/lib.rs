//! BFT Ledger - deterministic account execution engine
//!
//! This crate provides the execution engine the application layer drives:
//! - Immutable account state views with cheap derivation from a committed root
//! - Transaction application (nonce, balance and gas rules, value transfer,
//!   contract creation)
//! - Block writes with state root computation and optional sled persistence
//! - Genesis allocation loading

pub mod account;
pub mod engine;
pub mod gas;
pub mod genesis;
pub mod persistence;
pub mod state_view;

pub use account::Account;
pub use engine::{contract_address, EngineError, ExecutionEngine, Ledger, LedgerConfig};
pub use genesis::{Genesis, GenesisAccount, GenesisError};
pub use persistence::{BlockRecord, ChainHead, PersistentStore};
pub use state_view::{compute_state_root, Accounts, StateView};
