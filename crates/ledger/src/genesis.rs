//! Genesis allocation
//!
//! Loaded once, before the first block, from a JSON file:
//!
//! ```json
//! {
//!   "chain_id": 1337,
//!   "timestamp": 0,
//!   "alloc": {
//!     "0x1234123412341234123412341234123412341234": { "balance": "10000000000000000000000000000000000" }
//!   }
//! }
//! ```
//!
//! Balances are strings, decimal or `0x`-prefixed hex, since they do not fit
//! in a JSON number.

use crate::{
    account::Account,
    state_view::{compute_state_root, Accounts},
};
use bft_types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error("failed to read genesis file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse genesis file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid balance {balance:?} for {address}")]
    InvalidBalance { address: Address, balance: String },
}

/// Initial allocation for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub balance: String,
}

/// Genesis document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub chain_id: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub alloc: BTreeMap<Address, GenesisAccount>,
}

impl Genesis {
    /// Empty genesis for `chain_id`
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            timestamp: 0,
            alloc: BTreeMap::new(),
        }
    }

    /// Add a funded account
    pub fn with_balance(mut self, address: Address, balance: u128) -> Self {
        self.alloc.insert(
            address,
            GenesisAccount {
                balance: balance.to_string(),
            },
        );
        self
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GenesisError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, GenesisError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Account set described by the allocation
    pub fn accounts(&self) -> Result<Accounts, GenesisError> {
        let mut accounts = Accounts::new();
        for (address, entry) in &self.alloc {
            let balance =
                parse_balance(&entry.balance).ok_or_else(|| GenesisError::InvalidBalance {
                    address: *address,
                    balance: entry.balance.clone(),
                })?;
            accounts.insert(*address, Account::with_balance(balance));
        }
        Ok(accounts)
    }

    /// Root of the genesis state
    pub fn state_root(&self) -> Result<H256, GenesisError> {
        Ok(compute_state_root(&self.accounts()?))
    }
}

fn parse_balance(s: &str) -> Option<u128> {
    match s.strip_prefix("0x") {
        Some(digits) => u128::from_str_radix(digits, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genesis_json() {
        let genesis = Genesis::from_json(
            r#"{
                "chain_id": 1337,
                "alloc": {
                    "0x1234123412341234123412341234123412341234": { "balance": "10000000000000000000000000000000000" },
                    "0x0000000000000000000000000000000000000001": { "balance": "0x10" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(genesis.chain_id, 1337);
        assert_eq!(genesis.timestamp, 0);

        let accounts = genesis.accounts().unwrap();
        let big: Address = "0x1234123412341234123412341234123412341234".parse().unwrap();
        assert_eq!(accounts[&big].balance, 10u128.pow(34));
        let one: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        assert_eq!(accounts[&one].balance, 16);
    }

    #[test]
    fn test_invalid_balance() {
        let genesis = Genesis::from_json(
            r#"{ "chain_id": 1, "alloc": { "0x1234123412341234123412341234123412341234": { "balance": "lots" } } }"#,
        )
        .unwrap();
        assert!(matches!(
            genesis.accounts(),
            Err(GenesisError::InvalidBalance { .. })
        ));
    }

    #[test]
    fn test_builder_matches_json() {
        let addr: Address = "0x1234123412341234123412341234123412341234".parse().unwrap();
        let built = Genesis::new(7).with_balance(addr, 42);
        let json = serde_json::to_string(&built).unwrap();
        assert_eq!(Genesis::from_json(&json).unwrap(), built);
        assert_eq!(built.state_root().unwrap(), built.state_root().unwrap());
    }
}
