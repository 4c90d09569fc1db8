//! Account record

use serde::{Deserialize, Serialize};

/// State of a single account
///
/// An address that was never written reads as `Account::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Number of transactions sent from this account
    pub nonce: u64,
    /// Balance in base units
    pub balance: u128,
    /// Contract code, empty for externally owned accounts
    pub code: Vec<u8>,
}

impl Account {
    /// Externally owned account with a starting balance
    pub fn with_balance(balance: u128) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }

    /// Hash input for the state root
    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.nonce.to_le_bytes());
        hasher.update(&self.balance.to_le_bytes());
        hasher.update(blake3::hash(&self.code).as_bytes());
    }
}
