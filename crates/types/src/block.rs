//! Per-block context and transaction receipts

use crate::primitives::{Address, H256};
use serde::{Deserialize, Serialize};

/// Header fields the consensus engine supplies at begin-block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderContext {
    /// Block height, strictly increasing
    pub height: u64,
    /// Block timestamp, never lower than the previous block's
    pub timestamp: u64,
}

impl HeaderContext {
    pub fn new(height: u64, timestamp: u64) -> Self {
        Self { height, timestamp }
    }
}

/// Result of applying one transaction inside a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Position within the block, assigned when the receipt is accumulated
    pub index: u32,
    pub tx_hash: H256,
    pub sender: Address,
    /// Recipient, `None` for contract creation
    pub to: Option<Address>,
    /// Address of the created contract, if any
    pub contract_address: Option<Address>,
    pub value: u128,
    pub gas_used: u64,
    /// `gas_price * gas_used`, debited from the sender
    pub fee: u128,
}
