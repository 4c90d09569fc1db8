//! Gas schedule
//!
//! There is no virtual machine behind this ledger, so the gas a transaction
//! uses is its intrinsic gas: a base charge plus a per-byte payload charge.

use bft_types::DecodedTransaction;

/// Base cost of any transaction
pub const TX_GAS: u64 = 21_000;

/// Base cost of a contract-creating transaction
pub const TX_CREATE_GAS: u64 = 53_000;

/// Per zero byte of payload
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Per non-zero byte of payload
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;

/// Gas charged before any execution; `None` on overflow
pub fn intrinsic_gas(tx: &DecodedTransaction) -> Option<u64> {
    let base = if tx.is_contract_creation() {
        TX_CREATE_GAS
    } else {
        TX_GAS
    };

    let zeros = tx.payload.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = tx.payload.len() as u64 - zeros;

    base.checked_add(zeros.checked_mul(TX_DATA_ZERO_GAS)?)?
        .checked_add(non_zeros.checked_mul(TX_DATA_NON_ZERO_GAS)?)
}
