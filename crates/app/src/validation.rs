//! Admission rules shared by the pool and block paths

use bft_ledger::{gas::intrinsic_gas, StateView};
use bft_types::{DecodedTransaction, ResultCode};

/// Check `tx` against the sender's account in `view`
///
/// The nonce must match exactly: no gaps, no replays, no reordering.
pub fn validate(view: &StateView, tx: &DecodedTransaction) -> Result<(), ResultCode> {
    let account = view.account(&tx.sender);

    if tx.nonce != account.nonce {
        return Err(ResultCode::BadNonce);
    }

    match intrinsic_gas(tx) {
        Some(gas) if gas <= tx.gas_limit => {}
        _ => return Err(ResultCode::GasLimitExceeded),
    }

    match tx.max_cost() {
        Some(cost) if cost <= account.balance => Ok(()),
        _ => Err(ResultCode::InsufficientFunds),
    }
}
