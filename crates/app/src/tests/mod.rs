//! Scenario tests for the lifecycle controller and the submission bridge


use crate::application::Application;
use bft_ledger::{Genesis, Ledger, LedgerConfig};
use bft_types::{
    address_of, sign_transaction, Address, SigningKey, TransactionCodec, UnsignedTransaction,
};
use std::sync::Arc;

pub(crate) const CHAIN_ID: u64 = 1337;
pub(crate) const GENESIS_BALANCE: u128 = 10u128.pow(34);
pub(crate) const GAS_PRICE: u128 = 10;
pub(crate) const GAS_LIMIT: u64 = 21_000;
pub(crate) const VALUE: u128 = 10;

/// Helper to create a deterministic signing key
pub(crate) fn key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

pub(crate) fn address(key: &SigningKey) -> Address {
    address_of(key.verifying_key())
}

/// Helper to create a signed transaction with explicit fields
pub(crate) fn signed_tx(
    key: &SigningKey,
    nonce: u64,
    to: Option<Address>,
    value: u128,
    gas_limit: u64,
    payload: Vec<u8>,
) -> Vec<u8> {
    let unsigned = UnsignedTransaction {
        nonce,
        gas_price: GAS_PRICE,
        gas_limit,
        to,
        value,
        payload,
        chain_id: CHAIN_ID,
    };
    sign_transaction(key, unsigned).unwrap().to_bytes()
}

/// Helper to create the default transfer (value 10, gas 21000, price 10)
pub(crate) fn transfer(key: &SigningKey, nonce: u64, to: Address) -> Vec<u8> {
    signed_tx(key, nonce, Some(to), VALUE, GAS_LIMIT, Vec::new())
}

/// Genesis funding every key with the standard balance
pub(crate) fn genesis(keys: &[&SigningKey]) -> Genesis {
    keys.iter().fold(Genesis::new(CHAIN_ID), |genesis, key| {
        genesis.with_balance(address(key), GENESIS_BALANCE)
    })
}

pub(crate) fn ledger(genesis: &Genesis) -> Arc<Ledger> {
    Arc::new(Ledger::in_memory(genesis, LedgerConfig::default()).unwrap())
}

pub(crate) fn application(genesis: &Genesis) -> Application<Ledger> {
    Application::new(ledger(genesis), TransactionCodec::new(CHAIN_ID)).unwrap()
}

/// Receiving address nobody holds a key for
pub(crate) fn recipient() -> Address {
    Address([0xbb; 20])
}
