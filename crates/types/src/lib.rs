//! Shared types for the BFT ledger application
//!
//! Everything that crosses a crate boundary lives here:
//! - 20-byte account addresses and 32-byte hashes
//! - Result codes returned to the consensus engine
//! - Block header context and receipts
//! - The signed transaction wire format and its decoder

pub mod block;
pub mod primitives;
pub mod result_code;
pub mod transaction;

pub use k256::ecdsa::SigningKey;

pub use block::{HeaderContext, Receipt};
pub use primitives::{keccak256, Address, H256, ParseHexError};
pub use result_code::ResultCode;
pub use transaction::{
    address_of, sign_transaction, CodecError, DecodedTransaction, SignedTransaction, TransactionCodec,
    UnsignedTransaction,
};
