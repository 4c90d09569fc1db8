//! Transaction wire format and codec
//!
//! Transactions travel as borsh-encoded [`SignedTransaction`] bytes. The
//! signature is a recoverable secp256k1 ECDSA signature over the Keccak-256
//! hash of the borsh-encoded [`UnsignedTransaction`], which includes the
//! chain id. The sender is never transmitted; it is recovered from the
//! signature.

use crate::primitives::{keccak256, Address, H256};
use crate::result_code::ResultCode;
use borsh::{BorshDeserialize, BorshSerialize};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Fields covered by the signature
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UnsignedTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// `None` creates a contract
    pub to: Option<Address>,
    pub value: u128,
    pub payload: Vec<u8>,
    pub chain_id: u64,
}

impl UnsignedTransaction {
    /// Hash that gets signed
    pub fn signing_hash(&self) -> H256 {
        keccak256(&borsh::to_vec(self).expect("in-memory borsh encoding cannot fail"))
    }
}

/// Transaction as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignedTransaction {
    pub unsigned: UnsignedTransaction,
    /// `r || s`
    pub signature: [u8; 64],
    pub recovery_id: u8,
}

impl SignedTransaction {
    /// Encode to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("SignedTransaction serialization should not fail")
    }
}

/// A transaction whose sender has been recovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub sender: Address,
    pub nonce: u64,
    pub to: Option<Address>,
    pub value: u128,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub payload: Vec<u8>,
    pub chain_id: u64,
    pub signature: [u8; 64],
    /// Keccak-256 of the raw wire bytes
    pub hash: H256,
}

impl DecodedTransaction {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Upfront cost `value + gas_price * gas_limit`; `None` on overflow
    pub fn max_cost(&self) -> Option<u128> {
        self.gas_price
            .checked_mul(u128::from(self.gas_limit))?
            .checked_add(self.value)
    }
}

/// Why a byte string could not be turned into a [`DecodedTransaction`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed transaction encoding: {0}")]
    Malformed(String),

    #[error("chain id {actual} does not match {expected}")]
    WrongChain { expected: u64, actual: u64 },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl From<CodecError> for ResultCode {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Malformed(_) => ResultCode::Malformed,
            CodecError::WrongChain { .. } | CodecError::InvalidSignature(_) => {
                ResultCode::InvalidSignature
            }
        }
    }
}

/// Decoder bound to one chain's signing scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionCodec {
    chain_id: u64,
}

impl TransactionCodec {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Decode wire bytes and recover the sender
    ///
    /// Pure: touches no state, so a failure leaves nothing to undo.
    pub fn decode(&self, raw: &[u8]) -> Result<DecodedTransaction, CodecError> {
        let signed: SignedTransaction =
            borsh::from_slice(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;

        if signed.unsigned.chain_id != self.chain_id {
            return Err(CodecError::WrongChain {
                expected: self.chain_id,
                actual: signed.unsigned.chain_id,
            });
        }

        let sender = recover_sender(&signed)?;
        let SignedTransaction {
            unsigned, signature, ..
        } = signed;

        Ok(DecodedTransaction {
            sender,
            nonce: unsigned.nonce,
            to: unsigned.to,
            value: unsigned.value,
            gas_price: unsigned.gas_price,
            gas_limit: unsigned.gas_limit,
            payload: unsigned.payload,
            chain_id: unsigned.chain_id,
            signature,
            hash: keccak256(raw),
        })
    }
}

fn recover_sender(signed: &SignedTransaction) -> Result<Address, CodecError> {
    let signature = Signature::from_slice(&signed.signature)
        .map_err(|e| CodecError::InvalidSignature(e.to_string()))?;

    // Only the low-S form is accepted so a signature has exactly one encoding
    if signature.normalize_s().is_some() {
        return Err(CodecError::InvalidSignature("high S value".to_string()));
    }

    let recovery_id = RecoveryId::from_byte(signed.recovery_id)
        .ok_or_else(|| CodecError::InvalidSignature("recovery id out of range".to_string()))?;

    let prehash = signed.unsigned.signing_hash();
    let key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &signature, recovery_id)
        .map_err(|e| CodecError::InvalidSignature(e.to_string()))?;

    Ok(address_of(&key))
}

/// Address controlled by a public key
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_public_key(&point.as_bytes()[1..])
}

/// Sign `unsigned` with `key`, producing a wire transaction
pub fn sign_transaction(
    key: &SigningKey,
    unsigned: UnsignedTransaction,
) -> Result<SignedTransaction, k256::ecdsa::Error> {
    let prehash = unsigned.signing_hash();
    let (signature, recovery_id) = key.sign_prehash_recoverable(prehash.as_bytes())?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes.copy_from_slice(&signature.to_bytes());

    Ok(SignedTransaction {
        unsigned,
        signature: sig_bytes,
        recovery_id: recovery_id.to_byte(),
    })
}
