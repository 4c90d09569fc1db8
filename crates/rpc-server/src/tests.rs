//! Shared fixtures for the RPC tests

use crate::methods::RpcContext;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bft_app::{
    Application, ConsensusClient, FatalError, ForwardError, SubmissionBridge, SubmitAck,
};
use bft_ledger::{Genesis, Ledger, LedgerConfig};
use bft_types::{
    address_of, sign_transaction, Address, SigningKey, TransactionCodec, UnsignedTransaction,
};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

const CHAIN_ID: u64 = 1337;

/// Consensus engine stand-in that acknowledges everything
#[derive(Default)]
pub(crate) struct MockConsensus {
    submitted: Mutex<Vec<Vec<u8>>>,
}

impl MockConsensus {
    pub(crate) fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl ConsensusClient for MockConsensus {
    async fn submit_transaction(&self, raw: &[u8]) -> Result<SubmitAck, ForwardError> {
        self.submitted.lock().push(raw.to_vec());
        Ok(SubmitAck {
            hash: String::new(),
        })
    }

    async fn status(&self) -> Result<serde_json::Value, ForwardError> {
        Ok(serde_json::Value::Null)
    }
}

pub(crate) fn funded_key() -> SigningKey {
    SigningKey::from_slice(&[1; 32]).unwrap()
}

/// Base64 transfer of 10 units from `key`
pub(crate) fn signed_transfer(key: &SigningKey, nonce: u64) -> String {
    let unsigned = UnsignedTransaction {
        nonce,
        gas_price: 10,
        gas_limit: 21_000,
        to: Some(Address([0xbb; 20])),
        value: 10,
        payload: Vec::new(),
        chain_id: CHAIN_ID,
    };
    BASE64.encode(sign_transaction(key, unsigned).unwrap().to_bytes())
}

/// In-memory node with `key` funded at genesis
pub(crate) fn context(
    key: &SigningKey,
) -> (
    RpcContext,
    Arc<MockConsensus>,
    mpsc::UnboundedReceiver<FatalError>,
) {
    let genesis =
        Genesis::new(CHAIN_ID).with_balance(address_of(key.verifying_key()), 10u128.pow(34));
    let ledger = Arc::new(Ledger::in_memory(&genesis, LedgerConfig::default()).unwrap());
    let app = Application::new(ledger, TransactionCodec::new(CHAIN_ID)).unwrap();

    let consensus = Arc::new(MockConsensus::default());
    let bridge = Arc::new(SubmissionBridge::new(
        app.pool_validator(),
        consensus.clone(),
        Duration::from_secs(1),
    ));
    let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

    let ctx = RpcContext::new(Arc::new(Mutex::new(app)), bridge, fatal_tx);
    (ctx, consensus, fatal_rx)
}
