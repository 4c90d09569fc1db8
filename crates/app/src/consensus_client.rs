//! Client side of the consensus engine's inbound RPC
//!
//! [`ConsensusClient`] is the seam the submission bridge forwards through.
//! [`RpcConsensusClient`] speaks JSON-RPC over HTTP to a Tendermint-style
//! endpoint (`broadcast_tx_sync`, `status`).

use crate::error::ForwardError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonrpsee::{
    core::{client::ClientT, params::ObjectParams},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Synchronous acknowledgement from the consensus engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    /// Transaction hash as reported by the consensus engine
    pub hash: String,
}

/// Result of `broadcast_tx_sync`
#[derive(Clone, Debug, Deserialize)]
pub struct BroadcastTxResult {
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub hash: String,
}

#[async_trait]
pub trait ConsensusClient: Send + Sync {
    /// Hand raw transaction bytes to the consensus engine's mempool
    async fn submit_transaction(&self, raw: &[u8]) -> Result<SubmitAck, ForwardError>;

    /// Probe the consensus engine; any well-formed answer means it is up
    async fn status(&self) -> Result<serde_json::Value, ForwardError>;
}

/// JSON-RPC over HTTP consensus client
pub struct RpcConsensusClient {
    client: HttpClient,
    url: String,
}

impl RpcConsensusClient {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, ForwardError> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(url)
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConsensusClient for RpcConsensusClient {
    async fn submit_transaction(&self, raw: &[u8]) -> Result<SubmitAck, ForwardError> {
        let mut params = ObjectParams::new();
        params
            .insert("tx", STANDARD.encode(raw))
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let result: BroadcastTxResult = self
            .client
            .request("broadcast_tx_sync", params)
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        if result.code != 0 {
            return Err(ForwardError::Rejected {
                code: result.code,
                log: result.log,
            });
        }

        Ok(SubmitAck { hash: result.hash })
    }

    async fn status(&self) -> Result<serde_json::Value, ForwardError> {
        self.client
            .request("status", rpc_params![])
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))
    }
}
