//! RPC Methods - JSON-RPC method handlers
//!
//! Two groups of callers share this surface: the consensus engine, which
//! drives the block lifecycle (`checkTx` .. `commit`), and local clients,
//! which submit transactions and read account state.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bft_app::{AppInfo, Application, FatalError, PoolValidator, SubmissionBridge, SubmitError};
use bft_ledger::Ledger;
use bft_types::{Address, HeaderContext, ResultCode, H256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;

/// RPC context shared across handlers
pub struct RpcContext {
    pub app: Arc<Mutex<Application<Ledger>>>,
    /// Pool admission without taking the application lock
    pub pool: Arc<PoolValidator<Ledger>>,
    pub bridge: Arc<SubmissionBridge<Ledger>>,
    fatal: mpsc::UnboundedSender<FatalError>,
    halted: AtomicBool,
}

impl RpcContext {
    /// Fatal lifecycle errors are handed to `fatal`; the owner is expected to
    /// stop the process.
    pub fn new(
        app: Arc<Mutex<Application<Ledger>>>,
        bridge: Arc<SubmissionBridge<Ledger>>,
        fatal: mpsc::UnboundedSender<FatalError>,
    ) -> Self {
        let pool = app.lock().pool_validator();
        Self {
            app,
            pool,
            bridge,
            fatal,
            halted: AtomicBool::new(false),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Run a lifecycle call, halting the surface on a fatal error
    fn lifecycle<T>(
        &self,
        call: impl FnOnce(&mut Application<Ledger>) -> Result<T, FatalError>,
    ) -> Result<T, RpcError> {
        if self.is_halted() {
            return Err(RpcError::Halted);
        }

        let mut app = self.app.lock();
        call(&mut app).map_err(|e| {
            self.halted.store(true, Ordering::SeqCst);
            tracing::error!("Fatal lifecycle error: {}", e);
            let message = e.to_string();
            if self.fatal.send(e).is_err() {
                tracing::error!("Fatal error receiver is gone");
            }
            RpcError::Fatal(message)
        })
    }
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
pub struct BeginBlockRequest {
    pub height: u64,
    pub timestamp: u64,
}

/// Result code as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub code: u32,
    pub name: String,
}

impl From<ResultCode> for TxResult {
    fn from(code: ResultCode) -> Self {
        Self {
            code: code.code(),
            name: code.name().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResult {
    #[serde(rename = "stateRoot")]
    pub state_root: H256,
    pub code: u32,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: Address,
    pub nonce: u64,
    /// Decimal string; balances exceed JSON's safe integer range
    pub balance: String,
    /// Base64 contract code, empty for plain accounts
    pub code: String,
    #[serde(rename = "isContract")]
    pub is_contract: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    #[serde(rename = "lastHeight")]
    pub last_height: u64,
    #[serde(rename = "lastTimestamp")]
    pub last_timestamp: u64,
    #[serde(rename = "lastStateRoot")]
    pub last_state_root: H256,
}

impl From<AppInfo> for InfoResponse {
    fn from(info: AppInfo) -> Self {
        Self {
            last_height: info.last_height,
            last_timestamp: info.last_timestamp,
            last_state_root: info.last_state_root,
        }
    }
}

// ============ RPC Handlers ============

fn decode_tx(encoded: &str) -> Result<Vec<u8>, RpcError> {
    BASE64
        .decode(encoded)
        .map_err(|_| RpcError::InvalidParams("Invalid base64 encoding".to_string()))
}

fn parse_address(encoded: &str) -> Result<Address, RpcError> {
    encoded
        .parse()
        .map_err(|e| RpcError::InvalidParams(format!("Invalid address: {}", e)))
}

/// Handle checkTx RPC method
pub fn handle_check_tx(ctx: &RpcContext, tx: &str) -> Result<TxResult, RpcError> {
    let raw = decode_tx(tx)?;
    Ok(ctx.pool.check_tx(&raw).into())
}

/// Handle beginBlock RPC method
pub fn handle_begin_block(ctx: &RpcContext, params: BeginBlockRequest) -> Result<(), RpcError> {
    ctx.lifecycle(|app| app.begin_block(HeaderContext::new(params.height, params.timestamp)))
}

/// Handle deliverTx RPC method
pub fn handle_deliver_tx(ctx: &RpcContext, tx: &str) -> Result<TxResult, RpcError> {
    let raw = decode_tx(tx)?;
    ctx.lifecycle(|app| app.deliver_tx(&raw)).map(TxResult::from)
}

/// Handle endBlock RPC method
pub fn handle_end_block(ctx: &RpcContext, height: u64) -> Result<(), RpcError> {
    ctx.lifecycle(|app| app.end_block(height))
}

/// Handle commit RPC method
pub fn handle_commit(ctx: &RpcContext) -> Result<CommitResult, RpcError> {
    let response = ctx.lifecycle(|app| app.commit())?;
    Ok(CommitResult {
        state_root: response.state_root,
        code: response.code.code(),
        name: response.code.name().to_string(),
    })
}

/// Handle reset RPC method
pub fn handle_reset(ctx: &RpcContext) -> Result<(), RpcError> {
    ctx.lifecycle(|app| {
        app.reset();
        Ok(())
    })
}

/// Handle info RPC method
pub fn handle_info(ctx: &RpcContext) -> Result<InfoResponse, RpcError> {
    Ok(ctx.app.lock().info().into())
}

/// Handle getAccount RPC method
pub fn handle_get_account(ctx: &RpcContext, address: &str) -> Result<AccountInfo, RpcError> {
    let address = parse_address(address)?;
    let account = ctx
        .app
        .lock()
        .query_account(&address)
        .map_err(|e| RpcError::InternalError(e.to_string()))?;

    Ok(AccountInfo {
        address,
        nonce: account.nonce,
        balance: account.balance.to_string(),
        code: BASE64.encode(&account.code),
        is_contract: account.is_contract(),
    })
}

/// Handle getPendingNonce RPC method
pub fn handle_get_pending_nonce(ctx: &RpcContext, address: &str) -> Result<u64, RpcError> {
    let address = parse_address(address)?;
    Ok(ctx.pool.pending_nonce(&address))
}

/// Handle sendRawTransaction RPC method
///
/// Validates locally, then forwards to the consensus engine. Returns the
/// transaction hash.
pub async fn handle_send_raw_transaction(ctx: &RpcContext, tx: &str) -> Result<H256, RpcError> {
    let raw = decode_tx(tx)?;
    ctx.bridge.submit(&raw).await.map_err(|e| match e {
        SubmitError::Rejected(code) => RpcError::TransactionRejected(code),
        SubmitError::Forwarding(e) => RpcError::Forwarding(e.to_string()),
    })
}

/// Handle getHealth RPC method
pub fn handle_get_health(ctx: &RpcContext) -> Result<String, RpcError> {
    if ctx.is_halted() {
        return Err(RpcError::Halted);
    }
    Ok("ok".to_string())
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Transaction rejected: {0}")]
    TransactionRejected(ResultCode),
    #[error("Transaction admitted but not forwarded: {0}")]
    Forwarding(String),
    #[error("Fatal: {0}")]
    Fatal(String),
    #[error("Node halted after a fatal error")]
    Halted,
}
