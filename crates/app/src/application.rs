//! Block Lifecycle Controller
//!
//! The consensus engine drives a strict five-call cycle:
//! `begin_block` → `deliver_tx`* → `end_block` → `commit`. The controller owns
//! the two account views, the check view shared with the pool path and the
//! deliver view of the open block, and rejects any call that is not legal in
//! the current [`LifecycleState`] with a [`FatalError`].
//!
//! Nothing here reads the wall clock or any other non-replicated input.

use crate::{
    check::{CheckState, PoolValidator},
    error::FatalError,
    executor::{BlockExecutor, PendingBlock},
    lifecycle::LifecycleState,
};
use bft_ledger::{Account, ChainHead, EngineError, ExecutionEngine};
use bft_types::{Address, HeaderContext, Receipt, ResultCode, TransactionCodec, H256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the committed-block broadcast channel
const COMMIT_CHANNEL_CAPACITY: usize = 64;

/// Event published after every successful commit
#[derive(Clone, Debug)]
pub struct CommittedBlock {
    /// Header of the committed block
    pub header: HeaderContext,
    /// State root after the block
    pub state_root: H256,
    /// Receipts in delivery order
    pub receipts: Vec<Receipt>,
    /// Accounts modified by the block, with their new values
    pub accounts: Vec<(Address, Account)>,
}

/// Answer to `commit`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    /// The new app hash
    pub state_root: H256,
    pub code: ResultCode,
}

/// Answer to `info`, used by the consensus engine's handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub last_height: u64,
    pub last_timestamp: u64,
    pub last_state_root: H256,
}

pub struct Application<E> {
    engine: Arc<E>,
    pool: Arc<PoolValidator<E>>,
    executor: BlockExecutor<E>,
    check: CheckState,
    state: LifecycleState,
    head: ChainHead,
    commits: broadcast::Sender<CommittedBlock>,
}

impl<E: ExecutionEngine> Application<E> {
    /// Create the controller on top of the engine's last committed block
    pub fn new(engine: Arc<E>, codec: TransactionCodec) -> Result<Self, EngineError> {
        let head = engine.head();
        let check = CheckState::new(engine.derive_view(head.state_root)?);
        let pool = Arc::new(PoolValidator::new(
            Arc::clone(&engine),
            codec,
            check.clone(),
        ));
        let executor = BlockExecutor::new(Arc::clone(&engine), codec);
        let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);

        tracing::info!(
            "Application started at height {} (state root {})",
            head.height,
            head.state_root
        );

        Ok(Self {
            engine,
            pool,
            executor,
            check,
            state: LifecycleState::Idle,
            head,
            commits,
        })
    }

    /// Pool admission; legal in every lifecycle state
    pub fn check_tx(&self, raw: &[u8]) -> ResultCode {
        self.pool.check_tx(raw)
    }

    pub fn begin_block(&mut self, header: HeaderContext) -> Result<(), FatalError> {
        if !matches!(self.state, LifecycleState::Idle) {
            return Err(self.violation("begin_block"));
        }
        if header.height <= self.head.height {
            return Err(FatalError::HeightNotIncreasing {
                height: header.height,
                committed: self.head.height,
            });
        }
        if header.timestamp < self.head.timestamp {
            return Err(FatalError::TimestampRegressed {
                timestamp: header.timestamp,
                committed: self.head.timestamp,
            });
        }

        let block = self.executor.begin(header, self.head.state_root)?;
        tracing::debug!(
            "begin_block: height {} timestamp {}",
            header.height,
            header.timestamp
        );
        self.state = LifecycleState::BlockOpen(block);
        Ok(())
    }

    pub fn deliver_tx(&mut self, raw: &[u8]) -> Result<ResultCode, FatalError> {
        match &mut self.state {
            LifecycleState::BlockOpen(block) => Ok(self.executor.deliver(block, raw)),
            _ => Err(self.violation("deliver_tx")),
        }
    }

    /// Close the open block; no account state changes here
    pub fn end_block(&mut self, height: u64) -> Result<(), FatalError> {
        let open = match &self.state {
            LifecycleState::BlockOpen(block) => block.header().height,
            _ => return Err(self.violation("end_block")),
        };
        if open != height {
            return Err(FatalError::HeightMismatch { open, got: height });
        }

        if let LifecycleState::BlockOpen(block) =
            std::mem::replace(&mut self.state, LifecycleState::Idle)
        {
            tracing::debug!(
                "end_block: height {} with {} transactions",
                height,
                block.receipts().len()
            );
            self.state = LifecycleState::Ended(block);
        }
        Ok(())
    }

    /// Persist the ended block and re-derive the check view from the new root
    ///
    /// Every pool admission since the last commit is discarded; transactions
    /// still pending in the consensus engine's pool get re-checked against
    /// the new state.
    pub fn commit(&mut self) -> Result<CommitResponse, FatalError> {
        let block = match std::mem::replace(&mut self.state, LifecycleState::Idle) {
            LifecycleState::Ended(block) => block,
            other => {
                self.state = other;
                return Err(self.violation("commit"));
            }
        };

        let header = *block.header();
        let state_root = match self
            .engine
            .write_block(block.view(), &header, block.receipts())
        {
            Ok(root) => root,
            Err(e) => {
                tracing::error!("commit: failed to persist block {}: {}", header.height, e);
                self.state = LifecycleState::Ended(block);
                return Err(e.into());
            }
        };

        self.head = ChainHead {
            height: header.height,
            timestamp: header.timestamp,
            state_root,
        };
        self.check.reset(self.engine.derive_view(state_root)?);

        tracing::info!(
            "Committed block {} ({} txs, state root {})",
            header.height,
            block.receipts().len(),
            state_root
        );

        self.publish(block, state_root);

        Ok(CommitResponse {
            state_root,
            code: ResultCode::Ok,
        })
    }

    /// Discard any open or ended block and return to `Idle`
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.state, LifecycleState::Idle);
        if let Some(block) = previous.pending() {
            tracing::warn!(
                "reset: discarding block {} in state {} with {} transactions",
                block.header().height,
                previous.name(),
                block.receipts().len()
            );
        }
    }

    pub fn info(&self) -> AppInfo {
        AppInfo {
            last_height: self.head.height,
            last_timestamp: self.head.timestamp,
            last_state_root: self.head.state_root,
        }
    }

    /// Account in the last committed state
    pub fn query_account(&self, address: &Address) -> Result<Account, EngineError> {
        Ok(self
            .engine
            .derive_view(self.head.state_root)?
            .account(address))
    }

    /// Next nonce the pool expects from `address`
    pub fn pending_nonce(&self, address: &Address) -> u64 {
        self.pool.pending_nonce(address)
    }

    pub fn head(&self) -> ChainHead {
        self.head
    }

    pub fn lifecycle_state(&self) -> &'static str {
        self.state.name()
    }

    /// Block currently open or awaiting commit
    pub fn pending_block(&self) -> Option<&PendingBlock> {
        self.state.pending()
    }

    /// Validator sharing this controller's check view
    pub fn pool_validator(&self) -> Arc<PoolValidator<E>> {
        Arc::clone(&self.pool)
    }

    /// Subscribe to committed blocks
    pub fn subscribe(&self) -> broadcast::Receiver<CommittedBlock> {
        self.commits.subscribe()
    }

    fn violation(&self, call: &'static str) -> FatalError {
        FatalError::ProtocolViolation {
            call,
            state: self.state.name(),
        }
    }

    fn publish(&self, block: PendingBlock, state_root: H256) {
        if self.commits.receiver_count() == 0 {
            return;
        }
        let event = CommittedBlock {
            header: *block.header(),
            state_root,
            accounts: block.view().touched(),
            receipts: block.receipts().to_vec(),
        };
        // No receivers left is not an error
        let _ = self.commits.send(event);
    }
}
