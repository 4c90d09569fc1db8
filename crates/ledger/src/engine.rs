//! Execution engine
//!
//! [`ExecutionEngine`] is the seam the application layer drives: derive a
//! view at a committed root, apply a transaction to a view, write a block.
//! [`Ledger`] is the in-process implementation, keeping recent committed
//! states in memory and optionally persisting every block to sled.

use crate::{
    gas::intrinsic_gas,
    genesis::{Genesis, GenesisError},
    persistence::{BlockRecord, ChainHead, PersistentStore},
    state_view::{compute_state_root, Accounts, StateView},
};
use bft_types::{keccak256, Address, DecodedTransaction, HeaderContext, Receipt, ResultCode, H256};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::{collections::VecDeque, path::Path, sync::Arc};

/// Failures of the engine itself, as opposed to transaction rejections
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no committed state with root {0}")]
    UnknownRoot(H256),

    #[error("view rooted at {view_root} does not descend from head {head_root}")]
    StaleView { view_root: H256, head_root: H256 },

    #[error("block height {height} does not follow committed height {head_height}")]
    NonSequentialBlock { height: u64, head_height: u64 },

    #[error("stored state root {stored} does not match recomputed root {computed}")]
    CorruptState { stored: H256, computed: H256 },

    #[error("invalid genesis: {0}")]
    Genesis(#[from] GenesisError),

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Operations the application layer needs from an execution engine
pub trait ExecutionEngine: Send + Sync {
    /// Last committed block
    fn head(&self) -> ChainHead;

    /// Fresh view of the committed state at `root`
    fn derive_view(&self, root: H256) -> Result<StateView, EngineError>;

    /// Apply `tx` on top of `view`
    ///
    /// On rejection the returned code says why and `view` is untouched.
    fn apply_transaction(
        &self,
        view: &StateView,
        tx: &DecodedTransaction,
    ) -> Result<(StateView, Receipt), ResultCode>;

    /// Commit `view` as block `header`, returning the new state root
    fn write_block(
        &self,
        view: &StateView,
        header: &HeaderContext,
        receipts: &[Receipt],
    ) -> Result<H256, EngineError>;
}

/// Ledger configuration
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Committed states kept in memory for `derive_view`
    pub state_history: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { state_history: 16 }
    }
}

/// Deterministic account ledger
pub struct Ledger {
    /// Recent committed states by root
    states: DashMap<H256, Arc<Accounts>>,
    /// Roots in commit order, oldest first
    history: Mutex<VecDeque<H256>>,
    head: RwLock<ChainHead>,
    store: Option<PersistentStore>,
    config: LedgerConfig,
}

impl Ledger {
    /// Ledger that lives only in memory, starting from `genesis`
    pub fn in_memory(genesis: &Genesis, config: LedgerConfig) -> Result<Self, EngineError> {
        let accounts = genesis.accounts()?;
        let head = ChainHead {
            height: 0,
            timestamp: genesis.timestamp,
            state_root: compute_state_root(&accounts),
        };
        Ok(Self::from_parts(accounts, head, None, config))
    }

    /// Ledger backed by a sled database at `path`
    ///
    /// A fresh database is initialised from `genesis`; an existing one is
    /// loaded and its stored root verified against the loaded accounts.
    pub fn open<P: AsRef<Path>>(
        path: P,
        genesis: &Genesis,
        config: LedgerConfig,
    ) -> Result<Self, EngineError> {
        let store = PersistentStore::open(path)?;

        let (accounts, head) = match store.load_head()? {
            Some(head) => {
                let accounts = store.load_accounts()?;
                let computed = compute_state_root(&accounts);
                if computed != head.state_root {
                    return Err(EngineError::CorruptState {
                        stored: head.state_root,
                        computed,
                    });
                }
                tracing::info!(
                    "Loaded ledger at height {} ({} accounts, root {})",
                    head.height,
                    accounts.len(),
                    head.state_root
                );
                (accounts, head)
            }
            None => {
                let accounts = genesis.accounts()?;
                let head = ChainHead {
                    height: 0,
                    timestamp: genesis.timestamp,
                    state_root: compute_state_root(&accounts),
                };
                store.write_genesis(&accounts, &head)?;
                tracing::info!(
                    "Initialised ledger from genesis ({} accounts, root {})",
                    accounts.len(),
                    head.state_root
                );
                (accounts, head)
            }
        };

        Ok(Self::from_parts(accounts, head, Some(store), config))
    }

    fn from_parts(
        accounts: Accounts,
        head: ChainHead,
        store: Option<PersistentStore>,
        config: LedgerConfig,
    ) -> Self {
        let states = DashMap::new();
        states.insert(head.state_root, Arc::new(accounts));
        let mut history = VecDeque::new();
        history.push_back(head.state_root);

        Self {
            states,
            history: Mutex::new(history),
            head: RwLock::new(head),
            store,
            config,
        }
    }

    /// Committed block record, if persisted
    pub fn block(&self, height: u64) -> Result<Option<BlockRecord>, EngineError> {
        match &self.store {
            Some(store) => Ok(store.load_block(height)?),
            None => Ok(None),
        }
    }

    /// Number of committed states held in memory
    #[cfg(test)]
    pub(crate) fn retained_states(&self) -> usize {
        self.states.len()
    }

    fn remember(&self, root: H256, accounts: Arc<Accounts>) {
        self.states.insert(root, accounts);

        let mut history = self.history.lock();
        history.push_back(root);
        let keep = self.config.state_history.max(1);
        while history.len() > keep {
            if let Some(old) = history.pop_front() {
                // Empty blocks repeat roots; only drop a state nobody lists
                if !history.contains(&old) {
                    self.states.remove(&old);
                }
            }
        }
    }
}

/// Address of a contract created by `sender` at `nonce`
pub fn contract_address(sender: &Address, nonce: u64) -> Address {
    let mut preimage = Vec::with_capacity(28);
    preimage.extend_from_slice(sender.as_ref());
    preimage.extend_from_slice(&nonce.to_be_bytes());
    let hash = keccak256(&preimage);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.as_bytes()[12..]);
    Address(out)
}

impl ExecutionEngine for Ledger {
    fn head(&self) -> ChainHead {
        *self.head.read()
    }

    fn derive_view(&self, root: H256) -> Result<StateView, EngineError> {
        let accounts = self
            .states
            .get(&root)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(EngineError::UnknownRoot(root))?;
        Ok(StateView::new(root, accounts))
    }

    fn apply_transaction(
        &self,
        view: &StateView,
        tx: &DecodedTransaction,
    ) -> Result<(StateView, Receipt), ResultCode> {
        let mut sender = view.account(&tx.sender);
        if tx.nonce != sender.nonce {
            return Err(ResultCode::BadNonce);
        }

        let gas_used = intrinsic_gas(tx).ok_or(ResultCode::GasLimitExceeded)?;
        if gas_used > tx.gas_limit {
            return Err(ResultCode::GasLimitExceeded);
        }

        let max_cost = tx.max_cost().ok_or(ResultCode::InsufficientFunds)?;
        if sender.balance < max_cost {
            return Err(ResultCode::InsufficientFunds);
        }

        // gas_used <= gas_limit, so the fee is bounded by max_cost
        let fee = tx.gas_price * u128::from(gas_used);
        sender.balance -= tx.value + fee;
        sender.nonce += 1;

        let (recipient, created) = match tx.to {
            Some(to) => (to, None),
            None => {
                let address = contract_address(&tx.sender, tx.nonce);
                (address, Some(address))
            }
        };

        let mut updates = vec![(tx.sender, sender.clone())];
        if recipient == tx.sender {
            // Self-transfer: the value comes straight back
            updates[0].1.balance += tx.value;
        } else {
            let mut target = view.account(&recipient);
            target.balance = target
                .balance
                .checked_add(tx.value)
                .ok_or(ResultCode::Internal)?;
            if created.is_some() {
                target.code = tx.payload.clone();
            }
            updates.push((recipient, target));
        }

        let receipt = Receipt {
            index: 0,
            tx_hash: tx.hash,
            sender: tx.sender,
            to: tx.to,
            contract_address: created,
            value: tx.value,
            gas_used,
            fee,
        };

        Ok((view.with_accounts(updates), receipt))
    }

    fn write_block(
        &self,
        view: &StateView,
        header: &HeaderContext,
        receipts: &[Receipt],
    ) -> Result<H256, EngineError> {
        let head = self.head();
        if view.base_root() != head.state_root {
            return Err(EngineError::StaleView {
                view_root: view.base_root(),
                head_root: head.state_root,
            });
        }
        if header.height <= head.height {
            return Err(EngineError::NonSequentialBlock {
                height: header.height,
                head_height: head.height,
            });
        }

        let accounts = view.merged();
        let state_root = compute_state_root(&accounts);
        let new_head = ChainHead {
            height: header.height,
            timestamp: header.timestamp,
            state_root,
        };

        if let Some(store) = &self.store {
            let record = BlockRecord {
                header: *header,
                parent_root: head.state_root,
                state_root,
                receipts: receipts.to_vec(),
            };
            store.write_block(&record, &view.touched(), &new_head)?;
        }

        self.remember(state_root, Arc::new(accounts));
        *self.head.write() = new_head;

        tracing::debug!(
            "Wrote block {} ({} receipts, root {})",
            header.height,
            receipts.len(),
            state_root
        );

        Ok(state_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn genesis() -> Genesis {
        Genesis::new(1)
            .with_balance(addr(1), 1_000_000_000)
            .with_balance(addr(2), 500)
    }

    fn tx(sender: Address, nonce: u64, to: Option<Address>, value: u128) -> DecodedTransaction {
        DecodedTransaction {
            sender,
            nonce,
            to,
            value,
            gas_price: 10,
            gas_limit: 100_000,
            payload: Vec::new(),
            chain_id: 1,
            signature: [0u8; 64],
            hash: H256([nonce as u8; 32]),
        }
    }

    #[test]
    fn test_transfer_accounting() {
        let ledger = Ledger::in_memory(&genesis(), LedgerConfig::default()).unwrap();
        let view = ledger.derive_view(ledger.head().state_root).unwrap();

        let (next, receipt) = ledger
            .apply_transaction(&view, &tx(addr(1), 0, Some(addr(3)), 10))
            .unwrap();

        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.fee, 210_000);
        assert_eq!(next.balance(&addr(1)), 1_000_000_000 - 10 - 210_000);
        assert_eq!(next.nonce(&addr(1)), 1);
        assert_eq!(next.balance(&addr(3)), 10);
        // Parent view untouched
        assert_eq!(view.balance(&addr(1)), 1_000_000_000);
    }

    #[test]
    fn test_rejections_leave_view_untouched() {
        let ledger = Ledger::in_memory(&genesis(), LedgerConfig::default()).unwrap();
        let view = ledger.derive_view(ledger.head().state_root).unwrap();

        let bad_nonce = ledger.apply_transaction(&view, &tx(addr(1), 5, Some(addr(3)), 1));
        assert_eq!(bad_nonce.unwrap_err(), ResultCode::BadNonce);

        let poor = ledger.apply_transaction(&view, &tx(addr(2), 0, Some(addr(3)), 1));
        assert_eq!(poor.unwrap_err(), ResultCode::InsufficientFunds);

        let mut low_gas = tx(addr(1), 0, Some(addr(3)), 1);
        low_gas.gas_limit = 20_999;
        assert_eq!(
            ledger.apply_transaction(&view, &low_gas).unwrap_err(),
            ResultCode::GasLimitExceeded
        );

        assert!(!view.is_dirty());
    }

    #[test]
    fn test_contract_creation_stores_code() {
        let ledger = Ledger::in_memory(&genesis(), LedgerConfig::default()).unwrap();
        let view = ledger.derive_view(ledger.head().state_root).unwrap();

        let mut create = tx(addr(1), 0, None, 0);
        create.payload = vec![0x60, 0x00];
        let (next, receipt) = ledger.apply_transaction(&view, &create).unwrap();

        let created = receipt.contract_address.unwrap();
        assert_eq!(created, contract_address(&addr(1), 0));
        assert_eq!(next.account(&created).code, vec![0x60, 0x00]);
        assert_eq!(receipt.gas_used, 53_000 + 68 + 4);
    }

    #[test]
    fn test_self_transfer_only_costs_fee() {
        let ledger = Ledger::in_memory(&genesis(), LedgerConfig::default()).unwrap();
        let view = ledger.derive_view(ledger.head().state_root).unwrap();
        let (next, receipt) = ledger
            .apply_transaction(&view, &tx(addr(1), 0, Some(addr(1)), 1_000))
            .unwrap();
        assert_eq!(next.balance(&addr(1)), 1_000_000_000 - receipt.fee);
    }

    #[test]
    fn test_write_block_is_deterministic() {
        let a = Ledger::in_memory(&genesis(), LedgerConfig::default()).unwrap();
        let b = Ledger::in_memory(&genesis(), LedgerConfig::default()).unwrap();
        assert_eq!(a.head().state_root, b.head().state_root);

        let header = HeaderContext::new(1, 1);
        let mut roots = Vec::new();
        for ledger in [&a, &b] {
            let view = ledger.derive_view(ledger.head().state_root).unwrap();
            let (view, r1) = ledger
                .apply_transaction(&view, &tx(addr(1), 0, Some(addr(2)), 7))
                .unwrap();
            let (view, r2) = ledger
                .apply_transaction(&view, &tx(addr(1), 1, Some(addr(3)), 9))
                .unwrap();
            roots.push(ledger.write_block(&view, &header, &[r1, r2]).unwrap());
        }

        assert_eq!(roots[0], roots[1]);
        assert_eq!(a.head().height, 1);
        assert_eq!(a.head().state_root, roots[0]);
    }

    #[test]
    fn test_stale_view_rejected() {
        let ledger = Ledger::in_memory(&genesis(), LedgerConfig::default()).unwrap();
        let genesis_root = ledger.head().state_root;
        let stale = ledger.derive_view(genesis_root).unwrap();

        let (view, _) = ledger
            .apply_transaction(&stale, &tx(addr(1), 0, Some(addr(2)), 1))
            .unwrap();
        ledger.write_block(&view, &HeaderContext::new(1, 1), &[]).unwrap();

        let err = ledger
            .write_block(&stale, &HeaderContext::new(2, 2), &[])
            .unwrap_err();
        assert!(matches!(err, EngineError::StaleView { .. }));
    }

    #[test]
    fn test_history_is_pruned() {
        let ledger = Ledger::in_memory(&genesis(), LedgerConfig { state_history: 2 }).unwrap();
        let genesis_root = ledger.head().state_root;

        for height in 1..=3u64 {
            let view = ledger.derive_view(ledger.head().state_root).unwrap();
            let (view, _) = ledger
                .apply_transaction(&view, &tx(addr(1), height - 1, Some(addr(2)), 1))
                .unwrap();
            ledger
                .write_block(&view, &HeaderContext::new(height, height), &[])
                .unwrap();
        }

        assert_eq!(ledger.retained_states(), 2);
        assert!(matches!(
            ledger.derive_view(genesis_root),
            Err(EngineError::UnknownRoot(_))
        ));
        assert!(ledger.derive_view(ledger.head().state_root).is_ok());
    }

    #[test]
    fn test_reopen_restores_head_and_accounts() {
        let dir = tempdir().unwrap();
        let committed_root = {
            let ledger = Ledger::open(dir.path(), &genesis(), LedgerConfig::default()).unwrap();
            let view = ledger.derive_view(ledger.head().state_root).unwrap();
            let (view, receipt) = ledger
                .apply_transaction(&view, &tx(addr(1), 0, Some(addr(4)), 99))
                .unwrap();
            ledger
                .write_block(&view, &HeaderContext::new(1, 5), &[receipt])
                .unwrap()
        };

        let reopened = Ledger::open(dir.path(), &genesis(), LedgerConfig::default()).unwrap();
        let head = reopened.head();
        assert_eq!(head.height, 1);
        assert_eq!(head.timestamp, 5);
        assert_eq!(head.state_root, committed_root);

        let view = reopened.derive_view(head.state_root).unwrap();
        assert_eq!(view.balance(&addr(4)), 99);
        assert_eq!(view.nonce(&addr(1)), 1);

        let record = reopened.block(1).unwrap().unwrap();
        assert_eq!(record.receipts.len(), 1);
        assert_eq!(record.state_root, committed_root);
    }
}
