//! Persistence layer for committed ledger state
//!
//! Uses a sled embedded database. Every committed block writes the accounts
//! it touched, a block record and the new chain head in one transaction,
//! then flushes, so the stored accounts always hash to the stored head.

use crate::{
    account::Account,
    state_view::Accounts,
};
use bft_types::{Address, HeaderContext, Receipt, H256};
use serde::{Deserialize, Serialize};
use sled::{
    transaction::{ConflictableTransactionError, TransactionError, TransactionalTree},
    Db, Transactional,
};
use std::path::Path;

const HEAD_KEY: &str = "head";

/// Last committed block
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainHead {
    /// Height of the last committed block, 0 for genesis
    pub height: u64,
    /// Timestamp of the last committed block
    pub timestamp: u64,
    /// Root of the committed state
    pub state_root: H256,
}

/// What gets stored per committed block
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub header: HeaderContext,
    pub parent_root: H256,
    pub state_root: H256,
    pub receipts: Vec<Receipt>,
}

/// Serialized writes of one commit, ready to apply inside a transaction
struct StagedWrite {
    accounts: Vec<(Address, Vec<u8>)>,
    block: Option<([u8; 8], Vec<u8>)>,
    head: Vec<u8>,
}

impl StagedWrite {
    fn new<'a, I>(accounts: I, record: Option<&BlockRecord>, head: &ChainHead) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (&'a Address, &'a Account)>,
    {
        let accounts = accounts
            .into_iter()
            .map(|(address, account)| Ok((*address, bincode::serialize(account)?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let block = match record {
            Some(record) => Some((record.header.height.to_be_bytes(), bincode::serialize(record)?)),
            None => None,
        };

        Ok(Self {
            accounts,
            block,
            head: bincode::serialize(head)?,
        })
    }

    fn stage_accounts(
        &self,
        tree: &TransactionalTree,
    ) -> Result<(), ConflictableTransactionError<()>> {
        for (address, value) in &self.accounts {
            tree.insert(address.as_ref(), value.as_slice())?;
        }
        Ok(())
    }
}

/// Persistent storage for committed state
pub struct PersistentStore {
    /// Sled database instance
    db: Db,
    /// Address -> account
    accounts: sled::Tree,
    /// Big-endian height -> block record
    blocks: sled::Tree,
    /// Chain head
    metadata: sled::Tree,
}

impl PersistentStore {
    /// Open or create a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let accounts = db.open_tree("accounts")?;
        let blocks = db.open_tree("blocks")?;
        let metadata = db.open_tree("metadata")?;

        tracing::info!("Opened persistent store at {:?}", path.as_ref());

        Ok(Self {
            db,
            accounts,
            blocks,
            metadata,
        })
    }

    /// Persist the genesis state as height 0
    pub fn write_genesis(&self, accounts: &Accounts, head: &ChainHead) -> anyhow::Result<()> {
        let staged = StagedWrite::new(accounts.iter(), None, head)?;
        self.commit(&staged)
    }

    /// Persist one committed block
    ///
    /// Accounts, block record and head land in one transaction across the
    /// three trees; after a crash either all of them are on disk or none.
    pub fn write_block(
        &self,
        record: &BlockRecord,
        touched: &[(Address, Account)],
        head: &ChainHead,
    ) -> anyhow::Result<()> {
        let staged = StagedWrite::new(
            touched.iter().map(|(address, account)| (address, account)),
            Some(record),
            head,
        )?;
        self.commit(&staged)
    }

    fn commit(&self, staged: &StagedWrite) -> anyhow::Result<()> {
        (&self.accounts, &self.blocks, &self.metadata)
            .transaction(|(accounts, blocks, metadata)| {
                staged.stage_accounts(accounts)?;
                if let Some((key, value)) = &staged.block {
                    blocks.insert(&key[..], value.as_slice())?;
                }
                metadata.insert(HEAD_KEY, staged.head.as_slice())?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| {
                anyhow::anyhow!("commit transaction failed: {:?}", e)
            })?;
        self.flush()
    }

    /// Load the chain head, `None` for a fresh database
    pub fn load_head(&self) -> anyhow::Result<Option<ChainHead>> {
        match self.metadata.get(HEAD_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get one account
    #[cfg(test)]
    fn get_account(&self, address: &Address) -> anyhow::Result<Option<Account>> {
        match self.accounts.get(address.as_ref())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load every stored account
    pub fn load_accounts(&self) -> anyhow::Result<Accounts> {
        let mut accounts = Accounts::new();

        for result in self.accounts.iter() {
            let (key, value) = result?;
            let address = Address::from_slice(&key)
                .map_err(|_| anyhow::anyhow!("Invalid address length in accounts tree"))?;
            let account: Account = bincode::deserialize(&value)?;
            accounts.insert(address, account);
        }

        Ok(accounts)
    }

    /// Load a committed block by height
    pub fn load_block(&self, height: u64) -> anyhow::Result<Option<BlockRecord>> {
        match self.blocks.get(height.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Get the number of stored accounts
    #[cfg(test)]
    fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_load_block() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();

        let address = Address([3u8; 20]);
        let account = Account {
            nonce: 2,
            balance: 1_000,
            code: vec![1, 2, 3],
        };
        let record = BlockRecord {
            header: HeaderContext::new(1, 10),
            parent_root: H256([1u8; 32]),
            state_root: H256([2u8; 32]),
            receipts: Vec::new(),
        };
        let head = ChainHead {
            height: 1,
            timestamp: 10,
            state_root: H256([2u8; 32]),
        };

        store
            .write_block(&record, &[(address, account.clone())], &head)
            .unwrap();

        assert_eq!(store.load_head().unwrap(), Some(head));
        assert_eq!(store.get_account(&address).unwrap(), Some(account));
        assert_eq!(store.load_block(1).unwrap(), Some(record));
        assert_eq!(store.load_block(2).unwrap(), None);
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn test_interrupted_write_leaves_previous_head() {
        use crate::{
            engine::{ExecutionEngine, Ledger, LedgerConfig},
            genesis::Genesis,
        };
        use bft_types::DecodedTransaction;

        let dir = tempdir().unwrap();
        let sender = Address([1u8; 20]);
        let recipient = Address([2u8; 20]);
        let genesis = Genesis::new(1).with_balance(sender, 1_000_000_000);

        let (genesis_root, record, touched, head) = {
            let ledger = Ledger::open(dir.path(), &genesis, LedgerConfig::default()).unwrap();
            let genesis_root = ledger.head().state_root;
            let view = ledger.derive_view(genesis_root).unwrap();
            let tx = DecodedTransaction {
                sender,
                nonce: 0,
                to: Some(recipient),
                value: 10,
                gas_price: 1,
                gas_limit: 21_000,
                payload: Vec::new(),
                chain_id: 1,
                signature: [0u8; 64],
                hash: H256([9u8; 32]),
            };
            let (view, receipt) = ledger.apply_transaction(&view, &tx).unwrap();
            let merged = view.merged();
            let head = ChainHead {
                height: 1,
                timestamp: 1,
                state_root: crate::state_view::compute_state_root(&merged),
            };
            let record = BlockRecord {
                header: HeaderContext::new(1, 1),
                parent_root: genesis_root,
                state_root: head.state_root,
                receipts: vec![receipt],
            };
            (genesis_root, record, view.touched(), head)
        };

        // Accounts staged, then the write dies before block and head
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            let staged = StagedWrite::new(
                touched.iter().map(|(address, account)| (address, account)),
                Some(&record),
                &head,
            )
            .unwrap();
            let result = (&store.accounts, &store.blocks, &store.metadata).transaction(
                |(accounts, _, _)| {
                    staged.stage_accounts(accounts)?;
                    Err::<(), _>(ConflictableTransactionError::Abort(()))
                },
            );
            assert!(matches!(result, Err(TransactionError::Abort(()))));
            assert_eq!(store.get_account(&recipient).unwrap(), None);
        }

        let reopened = Ledger::open(dir.path(), &genesis, LedgerConfig::default()).unwrap();
        assert_eq!(reopened.head().height, 0);
        assert_eq!(reopened.head().state_root, genesis_root);
        drop(reopened);

        // The full write goes through and reopens at the new head
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            store.write_block(&record, &touched, &head).unwrap();
        }
        let reopened = Ledger::open(dir.path(), &genesis, LedgerConfig::default()).unwrap();
        assert_eq!(reopened.head(), head);
        let view = reopened.derive_view(head.state_root).unwrap();
        assert_eq!(view.balance(&recipient), 10);
    }

    #[test]
    fn test_fresh_store_has_no_head() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(store.load_head().unwrap(), None);
        assert!(store.load_accounts().unwrap().is_empty());
    }
}
