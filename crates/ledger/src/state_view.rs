//! Account state views
//!
//! A view is an immutable snapshot: a committed base map shared behind an
//! `Arc`, plus a copy-on-write overlay holding every account written since
//! the view was derived. Deriving a view from a committed root is two `Arc`
//! clones, so re-deriving after every commit costs nothing proportional to
//! the size of the state.

use crate::account::Account;
use bft_types::{Address, H256};
use std::{collections::BTreeMap, sync::Arc};

/// Ordered account map; ordering makes root computation deterministic
pub type Accounts = BTreeMap<Address, Account>;

/// Compute the state root of a full account set
pub fn compute_state_root(accounts: &Accounts) -> H256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(accounts.len() as u64).to_le_bytes());
    for (address, account) in accounts {
        hasher.update(address.as_ref());
        account.hash_into(&mut hasher);
    }
    H256(*hasher.finalize().as_bytes())
}

/// Immutable view of account state rooted at a committed block
#[derive(Clone, Debug)]
pub struct StateView {
    /// Root of the committed state this view descends from
    base_root: H256,
    base: Arc<Accounts>,
    overlay: Arc<Accounts>,
}

impl StateView {
    /// View of committed state with no pending writes
    pub fn new(base_root: H256, base: Arc<Accounts>) -> Self {
        Self {
            base_root,
            base,
            overlay: Arc::new(Accounts::new()),
        }
    }

    pub fn base_root(&self) -> H256 {
        self.base_root
    }

    /// Account at `address`, zero account if absent
    pub fn account(&self, address: &Address) -> Account {
        self.overlay
            .get(address)
            .or_else(|| self.base.get(address))
            .cloned()
            .unwrap_or_default()
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.overlay
            .get(address)
            .or_else(|| self.base.get(address))
            .map(|a| a.nonce)
            .unwrap_or(0)
    }

    pub fn balance(&self, address: &Address) -> u128 {
        self.overlay
            .get(address)
            .or_else(|| self.base.get(address))
            .map(|a| a.balance)
            .unwrap_or(0)
    }

    /// Whether any account was written since derivation
    pub fn is_dirty(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// Accounts written since derivation, in address order
    pub fn touched(&self) -> Vec<(Address, Account)> {
        self.overlay
            .iter()
            .map(|(address, account)| (*address, account.clone()))
            .collect()
    }

    /// Derive a new view with `updates` applied on top of this one
    pub fn with_accounts<I>(&self, updates: I) -> StateView
    where
        I: IntoIterator<Item = (Address, Account)>,
    {
        let mut overlay = Arc::clone(&self.overlay);
        let writes = Arc::make_mut(&mut overlay);
        for (address, account) in updates {
            writes.insert(address, account);
        }
        Self {
            base_root: self.base_root,
            base: Arc::clone(&self.base),
            overlay,
        }
    }

    /// Full account set with the overlay folded into the base
    pub fn merged(&self) -> Accounts {
        let mut accounts = (*self.base).clone();
        for (address, account) in self.overlay.iter() {
            accounts.insert(*address, account.clone());
        }
        accounts
    }

    /// State root this view would commit to
    pub fn state_root(&self) -> H256 {
        if self.is_dirty() {
            compute_state_root(&self.merged())
        } else {
            self.base_root
        }
    }
}
