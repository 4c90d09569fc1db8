//! Subscription Manager - Manages WebSocket subscriptions
//!
//! Handles account subscriptions and fans committed-block updates out to
//! subscribers.

use bft_app::CommittedBlock;
use bft_ledger::Account;
use bft_types::Address;
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};

/// Subscription ID
pub type SubscriptionId = u64;

/// Account update notification
#[derive(Clone, Debug)]
pub struct AccountNotification {
    pub subscription_id: SubscriptionId,
    pub address: Address,
    /// Height of the block that modified the account
    pub height: u64,
    pub account: Account,
}

/// Subscription entry
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub address: Address,
    pub sender: broadcast::Sender<AccountNotification>,
}

/// Manages WebSocket subscriptions
pub struct SubscriptionManager {
    /// Active subscriptions by ID
    subscriptions: DashMap<SubscriptionId, Subscription>,
    /// Subscriptions by address for efficient lookup
    address_subscriptions: DashMap<Address, Vec<SubscriptionId>>,
    /// Next subscription ID
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            address_subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to account updates
    pub fn subscribe_account(
        &self,
        address: Address,
    ) -> (SubscriptionId, broadcast::Receiver<AccountNotification>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = broadcast::channel(64);

        let subscription = Subscription {
            id,
            address,
            sender,
        };

        self.subscriptions.insert(id, subscription);

        // Add to address index
        self.address_subscriptions
            .entry(address)
            .or_default()
            .push(id);

        tracing::debug!("Created subscription {} for account {}", id, address);

        (id, receiver)
    }

    /// Unsubscribe from account updates
    ///
    /// Dropping the subscription's sender ends every receiver for it.
    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> bool {
        if let Some((_, sub)) = self.subscriptions.remove(&subscription_id) {
            // Remove from address index
            let now_empty = match self.address_subscriptions.get_mut(&sub.address) {
                Some(mut subs) => {
                    subs.retain(|&id| id != subscription_id);
                    subs.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.address_subscriptions
                    .remove_if(&sub.address, |_, subs| subs.is_empty());
            }
            tracing::debug!("Removed subscription {}", subscription_id);
            true
        } else {
            false
        }
    }

    /// Notify subscribers of account update
    pub fn notify_account_update(&self, address: &Address, height: u64, account: &Account) {
        if let Some(sub_ids) = self.address_subscriptions.get(address) {
            for &sub_id in sub_ids.iter() {
                if let Some(sub) = self.subscriptions.get(&sub_id) {
                    let notification = AccountNotification {
                        subscription_id: sub_id,
                        address: *address,
                        height,
                        account: account.clone(),
                    };

                    // Ignore send errors (subscriber might have disconnected)
                    let _ = sub.sender.send(notification);
                }
            }
        }
    }

    /// Notify subscribers of every account a committed block touched
    pub fn notify_block(&self, block: &CommittedBlock) {
        for (address, account) in &block.accounts {
            self.notify_account_update(address, block.header.height, account);
        }
    }

    /// Forward committed blocks from the application to subscribers
    pub fn spawn_commit_listener(
        self: Arc<Self>,
        mut commits: broadcast::Receiver<CommittedBlock>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match commits.recv().await {
                    Ok(block) => self.notify_block(&block),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!("Subscription listener lagged, {} blocks skipped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Get subscription count
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if a subscription exists
    pub fn has_subscription(&self, subscription_id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&subscription_id)
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bft_types::{HeaderContext, H256};

    #[tokio::test]
    async fn test_subscribe_and_notify() {
        let manager = SubscriptionManager::new();
        let address = Address([7; 20]);

        let (sub_id, mut receiver) = manager.subscribe_account(address);
        assert_eq!(sub_id, 1);

        manager.notify_account_update(&address, 1, &Account::with_balance(100));

        let notification = receiver.recv().await.unwrap();
        assert_eq!(notification.subscription_id, sub_id);
        assert_eq!(notification.address, address);
        assert_eq!(notification.account.balance, 100);
    }

    #[test]
    fn test_unsubscribe() {
        let manager = SubscriptionManager::new();
        let address = Address([7; 20]);

        let (sub_id, mut receiver) = manager.subscribe_account(address);
        assert!(manager.has_subscription(sub_id));

        assert!(manager.unsubscribe(sub_id));
        assert!(!manager.has_subscription(sub_id));
        assert!(!manager.unsubscribe(sub_id));
        assert!(matches!(
            receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_commit_listener_only_notifies_touched_accounts() {
        let manager = Arc::new(SubscriptionManager::new());
        let touched = Address([1; 20]);
        let untouched = Address([2; 20]);
        let (_, mut touched_rx) = manager.subscribe_account(touched);
        let (_, mut untouched_rx) = manager.subscribe_account(untouched);

        let (commits, rx) = broadcast::channel(4);
        let listener = manager.clone().spawn_commit_listener(rx);

        commits
            .send(CommittedBlock {
                header: HeaderContext::new(3, 30),
                state_root: H256::zero(),
                receipts: Vec::new(),
                accounts: vec![(touched, Account::with_balance(5))],
            })
            .unwrap();
        drop(commits);
        listener.await.unwrap();

        let notification = touched_rx.recv().await.unwrap();
        assert_eq!(notification.height, 3);
        assert_eq!(notification.account.balance, 5);
        assert!(untouched_rx.try_recv().is_err());
    }
}
