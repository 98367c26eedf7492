//! Transaction and read-state storage.
//!
//! Transactions are grouped per `(protocol, network, raw address)` and are
//! idempotent per transaction hash: storing a transaction twice keeps one
//! copy. Listing order is stable across calls as long as no new
//! transactions arrive.
//!
//! Read state is a boolean keyed by message id. A missing record means
//! unread, never an error.

use std::collections::HashMap;
use std::sync::RwLock;

use chainmail_protocol::{MessageId, Protocol, Transaction};

use crate::{Result, StoreError};

/// Persistent state consumed by the receive pipeline.
pub trait StateStore: Send + Sync {
    /// All known transactions for an address.
    fn get_transactions(
        &self,
        protocol: Protocol,
        network: &str,
        address: &[u8],
    ) -> Result<Vec<Transaction>>;

    /// Record a transaction. Returns `false` if its hash was already known.
    fn put_transaction(
        &self,
        protocol: Protocol,
        network: &str,
        address: &[u8],
        transaction: &Transaction,
    ) -> Result<bool>;

    /// Whether a message has been read. Absent records are unread.
    fn get_read_status(&self, id: &MessageId) -> Result<bool>;

    /// Record the read flag for a message.
    fn set_read_status(&self, id: &MessageId, read: bool) -> Result<()>;

    /// Forget the read flag for a message.
    fn delete_read_status(&self, id: &MessageId) -> Result<()>;
}

type AddressKey = (Protocol, String, Vec<u8>);

/// In-memory [`StateStore`]. Transactions are listed in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    transactions: RwLock<HashMap<AddressKey, Vec<Transaction>>>,
    read_status: RwLock<HashMap<MessageId, bool>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get_transactions(
        &self,
        protocol: Protocol,
        network: &str,
        address: &[u8],
    ) -> Result<Vec<Transaction>> {
        let transactions = self
            .transactions
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(transactions
            .get(&(protocol, network.to_string(), address.to_vec()))
            .cloned()
            .unwrap_or_default())
    }

    fn put_transaction(
        &self,
        protocol: Protocol,
        network: &str,
        address: &[u8],
        transaction: &Transaction,
    ) -> Result<bool> {
        let mut transactions = self
            .transactions
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let list = transactions
            .entry((protocol, network.to_string(), address.to_vec()))
            .or_default();

        if list.iter().any(|known| known.hash == transaction.hash) {
            return Ok(false);
        }
        list.push(transaction.clone());
        Ok(true)
    }

    fn get_read_status(&self, id: &MessageId) -> Result<bool> {
        let status = self
            .read_status
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(status.get(id).copied().unwrap_or(false))
    }

    fn set_read_status(&self, id: &MessageId, read: bool) -> Result<()> {
        self.read_status
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(*id, read);
        Ok(())
    }

    fn delete_read_status(&self, id: &MessageId) -> Result<()> {
        self.read_status
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: [u8; 20] = [0xa1; 20];
    const BOB: [u8; 20] = [0xb0; 20];

    fn id(byte: u8) -> MessageId {
        MessageId::from_bytes(&[byte; 18]).unwrap()
    }

    #[test]
    fn test_transactions_are_per_address() {
        let store = MemoryStateStore::new();
        let tx = Transaction::new(10, vec![1], vec![0x01]);
        store
            .put_transaction(Protocol::Ethereum, "mainnet", &ALICE, &tx)
            .unwrap();

        assert_eq!(
            store
                .get_transactions(Protocol::Ethereum, "mainnet", &ALICE)
                .unwrap(),
            vec![tx]
        );
        assert!(store
            .get_transactions(Protocol::Ethereum, "mainnet", &BOB)
            .unwrap()
            .is_empty());
        assert!(store
            .get_transactions(Protocol::Ethereum, "sepolia", &ALICE)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_put_is_idempotent_per_hash() {
        let store = MemoryStateStore::new();
        let tx = Transaction::new(10, vec![1], vec![0x01]);
        assert!(store
            .put_transaction(Protocol::Ethereum, "mainnet", &ALICE, &tx)
            .unwrap());
        assert!(!store
            .put_transaction(Protocol::Ethereum, "mainnet", &ALICE, &tx)
            .unwrap());
        assert_eq!(
            store
                .get_transactions(Protocol::Ethereum, "mainnet", &ALICE)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_listing_order_is_stable() {
        let store = MemoryStateStore::new();
        for (block, hash) in [(5, 3u8), (2, 1), (9, 2)] {
            let tx = Transaction::new(block, vec![hash], vec![]);
            store
                .put_transaction(Protocol::Algorand, "testnet", &ALICE, &tx)
                .unwrap();
        }
        let first = store
            .get_transactions(Protocol::Algorand, "testnet", &ALICE)
            .unwrap();
        let second = store
            .get_transactions(Protocol::Algorand, "testnet", &ALICE)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|t| t.block_number).collect::<Vec<_>>(),
            vec![5, 2, 9]
        );
    }

    #[test]
    fn test_read_status_defaults_to_unread() {
        let store = MemoryStateStore::new();
        assert!(!store.get_read_status(&id(1)).unwrap());

        store.set_read_status(&id(1), true).unwrap();
        assert!(store.get_read_status(&id(1)).unwrap());
        assert!(!store.get_read_status(&id(2)).unwrap());

        store.set_read_status(&id(1), false).unwrap();
        assert!(!store.get_read_status(&id(1)).unwrap());

        store.set_read_status(&id(1), true).unwrap();
        store.delete_read_status(&id(1)).unwrap();
        assert!(!store.get_read_status(&id(1)).unwrap());
    }
}
