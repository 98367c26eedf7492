//! sled-backed [`StateStore`] and [`ContentCache`].
//!
//! ## Trees
//!
//! | Tree           | Key                                        | Value                 |
//! |----------------|--------------------------------------------|-----------------------|
//! | `transactions` | address prefix, ordered block number, hash | bincode `Transaction` |
//! | `tx_index`     | address prefix, hash                       | `transactions` key    |
//! | `read_status`  | message id                                 | `0` or `1`            |
//! | `content`      | location cache key                         | plaintext or sealed   |
//!
//! The address prefix is length-delimited (u32 big-endian per part) so that one address's keys
//! never prefix another's. Block numbers are stored big-endian with the
//! sign bit flipped, which makes a prefix scan return transactions ordered
//! by block number and then by hash. Both trees are written in one sled
//! transaction.
//!
//! ## Cache Encryption
//!
//! With [`SledStore::with_cache_key`] cached plaintext is sealed with
//! XChaCha20-Poly1305 before it reaches disk. Transactions and read state
//! are not secret and stay in the clear.

use std::path::{Path, PathBuf};

use chainmail_crypto::symmetric::{decrypt, encrypt, EncryptedData, SymmetricKey};
use chainmail_protocol::{MessageId, Protocol, Transaction};
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::Transactional;
use tracing::debug;

use crate::{ContentCache, Result, StateStore, StoreError};

const TRANSACTIONS_TREE: &str = "transactions";
const TX_INDEX_TREE: &str = "tx_index";
const READ_STATUS_TREE: &str = "read_status";
const CONTENT_TREE: &str = "content";

/// State store and content cache on one sled database.
pub struct SledStore {
    db: sled::Db,
    transactions: sled::Tree,
    tx_index: sled::Tree,
    read_status: sled::Tree,
    content: sled::Tree,
    cache_key: Option<SymmetricKey>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("path", &self.path)
            .field("encrypted_cache", &self.cache_key.is_some())
            .finish_non_exhaustive()
    }
}

impl SledStore {
    /// Open or create a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if sled cannot open the directory.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        let mut store = Self::from_db(db)?;
        store.path = Some(path.to_path_buf());
        debug!(path = %path.display(), "opened sled store");
        Ok(store)
    }

    /// Create a store that is deleted when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            transactions: db.open_tree(TRANSACTIONS_TREE)?,
            tx_index: db.open_tree(TX_INDEX_TREE)?,
            read_status: db.open_tree(READ_STATUS_TREE)?,
            content: db.open_tree(CONTENT_TREE)?,
            db,
            cache_key: None,
            path: None,
        })
    }

    /// Seal cached plaintext under `key`.
    ///
    /// Entries written without a key (or under another key) read back as
    /// corruption.
    pub fn with_cache_key(mut self, key: SymmetricKey) -> Self {
        self.cache_key = Some(key);
        self
    }

    /// Directory backing this store, if not temporary.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn address_prefix(protocol: Protocol, network: &str, address: &[u8]) -> Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(12 + network.len() + address.len() + 40);
    for part in [protocol.as_str().as_bytes(), network.as_bytes(), address] {
        let len = u32::try_from(part.len())
            .map_err(|_| StoreError::Database(format!("key part of {} bytes", part.len())))?;
        prefix.extend_from_slice(&len.to_be_bytes());
        prefix.extend_from_slice(part);
    }
    Ok(prefix)
}

fn ordered_block(block_number: i64) -> [u8; 8] {
    ((block_number as u64) ^ (1 << 63)).to_be_bytes()
}

impl StateStore for SledStore {
    fn get_transactions(
        &self,
        protocol: Protocol,
        network: &str,
        address: &[u8],
    ) -> Result<Vec<Transaction>> {
        self.transactions
            .scan_prefix(address_prefix(protocol, network, address)?)
            .values()
            .map(|value| {
                let value = value?;
                Transaction::from_bytes(&value)
                    .map_err(|e| StoreError::Corruption(format!("transaction record: {}", e)))
            })
            .collect()
    }

    fn put_transaction(
        &self,
        protocol: Protocol,
        network: &str,
        address: &[u8],
        transaction: &Transaction,
    ) -> Result<bool> {
        let prefix = address_prefix(protocol, network, address)?;

        let mut index_key = prefix.clone();
        index_key.extend_from_slice(&transaction.hash);

        let mut record_key = prefix;
        record_key.extend_from_slice(&ordered_block(transaction.block_number));
        record_key.extend_from_slice(&transaction.hash);

        let record = transaction.to_bytes()?;

        // An index entry only counts when its record exists.
        let added = (&self.tx_index, &self.transactions)
            .transaction(|(index, records)| -> ConflictableTransactionResult<bool, StoreError> {
                if let Some(existing) = index.get(index_key.as_slice())? {
                    if records.get(existing)?.is_some() {
                        return Ok(false);
                    }
                }
                index.insert(index_key.as_slice(), record_key.as_slice())?;
                records.insert(record_key.as_slice(), record.as_slice())?;
                Ok(true)
            })
            .map_err(|e: TransactionError<StoreError>| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => e.into(),
            })?;
        if !added {
            return Ok(false);
        }

        debug!(
            protocol = %protocol,
            network = %network,
            block = transaction.block_number,
            "stored transaction"
        );
        Ok(true)
    }

    fn get_read_status(&self, id: &MessageId) -> Result<bool> {
        Ok(matches!(
            self.read_status.get(id.as_bytes())?.as_deref(),
            Some([1])
        ))
    }

    fn set_read_status(&self, id: &MessageId, read: bool) -> Result<()> {
        self.read_status.insert(id.as_bytes(), &[u8::from(read)][..])?;
        Ok(())
    }

    fn delete_read_status(&self, id: &MessageId) -> Result<()> {
        self.read_status.remove(id.as_bytes())?;
        Ok(())
    }
}

impl ContentCache for SledStore {
    fn get(&self, locator: &str) -> Result<Option<Vec<u8>>> {
        let Some(stored) = self.content.get(locator.as_bytes())? else {
            return Ok(None);
        };
        match &self.cache_key {
            None => Ok(Some(stored.to_vec())),
            Some(key) => {
                let sealed = EncryptedData::from_bytes(&stored)
                    .map_err(|e| StoreError::Corruption(format!("cache entry: {}", e)))?;
                let plaintext = decrypt(key, &sealed)
                    .map_err(|e| StoreError::Corruption(format!("cache entry: {}", e)))?;
                Ok(Some(plaintext))
            }
        }
    }

    fn put(&self, locator: &str, plaintext: &[u8]) -> Result<()> {
        let stored = match &self.cache_key {
            None => plaintext.to_vec(),
            Some(key) => encrypt(key, plaintext)?.to_bytes(),
        };
        self.content.insert(locator.as_bytes(), stored)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ALICE: [u8; 20] = [0xa1; 20];

    fn id(byte: u8) -> MessageId {
        MessageId::from_bytes(&[byte; 18]).unwrap()
    }

    #[test]
    fn test_transactions_ordered_by_block() {
        let store = SledStore::temporary().unwrap();
        for (block, hash) in [(7, 2u8), (-1, 9), (7, 1), (3, 4)] {
            let tx = Transaction::new(block, vec![hash], vec![0x01]);
            assert!(store
                .put_transaction(Protocol::Ethereum, "mainnet", &ALICE, &tx)
                .unwrap());
        }

        let listed = store
            .get_transactions(Protocol::Ethereum, "mainnet", &ALICE)
            .unwrap();
        let order: Vec<_> = listed
            .iter()
            .map(|t| (t.block_number, t.hash[0]))
            .collect();
        assert_eq!(order, vec![(-1, 9), (3, 4), (7, 1), (7, 2)]);
    }

    #[test]
    fn test_put_is_idempotent_per_hash() {
        let store = SledStore::temporary().unwrap();
        let tx = Transaction::new(1, vec![0xee; 32], vec![0x01]);
        assert!(store
            .put_transaction(Protocol::Substrate, "polkadot", &ALICE, &tx)
            .unwrap());
        assert!(!store
            .put_transaction(Protocol::Substrate, "polkadot", &ALICE, &tx)
            .unwrap());
        assert_eq!(
            store
                .get_transactions(Protocol::Substrate, "polkadot", &ALICE)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_addresses_do_not_bleed() {
        let store = SledStore::temporary().unwrap();
        let short = [0x01u8];
        let long = [0x01u8, 0x02];
        store
            .put_transaction(
                Protocol::Ethereum,
                "mainnet",
                &long,
                &Transaction::new(1, vec![1], vec![]),
            )
            .unwrap();
        assert!(store
            .get_transactions(Protocol::Ethereum, "mainnet", &short)
            .unwrap()
            .is_empty());
        assert!(store
            .get_transactions(Protocol::Ethereum, "main", &long)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_long_network_does_not_alias_short_one() {
        let store = SledStore::temporary().unwrap();
        // 0x10001 bytes; a 16-bit length would read as 1.
        let long_network = "a".repeat(0x1_0001);
        store
            .put_transaction(
                Protocol::Ethereum,
                &long_network,
                &ALICE,
                &Transaction::new(1, vec![1], vec![]),
            )
            .unwrap();

        // Under a 16-bit length this prefix is a prefix of the one above.
        let aliased = vec![b'a'; 0x6161];
        assert!(store
            .get_transactions(Protocol::Ethereum, "a", &aliased)
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .get_transactions(Protocol::Ethereum, &long_network, &ALICE)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_index_without_record_is_rewritten() {
        let store = SledStore::temporary().unwrap();
        let tx = Transaction::new(4, vec![0x44; 32], vec![0x01]);

        // Index entry left behind without its record.
        let mut index_key = address_prefix(Protocol::Ethereum, "mainnet", &ALICE).unwrap();
        index_key.extend_from_slice(&tx.hash);
        store.tx_index.insert(index_key, &b"missing"[..]).unwrap();

        assert!(store
            .put_transaction(Protocol::Ethereum, "mainnet", &ALICE, &tx)
            .unwrap());
        assert_eq!(
            store
                .get_transactions(Protocol::Ethereum, "mainnet", &ALICE)
                .unwrap(),
            vec![tx.clone()]
        );
        assert!(!store
            .put_transaction(Protocol::Ethereum, "mainnet", &ALICE, &tx)
            .unwrap());
    }

    #[test]
    fn test_concurrent_puts_store_once() {
        let store = std::sync::Arc::new(SledStore::temporary().unwrap());
        let tx = Transaction::new(9, vec![0x99; 32], vec![0x01]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let tx = tx.clone();
                std::thread::spawn(move || {
                    store
                        .put_transaction(Protocol::Ethereum, "mainnet", &ALICE, &tx)
                        .unwrap()
                })
            })
            .collect();
        let added = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|added| *added)
            .count();

        assert_eq!(added, 1);
        assert_eq!(
            store
                .get_transactions(Protocol::Ethereum, "mainnet", &ALICE)
                .unwrap(),
            vec![tx]
        );
    }

    #[test]
    fn test_read_status() {
        let store = SledStore::temporary().unwrap();
        assert!(!store.get_read_status(&id(1)).unwrap());
        store.set_read_status(&id(1), true).unwrap();
        assert!(store.get_read_status(&id(1)).unwrap());
        store.set_read_status(&id(1), false).unwrap();
        assert!(!store.get_read_status(&id(1)).unwrap());
        store.set_read_status(&id(1), true).unwrap();
        store.delete_read_status(&id(1)).unwrap();
        assert!(!store.get_read_status(&id(1)).unwrap());
    }

    #[test]
    fn test_encrypted_cache_roundtrip() {
        let key = SymmetricKey::generate();
        let store = SledStore::temporary().unwrap().with_cache_key(key);
        store.put("https://host/a", b"plaintext").unwrap();
        assert_eq!(
            store.get("https://host/a").unwrap(),
            Some(b"plaintext".to_vec())
        );

        let raw = store.content.get(b"https://host/a").unwrap().unwrap();
        assert_ne!(&raw[..], &b"plaintext"[..]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let tx = Transaction::new(5, vec![5], vec![0x01]);
        {
            let store = SledStore::open(dir.path()).unwrap();
            store
                .put_transaction(Protocol::Algorand, "mainnet", &ALICE, &tx)
                .unwrap();
            store.set_read_status(&id(3), true).unwrap();
            store.put("loc", b"cached").unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.path(), Some(dir.path()));
        assert_eq!(
            store
                .get_transactions(Protocol::Algorand, "mainnet", &ALICE)
                .unwrap(),
            vec![tx]
        );
        assert!(store.get_read_status(&id(3)).unwrap());
        assert_eq!(store.get("loc").unwrap(), Some(b"cached".to_vec()));
    }
}
