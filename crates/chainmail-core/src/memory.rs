//! In-process backends.
//!
//! [`MemoryLedger`] plays a network: it verifies the sender's signature
//! over the envelope, assigns block numbers and transaction hashes, and
//! serves the transactions back to receivers. [`MemoryContentStore`] plays
//! an object store with a fixed base URL. Both are used by tests and by
//! local single-process setups.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chainmail_crypto::{verify_signature, Hash256, Signer};
use chainmail_protocol::{Address, Headers, MessageId, Transaction};
use tracing::debug;

use crate::backends::{
    ContentFetcher, ContentStore, NetworkReceiver, NetworkSender, OutgoingTransaction,
    StoredContent,
};
use crate::registry::NetworkKey;
use crate::{CoreError, Result};

const TX_HASH_CONTEXT: &str = "chainmail 2024-06 memory ledger transaction hash";

fn poisoned() -> CoreError {
    CoreError::Backend("memory backend lock poisoned".into())
}

#[derive(Default)]
struct LedgerState {
    next_block: i64,
    inboxes: HashMap<(NetworkKey, Vec<u8>), Vec<Transaction>>,
    declined: HashSet<NetworkKey>,
    failing: Option<String>,
}

/// A ledger held in memory.
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    submissions: AtomicUsize,
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("submissions", &self.submissions())
            .finish_non_exhaustive()
    }
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request for `key` with [`CoreError::NetworkNotSupported`].
    pub fn decline(&self, key: NetworkKey) {
        if let Ok(mut state) = self.state.write() {
            state.declined.insert(key);
        }
    }

    /// Make receives fail with `reason`, or succeed again with `None`.
    pub fn set_failing(&self, reason: Option<String>) {
        if let Ok(mut state) = self.state.write() {
            state.failing = reason;
        }
    }

    /// Number of accepted submissions.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Append a transaction for `to` without a signature check.
    pub fn inject(&self, to: &Address, transaction: Transaction) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.next_block = state.next_block.max(transaction.block_number + 1);
        state
            .inboxes
            .entry(inbox(to))
            .or_default()
            .push(transaction);
        Ok(())
    }

    fn check_network(state: &LedgerState, key: &NetworkKey) -> Result<()> {
        if state.declined.contains(key) {
            return Err(CoreError::NetworkNotSupported(key.clone()));
        }
        Ok(())
    }
}

fn inbox(address: &Address) -> (NetworkKey, Vec<u8>) {
    (
        NetworkKey::new(address.protocol(), address.network()),
        address.raw().to_vec(),
    )
}

#[async_trait]
impl NetworkSender for MemoryLedger {
    async fn send(&self, transaction: OutgoingTransaction, signer: &dyn Signer) -> Result<()> {
        let signature = signer.sign(&transaction.envelope_data)?;
        verify_signature(&signer.public_key(), &transaction.envelope_data, &signature)?;

        let mut state = self.state.write().map_err(|_| poisoned())?;
        let (key, raw) = inbox(&transaction.to);
        Self::check_network(&state, &key)?;

        let block_number = state.next_block;
        state.next_block += 1;
        let hash = Hash256::hash_many(&[
            TX_HASH_CONTEXT.as_bytes(),
            &block_number.to_be_bytes()[..],
            transaction.from.raw(),
            &signature[..],
        ]);

        let mut record = Transaction::new(
            block_number,
            hash.to_bytes().to_vec(),
            transaction.envelope_data,
        );
        if let Some(rekey) = transaction.rekey_to {
            record = record.with_rekey_address(rekey);
        }
        state.inboxes.entry((key.clone(), raw)).or_default().push(record);
        self.submissions.fetch_add(1, Ordering::SeqCst);
        debug!(%key, block = block_number, "ledger accepted transaction");
        Ok(())
    }
}

#[async_trait]
impl NetworkReceiver for MemoryLedger {
    async fn receive(&self, address: &Address) -> Result<Vec<Transaction>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let key = inbox(address);
        Self::check_network(&state, &key.0)?;
        if let Some(reason) = &state.failing {
            return Err(CoreError::Backend(reason.clone()));
        }
        Ok(state.inboxes.get(&key).cloned().unwrap_or_default())
    }
}

/// An object store held in memory.
///
/// Resources are named by the hex content hash and served at
/// `{base_url}/{resource}`.
pub struct MemoryContentStore {
    base_url: String,
    location_code: u64,
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl std::fmt::Debug for MemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContentStore")
            .field("base_url", &self.base_url)
            .field("location_code", &self.location_code)
            .field("fetches", &self.fetches())
            .finish_non_exhaustive()
    }
}

impl MemoryContentStore {
    /// Create a store serving under `base_url`, registered as `location_code`.
    pub fn new(base_url: impl Into<String>, location_code: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            location_code,
            objects: RwLock::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Location code the store registers under.
    pub fn location_code(&self) -> u64 {
        self.location_code
    }

    /// Number of fetches served, failed ones included.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite every stored object with `bytes`.
    pub fn tamper(&self, bytes: &[u8]) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        for object in objects.values_mut() {
            *object = bytes.to_vec();
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(
        &self,
        id: &MessageId,
        content_hash: &Hash256,
        ciphertext: &[u8],
        _headers: &Headers,
    ) -> Result<StoredContent> {
        let resource = content_hash.to_hex();
        let url = format!("{}/{}", self.base_url, resource);
        self.objects
            .write()
            .map_err(|_| poisoned())?
            .insert(url.clone(), ciphertext.to_vec());
        debug!(id = %id.to_hex(), %url, "stored content");
        Ok(StoredContent {
            url,
            resource,
            location_code: self.location_code,
        })
    }
}

#[async_trait]
impl ContentFetcher for MemoryContentStore {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .map_err(|_| poisoned())?
            .get(locator)
            .cloned()
            .ok_or_else(|| CoreError::Backend(format!("no object at {}", locator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainmail_crypto::Ed25519Signer;
    use chainmail_protocol::Protocol;

    fn address(byte: u8, network: &str) -> Address {
        Address::new(Protocol::Ethereum, network, vec![byte; 20]).unwrap()
    }

    fn outgoing(to: Address) -> OutgoingTransaction {
        OutgoingTransaction {
            from: address(1, to.network()),
            to,
            envelope_data: vec![0x01, 0x02],
            rekey_to: None,
        }
    }

    #[tokio::test]
    async fn test_send_then_receive() {
        let ledger = MemoryLedger::new();
        let signer = Ed25519Signer::generate();
        let bob = address(2, "mainnet");

        ledger.send(outgoing(bob.clone()), &signer).await.unwrap();
        ledger.send(outgoing(bob.clone()), &signer).await.unwrap();

        let txs = ledger.receive(&bob).await.unwrap();
        assert_eq!(txs.len(), 2);
        assert!(txs[0].block_number < txs[1].block_number);
        assert_ne!(txs[0].hash, txs[1].hash);
        assert_eq!(ledger.submissions(), 2);

        assert!(ledger.receive(&address(2, "sepolia")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decline_and_fail() {
        let ledger = MemoryLedger::new();
        let bob = address(2, "mainnet");
        ledger.decline(NetworkKey::new(Protocol::Ethereum, "mainnet"));
        assert!(matches!(
            ledger.receive(&bob).await,
            Err(CoreError::NetworkNotSupported(_))
        ));

        let other = address(2, "sepolia");
        ledger.set_failing(Some("rpc down".into()));
        assert!(matches!(
            ledger.receive(&other).await,
            Err(CoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_content_store_roundtrip() {
        let store = MemoryContentStore::new("https://content.example/", 7);
        let hash = Hash256::hash(b"sealed");
        let headers = Headers::new("a", "b", "s");
        let id = MessageId::derive(&headers, b"body");

        let stored = store.put(&id, &hash, b"sealed", &headers).await.unwrap();
        assert_eq!(stored.url, format!("https://content.example/{}", hash.to_hex()));
        assert_eq!(stored.location_code, 7);
        assert_eq!(store.fetch(&stored.url).await.unwrap(), b"sealed");
        assert!(store.fetch("https://content.example/missing").await.is_err());
        assert_eq!(store.fetches(), 2);
    }
}
