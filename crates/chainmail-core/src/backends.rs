//! Collaborator traits for network and content backends.
//!
//! The pipelines are transport-agnostic: everything that leaves the process
//! goes through one of these traits. Implementations are registered per
//! [`NetworkKey`](crate::NetworkKey) (senders, receivers) or per
//! [`EnvelopeKind`](chainmail_protocol::EnvelopeKind) (content stores).

use async_trait::async_trait;
use chainmail_crypto::{Hash256, Signer};
use chainmail_protocol::{Address, Headers, MessageId, Transaction};

use crate::Result;

/// A signed-and-submitted envelope, before the ledger assigns it a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingTransaction {
    /// Sending address.
    pub from: Address,
    /// Recipient address.
    pub to: Address,
    /// Serialized envelope.
    pub envelope_data: Vec<u8>,
    /// Raw address replies should go to, if the sender rekeyed.
    pub rekey_to: Option<Vec<u8>>,
}

/// Signs and submits envelopes to one network.
#[async_trait]
pub trait NetworkSender: Send + Sync {
    /// Sign `transaction` with `signer` and submit it.
    ///
    /// Returns [`CoreError::NetworkNotSupported`](crate::CoreError::NetworkNotSupported)
    /// if the backend does not serve the transaction's network.
    async fn send(&self, transaction: OutgoingTransaction, signer: &dyn Signer) -> Result<()>;
}

/// Lists transactions addressed to an address on one network.
#[async_trait]
pub trait NetworkReceiver: Send + Sync {
    /// All transactions the network holds for `address`.
    async fn receive(&self, address: &Address) -> Result<Vec<Transaction>>;
}

/// Where a content store put the ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredContent {
    /// Full URL, for URL envelopes.
    pub url: String,
    /// Resource id relative to the location code's base URL.
    pub resource: String,
    /// Location code the resource resolves under.
    pub location_code: u64,
}

/// Stores encrypted message content out of band.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `ciphertext` for message `id`.
    async fn put(
        &self,
        id: &MessageId,
        content_hash: &Hash256,
        ciphertext: &[u8],
        headers: &Headers,
    ) -> Result<StoredContent>;
}

/// Retrieves encrypted content by locator.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the bytes behind `locator`.
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>>;
}
