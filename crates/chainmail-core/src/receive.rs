//! Receive pipeline.
//!
//! A receive call has two phases with different failure semantics:
//!
//! 1. **Refresh** (optional). Fetch transactions from the network receiver
//!    and persist them. All-or-nothing: any failure aborts the call.
//! 2. **Process**. Load every known transaction for the address and turn
//!    each one into a [`MessageResult`]. A failing transaction produces a
//!    [`MessageFailure`] in its slot and never affects its neighbours.
//!
//! Per-transaction stages, in order:
//!
//! | Stage                          | Work                                               |
//! |--------------------------------|----------------------------------------------------|
//! | [`ReceiveStage::Envelope`]      | unmarshal the envelope                             |
//! | [`ReceiveStage::DecrypterKind`] | map the decrypter byte to a kind                   |
//! | [`ReceiveStage::Decrypter`]     | resolve a decrypter for the address                |
//! | [`ReceiveStage::Content`]       | decrypt the location, fetch, verify, decrypt body  |
//! | [`ReceiveStage::Message`]       | decode the message and check its id                |
//! | [`ReceiveStage::ReadState`]     | look up the read flag                              |
//!
//! Transactions are processed concurrently up to the configured limit and
//! results come back in the order the state store listed them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chainmail_protocol::{
    encode_block_id, encode_hash, Address, EncodedAddress, EncodedValue, Envelope, Headers,
    LocationTable, Message, MessageId, Transaction,
};
use chainmail_store::StateStore;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::NetworkReceiver;
use crate::content::ContentOpener;
use crate::guard::guarded;
use crate::keystore::KeyDerivationOptions;
use crate::registry::{CapabilityRegistry, NetworkKey};
use crate::resolver::DecrypterResolver;
use crate::{CoreError, ErrorKind, Result};

/// Status string of a successfully received message.
pub const STATUS_OK: &str = "ok";

/// Where processing of one transaction stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReceiveStage {
    /// Unmarshalling the envelope.
    Envelope,
    /// Mapping the decrypter byte.
    DecrypterKind,
    /// Resolving a decrypter.
    Decrypter,
    /// Locating, fetching and decrypting content.
    Content,
    /// Decoding the message.
    Message,
    /// Reading the persisted read flag.
    ReadState,
}

impl ReceiveStage {
    /// Stable stage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ReceiveStage::Envelope => "envelope",
            ReceiveStage::DecrypterKind => "decrypter-kind",
            ReceiveStage::Decrypter => "decrypter",
            ReceiveStage::Content => "content",
            ReceiveStage::Message => "message",
            ReceiveStage::ReadState => "read-state",
        }
    }
}

impl fmt::Display for ReceiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully decoded message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Content-derived id, the read-state key.
    pub id: MessageId,
    /// Message headers.
    pub headers: Headers,
    /// Subject line, copied from the headers.
    pub subject: String,
    /// Message body.
    pub body: Vec<u8>,
    /// Whether the message was marked read.
    pub read: bool,
    /// Always [`STATUS_OK`].
    pub status: String,
    /// Block the transaction was included in.
    pub block_id: EncodedValue,
    /// Transaction hash.
    pub transaction_hash: EncodedValue,
    /// Address to reply to instead of the sender, if the sender rekeyed.
    pub rekey_to: Option<EncodedAddress>,
    /// Set when the content cache could not store the plaintext.
    pub cache_warning: Option<String>,
}

/// A transaction that could not be turned into a message.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("transaction {} in block {}: {stage}: {status}", .transaction_hash.value, .block_id.value)]
pub struct MessageFailure {
    /// Block the transaction was included in.
    pub block_id: EncodedValue,
    /// Transaction hash.
    pub transaction_hash: EncodedValue,
    /// Stage that failed.
    pub stage: ReceiveStage,
    /// Class of the underlying error.
    pub kind: ErrorKind,
    /// Human-readable reason.
    pub status: String,
}

/// Outcome for one transaction.
pub type MessageResult = std::result::Result<ReceivedMessage, MessageFailure>;

/// Turns on-chain transactions into messages.
pub struct ReceivePipeline {
    resolver: Arc<DecrypterResolver>,
    receivers: CapabilityRegistry<dyn NetworkReceiver>,
    state: Arc<dyn StateStore>,
    opener: ContentOpener,
    locations: LocationTable,
    concurrency: usize,
    timeout: Duration,
}

impl fmt::Debug for ReceivePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivePipeline")
            .field("receivers", &self.receivers)
            .field("opener", &self.opener)
            .field("locations", &self.locations)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReceivePipeline {
    /// Create a pipeline.
    pub fn new(
        resolver: Arc<DecrypterResolver>,
        receivers: CapabilityRegistry<dyn NetworkReceiver>,
        state: Arc<dyn StateStore>,
        opener: ContentOpener,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            receivers,
            state,
            opener,
            locations: LocationTable::new(),
            concurrency: 1,
            timeout,
        }
    }

    /// Location codes used to resolve content-addressed envelopes.
    pub fn with_locations(mut self, locations: LocationTable) -> Self {
        self.locations = locations;
        self
    }

    /// Process up to `concurrency` transactions at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Receive every known message for `address`.
    ///
    /// The outer result fails only if the refresh fails or the call is
    /// cancelled. Otherwise it holds exactly one entry per stored
    /// transaction.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedCombination`] / [`CoreError::BackendDisabled`]
    ///   if refreshing and no receiver is registered
    /// - [`CoreError::NetworkNotSupported`] if the receiver declines the network
    /// - [`CoreError::FetchFailed`] for any other refresh failure
    /// - [`CoreError::Store`] if transactions cannot be persisted or listed
    /// - [`CoreError::Cancelled`] if `cancel` fires
    pub async fn receive(
        &self,
        address: &Address,
        refresh: bool,
        options: &KeyDerivationOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageResult>> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if refresh {
            self.refresh(address, cancel).await?;
        }

        let transactions =
            self.state
                .get_transactions(address.protocol(), address.network(), address.raw())?;

        let pending: Vec<_> = transactions
            .iter()
            .map(|tx| self.process(address, tx, options, cancel))
            .collect();
        let results: Vec<MessageResult> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            protocol = %address.protocol(),
            network = %address.network(),
            total = results.len(),
            failed,
            "received messages"
        );
        Ok(results)
    }

    async fn refresh(&self, address: &Address, cancel: &CancellationToken) -> Result<()> {
        let key = NetworkKey::new(address.protocol(), address.network());
        let receiver = self.receivers.require(&key)?;

        let fetched = guarded(
            cancel,
            self.timeout,
            "receiver.receive",
            receiver.receive(address),
        )
        .await
        .map_err(|e| match e {
            CoreError::NetworkNotSupported(_) | CoreError::Cancelled => e,
            other => CoreError::FetchFailed(Box::new(other)),
        })?;

        let mut added = 0usize;
        for tx in &fetched {
            if self
                .state
                .put_transaction(address.protocol(), address.network(), address.raw(), tx)?
            {
                added += 1;
            }
        }
        debug!(%key, fetched = fetched.len(), added, "refreshed transactions");
        Ok(())
    }

    async fn process(
        &self,
        address: &Address,
        tx: &Transaction,
        options: &KeyDerivationOptions,
        cancel: &CancellationToken,
    ) -> MessageResult {
        let block_id = encode_block_id(tx.block_number);
        let transaction_hash = encode_hash(address.protocol(), &tx.hash);

        match self.open(address, tx, options, cancel).await {
            Ok(opened) => Ok(self.finish(address, tx, opened, block_id, transaction_hash)),
            Err((stage, error)) => {
                warn!(
                    block = %block_id.value,
                    tx = %transaction_hash.value,
                    %stage,
                    error = %error,
                    "message failed"
                );
                Err(MessageFailure {
                    block_id,
                    transaction_hash,
                    stage,
                    kind: error.kind(),
                    status: error.to_string(),
                })
            }
        }
    }

    async fn open(
        &self,
        address: &Address,
        tx: &Transaction,
        options: &KeyDerivationOptions,
        cancel: &CancellationToken,
    ) -> std::result::Result<Opened, (ReceiveStage, CoreError)> {
        let at = |stage: ReceiveStage| move |e: CoreError| (stage, e);

        let envelope = Envelope::from_bytes(&tx.envelope_data)
            .map_err(CoreError::from)
            .map_err(at(ReceiveStage::Envelope))?;
        let kind = envelope
            .decrypter_kind()
            .map_err(CoreError::from)
            .map_err(at(ReceiveStage::DecrypterKind))?;
        let decrypter = self
            .resolver
            .resolve(address, kind, options, cancel)
            .await
            .map_err(at(ReceiveStage::Decrypter))?;

        let location = envelope
            .locate(decrypter.as_ref(), &self.locations)
            .map_err(CoreError::from)
            .map_err(at(ReceiveStage::Content))?;
        let content = self
            .opener
            .open(&location, decrypter.as_ref(), cancel)
            .await
            .map_err(at(ReceiveStage::Content))?;

        let message = Message::from_bytes(&content.plaintext)
            .map_err(CoreError::from)
            .map_err(at(ReceiveStage::Message))?;
        let read = self
            .state
            .get_read_status(&message.id())
            .map_err(CoreError::from)
            .map_err(at(ReceiveStage::ReadState))?;

        Ok(Opened {
            message,
            read,
            cache_warning: content.cache_error.map(|e| e.to_string()),
        })
    }

    fn finish(
        &self,
        address: &Address,
        tx: &Transaction,
        opened: Opened,
        block_id: EncodedValue,
        transaction_hash: EncodedValue,
    ) -> ReceivedMessage {
        let rekey_to = tx.rekey_address.as_deref().and_then(|raw| {
            match address.protocol().encode_address(raw) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    warn!(tx = %transaction_hash.value, error = %e, "dropping invalid rekey address");
                    None
                }
            }
        });

        let (id, headers, body) = opened.message.into_parts();
        ReceivedMessage {
            id,
            subject: headers.subject.clone(),
            headers,
            body,
            read: opened.read,
            status: STATUS_OK.to_string(),
            block_id,
            transaction_hash,
            rekey_to,
            cache_warning: opened.cache_warning,
        }
    }
}

struct Opened {
    message: Message,
    read: bool,
    cache_warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{KeyDerivation, MemoryKeystore};
    use async_trait::async_trait;
    use chainmail_crypto::{DecrypterKind, Encrypter, KdfParams, SealedBoxEncrypter};
    use chainmail_protocol::envelope::InlineEnvelope;
    use chainmail_protocol::{EncodingKind, Protocol};
    use chainmail_store::{MemoryContentCache, MemoryStateStore};

    const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";

    struct Fixture {
        address: Address,
        encrypter: SealedBoxEncrypter,
        state: Arc<MemoryStateStore>,
        pipeline: ReceivePipeline,
    }

    fn fixture(receivers: CapabilityRegistry<dyn NetworkReceiver>) -> Fixture {
        let keystore = Arc::new(MemoryKeystore::new(KdfParams::insecure_for_tests()));
        let address = Address::parse(RECIPIENT, Protocol::Ethereum, "mainnet").unwrap();
        let public = keystore
            .add_key(&address, [5u8; 32], KeyDerivation::Direct)
            .unwrap();
        let state = Arc::new(MemoryStateStore::new());
        let timeout = Duration::from_secs(5);
        let pipeline = ReceivePipeline::new(
            Arc::new(DecrypterResolver::new(keystore, timeout)),
            receivers,
            state.clone(),
            ContentOpener::new(Arc::new(MemoryContentCache::new()), None, timeout),
            timeout,
        )
        .with_concurrency(4);
        Fixture {
            address,
            encrypter: SealedBoxEncrypter::new(public),
            state,
            pipeline,
        }
    }

    fn envelope_bytes(fx: &Fixture, subject: &str) -> Vec<u8> {
        let headers = Headers::new("0x1111111111111111111111111111111111111111", RECIPIENT, subject);
        let message = Message::compose(headers, b"body".to_vec()).unwrap();
        let ciphertext = fx.encrypter.encrypt(&message.to_bytes().unwrap()).unwrap();
        Envelope::inline(fx.encrypter.kind(), ciphertext)
            .to_bytes()
            .unwrap()
    }

    fn store(fx: &Fixture, tx: Transaction) {
        fx.state
            .put_transaction(Protocol::Ethereum, "mainnet", fx.address.raw(), &tx)
            .unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_envelope_is_isolated() {
        let fx = fixture(CapabilityRegistry::new());
        for i in 0..5u8 {
            let data = if i == 2 {
                vec![0xff, 0x00, 0x01]
            } else {
                envelope_bytes(&fx, &format!("message {}", i))
            };
            store(&fx, Transaction::new(100 + i as i64, vec![i; 32], data));
        }

        let results = fx
            .pipeline
            .receive(
                &fx.address,
                false,
                &KeyDerivationOptions::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            if i == 2 {
                let failure = result.as_ref().unwrap_err();
                assert_eq!(failure.stage, ReceiveStage::Envelope);
                assert_eq!(failure.kind, ErrorKind::Validation);
                assert_eq!(failure.block_id.value, "0x66");
            } else {
                let message = result.as_ref().unwrap();
                assert_eq!(message.subject, format!("message {}", i));
                assert_eq!(message.status, STATUS_OK);
                assert!(!message.read);
                assert_eq!(message.block_id.encoding, EncodingKind::HexZeroXPrefix);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_decrypter_kind() {
        let fx = fixture(CapabilityRegistry::new());
        let data = Envelope::Inline(InlineEnvelope {
            decrypter: 0x7e,
            encrypted_content: vec![1, 2, 3],
        })
        .to_bytes()
        .unwrap();
        store(&fx, Transaction::new(1, vec![1; 32], data));

        let results = fx
            .pipeline
            .receive(
                &fx.address,
                false,
                &KeyDerivationOptions::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            results[0].as_ref().unwrap_err().stage,
            ReceiveStage::DecrypterKind
        );
    }

    #[tokio::test]
    async fn test_wrong_key_fails_content_stage() {
        let fx = fixture(CapabilityRegistry::new());
        let stranger = SealedBoxEncrypter::new(
            chainmail_crypto::X25519StaticPrivateKey::generate().public_key(),
        );
        let ciphertext = stranger.encrypt(b"not for you").unwrap();
        let data = Envelope::inline(DecrypterKind::X25519XChaCha20Poly1305, ciphertext)
            .to_bytes()
            .unwrap();
        store(&fx, Transaction::new(1, vec![1; 32], data));

        let results = fx
            .pipeline
            .receive(
                &fx.address,
                false,
                &KeyDerivationOptions::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap_err().stage, ReceiveStage::Content);
    }

    #[tokio::test]
    async fn test_read_state_and_rekey() {
        let fx = fixture(CapabilityRegistry::new());
        let data = envelope_bytes(&fx, "hello");
        store(
            &fx,
            Transaction::new(7, vec![7; 32], data).with_rekey_address(vec![0x33; 20]),
        );
        store(
            &fx,
            Transaction::new(8, vec![8; 32], envelope_bytes(&fx, "bad rekey"))
                .with_rekey_address(vec![0x33; 3]),
        );
        let options = KeyDerivationOptions::new();
        let cancel = CancellationToken::new();

        let first = fx
            .pipeline
            .receive(&fx.address, false, &options, &cancel)
            .await
            .unwrap();
        let message = first[0].as_ref().unwrap();
        assert!(!message.read);
        assert_eq!(
            message.rekey_to.as_ref().unwrap().value,
            "0x3333333333333333333333333333333333333333"
        );
        assert!(first[1].as_ref().unwrap().rekey_to.is_none());

        fx.state.set_read_status(&message.id, true).unwrap();
        let second = fx
            .pipeline
            .receive(&fx.address, false, &options, &cancel)
            .await
            .unwrap();
        assert!(second[0].as_ref().unwrap().read);
        assert_eq!(second[0].as_ref().unwrap().id, message.id);
    }

    struct Declining;

    #[async_trait]
    impl NetworkReceiver for Declining {
        async fn receive(&self, address: &Address) -> Result<Vec<Transaction>> {
            Err(CoreError::NetworkNotSupported(NetworkKey::new(
                address.protocol(),
                address.network(),
            )))
        }
    }

    struct Broken;

    #[async_trait]
    impl NetworkReceiver for Broken {
        async fn receive(&self, _address: &Address) -> Result<Vec<Transaction>> {
            Err(CoreError::Backend("rpc down".into()))
        }
    }

    #[tokio::test]
    async fn test_refresh_failures() {
        let key = NetworkKey::new(Protocol::Ethereum, "mainnet");
        let options = KeyDerivationOptions::new();
        let cancel = CancellationToken::new();

        let mut declining: CapabilityRegistry<dyn NetworkReceiver> = CapabilityRegistry::new();
        declining.register(key.clone(), Arc::new(Declining));
        let fx = fixture(declining);
        let err = fx
            .pipeline
            .receive(&fx.address, true, &options, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkNotSupported);

        let mut broken: CapabilityRegistry<dyn NetworkReceiver> = CapabilityRegistry::new();
        broken.register(key, Arc::new(Broken));
        let fx = fixture(broken);
        let err = fx
            .pipeline
            .receive(&fx.address, true, &options, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::FetchFailed(_)));

        let fx = fixture(CapabilityRegistry::new());
        let err = fx
            .pipeline
            .receive(&fx.address, true, &options, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedCombination(_)));
    }

    #[tokio::test]
    async fn test_cancelled() {
        let fx = fixture(CapabilityRegistry::new());
        store(&fx, Transaction::new(1, vec![1; 32], envelope_bytes(&fx, "x")));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fx
            .pipeline
            .receive(&fx.address, false, &KeyDerivationOptions::new(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
