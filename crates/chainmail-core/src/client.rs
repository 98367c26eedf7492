//! Client facade.
//!
//! [`MailClient`] wires the keystore, local stores, backend registries and
//! the two pipelines together. It is built with [`MailClientBuilder`]:
//!
//! ```
//! use std::sync::Arc;
//! use chainmail_core::{ClientConfig, MailClient, MemoryLedger, NetworkKey};
//! use chainmail_protocol::Protocol;
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let client = MailClient::builder(ClientConfig::in_memory())
//!     .with_network(NetworkKey::new(Protocol::Ethereum, "mainnet"), ledger)
//!     .build()
//!     .unwrap();
//! assert!(client.config().storage.in_memory);
//! ```
//!
//! ## Storage selection
//!
//! | `storage.in_memory` | State store            | Content cache                          |
//! |---------------------|------------------------|----------------------------------------|
//! | `true`              | [`MemoryStateStore`]   | [`MemoryContentCache`]                 |
//! | `false`             | [`SledStore`]          | the same [`SledStore`], sealed if `encrypt_cache` |
//!
//! Stores passed to the builder explicitly take precedence.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chainmail_crypto::{DecrypterKind, SymmetricKey};
use chainmail_protocol::{Address, EnvelopeKind, MessageId};
use chainmail_store::{ContentCache, MemoryContentCache, MemoryStateStore, SledStore, StateStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backends::{ContentFetcher, ContentStore, NetworkReceiver, NetworkSender};
use crate::config::{ClientConfig, ConfigError};
use crate::content::ContentOpener;
use crate::keystore::{KeyDerivation, KeyDerivationOptions, Keystore, MemoryKeystore};
use crate::naming::{
    AddressResolver, ForwardResolution, NameResolver, NameService, ReverseResolution,
};
use crate::receive::{MessageResult, ReceivePipeline};
use crate::registry::{CapabilityRegistry, NetworkKey};
use crate::resolver::DecrypterResolver;
use crate::send::{SendPipeline, SendRequest};
use crate::Result;

/// File name of the sled database inside the data directory.
pub const DATABASE_NAME: &str = "chainmail.db";

/// Builder for [`MailClient`].
pub struct MailClientBuilder {
    config: ClientConfig,
    keystore: Option<Arc<dyn Keystore>>,
    state: Option<Arc<dyn StateStore>>,
    cache: Option<Arc<dyn ContentCache>>,
    cache_key: Option<SymmetricKey>,
    senders: CapabilityRegistry<dyn NetworkSender>,
    receivers: CapabilityRegistry<dyn NetworkReceiver>,
    content_stores: HashMap<EnvelopeKind, Arc<dyn ContentStore>>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    name_resolvers: CapabilityRegistry<dyn NameResolver>,
    address_resolvers: CapabilityRegistry<dyn AddressResolver>,
    strategies: Vec<(DecrypterKind, Vec<KeyDerivation>)>,
}

impl MailClientBuilder {
    /// Start from `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            keystore: None,
            state: None,
            cache: None,
            cache_key: None,
            senders: CapabilityRegistry::new(),
            receivers: CapabilityRegistry::new(),
            content_stores: HashMap::new(),
            fetcher: None,
            name_resolvers: CapabilityRegistry::new(),
            address_resolvers: CapabilityRegistry::new(),
            strategies: Vec::new(),
        }
    }

    /// Use `keystore` instead of an empty [`MemoryKeystore`].
    pub fn with_keystore(mut self, keystore: Arc<dyn Keystore>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    /// Use `state` instead of the configured store.
    pub fn with_state_store(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Use `cache` instead of the configured cache.
    pub fn with_content_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Key sealing cached plaintext in the sled store.
    pub fn with_cache_key(mut self, key: SymmetricKey) -> Self {
        self.cache_key = Some(key);
        self
    }

    /// Register a sender for `key`.
    pub fn with_sender(mut self, key: NetworkKey, sender: Arc<dyn NetworkSender>) -> Self {
        self.senders.register(key, sender);
        self
    }

    /// Register a receiver for `key`.
    pub fn with_receiver(mut self, key: NetworkKey, receiver: Arc<dyn NetworkReceiver>) -> Self {
        self.receivers.register(key, receiver);
        self
    }

    /// Register one backend as both sender and receiver for `key`.
    pub fn with_network<N>(self, key: NetworkKey, network: Arc<N>) -> Self
    where
        N: NetworkSender + NetworkReceiver + 'static,
    {
        let sender: Arc<dyn NetworkSender> = network.clone();
        let receiver: Arc<dyn NetworkReceiver> = network;
        self.with_sender(key.clone(), sender)
            .with_receiver(key, receiver)
    }

    /// Mark `key` as known but switched off for sending and receiving.
    pub fn disable_network(mut self, key: NetworkKey) -> Self {
        self.senders.disable(key.clone());
        self.receivers.disable(key);
        self
    }

    /// Register the content store for `kind` envelopes.
    pub fn with_content_store(mut self, kind: EnvelopeKind, store: Arc<dyn ContentStore>) -> Self {
        self.content_stores.insert(kind, store);
        self
    }

    /// Fetcher used for URL and content-addressed envelopes.
    pub fn with_content_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Register a forward resolver for `key`.
    pub fn with_name_resolver(mut self, key: NetworkKey, resolver: Arc<dyn NameResolver>) -> Self {
        self.name_resolvers.register(key, resolver);
        self
    }

    /// Register a reverse resolver for `key`.
    pub fn with_address_resolver(
        mut self,
        key: NetworkKey,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        self.address_resolvers.register(key, resolver);
        self
    }

    /// Override the key derivation strategies tried for `kind`.
    pub fn with_decrypter_strategies(
        mut self,
        kind: DecrypterKind,
        strategies: Vec<KeyDerivation>,
    ) -> Self {
        self.strategies.push((kind, strategies));
        self
    }

    /// Validate the configuration and assemble the client.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Config`](crate::CoreError::Config) for invalid configuration,
    ///   including an encrypted disk cache without a cache key
    /// - [`CoreError::Store`](crate::CoreError::Store) if the database cannot be opened
    pub fn build(self) -> Result<MailClient> {
        let config = self.config;
        config.validate()?;
        let timeout = config.network.request_timeout;

        let (state, cache) = match (self.state, self.cache) {
            (Some(state), Some(cache)) => (state, cache),
            (state, cache) if config.storage.in_memory => (
                state.unwrap_or_else(|| {
                    Arc::new(MemoryStateStore::new()) as Arc<dyn StateStore>
                }),
                cache.unwrap_or_else(|| {
                    Arc::new(MemoryContentCache::new()) as Arc<dyn ContentCache>
                }),
            ),
            (state, cache) => {
                if config.storage.encrypt_cache && cache.is_none() && self.cache_key.is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: "storage.encrypt_cache".into(),
                        reason: "an encrypted cache needs a cache key".into(),
                    }
                    .into());
                }
                let path = config.storage.data_dir.join(DATABASE_NAME);
                let mut store = SledStore::open(&path)?;
                if let Some(key) = self.cache_key {
                    store = store.with_cache_key(key);
                }
                info!(path = %path.display(), "opened local store");
                let store = Arc::new(store);
                (
                    state.unwrap_or_else(|| store.clone() as Arc<dyn StateStore>),
                    cache.unwrap_or_else(|| store.clone() as Arc<dyn ContentCache>),
                )
            }
        };

        let keystore: Arc<dyn Keystore> = match self.keystore {
            Some(keystore) => keystore,
            None => Arc::new(MemoryKeystore::new(config.keystore.kdf)),
        };

        let mut resolver = DecrypterResolver::new(keystore.clone(), timeout);
        for (kind, strategies) in self.strategies {
            resolver = resolver.with_strategies(kind, strategies);
        }

        let default_envelope = EnvelopeKind::from_str(&config.locations.default_envelope)
            .map_err(|e| ConfigError::InvalidValue {
                field: "locations.default_envelope".into(),
                reason: e.to_string(),
            })?;
        let mut send = SendPipeline::new(keystore.clone(), self.senders, timeout)
            .with_default_envelope(default_envelope);
        for (kind, store) in self.content_stores {
            send = send.with_content_store(kind, store);
        }

        let receive = ReceivePipeline::new(
            Arc::new(resolver),
            self.receivers,
            state.clone(),
            ContentOpener::new(cache, self.fetcher, timeout),
            timeout,
        )
        .with_locations(config.locations.table())
        .with_concurrency(config.receive.concurrency);

        let names = NameService::new(self.name_resolvers, self.address_resolvers, timeout);

        debug!(?send, ?receive, ?names, "client assembled");
        Ok(MailClient {
            config,
            keystore,
            state,
            send,
            receive,
            names,
        })
    }
}

/// Sends, receives and resolves on behalf of local addresses.
pub struct MailClient {
    config: ClientConfig,
    keystore: Arc<dyn Keystore>,
    state: Arc<dyn StateStore>,
    send: SendPipeline,
    receive: ReceivePipeline,
    names: NameService,
}

impl std::fmt::Debug for MailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailClient")
            .field("config", &self.config)
            .field("send", &self.send)
            .field("receive", &self.receive)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl MailClient {
    /// Start building a client.
    pub fn builder(config: ClientConfig) -> MailClientBuilder {
        MailClientBuilder::new(config)
    }

    /// A client with no backends registered.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        MailClientBuilder::new(config).build()
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The keystore in use.
    pub fn keystore(&self) -> &Arc<dyn Keystore> {
        &self.keystore
    }

    /// Send one message. See [`SendPipeline::send`].
    pub async fn send(&self, request: SendRequest, cancel: &CancellationToken) -> Result<()> {
        self.send.send(request, cancel).await
    }

    /// Receive every known message for `address`.
    ///
    /// `refresh` defaults to `receive.refresh_by_default`. See
    /// [`ReceivePipeline::receive`].
    pub async fn receive(
        &self,
        address: &Address,
        refresh: Option<bool>,
        options: &KeyDerivationOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageResult>> {
        let refresh = refresh.unwrap_or(self.config.receive.refresh_by_default);
        self.receive.receive(address, refresh, options, cancel).await
    }

    /// Mark a message read.
    pub fn mark_read(&self, id: &MessageId) -> Result<()> {
        self.state.set_read_status(id, true)?;
        debug!(id = %id.to_hex(), "marked read");
        Ok(())
    }

    /// Mark a message unread, dropping its record.
    pub fn mark_unread(&self, id: &MessageId) -> Result<()> {
        self.state.delete_read_status(id)?;
        debug!(id = %id.to_hex(), "marked unread");
        Ok(())
    }

    /// Whether a message is marked read. Unknown ids are unread.
    pub fn read_status(&self, id: &MessageId) -> Result<bool> {
        Ok(self.state.get_read_status(id)?)
    }

    /// Forward lookup. See [`NameService::resolve_name`].
    pub async fn resolve_name(
        &self,
        key: &NetworkKey,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ForwardResolution> {
        self.names.resolve_name(key, name, cancel).await
    }

    /// Reverse lookup. See [`NameService::resolve_address`].
    pub async fn resolve_address(
        &self,
        key: &NetworkKey,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<ReverseResolution> {
        self.names.resolve_address(key, address, cancel).await
    }
}
