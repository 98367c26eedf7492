//! Send pipeline.
//!
//! One linear pass per call, stopping at the first failure:
//!
//! | Stage | Checks                                              | Error                                   |
//! |-------|-----------------------------------------------------|-----------------------------------------|
//! | 1     | addresses, subject, body, recipient key             | [`CoreError::InvalidMessage`]           |
//! | 2     | a sender is registered for `(protocol, network)`    | [`CoreError::UnsupportedCombination`]   |
//! | 3     | the keystore can sign for `from`                    | [`CoreError::NoSigningKey`]             |
//! | 4     | the encryption method and recipient key kind        | [`CoreError::UnsupportedEncryption`]    |
//! | 5     | the envelope kind, and a content store if external  | [`CoreError::UnsupportedEnvelope`]      |
//! | 6     | encrypt, store, encrypt location, encode, submit    | [`CoreError::SendStep`]                 |
//!
//! Nothing is encrypted, signed or stored before stage 5 succeeds, and a
//! failure in stage 6 aborts the whole send.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chainmail_crypto::{DecrypterKind, Encrypter, Hash256, NoOpEncrypter, SealedBoxEncrypter};
use chainmail_protocol::{Address, Envelope, EnvelopeKind, Headers, Message, Protocol};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backends::{ContentStore, NetworkSender, OutgoingTransaction};
use crate::error::SendStep;
use crate::guard::guarded;
use crate::keystore::{KeyDerivationOptions, Keystore};
use crate::registry::{CapabilityRegistry, NetworkKey};
use crate::{CoreError, Result};

/// Recipient key kind accepted by the sealed-box method.
pub const X25519_KEY_KIND: &str = "x25519";

const X25519_KEY_SIZE: usize = 32;

/// Everything needed to send one message.
#[derive(Clone, Debug)]
pub struct SendRequest {
    /// Ledger family.
    pub protocol: Protocol,
    /// Network within the family.
    pub network: String,
    /// Sender address, presentable form.
    pub from: String,
    /// Recipient address, presentable form.
    pub to: String,
    /// Optional reply-to address.
    pub reply_to: Option<String>,
    /// Optional address the sender is moving to.
    pub rekey_to: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: Vec<u8>,
    /// Body content type. Defaults to plain text.
    pub content_type: Option<String>,
    /// Recipient's public encryption key.
    pub recipient_public_key: Vec<u8>,
    /// Kind of `recipient_public_key`.
    pub public_key_kind: String,
    /// Encryption method name.
    pub encryption: String,
    /// Envelope kind name. Defaults to the pipeline's default.
    pub envelope: Option<String>,
    /// Options used to unlock the signing key.
    pub key_derivation: KeyDerivationOptions,
}

impl SendRequest {
    /// A request sealed to an X25519 recipient key.
    pub fn new(
        protocol: Protocol,
        network: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            protocol,
            network: network.into(),
            from: from.into(),
            to: to.into(),
            reply_to: None,
            rekey_to: None,
            subject: subject.into(),
            body: body.into(),
            content_type: None,
            recipient_public_key: Vec::new(),
            public_key_kind: X25519_KEY_KIND.to_string(),
            encryption: DecrypterKind::X25519XChaCha20Poly1305
                .method_name()
                .to_string(),
            envelope: None,
            key_derivation: KeyDerivationOptions::new(),
        }
    }

    /// Set the recipient key and its kind.
    pub fn with_recipient_key(mut self, key: impl Into<Vec<u8>>, kind: impl Into<String>) -> Self {
        self.recipient_public_key = key.into();
        self.public_key_kind = kind.into();
        self
    }

    /// Set the encryption method name.
    pub fn with_encryption(mut self, method: impl Into<String>) -> Self {
        self.encryption = method.into();
        self
    }

    /// Set the envelope kind name (`"0x01"`, `"0x02"`, `"0x50"`).
    pub fn with_envelope(mut self, kind: impl Into<String>) -> Self {
        self.envelope = Some(kind.into());
        self
    }

    /// Set the reply-to address.
    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Set the rekey-to address.
    pub fn with_rekey_to(mut self, address: impl Into<String>) -> Self {
        self.rekey_to = Some(address.into());
        self
    }

    /// Set the body content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the key derivation options.
    pub fn with_key_derivation(mut self, options: KeyDerivationOptions) -> Self {
        self.key_derivation = options;
        self
    }

    fn network_key(&self) -> NetworkKey {
        NetworkKey::new(self.protocol, self.network.clone())
    }
}

struct Validated {
    from: Address,
    to: Address,
    rekey_to: Option<Address>,
    message: Message,
}

fn parse_field(field: &str, value: &str, request: &SendRequest) -> Result<Address> {
    Address::parse(value, request.protocol, request.network.clone())
        .map_err(|e| CoreError::InvalidMessage(format!("{}: {}", field, e)))
}

fn validate(request: &SendRequest) -> Result<Validated> {
    let from = parse_field("from", &request.from, request)?;
    let to = parse_field("to", &request.to, request)?;
    let reply_to = request
        .reply_to
        .as_deref()
        .map(|value| parse_field("reply_to", value, request))
        .transpose()?;
    let rekey_to = request
        .rekey_to
        .as_deref()
        .map(|value| parse_field("rekey_to", value, request))
        .transpose()?;

    match request.public_key_kind.as_str() {
        X25519_KEY_KIND if request.recipient_public_key.len() == X25519_KEY_SIZE => {}
        X25519_KEY_KIND => {
            return Err(CoreError::InvalidMessage(format!(
                "recipient key must be {} bytes, got {}",
                X25519_KEY_SIZE,
                request.recipient_public_key.len()
            )))
        }
        other => {
            return Err(CoreError::InvalidMessage(format!(
                "unknown recipient key kind: {:?}",
                other
            )))
        }
    }

    let mut headers = Headers::new(
        from.encoded().value,
        to.encoded().value,
        request.subject.clone(),
    );
    if let Some(reply_to) = &reply_to {
        headers = headers.with_reply_to(reply_to.encoded().value);
    }
    if let Some(rekey_to) = &rekey_to {
        headers = headers.with_rekey_to(rekey_to.encoded().value);
    }
    if let Some(content_type) = &request.content_type {
        headers = headers.with_content_type(content_type.clone());
    }
    let message = Message::compose(headers, request.body.clone())
        .map_err(|e| CoreError::InvalidMessage(e.to_string()))?;

    Ok(Validated {
        from,
        to,
        rekey_to,
        message,
    })
}

fn encrypter_for(request: &SendRequest) -> Result<Box<dyn Encrypter>> {
    let kind = DecrypterKind::from_method_name(&request.encryption)
        .ok_or_else(|| CoreError::UnsupportedEncryption(request.encryption.clone()))?;
    match kind {
        DecrypterKind::X25519XChaCha20Poly1305 => {
            if request.public_key_kind != X25519_KEY_KIND {
                return Err(CoreError::UnsupportedEncryption(format!(
                    "{} needs an {} key, got {}",
                    kind, X25519_KEY_KIND, request.public_key_kind
                )));
            }
            let encrypter = SealedBoxEncrypter::from_public_key(&request.recipient_public_key)
                .map_err(|e| CoreError::UnsupportedEncryption(e.to_string()))?;
            Ok(Box::new(encrypter))
        }
        DecrypterKind::NoOperation => Ok(Box::new(NoOpEncrypter)),
    }
}

/// Composes, encrypts, stores and submits messages.
pub struct SendPipeline {
    keystore: Arc<dyn Keystore>,
    senders: CapabilityRegistry<dyn NetworkSender>,
    content_stores: HashMap<EnvelopeKind, Arc<dyn ContentStore>>,
    default_envelope: EnvelopeKind,
    timeout: Duration,
}

impl std::fmt::Debug for SendPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stores: Vec<_> = self.content_stores.keys().map(|k| k.name()).collect();
        stores.sort_unstable();
        f.debug_struct("SendPipeline")
            .field("senders", &self.senders)
            .field("content_stores", &stores)
            .field("default_envelope", &self.default_envelope)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SendPipeline {
    /// Create a pipeline that defaults to inline envelopes.
    pub fn new(
        keystore: Arc<dyn Keystore>,
        senders: CapabilityRegistry<dyn NetworkSender>,
        timeout: Duration,
    ) -> Self {
        Self {
            keystore,
            senders,
            content_stores: HashMap::new(),
            default_envelope: EnvelopeKind::Inline,
            timeout,
        }
    }

    /// Register the content store used for `kind` envelopes.
    pub fn with_content_store(mut self, kind: EnvelopeKind, store: Arc<dyn ContentStore>) -> Self {
        self.content_stores.insert(kind, store);
        self
    }

    /// Envelope kind used when a request names none.
    pub fn with_default_envelope(mut self, kind: EnvelopeKind) -> Self {
        self.default_envelope = kind;
        self
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// See the module table. Cancellation before or during stage 6 yields
    /// [`CoreError::Cancelled`], possibly wrapped in the step it hit.
    pub async fn send(&self, request: SendRequest, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let validated = validate(&request)?;
        let key = request.network_key();
        let sender = self.senders.require(&key)?;

        let known = guarded(
            cancel,
            self.timeout,
            "keystore.has_address",
            self.keystore.has_address(&validated.from),
        )
        .await?;
        if !known {
            return Err(CoreError::NoSigningKey {
                address: validated.from.to_string(),
            });
        }
        let signer = guarded(
            cancel,
            self.timeout,
            "keystore.get_signer",
            self.keystore
                .get_signer(&validated.from, &request.key_derivation),
        )
        .await?;

        let encrypter = encrypter_for(&request)?;

        let kind = match &request.envelope {
            Some(name) => EnvelopeKind::from_str(name)
                .map_err(|_| CoreError::UnsupportedEnvelope(name.clone()))?,
            None => self.default_envelope,
        };
        let store = if kind.is_external() {
            let store = self.content_stores.get(&kind).ok_or_else(|| {
                CoreError::UnsupportedEnvelope(format!("no content store for {}", kind))
            })?;
            Some(Arc::clone(store))
        } else {
            None
        };

        let id = validated.message.id();
        debug!(%key, envelope = %kind, id = %id.to_hex(), "sending message");

        let envelope = self
            .seal(&validated, encrypter.as_ref(), kind, store, cancel)
            .await?;
        let envelope_data = envelope
            .to_bytes()
            .map_err(CoreError::from)
            .map_err(CoreError::at_step(SendStep::EncodeEnvelope))?;

        let transaction = OutgoingTransaction {
            from: validated.from,
            to: validated.to,
            envelope_data,
            rekey_to: validated.rekey_to.map(|a| a.raw().to_vec()),
        };
        guarded(
            cancel,
            self.timeout,
            "sender.send",
            sender.send(transaction, signer.as_ref()),
        )
        .await
        .map_err(CoreError::at_step(SendStep::Submit))?;

        info!(%key, envelope = %kind, id = %id.to_hex(), "message sent");
        Ok(())
    }

    async fn seal(
        &self,
        validated: &Validated,
        encrypter: &dyn Encrypter,
        kind: EnvelopeKind,
        store: Option<Arc<dyn ContentStore>>,
        cancel: &CancellationToken,
    ) -> Result<Envelope> {
        let message = &validated.message;
        let ciphertext = message
            .to_bytes()
            .map_err(CoreError::from)
            .and_then(|bytes| encrypter.encrypt(&bytes).map_err(CoreError::from))
            .map_err(CoreError::at_step(SendStep::EncryptBody))?;

        let store = match store {
            None => return Ok(Envelope::inline(encrypter.kind(), ciphertext)),
            Some(store) => store,
        };

        let content_hash = Hash256::hash(&ciphertext);
        let stored = guarded(
            cancel,
            self.timeout,
            "content_store.put",
            store.put(&message.id(), &content_hash, &ciphertext, message.headers()),
        )
        .await
        .map_err(CoreError::at_step(SendStep::StoreContent))?;

        let envelope = match kind {
            EnvelopeKind::Url => Envelope::url(encrypter, &stored.url, content_hash),
            EnvelopeKind::ContentAddressed => Envelope::content_addressed(
                encrypter,
                stored.location_code,
                &stored.resource,
                content_hash,
            ),
            EnvelopeKind::Inline => Ok(Envelope::inline(encrypter.kind(), ciphertext)),
        };
        envelope
            .map_err(CoreError::from)
            .map_err(CoreError::at_step(SendStep::EncryptLocation))
    }
}
