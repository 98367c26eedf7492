//! Error types for the chainmail pipelines.
//!
//! Every [`CoreError`] classifies into an [`ErrorKind`] so callers can tell
//! caller mistakes from configuration gaps, missing keys, storage trouble,
//! cancellation and everything else.

use std::fmt;

use chainmail_protocol::ProtocolError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::NetworkKey;

/// Broad error classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed address, envelope, message or request. The caller's fault.
    Validation,
    /// No backend is configured (or it is disabled) for the protocol/network.
    UnsupportedCombination,
    /// A configured backend declined the network.
    NetworkNotSupported,
    /// No key or decrypter could be obtained.
    KeyResolution,
    /// Persistence or cache failure.
    Storage,
    /// The caller cancelled the operation.
    Cancelled,
    /// Anything else.
    Internal,
}

/// Sub-steps of the final send stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendStep {
    /// Encrypting the serialized message.
    EncryptBody,
    /// Storing the ciphertext with a content store.
    StoreContent,
    /// Encrypting the location descriptor.
    EncryptLocation,
    /// Serializing the envelope.
    EncodeEnvelope,
    /// Signing and submitting through the network sender.
    Submit,
}

impl SendStep {
    /// Stable step name.
    pub const fn as_str(self) -> &'static str {
        match self {
            SendStep::EncryptBody => "encrypt-body",
            SendStep::StoreContent => "store-content",
            SendStep::EncryptLocation => "encrypt-location",
            SendStep::EncodeEnvelope => "encode-envelope",
            SendStep::Submit => "submit",
        }
    }
}

impl fmt::Display for SendStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the pipelines and their collaborators.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The composed message or request is invalid.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Nothing is registered for this protocol/network.
    #[error("Unsupported protocol/network combination: {0}")]
    UnsupportedCombination(NetworkKey),

    /// The protocol/network is registered but disabled.
    #[error("Backend disabled for {0}")]
    BackendDisabled(NetworkKey),

    /// The backend declined this network.
    #[error("Network not supported: {0}")]
    NetworkNotSupported(NetworkKey),

    /// The keystore holds no signing key for the sender.
    #[error("No signing key for {address}")]
    NoSigningKey {
        /// Encoded sender address.
        address: String,
    },

    /// The encryption method or recipient key kind is not supported.
    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// The envelope kind is unknown or has no content store.
    #[error("Unsupported envelope: {0}")]
    UnsupportedEnvelope(String),

    /// No key derivation strategy produced a matching key.
    #[error("No matching key for {address}")]
    NoMatchingKey {
        /// Encoded recipient address.
        address: String,
    },

    /// The decrypter kind has no registered strategy.
    #[error("Unsupported decrypter kind: {0}")]
    UnsupportedDecrypterKind(String),

    /// The key is sealed and no passphrase was given.
    #[error("Passphrase required")]
    PassphraseRequired,

    /// The passphrase did not unseal the key.
    #[error("Invalid passphrase")]
    InvalidPassphrase,

    /// Refreshing transactions from the network failed.
    #[error("Fetch failed: {0}")]
    FetchFailed(#[source] Box<CoreError>),

    /// A send sub-step failed.
    #[error("Send failed at {step}: {source}")]
    SendStep {
        /// The failing sub-step.
        step: SendStep,
        /// What went wrong.
        #[source]
        source: Box<CoreError>,
    },

    /// A name resolver failed outside the status taxonomy.
    #[error("Name resolution failed: {0}")]
    NameResolution(String),

    /// A collaborator reported a failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// A collaborator call exceeded the request timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// The collaborator call that timed out.
        operation: &'static str,
    },

    /// Cryptographic error.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] chainmail_crypto::CryptoError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Store(#[from] chainmail_store::StoreError),
}

impl CoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Config(_)
            | CoreError::InvalidMessage(_)
            | CoreError::UnsupportedEncryption(_)
            | CoreError::UnsupportedEnvelope(_) => ErrorKind::Validation,
            CoreError::Protocol(e) => match e {
                ProtocolError::Crypto(_) | ProtocolError::Serialization(_) => ErrorKind::Internal,
                _ => ErrorKind::Validation,
            },
            CoreError::UnsupportedCombination(_) | CoreError::BackendDisabled(_) => {
                ErrorKind::UnsupportedCombination
            }
            CoreError::NetworkNotSupported(_) => ErrorKind::NetworkNotSupported,
            CoreError::NoSigningKey { .. }
            | CoreError::NoMatchingKey { .. }
            | CoreError::UnsupportedDecrypterKind(_)
            | CoreError::PassphraseRequired
            | CoreError::InvalidPassphrase => ErrorKind::KeyResolution,
            CoreError::Store(_) => ErrorKind::Storage,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::SendStep { source, .. } => match source.kind() {
                ErrorKind::Cancelled => ErrorKind::Cancelled,
                ErrorKind::Storage => ErrorKind::Storage,
                ErrorKind::NetworkNotSupported => ErrorKind::NetworkNotSupported,
                _ => ErrorKind::Internal,
            },
            CoreError::FetchFailed(_)
            | CoreError::NameResolution(_)
            | CoreError::Backend(_)
            | CoreError::Timeout { .. }
            | CoreError::Crypto(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error is a cancellation, possibly wrapped by a send step.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    pub(crate) fn at_step(step: SendStep) -> impl FnOnce(CoreError) -> CoreError {
        move |source| CoreError::SendStep {
            step,
            source: Box::new(source),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CoreError>;
