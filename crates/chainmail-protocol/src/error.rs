//! Error types for protocol operations.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] chainmail_crypto::CryptoError),

    /// The protocol identifier is not recognized.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// The address string or raw bytes do not conform to the protocol's encoding.
    #[error("Malformed {protocol} address: {reason}")]
    MalformedAddress {
        /// Protocol the address was checked against.
        protocol: String,
        /// What was wrong.
        reason: String,
    },

    /// Envelope bytes could not be parsed.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope's decrypter byte maps to no known strategy.
    #[error("Unknown decrypter kind: 0x{0:02x}")]
    UnknownDecrypterKind(u8),

    /// The requested envelope kind name is not supported.
    #[error("Unsupported envelope: {0}")]
    UnsupportedEnvelope(String),

    /// A content-addressed envelope names a location code with no base URL.
    #[error("Unknown location code: {0}")]
    UnknownLocationCode(u64),

    /// Message failed validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Content did not match the hash recorded in the envelope.
    #[error("Content integrity check failed for {locator}")]
    IntegrityMismatch {
        /// Locator the content was fetched from.
        locator: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ProtocolError {
    pub(crate) fn malformed_address(protocol: impl ToString, reason: impl Into<String>) -> Self {
        Self::MalformedAddress {
            protocol: protocol.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
