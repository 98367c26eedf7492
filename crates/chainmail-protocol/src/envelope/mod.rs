//! Envelope codec.
//!
//! An envelope is the on-chain part of a message. It records which
//! [`DecrypterKind`] sealed the message and a location descriptor telling
//! the recipient where the encrypted body lives.
//!
//! ## Wire Format
//!
//! ```text
//! +------+---------------------------------------------+
//! | tag  | bincode payload (fixed-int, no trailing)     |
//! | 1 B  | variable                                     |
//! +------+---------------------------------------------+
//! ```
//!
//! | Tag    | Kind               | Location descriptor                                   |
//! |--------|--------------------|-------------------------------------------------------|
//! | `0x01` | inline             | encrypted message content                             |
//! | `0x02` | url                | encrypted URL, content hash                           |
//! | `0x50` | content-addressed  | location code, encrypted resource id, content hash    |
//!
//! Every payload starts with the decrypter kind byte. Unknown tags are a
//! decode error; unknown decrypter bytes only fail once
//! [`Envelope::decrypter_kind`] is asked for.
//!
//! ## Modules
//!
//! - [`location`]: decrypted locations and the location code table

pub mod location;

use std::fmt;
use std::str::FromStr;

use bincode::Options;
use chainmail_crypto::{Decrypter, DecrypterKind, Encrypter, Hash256};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::limits::{MAX_ENVELOPE_SIZE, MAX_LOCATOR_LEN};
use crate::{ProtocolError, Result};

pub use location::{inline_locator, Location, LocationSource, LocationTable};

/// The closed set of envelope kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// Content travels inside the envelope.
    Inline,
    /// Content is stored at an encrypted URL.
    Url,
    /// Content is stored under a location code and encrypted resource id.
    ContentAddressed,
}

impl EnvelopeKind {
    /// All envelope kinds.
    pub const ALL: [EnvelopeKind; 3] = [
        EnvelopeKind::Inline,
        EnvelopeKind::Url,
        EnvelopeKind::ContentAddressed,
    ];

    /// Leading wire tag.
    pub const fn tag(self) -> u8 {
        match self {
            EnvelopeKind::Inline => 0x01,
            EnvelopeKind::Url => 0x02,
            EnvelopeKind::ContentAddressed => 0x50,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Name used by send requests (`"0x01"`, `"0x02"`, `"0x50"`).
    pub const fn name(self) -> &'static str {
        match self {
            EnvelopeKind::Inline => "0x01",
            EnvelopeKind::Url => "0x02",
            EnvelopeKind::ContentAddressed => "0x50",
        }
    }

    /// Whether content is stored outside the envelope.
    pub const fn is_external(self) -> bool {
        !matches!(self, EnvelopeKind::Inline)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnvelopeKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnsupportedEnvelope(s.to_string()))
    }
}

/// Payload of an inline envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineEnvelope {
    /// Decrypter kind byte.
    pub decrypter: u8,
    /// Encrypted message content.
    pub encrypted_content: Vec<u8>,
}

/// Payload of a URL envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEnvelope {
    /// Decrypter kind byte.
    pub decrypter: u8,
    /// Encrypted URL of the stored content.
    pub encrypted_url: Vec<u8>,
    /// BLAKE3 hash of the stored ciphertext.
    pub content_hash: Hash256,
}

/// Payload of a content-addressed envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAddressedEnvelope {
    /// Decrypter kind byte.
    pub decrypter: u8,
    /// Location code resolved through a [`LocationTable`].
    pub location_code: u64,
    /// Encrypted resource identifier.
    pub encrypted_resource: Vec<u8>,
    /// BLAKE3 hash of the stored ciphertext.
    pub content_hash: Hash256,
}

/// A decoded envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// Tag `0x01`.
    Inline(InlineEnvelope),
    /// Tag `0x02`.
    Url(UrlEnvelope),
    /// Tag `0x50`.
    ContentAddressed(ContentAddressedEnvelope),
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .with_limit(MAX_ENVELOPE_SIZE as u64)
}

fn decode_payload<T: DeserializeOwned>(kind: EnvelopeKind, bytes: &[u8]) -> Result<T> {
    wire_options()
        .deserialize(bytes)
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("{} payload: {}", kind, e)))
}

impl Envelope {
    /// Build an inline envelope around already-encrypted content.
    pub fn inline(decrypter: DecrypterKind, encrypted_content: Vec<u8>) -> Self {
        Envelope::Inline(InlineEnvelope {
            decrypter: decrypter.to_byte(),
            encrypted_content,
        })
    }

    /// Build a URL envelope, encrypting `url` with `encrypter`.
    pub fn url(encrypter: &dyn Encrypter, url: &str, content_hash: Hash256) -> Result<Self> {
        check_locator_len(url)?;
        Ok(Envelope::Url(UrlEnvelope {
            decrypter: encrypter.kind().to_byte(),
            encrypted_url: encrypter.encrypt(url.as_bytes())?,
            content_hash,
        }))
    }

    /// Build a content-addressed envelope, encrypting `resource` with `encrypter`.
    pub fn content_addressed(
        encrypter: &dyn Encrypter,
        location_code: u64,
        resource: &str,
        content_hash: Hash256,
    ) -> Result<Self> {
        check_locator_len(resource)?;
        Ok(Envelope::ContentAddressed(ContentAddressedEnvelope {
            decrypter: encrypter.kind().to_byte(),
            location_code,
            encrypted_resource: encrypter.encrypt(resource.as_bytes())?,
            content_hash,
        }))
    }

    /// The envelope kind.
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Inline(_) => EnvelopeKind::Inline,
            Envelope::Url(_) => EnvelopeKind::Url,
            Envelope::ContentAddressed(_) => EnvelopeKind::ContentAddressed,
        }
    }

    /// The raw decrypter kind byte.
    pub fn decrypter_byte(&self) -> u8 {
        match self {
            Envelope::Inline(e) => e.decrypter,
            Envelope::Url(e) => e.decrypter,
            Envelope::ContentAddressed(e) => e.decrypter,
        }
    }

    /// The decryption strategy that sealed this envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownDecrypterKind`] if the byte maps to
    /// no known strategy.
    pub fn decrypter_kind(&self) -> Result<DecrypterKind> {
        let byte = self.decrypter_byte();
        DecrypterKind::from_byte(byte).ok_or(ProtocolError::UnknownDecrypterKind(byte))
    }

    /// The encrypted location descriptor bytes.
    pub fn location_descriptor(&self) -> &[u8] {
        match self {
            Envelope::Inline(e) => &e.encrypted_content,
            Envelope::Url(e) => &e.encrypted_url,
            Envelope::ContentAddressed(e) => &e.encrypted_resource,
        }
    }

    /// Decrypt the location descriptor.
    ///
    /// Inline envelopes need no decryption at this stage: their descriptor
    /// is the encrypted content, returned as [`LocationSource::Inline`].
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Crypto`] if the descriptor does not decrypt
    /// - [`ProtocolError::MalformedEnvelope`] if the locator is not UTF-8 or too long
    /// - [`ProtocolError::UnknownLocationCode`] for unregistered location codes
    pub fn locate(&self, decrypter: &dyn Decrypter, table: &LocationTable) -> Result<Location> {
        match self {
            Envelope::Inline(e) => Ok(Location::inline(e.encrypted_content.clone())),
            Envelope::Url(e) => {
                let url = decrypt_locator(decrypter, &e.encrypted_url)?;
                Ok(Location {
                    locator: url,
                    source: LocationSource::Remote {
                        content_hash: e.content_hash,
                    },
                })
            }
            Envelope::ContentAddressed(e) => {
                let resource = decrypt_locator(decrypter, &e.encrypted_resource)?;
                Ok(Location {
                    locator: table.resolve(e.location_code, &resource)?,
                    source: LocationSource::Remote {
                        content_hash: e.content_hash,
                    },
                })
            }
        }
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Envelope::Inline(e) => wire_options().serialize(e),
            Envelope::Url(e) => wire_options().serialize(e),
            Envelope::ContentAddressed(e) => wire_options().serialize(e),
        }
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

        if 1 + payload.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::MalformedEnvelope(format!(
                "envelope too large: {} bytes exceeds maximum {} bytes",
                1 + payload.len(),
                MAX_ENVELOPE_SIZE
            )));
        }

        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(self.kind().tag());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedEnvelope`] for empty or oversize
    /// input, unknown tags, and payloads that do not match the tag's schema.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::MalformedEnvelope(format!(
                "envelope too large: {} bytes exceeds maximum {} bytes",
                bytes.len(),
                MAX_ENVELOPE_SIZE
            )));
        }

        let (&tag, payload) = bytes
            .split_first()
            .ok_or_else(|| ProtocolError::MalformedEnvelope("empty envelope".to_string()))?;
        let kind = EnvelopeKind::from_tag(tag).ok_or_else(|| {
            ProtocolError::MalformedEnvelope(format!("unknown envelope tag 0x{:02x}", tag))
        })?;

        Ok(match kind {
            EnvelopeKind::Inline => Envelope::Inline(decode_payload(kind, payload)?),
            EnvelopeKind::Url => Envelope::Url(decode_payload(kind, payload)?),
            EnvelopeKind::ContentAddressed => {
                Envelope::ContentAddressed(decode_payload(kind, payload)?)
            }
        })
    }
}

fn check_locator_len(locator: &str) -> Result<()> {
    if locator.len() > MAX_LOCATOR_LEN {
        return Err(ProtocolError::MalformedEnvelope(format!(
            "locator too long: {} bytes exceeds maximum {} bytes",
            locator.len(),
            MAX_LOCATOR_LEN
        )));
    }
    Ok(())
}

fn decrypt_locator(decrypter: &dyn Decrypter, ciphertext: &[u8]) -> Result<String> {
    let bytes = decrypter.decrypt(ciphertext)?;
    let locator = String::from_utf8(bytes)
        .map_err(|_| ProtocolError::MalformedEnvelope("locator is not UTF-8".to_string()))?;
    check_locator_len(&locator)?;
    Ok(locator)
}
