//! Resolved content locations.

use std::collections::BTreeMap;

use chainmail_crypto::Hash256;
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Result};

/// Prefix of locators for content carried inside the envelope.
pub const INLINE_LOCATOR_PREFIX: &str = "inline:";

/// Maps content-addressed location codes to the base URL they resolve under.
///
/// Codes travel in the clear inside content-addressed envelopes; the
/// resource identifier appended to the base URL is encrypted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationTable {
    codes: BTreeMap<u64, String>,
}

impl LocationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a code.
    pub fn with_location(mut self, code: u64, base_url: impl Into<String>) -> Self {
        self.insert(code, base_url);
        self
    }

    /// Add or replace a code in place.
    pub fn insert(&mut self, code: u64, base_url: impl Into<String>) {
        self.codes.insert(code, base_url.into());
    }

    /// The base URL for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownLocationCode`] if the code is not registered.
    pub fn base_url(&self, code: u64) -> Result<&str> {
        self.codes
            .get(&code)
            .map(String::as_str)
            .ok_or(ProtocolError::UnknownLocationCode(code))
    }

    /// Join a base URL and resource identifier.
    pub fn resolve(&self, code: u64, resource: &str) -> Result<String> {
        let base = self.base_url(code)?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), resource))
    }

    /// Number of registered codes.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether no codes are registered.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl From<BTreeMap<u64, String>> for LocationTable {
    fn from(codes: BTreeMap<u64, String>) -> Self {
        Self { codes }
    }
}

/// Where the encrypted message content lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocationSource {
    /// The content ciphertext was carried inside the envelope.
    Inline(Vec<u8>),
    /// The content ciphertext must be fetched from the locator.
    Remote {
        /// BLAKE3 hash of the stored ciphertext.
        content_hash: Hash256,
    },
}

/// A decrypted location descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// Cache key and fetch target for the content.
    pub locator: String,
    /// How to obtain the content ciphertext.
    pub source: LocationSource,
}

impl Location {
    /// Build the location of inline content.
    pub fn inline(ciphertext: Vec<u8>) -> Self {
        Self {
            locator: inline_locator(&ciphertext),
            source: LocationSource::Inline(ciphertext),
        }
    }

    /// Whether the content must be fetched.
    pub fn is_remote(&self) -> bool {
        matches!(self.source, LocationSource::Remote { .. })
    }

    /// Key under which the plaintext is cached.
    ///
    /// Remote keys carry the expected content hash, so an envelope that
    /// points an existing locator at different content misses the cache.
    pub fn cache_key(&self) -> String {
        match &self.source {
            LocationSource::Inline(_) => self.locator.clone(),
            LocationSource::Remote { content_hash } => {
                format!("{}#{}", self.locator, content_hash.to_hex())
            }
        }
    }

    /// Check fetched ciphertext against the hash recorded in the envelope.
    ///
    /// Inline content is accepted as-is since it is part of the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::IntegrityMismatch`] if the hashes differ.
    pub fn verify(&self, ciphertext: &[u8]) -> Result<()> {
        match &self.source {
            LocationSource::Inline(_) => Ok(()),
            LocationSource::Remote { content_hash } => {
                if Hash256::hash(ciphertext) == *content_hash {
                    Ok(())
                } else {
                    Err(ProtocolError::IntegrityMismatch {
                        locator: self.locator.clone(),
                    })
                }
            }
        }
    }
}

/// Locator under which inline ciphertext is cached.
pub fn inline_locator(ciphertext: &[u8]) -> String {
    format!("{}{}", INLINE_LOCATOR_PREFIX, Hash256::hash(ciphertext).to_hex())
}
