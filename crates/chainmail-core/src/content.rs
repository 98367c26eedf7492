//! Opening message content behind a location.
//!
//! ## Flow
//!
//! 1. Look the location's [`cache_key`](Location::cache_key) up in the
//!    [`ContentCache`]. A hit returns the cached plaintext without touching
//!    the decrypter or the network. Remote keys include the envelope's
//!    content hash, so a hit is always content the envelope vouches for.
//! 2. On a miss, take the inline ciphertext or fetch it through the
//!    [`ContentFetcher`], then check it against the envelope's content hash.
//! 3. Decrypt and write the plaintext back to the cache.
//!
//! The cache is an optimisation, never a gate. A failing cache read counts
//! as a miss; a failing cache write is reported next to the plaintext in
//! [`OpenedContent::cache_error`] and the message is still delivered.

use std::sync::Arc;
use std::time::Duration;

use chainmail_crypto::Decrypter;
use chainmail_protocol::{Location, LocationSource};
use chainmail_store::{ContentCache, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backends::ContentFetcher;
use crate::guard::guarded;
use crate::{CoreError, Result};

/// Plaintext recovered from a location.
#[derive(Debug)]
pub struct OpenedContent {
    /// Decrypted message bytes.
    pub plaintext: Vec<u8>,
    /// Whether the plaintext came from the cache.
    pub cache_hit: bool,
    /// Set when writing the plaintext back to the cache failed.
    pub cache_error: Option<StoreError>,
}

/// Reads, verifies, decrypts and caches message content.
#[derive(Clone)]
pub struct ContentOpener {
    cache: Arc<dyn ContentCache>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    timeout: Duration,
}

impl std::fmt::Debug for ContentOpener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentOpener")
            .field("has_fetcher", &self.fetcher.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ContentOpener {
    /// Create an opener. Without a fetcher only inline content opens.
    pub fn new(
        cache: Arc<dyn ContentCache>,
        fetcher: Option<Arc<dyn ContentFetcher>>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            fetcher,
            timeout,
        }
    }

    /// Recover the plaintext behind `location`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedEnvelope`] for remote content with no fetcher
    /// - [`CoreError::Protocol`] if fetched content fails the hash check
    /// - [`CoreError::Crypto`] if decryption fails
    /// - whatever the fetcher returns, including cancellation and timeout
    pub async fn open(
        &self,
        location: &Location,
        decrypter: &dyn Decrypter,
        cancel: &CancellationToken,
    ) -> Result<OpenedContent> {
        let cache_key = location.cache_key();
        match self.cache.get(&cache_key) {
            Ok(Some(plaintext)) => {
                debug!(locator = %location.locator, "content cache hit");
                return Ok(OpenedContent {
                    plaintext,
                    cache_hit: true,
                    cache_error: None,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(locator = %location.locator, error = %e, "content cache read failed");
            }
        }

        let ciphertext = match &location.source {
            LocationSource::Inline(ciphertext) => ciphertext.clone(),
            LocationSource::Remote { .. } => {
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    CoreError::UnsupportedEnvelope(format!(
                        "no content fetcher for {}",
                        location.locator
                    ))
                })?;
                guarded(
                    cancel,
                    self.timeout,
                    "content.fetch",
                    fetcher.fetch(&location.locator),
                )
                .await?
            }
        };

        location.verify(&ciphertext)?;
        let plaintext = decrypter.decrypt(&ciphertext)?;

        let cache_error = match self.cache.put(&cache_key, &plaintext) {
            Ok(()) => None,
            Err(e) => {
                warn!(locator = %location.locator, error = %e, "content cache write failed");
                Some(e)
            }
        };

        Ok(OpenedContent {
            plaintext,
            cache_hit: false,
            cache_error,
        })
    }
}
