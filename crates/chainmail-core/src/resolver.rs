//! Decrypter resolution.
//!
//! Given a recipient address and the [`DecrypterKind`] recorded in an
//! envelope, [`DecrypterResolver`] walks the key derivation strategies
//! registered for that kind, in order, until the keystore yields a
//! decrypter. A strategy that produces the wrong key
//! ([`CoreError::NoMatchingKey`]) moves on to the next one; any other
//! keystore failure stops the walk.
//!
//! Results are not cached. Every envelope resolves afresh so a key added
//! to the keystore mid-session is picked up immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chainmail_crypto::{Decrypter, DecrypterKind};
use chainmail_protocol::Address;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::guard::guarded;
use crate::keystore::{KeyDerivation, KeyDerivationOptions, Keystore};
use crate::{CoreError, Result};

/// Maps decrypter kinds to key derivation strategies.
pub struct DecrypterResolver {
    keystore: Arc<dyn Keystore>,
    strategies: HashMap<DecrypterKind, Vec<KeyDerivation>>,
    timeout: Duration,
}

impl std::fmt::Debug for DecrypterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecrypterResolver")
            .field("strategies", &self.strategies)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DecrypterResolver {
    /// Resolver with the default strategy table.
    ///
    /// X25519 envelopes try the stored key directly, then the key derived
    /// from the signing seed. No-op envelopes need only a known address.
    pub fn new(keystore: Arc<dyn Keystore>, timeout: Duration) -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(
            DecrypterKind::X25519XChaCha20Poly1305,
            vec![KeyDerivation::Direct, KeyDerivation::SigningSeed],
        );
        strategies.insert(DecrypterKind::NoOperation, vec![KeyDerivation::Direct]);
        Self {
            keystore,
            strategies,
            timeout,
        }
    }

    /// Replace the strategies tried for `kind`.
    pub fn with_strategies(mut self, kind: DecrypterKind, strategies: Vec<KeyDerivation>) -> Self {
        self.strategies.insert(kind, strategies);
        self
    }

    /// Stop accepting envelopes sealed with `kind`.
    pub fn disable_kind(mut self, kind: DecrypterKind) -> Self {
        self.strategies.remove(&kind);
        self
    }

    /// The keystore behind this resolver.
    pub fn keystore(&self) -> &Arc<dyn Keystore> {
        &self.keystore
    }

    /// Find a decrypter of `kind` for `address`.
    ///
    /// The key is unlocked once with the passphrase in `options`, then
    /// each registered strategy is tried on it in turn. The strategy in
    /// `options` is ignored.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedDecrypterKind`] if `kind` has no strategies
    /// - [`CoreError::NoMatchingKey`] if no strategy matched
    /// - [`CoreError::Cancelled`] / [`CoreError::Timeout`] from the guard
    /// - any other keystore error as-is
    pub async fn resolve(
        &self,
        address: &Address,
        kind: DecrypterKind,
        options: &KeyDerivationOptions,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Decrypter>> {
        let strategies = self
            .strategies
            .get(&kind)
            .ok_or_else(|| CoreError::UnsupportedDecrypterKind(kind.to_string()))?;

        let key = guarded(
            cancel,
            self.timeout,
            "keystore.unlock",
            self.keystore.unlock(address, kind, options),
        )
        .await?;

        for strategy in strategies {
            match key.decrypter(*strategy) {
                Ok(decrypter) => {
                    debug!(%kind, ?strategy, "resolved decrypter");
                    return Ok(decrypter);
                }
                Err(CoreError::NoMatchingKey { .. }) => {
                    trace!(%kind, ?strategy, "strategy did not match");
                }
                Err(e) => return Err(e),
            }
        }

        Err(CoreError::NoMatchingKey {
            address: address.to_string(),
        })
    }
}
