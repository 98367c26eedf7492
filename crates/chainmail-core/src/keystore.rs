//! Key material access.
//!
//! The pipelines never touch private keys directly. They ask a [`Keystore`]
//! for a [`Signer`] (send) or a [`Decrypter`] (receive), passing
//! [`KeyDerivationOptions`] that select how the decryption key is derived
//! from the stored seed:
//!
//! | Strategy                     | X25519 secret                                   |
//! |------------------------------|-------------------------------------------------|
//! | [`KeyDerivation::Direct`]      | the stored 32-byte seed                         |
//! | [`KeyDerivation::SigningSeed`] | `BLAKE3-derive_key(SIGNING_SEED_CONTEXT, seed)` |
//!
//! A strategy *matches* an address when the derived public key equals the
//! encryption key registered for it.
//!
//! [`MemoryKeystore`] keeps seeds in memory, optionally sealed under a
//! passphrase with Argon2id and XChaCha20-Poly1305.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chainmail_crypto::symmetric::{decrypt, encrypt, EncryptedData};
use chainmail_crypto::{
    derive_passphrase_key, Decrypter, DecrypterKind, Ed25519Signer, KdfParams, NoOpDecrypter,
    SealedBoxDecrypter, Signer, X25519PublicKey, X25519StaticPrivateKey,
};
use chainmail_protocol::{Address, Protocol};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::{CoreError, Result};

/// Key derivation context for the signing-seed strategy.
pub const SIGNING_SEED_CONTEXT: &str = "chainmail 2024-06 signing seed to x25519";

const SEED_SIZE: usize = 32;
const SALT_SIZE: usize = 16;

/// Provides signing and decryption capabilities for local addresses.
#[async_trait]
pub trait Keystore: Send + Sync {
    /// Whether key material exists for `address`.
    async fn has_address(&self, address: &Address) -> Result<bool>;

    /// A signer for `address`.
    ///
    /// Fails with [`CoreError::NoSigningKey`] if the address is unknown.
    async fn get_signer(
        &self,
        address: &Address,
        options: &KeyDerivationOptions,
    ) -> Result<Arc<dyn Signer>>;

    /// Unlock the key material `address` needs for `kind` envelopes.
    ///
    /// Passphrase stretching happens here, once, so the returned handle
    /// can try every derivation strategy cheaply. Fails with
    /// [`CoreError::NoMatchingKey`] if the address is unknown.
    async fn unlock(
        &self,
        address: &Address,
        kind: DecrypterKind,
        options: &KeyDerivationOptions,
    ) -> Result<Box<dyn UnlockedKey>>;

    /// A decrypter of `kind` for `address`, derived per `options.strategy`.
    ///
    /// Fails with [`CoreError::NoMatchingKey`] when the strategy does not
    /// produce the address's key.
    async fn get_decrypter(
        &self,
        address: &Address,
        kind: DecrypterKind,
        options: &KeyDerivationOptions,
    ) -> Result<Arc<dyn Decrypter>> {
        self.unlock(address, kind, options)
            .await?
            .decrypter(options.strategy)
    }
}

/// Key material unlocked for one resolution. Dropping it drops the seed.
pub trait UnlockedKey: Send + Sync {
    /// A decrypter derived per `strategy`, or [`CoreError::NoMatchingKey`]
    /// if `strategy` does not produce the registered key.
    fn decrypter(&self, strategy: KeyDerivation) -> Result<Arc<dyn Decrypter>>;
}

/// How a decryption key is derived from a stored seed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyDerivation {
    /// The seed is the X25519 secret.
    #[default]
    Direct,
    /// The X25519 secret is derived from the signing seed.
    SigningSeed,
}

/// Options passed to the keystore on every request.
#[derive(Clone, Default)]
pub struct KeyDerivationOptions {
    /// Derivation strategy to try.
    pub strategy: KeyDerivation,
    passphrase: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for KeyDerivationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDerivationOptions")
            .field("strategy", &self.strategy)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl KeyDerivationOptions {
    /// Options with the direct strategy and no passphrase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unseal keys with `passphrase`.
    pub fn with_passphrase(mut self, passphrase: impl AsRef<[u8]>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.as_ref().to_vec()));
        self
    }

    /// Use `strategy`.
    pub fn with_strategy(mut self, strategy: KeyDerivation) -> Self {
        self.strategy = strategy;
        self
    }

    /// The passphrase, if any.
    pub fn passphrase(&self) -> Option<&[u8]> {
        self.passphrase.as_deref().map(Vec::as_slice)
    }
}

enum Seed {
    Plain(Zeroizing<[u8; SEED_SIZE]>),
    Sealed {
        salt: [u8; SALT_SIZE],
        sealed: EncryptedData,
    },
}

struct KeyEntry {
    seed: Arc<Seed>,
    encryption_key: X25519PublicKey,
}

type EntryKey = (Protocol, String, Vec<u8>);

fn entry_key(address: &Address) -> EntryKey {
    (
        address.protocol(),
        address.network().to_string(),
        address.raw().to_vec(),
    )
}

fn x25519_secret(seed: &[u8; SEED_SIZE], strategy: KeyDerivation) -> Result<X25519StaticPrivateKey> {
    let secret = match strategy {
        KeyDerivation::Direct => Zeroizing::new(*seed),
        KeyDerivation::SigningSeed => Zeroizing::new(blake3::derive_key(SIGNING_SEED_CONTEXT, seed)),
    };
    Ok(X25519StaticPrivateKey::from_bytes(secret.as_ref())?)
}

/// In-memory [`Keystore`].
pub struct MemoryKeystore {
    entries: RwLock<HashMap<EntryKey, KeyEntry>>,
    kdf: KdfParams,
}

impl std::fmt::Debug for MemoryKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("MemoryKeystore")
            .field("addresses", &count)
            .field("kdf", &self.kdf)
            .finish()
    }
}

impl Default for MemoryKeystore {
    fn default() -> Self {
        Self::new(KdfParams::default())
    }
}

impl MemoryKeystore {
    /// Create an empty keystore sealing with `kdf`.
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            kdf,
        }
    }

    /// Store `seed` for `address`. The registered encryption key is the
    /// public key `strategy` derives from it.
    pub fn add_key(
        &self,
        address: &Address,
        seed: [u8; SEED_SIZE],
        strategy: KeyDerivation,
    ) -> Result<X25519PublicKey> {
        let seed = Zeroizing::new(seed);
        let encryption_key = x25519_secret(&seed, strategy)?.public_key();
        self.insert(address, Seed::Plain(seed), encryption_key.clone())?;
        Ok(encryption_key)
    }

    /// Store `seed` for `address`, sealed under `passphrase`.
    pub fn add_sealed_key(
        &self,
        address: &Address,
        seed: [u8; SEED_SIZE],
        strategy: KeyDerivation,
        passphrase: &[u8],
    ) -> Result<X25519PublicKey> {
        let seed = Zeroizing::new(seed);
        let encryption_key = x25519_secret(&seed, strategy)?.public_key();

        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let key = derive_passphrase_key(passphrase, &salt, &self.kdf)?;
        let sealed = encrypt(&key, seed.as_ref())?;

        self.insert(address, Seed::Sealed { salt, sealed }, encryption_key.clone())?;
        Ok(encryption_key)
    }

    /// Generate a random seed for `address`.
    pub fn generate(&self, address: &Address, strategy: KeyDerivation) -> Result<X25519PublicKey> {
        let mut seed = [0u8; SEED_SIZE];
        OsRng.fill_bytes(&mut seed);
        let public = self.add_key(address, seed, strategy);
        zeroize::Zeroize::zeroize(&mut seed);
        public
    }

    /// The encryption key senders should seal to for `address`.
    pub fn encryption_key(&self, address: &Address) -> Option<X25519PublicKey> {
        self.entries
            .read()
            .ok()?
            .get(&entry_key(address))
            .map(|entry| entry.encryption_key.clone())
    }

    /// Forget `address`.
    pub fn remove(&self, address: &Address) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .map_err(|_| CoreError::Backend("keystore lock poisoned".into()))?
            .remove(&entry_key(address))
            .is_some())
    }

    fn insert(&self, address: &Address, seed: Seed, encryption_key: X25519PublicKey) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| CoreError::Backend("keystore lock poisoned".into()))?
            .insert(
                entry_key(address),
                KeyEntry {
                    seed: Arc::new(seed),
                    encryption_key,
                },
            );
        debug!(protocol = %address.protocol(), network = %address.network(), "added key");
        Ok(())
    }

    fn lookup(&self, address: &Address) -> Result<Option<(Arc<Seed>, X25519PublicKey)>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CoreError::Backend("keystore lock poisoned".into()))?;
        Ok(entries
            .get(&entry_key(address))
            .map(|entry| (Arc::clone(&entry.seed), entry.encryption_key.clone())))
    }

    /// Recover the plain seed. Sealed seeds are stretched on the blocking
    /// pool so a caller that times out or cancels is not held up by Argon2.
    async fn unseal(
        &self,
        seed: Arc<Seed>,
        options: &KeyDerivationOptions,
    ) -> Result<Zeroizing<[u8; SEED_SIZE]>> {
        if let Seed::Plain(plain) = seed.as_ref() {
            return Ok(plain.clone());
        }
        let passphrase = Zeroizing::new(
            options
                .passphrase()
                .ok_or(CoreError::PassphraseRequired)?
                .to_vec(),
        );
        let kdf = self.kdf;
        tokio::task::spawn_blocking(move || open_sealed(&seed, &passphrase, &kdf))
            .await
            .map_err(|e| CoreError::Backend(format!("unseal task failed: {}", e)))?
    }
}

fn open_sealed(seed: &Seed, passphrase: &[u8], kdf: &KdfParams) -> Result<Zeroizing<[u8; SEED_SIZE]>> {
    let (salt, sealed) = match seed {
        Seed::Plain(plain) => return Ok(plain.clone()),
        Seed::Sealed { salt, sealed } => (salt, sealed),
    };
    let key = derive_passphrase_key(passphrase, salt, kdf)?;
    let plain = Zeroizing::new(decrypt(&key, sealed).map_err(|_| CoreError::InvalidPassphrase)?);
    if plain.len() != SEED_SIZE {
        return Err(CoreError::InvalidPassphrase);
    }
    let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
    seed.copy_from_slice(&plain);
    Ok(seed)
}

/// Seed unlocked by [`MemoryKeystore::unlock`].
struct MemoryUnlockedKey {
    address: String,
    kind: DecrypterKind,
    seed: Option<Zeroizing<[u8; SEED_SIZE]>>,
    encryption_key: X25519PublicKey,
}

impl UnlockedKey for MemoryUnlockedKey {
    fn decrypter(&self, strategy: KeyDerivation) -> Result<Arc<dyn Decrypter>> {
        let no_match = || CoreError::NoMatchingKey {
            address: self.address.clone(),
        };
        match (self.kind, &self.seed) {
            (DecrypterKind::NoOperation, _) => Ok(Arc::new(NoOpDecrypter)),
            (DecrypterKind::X25519XChaCha20Poly1305, None) => Err(no_match()),
            (DecrypterKind::X25519XChaCha20Poly1305, Some(seed)) => {
                let secret = x25519_secret(seed, strategy)?;
                if secret.public_key() != self.encryption_key {
                    return Err(no_match());
                }
                Ok(Arc::new(SealedBoxDecrypter::new(secret)))
            }
        }
    }
}

#[async_trait]
impl Keystore for MemoryKeystore {
    async fn has_address(&self, address: &Address) -> Result<bool> {
        Ok(self.lookup(address)?.is_some())
    }

    async fn get_signer(
        &self,
        address: &Address,
        options: &KeyDerivationOptions,
    ) -> Result<Arc<dyn Signer>> {
        let (seed, _) = self.lookup(address)?.ok_or_else(|| CoreError::NoSigningKey {
            address: address.to_string(),
        })?;
        let seed = self.unseal(seed, options).await?;
        Ok(Arc::new(Ed25519Signer::from_seed(seed.as_ref())?))
    }

    async fn unlock(
        &self,
        address: &Address,
        kind: DecrypterKind,
        options: &KeyDerivationOptions,
    ) -> Result<Box<dyn UnlockedKey>> {
        let (seed, encryption_key) =
            self.lookup(address)?
                .ok_or_else(|| CoreError::NoMatchingKey {
                    address: address.to_string(),
                })?;
        let seed = match kind {
            DecrypterKind::NoOperation => None,
            DecrypterKind::X25519XChaCha20Poly1305 => Some(self.unseal(seed, options).await?),
        };
        Ok(Box::new(MemoryUnlockedKey {
            address: address.to_string(),
            kind,
            seed,
            encryption_key,
        }))
    }
}
