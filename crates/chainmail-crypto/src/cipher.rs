//! Encryption and decryption capabilities.
//!
//! Envelopes record which [`DecrypterKind`] sealed their body and location
//! descriptor. The sender obtains an [`Encrypter`] from the recipient's
//! public key; the recipient obtains a [`Decrypter`] from its keystore.
//!
//! ## Sealed box layout
//!
//! ```text
//! +--------------------+----------------+------------------------+
//! | ephemeral public   | nonce          | ciphertext + tag       |
//! | 32 bytes           | 24 bytes       | variable               |
//! +--------------------+----------------+------------------------+
//! ```
//!
//! The symmetric key is `BLAKE3-derive_key(SEALED_BOX_CONTEXT, X25519(eph, recipient))`.

use crate::symmetric::{self, EncryptedData, SymmetricKey};
use crate::x25519::{
    X25519EphemeralKeyPair, X25519PublicKey, X25519StaticPrivateKey, PUBLIC_KEY_SIZE,
};
use crate::{CryptoError, Result};

/// Key derivation context for sealed boxes.
pub const SEALED_BOX_CONTEXT: &str = "chainmail 2024-06 sealed box v1";

/// Tag identifying the decryption strategy recorded in an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecrypterKind {
    /// X25519 ephemeral-static agreement + XChaCha20-Poly1305.
    X25519XChaCha20Poly1305,
    /// Identity transform, for unencrypted public mail.
    NoOperation,
}

impl DecrypterKind {
    /// All known kinds.
    pub const ALL: [DecrypterKind; 2] = [
        DecrypterKind::X25519XChaCha20Poly1305,
        DecrypterKind::NoOperation,
    ];

    /// Envelope byte for this kind.
    pub const fn to_byte(self) -> u8 {
        match self {
            DecrypterKind::X25519XChaCha20Poly1305 => b'x',
            DecrypterKind::NoOperation => 0x20,
        }
    }

    /// Parse an envelope byte. Returns `None` for unknown bytes.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.to_byte() == byte)
    }

    /// Encryption method name used by send requests.
    pub const fn method_name(self) -> &'static str {
        match self {
            DecrypterKind::X25519XChaCha20Poly1305 => "x25519-xchacha20poly1305",
            DecrypterKind::NoOperation => "noop",
        }
    }

    /// Parse an encryption method name.
    pub fn from_method_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.method_name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for DecrypterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method_name())
    }
}

/// Encrypts data for one recipient.
pub trait Encrypter: Send + Sync {
    /// The kind a recipient needs to decrypt the output.
    fn kind(&self) -> DecrypterKind;

    /// Encrypt `plaintext`.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
}

/// Decrypts data addressed to one key.
pub trait Decrypter: Send + Sync {
    /// The kind this decrypter handles.
    fn kind(&self) -> DecrypterKind;

    /// Decrypt `ciphertext`.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Seals data to a recipient X25519 public key.
#[derive(Clone, Debug)]
pub struct SealedBoxEncrypter {
    recipient: X25519PublicKey,
}

impl SealedBoxEncrypter {
    /// Create an encrypter for `recipient`.
    pub fn new(recipient: X25519PublicKey) -> Self {
        Self { recipient }
    }

    /// Create from raw public key bytes.
    pub fn from_public_key(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(X25519PublicKey::from_bytes(bytes)?))
    }
}

impl Encrypter for SealedBoxEncrypter {
    fn kind(&self) -> DecrypterKind {
        DecrypterKind::X25519XChaCha20Poly1305
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let ephemeral = X25519EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key().clone();
        let shared = ephemeral.diffie_hellman(&self.recipient);
        if shared.is_all_zero() {
            return Err(CryptoError::Encryption(
                "recipient public key is a low-order point".into(),
            ));
        }

        let key = SymmetricKey::from_bytes(&shared.derive_key(SEALED_BOX_CONTEXT))?;
        let sealed = symmetric::encrypt(&key, plaintext)?;

        let mut out = Vec::with_capacity(PUBLIC_KEY_SIZE + sealed.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&sealed.to_bytes());
        Ok(out)
    }
}

/// Opens sealed boxes with a static X25519 private key.
pub struct SealedBoxDecrypter {
    secret: X25519StaticPrivateKey,
}

impl SealedBoxDecrypter {
    /// Create a decrypter from a private key.
    pub fn new(secret: X25519StaticPrivateKey) -> Self {
        Self { secret }
    }

    /// The public key senders must seal to.
    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }
}

impl std::fmt::Debug for SealedBoxDecrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedBoxDecrypter")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl Decrypter for SealedBoxDecrypter {
    fn kind(&self) -> DecrypterKind {
        DecrypterKind::X25519XChaCha20Poly1305
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < PUBLIC_KEY_SIZE {
            return Err(CryptoError::Decryption);
        }
        let (ephemeral, sealed) = ciphertext.split_at(PUBLIC_KEY_SIZE);
        let ephemeral = X25519PublicKey::from_bytes(ephemeral)?;

        let shared = self.secret.diffie_hellman(&ephemeral);
        if shared.is_all_zero() {
            return Err(CryptoError::Decryption);
        }

        let key = SymmetricKey::from_bytes(&shared.derive_key(SEALED_BOX_CONTEXT))?;
        let sealed = EncryptedData::from_bytes(sealed)?;
        symmetric::decrypt(&key, &sealed)
    }
}

/// Pass-through encrypter.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpEncrypter;

impl Encrypter for NoOpEncrypter {
    fn kind(&self) -> DecrypterKind {
        DecrypterKind::NoOperation
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }
}

/// Pass-through decrypter.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpDecrypter;

impl Decrypter for NoOpDecrypter {
    fn kind(&self) -> DecrypterKind {
        DecrypterKind::NoOperation
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}
