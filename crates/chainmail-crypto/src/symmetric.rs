//! XChaCha20-Poly1305 symmetric encryption.
//!
//! Used for sealing message bodies and location descriptors (via
//! [`crate::cipher`]), for passphrase-sealed keystore seeds, and for
//! at-rest encryption of cached plaintext.
//!
//! ## Security Notes
//!
//! - Keys are zeroized on drop
//! - Nonces are 192-bit and drawn from OsRng, so random generation is safe
//! - NEVER reuse a nonce with the same key

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Size of symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of nonce in bytes (192 bits for XChaCha20).
pub const NONCE_SIZE: usize = 24;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A 256-bit symmetric key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the key bytes. Avoid logging or persisting them.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// A 192-bit nonce.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a nonce from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; NONCE_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: NONCE_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// Get the nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Encrypted data with its nonce.
///
/// Wire format: `[nonce (24 bytes)][ciphertext + tag]`
#[derive(Clone, Debug)]
pub struct EncryptedData {
    /// The nonce used for encryption.
    pub nonce: Nonce,
    /// The ciphertext with authentication tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Total serialized size.
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    /// Whether the ciphertext is empty.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Serialize to bytes (nonce || ciphertext).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(self.nonce.as_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Deserialize from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] if the input cannot hold a nonce
    /// and a tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption);
        }
        let nonce = Nonce::from_bytes(&bytes[..NONCE_SIZE])?;
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_SIZE..].to_vec(),
        })
    }
}

/// Encrypt plaintext with a fresh random nonce.
///
/// ```
/// use chainmail_crypto::symmetric::{decrypt, encrypt, SymmetricKey};
///
/// let key = SymmetricKey::generate();
/// let sealed = encrypt(&key, b"subject: hello").unwrap();
/// assert_eq!(decrypt(&key, &sealed).unwrap(), b"subject: hello");
/// ```
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<EncryptedData> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::generate();

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|_| CryptoError::Encryption("XChaCha20-Poly1305 encryption failed".into()))?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypt and authenticate.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] for a wrong key or tampered data.
pub fn decrypt(key: &SymmetricKey, encrypted: &EncryptedData) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(
            XNonce::from_slice(encrypted.nonce.as_bytes()),
            encrypted.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = SymmetricKey::generate();
        let encrypted = encrypt(&key, b"body").unwrap();
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"body");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt(&SymmetricKey::generate(), b"body").unwrap();
        assert!(matches!(
            decrypt(&SymmetricKey::generate(), &encrypted),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = SymmetricKey::generate();
        let mut encrypted = encrypt(&key, b"body").unwrap();
        encrypted.ciphertext[0] ^= 0xff;
        assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let key = SymmetricKey::generate();
        let encrypted = encrypt(&key, b"body").unwrap();
        let parsed = EncryptedData::from_bytes(&encrypted.to_bytes()).unwrap();
        assert_eq!(decrypt(&key, &parsed).unwrap(), b"body");
    }

    #[test]
    fn test_from_bytes_too_short() {
        assert!(EncryptedData::from_bytes(&[0u8; NONCE_SIZE + TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_key_length_checked() {
        assert!(matches!(
            SymmetricKey::from_bytes(&[0u8; 16]),
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_key_debug_redacted() {
        let key = SymmetricKey::from_bytes(&[7u8; 32]).unwrap();
        assert_eq!(format!("{:?}", key), "SymmetricKey([REDACTED])");
    }
}
