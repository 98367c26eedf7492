//! Ed25519 signing.
//!
//! Network senders sign the envelope they submit with a [`Signer`]
//! obtained from the keystore for the `from` address.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::{CryptoError, Result};

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Signs payloads on behalf of one address.
pub trait Signer: Send + Sync {
    /// The public key that verifies this signer's signatures.
    fn public_key(&self) -> Vec<u8>;

    /// Sign `message`.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Ed25519 signer backed by a 32-byte seed.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a random signer.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create a signer from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: &[u8; 32] = seed
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: seed.len(),
            })?;
        Ok(Self {
            key: SigningKey::from_bytes(seed),
        })
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &hex::encode(self.key.verifying_key().as_bytes()))
            .finish()
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

/// Verify an Ed25519 signature.
///
/// # Errors
///
/// Returns [`CryptoError::SignatureVerification`] for malformed keys,
/// malformed signatures, or a signature that does not verify.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let public_key: &[u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::SignatureVerification)?;
    let verifying =
        VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::SignatureVerification)?;
    let signature =
        Signature::from_slice(signature).map_err(|_| CryptoError::SignatureVerification)?;
    verifying
        .verify(message, &signature)
        .map_err(|_| CryptoError::SignatureVerification)
}
