//! # chainmail-crypto
//!
//! Cryptographic primitives for chainmail.
//!
//! This crate provides:
//! - **BLAKE3** hashing ([`Hash256`]) for content hashes and message ids
//! - **XChaCha20-Poly1305** symmetric encryption ([`symmetric`])
//! - **X25519** key agreement ([`x25519`])
//! - **Ed25519** signing ([`signing`])
//! - **Argon2id** passphrase key derivation ([`kdf`])
//! - [`Encrypter`] / [`Decrypter`] capabilities tagged with a [`DecrypterKind`]
//!
//! ## Security
//!
//! All secret data uses `zeroize` for memory cleanup.
//! Hash comparisons are constant-time via `subtle`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cipher;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod signing;
pub mod symmetric;
pub mod x25519;

#[cfg(test)]
mod proptests;

pub use cipher::{
    Decrypter, DecrypterKind, Encrypter, NoOpDecrypter, NoOpEncrypter, SealedBoxDecrypter,
    SealedBoxEncrypter,
};
pub use error::{CryptoError, Result};
pub use hash::Hash256;
pub use kdf::{derive_passphrase_key, KdfParams};
pub use signing::{verify_signature, Ed25519Signer, Signer, SIGNATURE_SIZE};
pub use symmetric::{decrypt, encrypt, EncryptedData, Nonce, SymmetricKey, KEY_SIZE, NONCE_SIZE};
pub use x25519::{SharedSecret, X25519EphemeralKeyPair, X25519PublicKey, X25519StaticPrivateKey};
