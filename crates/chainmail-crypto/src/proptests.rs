//! Property-based tests for cryptographic primitives.

use proptest::prelude::*;

use crate::{
    decrypt, encrypt, Decrypter, Encrypter, Hash256, SealedBoxDecrypter, SealedBoxEncrypter,
    SymmetricKey, X25519StaticPrivateKey,
};

proptest! {
    /// Symmetric encryption followed by decryption returns the plaintext.
    #[test]
    fn symmetric_roundtrip(plaintext: Vec<u8>) {
        let key = SymmetricKey::generate();
        let encrypted = encrypt(&key, &plaintext).unwrap();
        prop_assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    /// Sealed boxes open for the intended recipient only.
    #[test]
    fn sealed_box_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        let recipient = SealedBoxDecrypter::new(X25519StaticPrivateKey::generate());
        let sealed = SealedBoxEncrypter::new(recipient.public_key())
            .encrypt(&plaintext)
            .unwrap();
        prop_assert_eq!(recipient.decrypt(&sealed).unwrap(), plaintext);
    }

    /// Opening arbitrary bytes never panics.
    #[test]
    fn sealed_box_open_arbitrary(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let recipient = SealedBoxDecrypter::new(X25519StaticPrivateKey::generate());
        let _ = recipient.decrypt(&data);
    }

    /// Hex encoding of hashes round-trips.
    #[test]
    fn hash_hex_roundtrip(data: Vec<u8>) {
        let hash = Hash256::hash(&data);
        prop_assert_eq!(Hash256::from_hex(&hash.to_hex()).unwrap(), hash);
    }
}
