//! Property-based tests for the protocol codecs.

use proptest::prelude::*;

use chainmail_crypto::{DecrypterKind, Hash256, NoOpEncrypter};

use crate::address::{algorand_raw_address, substrate_raw_address, Protocol};
use crate::{decode, encode, Envelope, ProtocolError};

proptest! {
    /// Ethereum addresses round-trip through the codec.
    #[test]
    fn ethereum_address_roundtrip(raw in prop::array::uniform20(any::<u8>())) {
        let encoded = encode(&raw, "ethereum").unwrap();
        prop_assert_eq!(decode(&encoded.value, "ethereum").unwrap(), raw.to_vec());
    }

    /// SS58 addresses round-trip for every simple prefix.
    #[test]
    fn substrate_address_roundtrip(
        prefix in 0u8..64,
        account in prop::array::uniform32(any::<u8>()),
    ) {
        let raw = substrate_raw_address(prefix, &account).unwrap();
        let encoded = encode(&raw, "substrate").unwrap();
        prop_assert_eq!(decode(&encoded.value, "substrate").unwrap(), raw);
    }

    /// Algorand addresses round-trip.
    #[test]
    fn algorand_address_roundtrip(public_key in prop::array::uniform32(any::<u8>())) {
        let raw = algorand_raw_address(&public_key);
        let encoded = encode(&raw, "algorand").unwrap();
        prop_assert_eq!(decode(&encoded.value, "algorand").unwrap(), raw);
    }

    /// Decoding arbitrary strings never panics, whatever the protocol.
    #[test]
    fn address_decode_arbitrary(value in ".{0,80}") {
        for protocol in Protocol::ALL {
            let _ = protocol.decode_address(&value);
        }
    }

    /// Unknown protocols are rejected as unsupported in both directions.
    #[test]
    fn unknown_protocol_always_fails(protocol in "[a-z]{1,12}") {
        prop_assume!(protocol.parse::<Protocol>().is_err());
        prop_assert!(matches!(
            decode("0x00", &protocol),
            Err(ProtocolError::UnsupportedProtocol(p)) if p == protocol
        ));
        prop_assert!(matches!(
            encode(&[0u8; 20], &protocol),
            Err(ProtocolError::UnsupportedProtocol(_))
        ));
    }

    /// Envelopes survive serialization.
    #[test]
    fn envelope_roundtrip(
        content in prop::collection::vec(any::<u8>(), 0..512),
        resource in "[a-z0-9]{1,64}",
        code in any::<u64>(),
    ) {
        let inline = Envelope::inline(DecrypterKind::NoOperation, content.clone());
        prop_assert_eq!(Envelope::from_bytes(&inline.to_bytes().unwrap()).unwrap(), inline);

        let addressed = Envelope::content_addressed(
            &NoOpEncrypter,
            code,
            &resource,
            Hash256::hash(&content),
        )
        .unwrap();
        prop_assert_eq!(
            Envelope::from_bytes(&addressed.to_bytes().unwrap()).unwrap(),
            addressed
        );
    }

    /// Unmarshalling arbitrary bytes never panics.
    #[test]
    fn envelope_unmarshal_arbitrary(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        let _ = Envelope::from_bytes(&data);
    }
}
