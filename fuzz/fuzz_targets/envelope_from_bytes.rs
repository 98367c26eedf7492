//! Fuzz target for Envelope::from_bytes.
//!
//! Transaction payloads come straight off the network, so decoding must
//! reject garbage without panicking.

#![no_main]

use chainmail_protocol::Envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = Envelope::from_bytes(data) {
        // Decoded envelopes re-encode to something that decodes the same
        let bytes = envelope.to_bytes().expect("decoded envelope must encode");
        let roundtrip = Envelope::from_bytes(&bytes).expect("encoded envelope must decode");
        assert_eq!(envelope, roundtrip);
        let _ = envelope.decrypter_kind();
    }
});
