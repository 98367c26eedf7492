//! Fuzz target for address decoding.
//!
//! Any string may be handed to the decoder for any protocol. Decoding must
//! never panic, and whatever decodes must re-encode to the same raw bytes.

#![no_main]

use chainmail_protocol::Protocol;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = std::str::from_utf8(data) else {
        return;
    };

    for protocol in Protocol::ALL {
        if let Ok(raw) = protocol.decode_address(value) {
            let encoded = protocol
                .encode_address(&raw)
                .expect("decoded raw address must encode");
            let again = protocol
                .decode_address(&encoded.value)
                .expect("encoded address must decode");
            assert_eq!(raw, again);
        }
    }
});
