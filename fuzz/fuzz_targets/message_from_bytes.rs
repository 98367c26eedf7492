//! Fuzz target for Message::from_bytes.

#![no_main]

use chainmail_protocol::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decrypted content is attacker-chosen: never panic
    if let Ok(message) = Message::from_bytes(data) {
        let bytes = message.to_bytes().expect("decoded message must encode");
        let roundtrip = Message::from_bytes(&bytes).expect("encoded message must decode");
        assert_eq!(message.id(), roundtrip.id());
    }
});
