#![no_main]

use libfuzzer_sys::fuzz_target;
use quiz_room_client::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = serde_json::from_slice::<ClientMessage>(data) {
        // Anything that decodes must encode again.
        let json = serde_json::to_string(&message).unwrap_or_default();
        assert!(!json.is_empty());
        let _ = message.gate_action();
    }
});
