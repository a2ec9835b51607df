#![no_main]

use libfuzzer_sys::fuzz_target;
use quiz_room_client::action::Action;
use quiz_room_client::protocol::ServerMessage;
use quiz_room_client::reducer::{initial_state, reduce};

fuzz_target!(|data: &[u8]| {
    // Split the input into newline-separated frames so one run can fold a
    // sequence of messages through the reducer.
    let mut state = initial_state();
    for (i, frame) in data.split(|b| *b == b'\n').enumerate() {
        let Ok(message) = serde_json::from_slice::<ServerMessage>(frame) else {
            continue;
        };
        for action in Action::from_server_message(message, i as u64 * 1_000) {
            state = reduce(state, &action);
        }
    }

    // Normalization bounds hold whatever arrived.
    for team in state.teams.values() {
        assert_eq!(team.deck_slots.len(), 4);
        if let Some(writer) = &team.writer_player_id {
            assert!(!team.suggester_player_ids.contains(writer));
        }
    }
    assert!(state.effects.active_effects.len() <= quiz_room_client::reducer::MAX_ACTIVE_EFFECTS);
});
