#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests: JSON fixtures shaped like real authority traffic, and
//! the exact shape of every outbound message.

use quiz_room_client::gate::GateAction;
use quiz_room_client::protocol::{
    ClientMessage, GoldUpdatePayload, MessageType, RoundState, ServerMessage, StateSnapshot,
};
use serde_json::{json, Value};

fn decode(value: Value) -> ServerMessage {
    serde_json::from_value(value).expect("decode server message")
}

fn encode(message: &ClientMessage) -> Value {
    serde_json::to_value(message).expect("encode client message")
}

// ════════════════════════════════════════════════════════════════════
// Inbound
// ════════════════════════════════════════════════════════════════════

#[test]
fn state_sync_fixture() {
    let msg = decode(json!({
        "type": "state-sync",
        "data": {
            "roundState": "ROUND_ACTIVE",
            "questionText": "Name a prime",
            "timeRemaining": 42,
            "timerEnabled": true,
            "teams": {
                "t1": {
                    "name": "Owls",
                    "gold": 6,
                    "writerPlayerId": "p1",
                    "suggesterPlayerIds": ["p2", "p3"],
                    "answer": "7",
                    "locked": false,
                    "deckSlots": ["fog", null, "", "boost"],
                    "deckLocked": true,
                    "teamCardPool": ["fog", "boost"],
                    "suggestions": [{ "text": "11", "suggesterId": "p2", "timestamp": 17 }]
                }
            },
            "gold": { "t1": 6 }
        }
    }));

    let ServerMessage::StateSync(snapshot) = msg else {
        panic!("expected state-sync, got {msg:?}");
    };
    assert_eq!(snapshot.round_state, Some(RoundState::Active));
    assert_eq!(snapshot.time_remaining, Some(42));
    assert_eq!(snapshot.team_count(), 1);
    let team = &snapshot.teams.as_ref().unwrap()["t1"];
    assert_eq!(team.writer_player_id.as_deref(), Some("p1"));
    assert_eq!(team.deck_slots.as_ref().unwrap().len(), 4);
    assert_eq!(team.suggestions.as_ref().unwrap()[0].timestamp, Some(17));
}

#[test]
fn partial_state_sync_has_no_opinion_on_missing_fields() {
    let ServerMessage::StateSync(snapshot) =
        decode(json!({ "type": "state-sync", "data": { "timeRemaining": 5 } }))
    else {
        panic!("expected state-sync");
    };
    assert_eq!(
        snapshot,
        StateSnapshot {
            time_remaining: Some(5),
            ..StateSnapshot::default()
        }
    );
}

#[test]
fn legacy_team_identity_fields_decode() {
    let msg = decode(json!({
        "type": "TEAM_UPDATE",
        "data": { "teams": { "t1": { "writer": "session-9", "suggesters": ["session-4"] } } }
    }));
    let ServerMessage::TeamUpdate(payload) = msg else {
        panic!("expected TEAM_UPDATE");
    };
    let team = &payload.teams.unwrap()["t1"];
    assert_eq!(team.writer.as_deref(), Some("session-9"));
    assert_eq!(team.writer_player_id, None);
}

#[test]
fn gold_update_prefers_teams_key() {
    let ServerMessage::GoldUpdate(payload) = decode(json!({
        "type": "GOLD_UPDATE",
        "data": { "teams": { "A": 3 }, "gold": { "A": 99 } }
    })) else {
        panic!("expected GOLD_UPDATE");
    };
    assert_eq!(payload.entries().unwrap()["A"], 3);

    let legacy: GoldUpdatePayload = serde_json::from_value(json!({ "gold": { "B": -4 } })).unwrap();
    assert_eq!(legacy.entries().unwrap()["B"], -4);
}

#[test]
fn round_score_fixture() {
    let ServerMessage::RoundScore(result) = decode(json!({
        "type": "ROUND_SCORE",
        "data": {
            "roundNumber": 2,
            "question": "2+2?",
            "evaluationScores": { "teams": { "A": 0.8, "B": 0.4 }, "perPlayer": { "p1": { "score": 1 } } },
            "roundPoints": { "teams": { "A": 3.0 } },
            "answers": { "A": "4", "B": "5" },
            "roundWinner": "A",
            "matchOver": false
        }
    })) else {
        panic!("expected ROUND_SCORE");
    };
    assert_eq!(result.round_number, Some(2));
    assert_eq!(result.round_winner.as_deref(), Some("A"));
    let eval = result.evaluation_scores.unwrap();
    assert!((eval.teams["A"] - 0.8).abs() < f64::EPSILON);
    assert_eq!(eval.per_player["p1"]["score"], 1);
    assert_eq!(result.match_over, Some(false));
}

#[test]
fn match_over_fixture() {
    let ServerMessage::MatchOver(result) = decode(json!({
        "type": "MATCH_OVER",
        "data": {
            "winner": "B",
            "finalScores": { "teams": { "A": 5.0, "B": 9.0 } },
            "mvp": { "playerId": "p4", "points": 12 }
        }
    })) else {
        panic!("expected MATCH_OVER");
    };
    assert_eq!(result.winner.as_deref(), Some("B"));
    assert_eq!(result.final_scores.unwrap().teams.len(), 2);
    assert_eq!(result.mvp.unwrap()["playerId"], "p4");
}

#[test]
fn signal_messages_need_no_data() {
    assert_eq!(
        decode(json!({ "type": "MATCH_RESET" })),
        ServerMessage::MatchReset
    );
    assert_eq!(
        decode(json!({ "type": "ROUND_ENDED", "data": null })),
        ServerMessage::RoundEnded
    );
}

#[test]
fn passive_messages_keep_their_data() {
    let msg = decode(json!({ "type": "XP_EARNED", "data": { "xp": 30 } }));
    assert_eq!(msg.message_type(), Some(MessageType::XpEarned));
    let ServerMessage::Passive { data, .. } = &msg else {
        panic!("expected passive message");
    };
    assert_eq!(data["xp"], 30);

    let reencoded: Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(reencoded, json!({ "type": "XP_EARNED", "data": { "xp": 30 } }));
}

#[test]
fn unknown_messages_are_preserved_not_rejected() {
    let msg = decode(json!({ "type": "FUTURE_THING", "data": [1, 2] }));
    assert_eq!(msg.message_type(), None);
    assert_eq!(msg.name(), "FUTURE_THING");
}

#[test]
fn bad_payload_shape_is_a_decode_error() {
    let err = serde_json::from_value::<ServerMessage>(json!({
        "type": "TIMER_UPDATE",
        "data": { "timeRemaining": "soon" }
    }));
    assert!(err.is_err());
    assert!(serde_json::from_str::<ServerMessage>(r#"{"data":{}}"#).is_err());
}

#[test]
fn card_cast_and_moderation_fixtures() {
    let ServerMessage::CardCast(cast) = decode(json!({
        "type": "CARD_CAST",
        "data": { "cardId": "fog", "casterTeamId": "A", "targetTeamId": "B", "isCosmetic": true }
    })) else {
        panic!("expected CARD_CAST");
    };
    assert_eq!(cast.target_team_id.as_deref(), Some("B"));
    assert_eq!(cast.is_cosmetic, Some(true));

    let ServerMessage::ModerationUpdate(moderation) = decode(json!({
        "type": "MODERATION_UPDATE",
        "data": { "mutedPlayers": ["p1"], "roundFrozen": true }
    })) else {
        panic!("expected MODERATION_UPDATE");
    };
    assert_eq!(moderation.muted_players, Some(vec!["p1".to_owned()]));
    assert_eq!(moderation.frozen_teams, None);
    assert_eq!(moderation.round_frozen, Some(true));
}

// ════════════════════════════════════════════════════════════════════
// Outbound
// ════════════════════════════════════════════════════════════════════

#[test]
fn outbound_wire_shapes() {
    assert_eq!(
        encode(&ClientMessage::Suggestion { text: "4".into() }),
        json!({ "type": "suggestion", "data": { "text": "4" } })
    );
    assert_eq!(
        encode(&ClientMessage::InsertSuggestion {
            suggester_id: "p2".into(),
            timestamp: 1_700
        }),
        json!({ "type": "insertSuggestion", "data": { "suggesterId": "p2", "timestamp": 1_700 } })
    );
    assert_eq!(
        encode(&ClientMessage::UpdateAnswer { answer: "4".into() }),
        json!({ "type": "updateAnswer", "data": { "answer": "4" } })
    );
    assert_eq!(
        encode(&ClientMessage::LockAnswer { answer: "4".into() }),
        json!({ "type": "lockAnswer", "data": { "answer": "4" } })
    );
    assert_eq!(
        encode(&ClientMessage::CastCard {
            card_id: "fog".into(),
            target_team_id: "B".into()
        }),
        json!({ "type": "castCard", "data": { "cardId": "fog", "targetTeamId": "B" } })
    );
}

#[test]
fn outbound_messages_map_to_gate_actions() {
    let pairs = [
        (
            ClientMessage::Suggestion { text: String::new() },
            GateAction::Suggestion,
        ),
        (
            ClientMessage::InsertSuggestion {
                suggester_id: String::new(),
                timestamp: 0,
            },
            GateAction::InsertSuggestion,
        ),
        (
            ClientMessage::UpdateAnswer {
                answer: String::new(),
            },
            GateAction::UpdateAnswer,
        ),
        (
            ClientMessage::LockAnswer {
                answer: String::new(),
            },
            GateAction::LockAnswer,
        ),
        (
            ClientMessage::CastCard {
                card_id: String::new(),
                target_team_id: String::new(),
            },
            GateAction::CastCard,
        ),
    ];
    for (message, action) in pairs {
        assert_eq!(message.gate_action(), action);
    }
}

#[test]
fn client_messages_decode_from_authority_echo() {
    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "castCard",
        "data": { "cardId": "boost", "targetTeamId": "A" }
    }))
    .unwrap();
    assert_eq!(
        msg,
        ClientMessage::CastCard {
            card_id: "boost".into(),
            target_team_id: "A".into()
        }
    );
}
