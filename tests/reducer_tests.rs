#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Reducer behavior driven by authority traffic, from wire JSON to state.

use std::collections::BTreeMap;
use std::sync::Arc;

use quiz_room_client::action::Action;
use quiz_room_client::protocol::{RawTeam, Role, RoundState, ServerMessage};
use quiz_room_client::reducer::{initial_state, reduce, reduce_all, EFFECT_HORIZON_MS};
use quiz_room_client::state::{ConnectionStatus, SessionState, TeamData};
use serde_json::{json, Value};

/// Decode a wire message and fold it in at `now_ms`.
fn feed(state: SessionState, kind: &str, data: Value, now_ms: u64) -> SessionState {
    let message: ServerMessage =
        serde_json::from_value(json!({ "type": kind, "data": data })).unwrap();
    Action::from_server_message(message, now_ms)
        .iter()
        .fold(state, reduce)
}

fn roster() -> Value {
    json!({
        "A": { "name": "Alpha", "gold": 4, "writerPlayerId": "p1", "suggesterPlayerIds": ["p2"] },
        "B": { "name": "Beta", "gold": 2, "writerPlayerId": "p3" }
    })
}

#[test]
fn reducer_is_deterministic_and_leaves_input_untouched() {
    let base = feed(initial_state(), "TEAM_UPDATE", json!({ "teams": roster() }), 0);
    let snapshot = base.clone();

    let action = Action::GoldUpdate {
        teams: Some(BTreeMap::from([("A".to_owned(), 11)])),
    };
    let first = reduce(base.clone(), &action);
    let second = reduce(base.clone(), &action);

    assert_eq!(first, second);
    assert_eq!(base, snapshot);
    assert_eq!(base.teams["A"].gold, 4);
    assert_eq!(first.teams["A"].gold, 11);
    // Untouched subtrees are shared, not copied.
    assert!(Arc::ptr_eq(&first.round, &base.round));
    assert!(Arc::ptr_eq(&first.moderation, &base.moderation));
}

#[test]
fn empty_snapshot_cannot_erase_known_teams() {
    let state = feed(initial_state(), "TEAM_UPDATE", json!({ "teams": roster() }), 0);
    let before = Arc::clone(&state.teams);

    for data in [
        json!({ "teams": {} }),
        json!({ "teams": {}, "gold": {} }),
        json!({}),
        json!({ "questionText": "still here?" }),
    ] {
        let next = feed(state.clone(), "state-sync", data, 1);
        assert_eq!(next.teams, before);
    }
}

#[test]
fn snapshot_gold_ignores_unknown_teams_but_events_stub_them() {
    let state = feed(initial_state(), "TEAM_UPDATE", json!({ "teams": roster() }), 0);

    let synced = feed(state.clone(), "state-sync", json!({ "gold": { "A": 9, "Z": 3 } }), 1);
    assert_eq!(synced.teams["A"].gold, 9);
    assert!(!synced.teams.contains_key("Z"));

    let evented = feed(state, "GOLD_UPDATE", json!({ "teams": { "Z": -5 } }), 1);
    assert_eq!(evented.teams["Z"].gold, 0);
    assert_eq!(evented.teams["Z"].name, "Z");
}

#[test]
fn normalization_is_idempotent_through_the_wire_shape() {
    let raw: RawTeam = serde_json::from_value(json!({
        "name": "",
        "gold": -3,
        "writerPlayerId": "p1",
        "suggesterPlayerIds": ["p2", "p1", "", "p2", "p4"],
        "deckSlots": ["fog", "", null, "boost", "extra"],
        "suggestions": [{ "text": "x", "suggesterId": "p2" }],
        "writer": "legacy-session"
    }))
    .unwrap();

    let once = TeamData::normalize(&raw, "T");
    let twice = TeamData::normalize(&RawTeam::from(&once), "T");

    assert_eq!(once, twice);
    assert_eq!(once.name, "T");
    assert_eq!(once.gold, 0);
    assert_eq!(once.suggester_player_ids, vec!["p2", "p4"]);
    assert_eq!(
        once.deck_slots,
        [Some("fog".to_owned()), None, None, Some("boost".to_owned())]
    );
    assert_eq!(once.suggestions[0].timestamp, 0);
}

#[test]
fn question_and_round_updates_keep_prior_values_when_empty() {
    let mut state = feed(
        initial_state(),
        "ROUND_STATE_UPDATE",
        json!({ "state": "ROUND_ACTIVE", "roundNumber": 1 }),
        0,
    );
    state = feed(state, "QUESTION_UPDATE", json!({ "question": "Q1" }), 0);
    state = feed(state, "QUESTION_UPDATE", json!({ "question": "" }), 0);
    state = feed(state, "QUESTION_UPDATE", json!({}), 0);
    state = feed(state, "ROUND_STATE_UPDATE", json!({}), 0);

    assert_eq!(state.round.question_text, "Q1");
    assert_eq!(state.round.round_state, RoundState::Active);
    assert_eq!(state.round.round_number, 1);
}

#[test]
fn a_full_round_from_the_wire() {
    let mut state = reduce(
        initial_state(),
        &Action::ConnectionStatus {
            status: Some(ConnectionStatus::Connected),
            room_id: Some("r1".into()),
            role: Some(Role::Display),
        },
    );
    state = feed(state, "state-sync", json!({ "teams": roster(), "roundState": "ROUND_WAITING" }), 0);
    state = feed(
        state,
        "ROUND_STARTED",
        json!({ "roundNumber": 1, "question": "Largest planet?", "duration": 60 }),
        1_000,
    );
    state = feed(state, "TIMER_UPDATE", json!({ "timeRemaining": 59 }), 2_000);
    state = feed(
        state,
        "CARD_CAST",
        json!({ "cardId": "fog", "casterTeamId": "A", "targetTeamId": "B" }),
        3_000,
    );
    state = feed(state, "ROUND_ENDED", Value::Null, 60_000);
    state = feed(
        state,
        "ROUND_SCORE",
        json!({ "roundNumber": 1, "roundPoints": { "teams": { "A": 3.0 } }, "roundWinner": "A" }),
        61_000,
    );

    assert_eq!(state.connection.room_id.as_deref(), Some("r1"));
    assert_eq!(state.round.round_state, RoundState::Review);
    assert_eq!(state.round.time_remaining, 59);
    assert!(state.round.timer_enabled);
    assert_eq!(state.effects.active_effects.len(), 1);
    assert_eq!(state.effects.active_effects[0].target_team_id, "B");
    assert_eq!(
        state
            .scoring
            .round_result
            .as_ref()
            .and_then(|r| r.round_winner.as_deref()),
        Some("A")
    );

    // A later snapshot evicts the stale cast.
    state = feed(state, "state-sync", json!({ "timeRemaining": 0 }), 61_000);
    assert!(state.effects.active_effects.is_empty());
}

#[test]
fn match_over_then_reset() {
    let mut state = feed(initial_state(), "TEAM_UPDATE", json!({ "teams": roster() }), 0);
    state = feed(
        state,
        "MODERATION_UPDATE",
        json!({ "mutedPlayers": ["p2"], "roundFrozen": true }),
        0,
    );
    state = feed(
        state,
        "MATCH_OVER",
        json!({ "winner": "A", "finalScores": { "teams": { "A": 10.0, "B": 4.0 } } }),
        0,
    );
    assert!(state.scoring.match_over);
    assert_eq!(state.scoring.match_scores.len(), 2);

    state = feed(state, "MATCH_RESET", Value::Null, 0);
    assert!(!state.scoring.match_over);
    assert!(state.scoring.match_scores.is_empty());
    assert_eq!(state.round.round_state, RoundState::Waiting);
    assert!(state.effects.active_effects.is_empty());
    // Roster and moderation belong to the room, not the match.
    assert_eq!(state.teams.len(), 2);
    assert!(state.moderation.is_muted("p2"));
    assert!(state.moderation.round_frozen);
}

#[test]
fn card_casts_age_out_relative_to_the_newest() {
    let cast = |card: &str, at: u64| Action::CardCast {
        card_id: Some(card.into()),
        caster_team_id: Some("A".into()),
        target_team_id: None,
        is_cosmetic: Some(true),
        timestamp: at,
    };
    let state = reduce_all(
        initial_state(),
        &[
            cast("early", 0),
            cast("mid", EFFECT_HORIZON_MS / 2),
            cast("late", EFFECT_HORIZON_MS + 1),
        ],
    );
    let ids: Vec<_> = state
        .effects
        .active_effects
        .iter()
        .map(|e| e.card_id.as_str())
        .collect();
    assert_eq!(ids, ["mid", "late"]);
    assert_eq!(state.effects.active_effects[0].target_team_id, "A");
    assert!(state.effects.active_effects[0].is_cosmetic);
}

#[test]
fn card_rules_are_clamped() {
    let state = feed(
        initial_state(),
        "CARD_RULES_UPDATE",
        json!({
            "disabledCards": ["fog"],
            "goldCostModifiers": { "boost": 5.0, "shield": 0.1, "swap": 1.5 }
        }),
        0,
    );
    assert!(state.card_rules.is_disabled("fog"));
    assert!((state.card_rules.multiplier("boost") - 2.0).abs() < f64::EPSILON);
    assert!((state.card_rules.multiplier("shield") - 0.5).abs() < f64::EPSILON);
    assert!((state.card_rules.multiplier("swap") - 1.5).abs() < f64::EPSILON);
    assert!((state.card_rules.multiplier("unknown") - 1.0).abs() < f64::EPSILON);
}

#[test]
fn passive_and_unknown_messages_change_nothing() {
    let state = feed(initial_state(), "TEAM_UPDATE", json!({ "teams": roster() }), 0);
    for (kind, data) in [
        ("XP_EARNED", json!({ "xp": 5 })),
        ("LOBBY_UPDATE", json!({})),
        ("ERROR", json!({ "message": "nope" })),
        ("BRAND_NEW", json!({ "x": 1 })),
    ] {
        assert_eq!(feed(state.clone(), kind, data, 0), state);
    }
}
