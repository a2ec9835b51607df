#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the session and broker lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, message, settle, state_sync, team, MockConnector};
use quiz_room_client::protocol::{ClientMessage, Role, RoundState};
use quiz_room_client::state::ConnectionStatus;
use quiz_room_client::{ClientConfig, ConnectionBroker, QuizRoomError, QuizSession};
use serde_json::json;

fn broker_with(connector: &MockConnector, config: ClientConfig) -> Arc<ConnectionBroker> {
    Arc::new(ConnectionBroker::new(connector.clone(), config))
}

fn broker(connector: &MockConnector) -> Arc<ConnectionBroker> {
    broker_with(connector, ClientConfig::default())
}

// ── Fresh connections ───────────────────────────────────────────────

#[tokio::test]
async fn fresh_connect_applies_held_snapshot() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    authority.push(state_sync(json!({
        "roundState": "ROUND_ACTIVE",
        "questionText": "Capital of France?",
        "teams": { "A": team("Alpha", 5, "p1") }
    })));

    let session = QuizSession::new(broker(&connector), Role::Student).with_token("jwt");
    let ready = session.subscribe();
    session.connect().await.unwrap();
    eventually(|| session.state().teams.contains_key("A")).await;

    let state = session.state();
    assert_eq!(state.connection.status, ConnectionStatus::Connected);
    assert_eq!(state.connection.room_id.as_deref(), Some("r1"));
    assert_eq!(state.connection.role, Some(Role::Student));
    assert_eq!(state.round.round_state, RoundState::Active);
    assert_eq!(state.round.question_text, "Capital of France?");
    assert_eq!(state.teams["A"].gold, 5);
    assert!(ready.has_changed().unwrap());

    let calls = connector.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].token.as_deref(), Some("jwt"));
}

#[tokio::test]
async fn discrete_events_reach_the_reducer() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let session = QuizSession::new(broker(&connector), Role::Student);
    session.connect().await.unwrap();

    authority.push(message(
        "ROUND_STARTED",
        json!({ "roundNumber": 3, "question": "2+2?", "duration": 45 }),
    ));
    authority.push(message(
        "TEAM_UPDATE",
        json!({ "teams": { "A": team("Alpha", 7, "p1") } }),
    ));
    authority.push(message("GOLD_UPDATE", json!({ "gold": { "A": 9 } })));

    eventually(|| session.state().team("A").is_some_and(|t| t.gold == 9)).await;
    let state = session.state();
    assert_eq!(state.round.round_state, RoundState::Active);
    assert_eq!(state.round.round_number, 3);
    assert_eq!(state.round.question_text, "2+2?");
    assert_eq!(state.round.time_remaining, 45);
    assert!(state.round.timer_enabled);
}

#[tokio::test]
async fn student_ignores_room_id_messages() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let broker = broker(&connector);
    let session = QuizSession::new(Arc::clone(&broker), Role::Student);
    session.connect().await.unwrap();

    authority.push(message("ROOM_ID", json!({ "roomId": "r2" })));
    authority.push(message("QUESTION_UPDATE", json!({ "question": "after" })));
    eventually(|| session.state().round.question_text == "after").await;

    assert_eq!(session.state().connection.room_id.as_deref(), Some("r1"));
    assert_eq!(broker.current_room_id().as_deref(), Some("r1"));
}

#[tokio::test]
async fn display_follows_room_id_messages() {
    let connector = MockConnector::new();
    let authority = connector.script_room("");
    let broker = broker(&connector);
    let session = QuizSession::new(Arc::clone(&broker), Role::Display);
    session.connect().await.unwrap();
    assert_eq!(session.state().connection.room_id, None);
    assert_eq!(session.state().connection.status, ConnectionStatus::Connected);

    authority.push(message("ROOM_ID", json!({ "roomId": "r7" })));
    eventually(|| session.state().connection.room_id.as_deref() == Some("r7")).await;
    assert_eq!(broker.current_room_id().as_deref(), Some("r7"));
}

#[tokio::test]
async fn fallback_sync_reapplies_held_snapshot() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    authority.push(state_sync(json!({ "teams": { "A": team("Alpha", 1, "p1") } })));

    let config = ClientConfig::default().with_fallback_sync_delay(Duration::from_millis(200));
    let session = QuizSession::new(broker_with(&connector, config), Role::Student);
    session.connect().await.unwrap();
    eventually(|| session.state().teams.contains_key("A")).await;

    // An explicit empty roster wipes the teams until the fallback fires.
    authority.push(message("TEAM_UPDATE", json!({ "teams": {} })));
    eventually(|| session.state().teams.is_empty()).await;

    eventually(|| session.state().teams.contains_key("A")).await;
}

#[tokio::test]
async fn authority_errors_leave_state_alone() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let session = QuizSession::new(broker(&connector), Role::Teacher);
    session.connect().await.unwrap();
    let before = session.state();

    authority.push(message("ERROR", json!({ "message": "not allowed" })));
    authority.push(message("LOBBY_UPDATE", json!({ "players": 3 })));
    authority.push(message("SOMETHING_NEW", json!({})));
    settle().await;

    assert_eq!(session.state(), before);
}

// ── Connection failures ─────────────────────────────────────────────

#[tokio::test]
async fn room_not_found_reports_error_and_clears_room() {
    let connector = MockConnector::new();
    connector.script_error(QuizRoomError::RoomNotFound {
        room_id: "gone".into(),
    });
    let broker = broker(&connector);
    broker.set_current_room_id("gone");

    let session = QuizSession::new(Arc::clone(&broker), Role::Display);
    let err = session.connect().await.unwrap_err();

    assert!(matches!(err, QuizRoomError::RoomNotFound { .. }));
    assert_eq!(session.state().connection.status, ConnectionStatus::Error);
    assert_eq!(broker.current_room_id(), None);
    assert_eq!(connector.calls()[0].room_id.as_deref(), Some("gone"));
}

#[tokio::test]
async fn authority_hang_up_reports_disconnected() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let broker = broker(&connector);
    let session = QuizSession::new(Arc::clone(&broker), Role::Display);
    session.connect().await.unwrap();

    authority.hang_up();
    eventually(|| session.state().connection.status == ConnectionStatus::Disconnected).await;
    assert_eq!(broker.current_room_id(), None);
}

// ── Teacher channel cache ───────────────────────────────────────────

#[tokio::test]
async fn teacher_remount_reuses_channel_and_restores_cached_teams() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let broker = broker(&connector);

    let first = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    first.connect().await.unwrap();
    authority.push(message(
        "TEAM_UPDATE",
        json!({ "teams": { "A": team("Alpha", 4, "p1"), "B": team("Beta", 2, "p2") } }),
    ));
    eventually(|| first.state().teams.len() == 2).await;
    assert_eq!(broker.cached_teams().len(), 2);

    first.unmount();
    drop(first);

    // Arrives while nothing is mounted: handlers drop it, the snapshot keeps it.
    authority.push(message("QUESTION_UPDATE", json!({ "question": "lost" })));
    authority.push(state_sync(json!({ "questionText": "kept", "roundState": "ROUND_REVIEW" })));
    eventually(|| {
        broker
            .existing_channel(Role::Teacher)
            .is_some_and(|c| c.snapshot().question_text.as_deref() == Some("kept"))
    })
    .await;

    let second = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    second.connect().await.unwrap();

    let state = second.state();
    assert_eq!(connector.calls().len(), 1);
    assert_eq!(state.connection.status, ConnectionStatus::Connected);
    assert_eq!(state.connection.room_id.as_deref(), Some("r1"));
    assert_eq!(state.round.question_text, "kept");
    assert_eq!(state.round.round_state, RoundState::Review);
    assert_eq!(state.teams.len(), 2);
    assert_eq!(state.teams["B"].gold, 2);

    // The reused channel now feeds the second session.
    authority.push(message("TIMER_UPDATE", json!({ "timeRemaining": 9, "enabled": true })));
    eventually(|| second.state().round.time_remaining == 9).await;
}

#[tokio::test]
async fn teacher_remount_prefers_snapshot_teams_over_cache() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let broker = broker(&connector);

    let first = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    first.connect().await.unwrap();
    broker.cache_teams(&serde_json::from_value(json!({ "OLD": {} })).unwrap());
    authority.push(state_sync(json!({ "teams": { "A": team("Alpha", 1, "p1") } })));
    eventually(|| first.state().teams.contains_key("A")).await;
    first.unmount();

    let second = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    second.connect().await.unwrap();
    let state = second.state();
    assert!(state.teams.contains_key("A"));
    assert!(!state.teams.contains_key("OLD"));
}

#[tokio::test]
async fn teacher_switching_rooms_joins_again() {
    let connector = MockConnector::new();
    connector.script_room("r1");
    connector.script_room("r2");
    let broker = broker(&connector);

    let first = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    first.connect().await.unwrap();
    first.unmount();

    let second = QuizSession::new(Arc::clone(&broker), Role::Teacher).with_room_id("r2");
    second.connect().await.unwrap();

    assert_eq!(connector.calls().len(), 2);
    assert_eq!(second.state().connection.room_id.as_deref(), Some("r2"));
    assert_eq!(broker.current_room_id().as_deref(), Some("r2"));
}

#[tokio::test]
async fn unmounted_session_stops_dispatching() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let broker = broker(&connector);
    let session = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    session.connect().await.unwrap();
    let before = session.state();

    session.unmount();
    authority.push(message("QUESTION_UPDATE", json!({ "question": "ignored" })));
    settle().await;

    assert_eq!(session.state(), before);
    // The cached channel stays open for the next mount.
    assert!(broker.existing_channel(Role::Teacher).is_some());
    assert!(!authority.client_closed());
}

#[tokio::test]
async fn teacher_leave_closes_cached_channel() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let broker = broker(&connector);
    let session = QuizSession::new(Arc::clone(&broker), Role::Teacher);
    session.connect().await.unwrap();

    session.leave().await;

    assert!(authority.client_closed());
    assert!(broker.existing_channel(Role::Teacher).is_none());
    assert_eq!(broker.current_room_id(), None);
    assert_eq!(
        session.state().connection.status,
        ConnectionStatus::Disconnected
    );
}

#[tokio::test]
async fn student_leave_keeps_current_room() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let broker = broker(&connector);
    let session = QuizSession::new(Arc::clone(&broker), Role::Student);
    session.connect().await.unwrap();

    session.leave().await;

    assert!(authority.client_closed());
    assert_eq!(broker.current_room_id().as_deref(), Some("r1"));
    assert_eq!(
        session.state().connection.status,
        ConnectionStatus::Disconnected
    );
}

// ── Gated submission ────────────────────────────────────────────────

#[tokio::test]
async fn submit_without_channel_is_rejected() {
    let connector = MockConnector::new();
    let session = QuizSession::new(broker(&connector), Role::Student);
    let sent = session
        .submit(
            "p1",
            Some("A"),
            ClientMessage::Suggestion { text: "x".into() },
        )
        .unwrap();
    assert!(!sent);
}

#[tokio::test]
async fn submit_mirrors_moderation() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let session = QuizSession::new(broker(&connector), Role::Student);
    session.connect().await.unwrap();

    authority.push(message(
        "MODERATION_UPDATE",
        json!({ "mutedPlayers": ["p1"], "frozenTeams": ["A"], "roundFrozen": false }),
    ));
    eventually(|| session.state().moderation.is_muted("p1")).await;

    let suggest = |text: &str| ClientMessage::Suggestion { text: text.into() };

    // Muted player: nothing leaves the client.
    assert!(!session.submit("p1", Some("B"), suggest("muted")).unwrap());
    // Frozen team still accepts suggestions, but not answer edits.
    assert!(session.submit("p2", Some("A"), suggest("ok")).unwrap());
    assert!(!session
        .submit(
            "p2",
            Some("A"),
            ClientMessage::UpdateAnswer {
                answer: "frozen".into()
            }
        )
        .unwrap());
    // Team-scoped action with no team.
    assert!(!session
        .submit(
            "p3",
            None,
            ClientMessage::LockAnswer {
                answer: "x".into()
            }
        )
        .unwrap());
    assert!(session
        .submit(
            "p3",
            Some("B"),
            ClientMessage::CastCard {
                card_id: "fog".into(),
                target_team_id: "A".into()
            }
        )
        .unwrap());

    eventually(|| authority.sent().len() == 2).await;
    let sent = authority.sent();
    assert_eq!(sent[0]["type"], "suggestion");
    assert_eq!(sent[0]["data"]["text"], "ok");
    assert_eq!(sent[1]["type"], "castCard");
    assert_eq!(sent[1]["data"]["cardId"], "fog");
    assert_eq!(sent[1]["data"]["targetTeamId"], "A");

    authority.push(message("MODERATION_UPDATE", json!({ "roundFrozen": true })));
    eventually(|| session.state().moderation.round_frozen).await;
    assert!(!session.submit("p2", Some("B"), suggest("paused")).unwrap());
}

#[tokio::test]
async fn submit_after_hang_up_is_not_connected() {
    let connector = MockConnector::new();
    let authority = connector.script_room("r1");
    let session = QuizSession::new(broker(&connector), Role::Student);
    session.connect().await.unwrap();

    authority.hang_up();
    eventually(|| session.channel().is_some_and(|c| !c.is_open())).await;

    let err = session
        .submit(
            "p1",
            Some("A"),
            ClientMessage::Suggestion { text: "late".into() },
        )
        .unwrap_err();
    assert!(matches!(err, QuizRoomError::NotConnected));
}

// ── Multi-threaded runtime ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fresh_connect_keeps_events_that_beat_the_handlers() {
    for _ in 0..50 {
        let connector = MockConnector::new();
        let authority = connector.script_room("r1");
        // Queued before the channel exists, so the loop sees them at once.
        authority.push(message(
            "TEAM_UPDATE",
            json!({ "teams": { "A": team("Alpha", 4, "p1") } }),
        ));
        authority.push(message("GOLD_UPDATE", json!({ "gold": { "A": 9 } })));
        authority.push(message("MODERATION_UPDATE", json!({ "mutedPlayers": ["p2"] })));

        let session = QuizSession::new(broker(&connector), Role::Student);
        session.connect().await.unwrap();
        eventually(|| session.state().moderation.is_muted("p2")).await;

        let state = session.state();
        assert_eq!(state.connection.status, ConnectionStatus::Connected);
        assert_eq!(state.teams["A"].name, "Alpha");
        assert_eq!(state.teams["A"].gold, 9);
        session.leave().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cached_resume_hands_over_to_the_new_session() {
    for _ in 0..50 {
        let connector = MockConnector::new();
        let authority = connector.script_room("r1");
        let broker = broker(&connector);

        let first = QuizSession::new(Arc::clone(&broker), Role::Teacher);
        first.connect().await.unwrap();
        authority.push(message(
            "TEAM_UPDATE",
            json!({ "teams": { "A": team("Alpha", 4, "p1"), "B": team("Beta", 2, "p2") } }),
        ));
        eventually(|| first.state().teams.len() == 2).await;
        first.unmount();

        let second = QuizSession::new(Arc::clone(&broker), Role::Teacher);
        second.connect().await.unwrap();
        assert_eq!(second.state().teams.len(), 2);

        authority.push(message("GOLD_UPDATE", json!({ "gold": { "A": 9 } })));
        authority.push(message("MODERATION_UPDATE", json!({ "frozenTeams": ["B"] })));
        eventually(|| second.state().moderation.is_team_frozen("B")).await;

        assert_eq!(second.state().teams["A"].gold, 9);
        assert_eq!(first.state().teams["A"].gold, 4);
        assert_eq!(connector.calls().len(), 1);
        second.leave().await;
    }
}
