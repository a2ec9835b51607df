//! Reducer actions and the translation from inbound messages.
//!
//! Actions are the only input to [`reduce`](crate::reducer::reduce). The
//! translation is pure: the receive time is passed in by the caller, so the
//! same message at the same instant always yields the same actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::protocol::{
    CardId, MatchResult, PlayerId, RawTeam, Role, RoomId, RoundResult, RoundState, ServerMessage,
    StateSnapshot, TeamId,
};
use crate::state::ConnectionStatus;

/// One step of state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Connection lifecycle. Every field is optional and merged field-wise.
    ConnectionStatus {
        status: Option<ConnectionStatus>,
        room_id: Option<RoomId>,
        role: Option<Role>,
    },
    /// Snapshot channel. `received_at_ms` drives effect eviction.
    StateSync {
        snapshot: Arc<StateSnapshot>,
        received_at_ms: u64,
    },
    RoundStateUpdate {
        state: Option<RoundState>,
        round_number: Option<u32>,
    },
    QuestionUpdate {
        question: Option<String>,
    },
    TimerUpdate {
        time_remaining: Option<u32>,
        enabled: Option<bool>,
    },
    TeamUpdate {
        teams: Option<BTreeMap<TeamId, RawTeam>>,
    },
    GoldUpdate {
        teams: Option<BTreeMap<TeamId, i64>>,
    },
    RoundScore {
        round_result: RoundResult,
    },
    MatchOver {
        match_result: MatchResult,
    },
    MatchReset,
    CardCast {
        card_id: Option<CardId>,
        caster_team_id: Option<TeamId>,
        target_team_id: Option<TeamId>,
        is_cosmetic: Option<bool>,
        timestamp: u64,
    },
    CardRulesUpdate {
        disabled_cards: Option<Vec<CardId>>,
        gold_cost_modifiers: Option<BTreeMap<CardId, f64>>,
    },
    ModerationUpdate {
        muted_players: Option<Vec<PlayerId>>,
        frozen_teams: Option<Vec<TeamId>>,
        round_frozen: Option<bool>,
    },
    /// Authority-reported error. Never changes state.
    Error {
        message: Option<String>,
    },
}

impl Action {
    /// Shorthand for a status-only connection action.
    pub fn status(status: ConnectionStatus) -> Self {
        Self::ConnectionStatus {
            status: Some(status),
            room_id: None,
            role: None,
        }
    }

    /// Translate one inbound message into the actions it implies.
    ///
    /// Passive and unknown messages yield no actions. `ROUND_STARTED` expands
    /// into up to three actions, in order: round state, question, timer.
    pub fn from_server_message(message: ServerMessage, now_ms: u64) -> Vec<Action> {
        match message {
            ServerMessage::StateSync(snapshot) => vec![Self::StateSync {
                snapshot: Arc::new(snapshot),
                received_at_ms: now_ms,
            }],
            ServerMessage::RoomId(p) => match p.room_id.filter(|id| !id.is_empty()) {
                Some(room_id) => vec![Self::ConnectionStatus {
                    status: None,
                    room_id: Some(room_id),
                    role: None,
                }],
                None => Vec::new(),
            },
            ServerMessage::RoundStateUpdate(p) => vec![Self::RoundStateUpdate {
                state: p.state,
                round_number: p.round_number,
            }],
            ServerMessage::QuestionUpdate(p) => vec![Self::QuestionUpdate {
                question: p.question,
            }],
            ServerMessage::TimerUpdate(p) => vec![Self::TimerUpdate {
                time_remaining: p.time_remaining,
                enabled: p.enabled,
            }],
            ServerMessage::TeamUpdate(p) => vec![Self::TeamUpdate { teams: p.teams }],
            ServerMessage::GoldUpdate(p) => vec![Self::GoldUpdate {
                teams: p.entries().cloned(),
            }],
            ServerMessage::RoundStarted(p) => {
                let mut actions = vec![Self::RoundStateUpdate {
                    state: Some(RoundState::Active),
                    round_number: p.round_number,
                }];
                if let Some(question) = p.question.filter(|q| !q.is_empty()) {
                    actions.push(Self::QuestionUpdate {
                        question: Some(question),
                    });
                }
                if let Some(duration) = p.duration {
                    actions.push(Self::TimerUpdate {
                        time_remaining: Some(duration),
                        enabled: Some(true),
                    });
                }
                actions
            }
            ServerMessage::RoundEnded => vec![Self::RoundStateUpdate {
                state: Some(RoundState::Review),
                round_number: None,
            }],
            ServerMessage::RoundScore(round_result) => vec![Self::RoundScore { round_result }],
            ServerMessage::MatchOver(match_result) => vec![Self::MatchOver { match_result }],
            ServerMessage::MatchReset => vec![Self::MatchReset],
            ServerMessage::CardCast(p) => vec![Self::CardCast {
                card_id: p.card_id,
                caster_team_id: p.caster_team_id,
                target_team_id: p.target_team_id,
                is_cosmetic: p.is_cosmetic,
                timestamp: now_ms,
            }],
            ServerMessage::CardRulesUpdate(p) => vec![Self::CardRulesUpdate {
                disabled_cards: p.disabled_cards,
                gold_cost_modifiers: p.gold_cost_modifiers,
            }],
            ServerMessage::ModerationUpdate(p) => vec![Self::ModerationUpdate {
                muted_players: p.muted_players,
                frozen_teams: p.frozen_teams,
                round_frozen: p.round_frozen,
            }],
            ServerMessage::Error(p) => vec![Self::Error { message: p.message }],
            ServerMessage::Passive { .. } | ServerMessage::Unknown { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{MessageType, RoundStartedPayload};

    #[test]
    fn round_started_expands_in_order() {
        let actions = Action::from_server_message(
            ServerMessage::RoundStarted(RoundStartedPayload {
                round_number: Some(2),
                question: Some("Capital of Peru?".into()),
                duration: Some(45),
            }),
            0,
        );
        assert_eq!(
            actions,
            vec![
                Action::RoundStateUpdate {
                    state: Some(RoundState::Active),
                    round_number: Some(2),
                },
                Action::QuestionUpdate {
                    question: Some("Capital of Peru?".into()),
                },
                Action::TimerUpdate {
                    time_remaining: Some(45),
                    enabled: Some(true),
                },
            ]
        );
    }

    #[test]
    fn round_started_without_extras_only_sets_state() {
        let actions = Action::from_server_message(
            ServerMessage::RoundStarted(RoundStartedPayload::default()),
            0,
        );
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn round_ended_moves_to_review() {
        let actions = Action::from_server_message(ServerMessage::RoundEnded, 0);
        assert_eq!(
            actions,
            vec![Action::RoundStateUpdate {
                state: Some(RoundState::Review),
                round_number: None,
            }]
        );
    }

    #[test]
    fn card_cast_is_stamped_with_receive_time() {
        let actions = Action::from_server_message(
            serde_json::from_str(r#"{"type":"CARD_CAST","data":{"cardId":"c","casterTeamId":"A"}}"#)
                .unwrap(),
            1234,
        );
        assert!(matches!(actions[0], Action::CardCast { timestamp: 1234, .. }));
    }

    #[test]
    fn passive_messages_yield_nothing() {
        let message = ServerMessage::Passive {
            kind: MessageType::Lock,
            data: serde_json::Value::Null,
        };
        assert!(Action::from_server_message(message, 0).is_empty());
    }
}
