//! The pure merge function.
//!
//! [`reduce`] folds one [`Action`] into a [`SessionState`] and returns the
//! next state. Subtrees the action does not touch are returned as the same
//! `Arc`; touched subtrees go through [`Arc::make_mut`], so a state the caller
//! still holds is never modified.
//!
//! Precedence rules:
//!
//! - Absent fields never clear anything.
//! - A snapshot whose team map is empty cannot erase a non-empty roster.
//! - Gold for an unknown team synthesizes a stub on the event channel but is
//!   ignored on the snapshot channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::Action;
use crate::protocol::{RawTeam, StateSnapshot, TeamId};
use crate::rules::clamp_multiplier;
use crate::state::{
    clamp_gold, ActiveEffect, CardRules, Effects, Round, Scoring, SessionState,
    TeamData, Teams,
};

/// Effects older than this (relative to the newest event) are evicted.
pub const EFFECT_HORIZON_MS: u64 = 10_000;

/// Upper bound on the active effect list, oldest evicted first.
pub const MAX_ACTIVE_EFFECTS: usize = 64;

/// Apply one action.
pub fn reduce(mut state: SessionState, action: &Action) -> SessionState {
    match action {
        Action::ConnectionStatus {
            status,
            room_id,
            role,
        } => {
            if status.is_none() && room_id.is_none() && role.is_none() {
                return state;
            }
            let connection = Arc::make_mut(&mut state.connection);
            if let Some(status) = status {
                connection.status = *status;
            }
            if let Some(room_id) = room_id {
                connection.room_id = Some(room_id.clone());
            }
            if let Some(role) = role {
                connection.role = Some(*role);
            }
        }

        Action::StateSync {
            snapshot,
            received_at_ms,
        } => {
            apply_snapshot(&mut state, snapshot);
            evict_effects(&mut state.effects, *received_at_ms);
        }

        Action::RoundStateUpdate {
            state: round_state,
            round_number,
        } => {
            if round_state.is_none() && round_number.is_none() {
                return state;
            }
            let round = Arc::make_mut(&mut state.round);
            if let Some(round_state) = round_state {
                round.round_state = *round_state;
            }
            if let Some(round_number) = round_number {
                round.round_number = *round_number;
            }
        }

        Action::QuestionUpdate { question } => {
            if let Some(question) = question.as_deref().filter(|q| !q.is_empty()) {
                Arc::make_mut(&mut state.round).question_text = question.to_owned();
            }
        }

        Action::TimerUpdate {
            time_remaining,
            enabled,
        } => {
            if time_remaining.is_none() && enabled.is_none() {
                return state;
            }
            let round = Arc::make_mut(&mut state.round);
            if let Some(time_remaining) = time_remaining {
                round.time_remaining = *time_remaining;
            }
            if let Some(enabled) = enabled {
                round.timer_enabled = *enabled;
            }
        }

        Action::TeamUpdate { teams } => {
            if let Some(teams) = teams {
                state.teams = Arc::new(normalize_teams(teams));
            }
        }

        Action::GoldUpdate { teams } => {
            let Some(gold) = teams else {
                return state;
            };
            if gold.is_empty() {
                return state;
            }
            let teams = Arc::make_mut(&mut state.teams);
            for (team_id, amount) in gold {
                let amount = clamp_gold(*amount);
                match teams.get_mut(team_id) {
                    Some(team) => team.gold = amount,
                    None => {
                        teams.insert(team_id.clone(), TeamData::stub(team_id, amount));
                    }
                }
            }
        }

        Action::RoundScore { round_result } => {
            Arc::make_mut(&mut state.scoring).round_result = Some(round_result.clone());
        }

        Action::MatchOver { match_result } => {
            let scoring = Arc::make_mut(&mut state.scoring);
            scoring.match_over = true;
            scoring.match_result = Some(match_result.clone());
            if let Some(final_scores) = &match_result.final_scores {
                if !final_scores.teams.is_empty() {
                    scoring.match_scores = final_scores.teams.clone();
                }
            }
        }

        Action::MatchReset => {
            state.round = Arc::new(Round::default());
            state.scoring = Arc::new(Scoring::default());
            state.effects = Arc::new(Effects::default());
        }

        Action::CardCast {
            card_id,
            caster_team_id,
            target_team_id,
            is_cosmetic,
            timestamp,
        } => {
            let card_id = card_id.as_deref().filter(|c| !c.is_empty());
            let caster = caster_team_id.as_deref().filter(|c| !c.is_empty());
            let (Some(card_id), Some(caster)) = (card_id, caster) else {
                return state;
            };
            let target = target_team_id
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(caster);

            Arc::make_mut(&mut state.effects)
                .active_effects
                .push_back(ActiveEffect {
                    card_id: card_id.to_owned(),
                    caster_team_id: caster.to_owned(),
                    target_team_id: target.to_owned(),
                    timestamp: *timestamp,
                    is_cosmetic: is_cosmetic.unwrap_or(false),
                });
            evict_effects(&mut state.effects, *timestamp);
        }

        Action::CardRulesUpdate {
            disabled_cards,
            gold_cost_modifiers,
        } => {
            if disabled_cards.is_none() && gold_cost_modifiers.is_none() {
                return state;
            }
            let rules: &mut CardRules = Arc::make_mut(&mut state.card_rules);
            if let Some(disabled) = disabled_cards {
                rules.disabled_cards = disabled.iter().cloned().collect();
            }
            if let Some(modifiers) = gold_cost_modifiers {
                rules.gold_cost_modifiers = modifiers
                    .iter()
                    .filter_map(|(card, m)| clamp_multiplier(*m).map(|m| (card.clone(), m)))
                    .collect();
            }
        }

        Action::ModerationUpdate {
            muted_players,
            frozen_teams,
            round_frozen,
        } => {
            if muted_players.is_none() && frozen_teams.is_none() && round_frozen.is_none() {
                return state;
            }
            let moderation = Arc::make_mut(&mut state.moderation);
            if let Some(muted) = muted_players {
                moderation.muted_players = muted.iter().cloned().collect();
            }
            if let Some(frozen) = frozen_teams {
                moderation.frozen_teams = frozen.iter().cloned().collect();
            }
            if let Some(round_frozen) = round_frozen {
                moderation.round_frozen = *round_frozen;
            }
        }

        Action::Error { .. } => {}
    }
    state
}

/// Fold a sequence of actions, left to right.
pub fn reduce_all<'a>(
    state: SessionState,
    actions: impl IntoIterator<Item = &'a Action>,
) -> SessionState {
    actions.into_iter().fold(state, reduce)
}

/// The initial state for a freshly mounted session.
pub fn initial_state() -> SessionState {
    SessionState::default()
}

// ── Helpers ─────────────────────────────────────────────────────────

fn normalize_teams(raw: &BTreeMap<TeamId, RawTeam>) -> Teams {
    raw.iter()
        .map(|(id, team)| (id.clone(), TeamData::normalize(team, id)))
        .collect()
}

fn apply_snapshot(state: &mut SessionState, snapshot: &StateSnapshot) {
    if snapshot.round_state.is_some()
        || snapshot.question_text.is_some()
        || snapshot.time_remaining.is_some()
        || snapshot.timer_enabled.is_some()
    {
        let round = Arc::make_mut(&mut state.round);
        if let Some(round_state) = snapshot.round_state {
            round.round_state = round_state;
        }
        if let Some(question) = &snapshot.question_text {
            round.question_text = question.clone();
        }
        if let Some(time_remaining) = snapshot.time_remaining {
            round.time_remaining = time_remaining;
        }
        if let Some(timer_enabled) = snapshot.timer_enabled {
            round.timer_enabled = timer_enabled;
        }
    }

    if let Some(raw) = &snapshot.teams {
        let incoming = normalize_teams(raw);
        // An empty incoming roster never replaces a known one.
        if !incoming.is_empty() || state.teams.is_empty() {
            state.teams = Arc::new(incoming);
        }
    }

    if let Some(gold) = &snapshot.gold {
        if gold.keys().any(|id| state.teams.contains_key(id)) {
            let teams = Arc::make_mut(&mut state.teams);
            for (team_id, amount) in gold {
                if let Some(team) = teams.get_mut(team_id) {
                    team.gold = clamp_gold(*amount);
                }
            }
        }
    }
}

fn is_expired(effect: &ActiveEffect, now_ms: u64) -> bool {
    now_ms.saturating_sub(effect.timestamp) > EFFECT_HORIZON_MS
}

/// Drop effects past the horizon and trim to the cap. Leaves the `Arc`
/// untouched when there is nothing to drop.
fn evict_effects(effects: &mut Arc<Effects>, now_ms: u64) {
    let stale = effects.active_effects.iter().any(|e| is_expired(e, now_ms));
    let over = effects.active_effects.len() > MAX_ACTIVE_EFFECTS;
    if !stale && !over {
        return;
    }
    let list = &mut Arc::make_mut(effects).active_effects;
    if stale {
        list.retain(|e| !is_expired(e, now_ms));
    }
    while list.len() > MAX_ACTIVE_EFFECTS {
        list.pop_front();
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
    use crate::protocol::{MatchResult, RoundState, ScoreBreakdown};
    use crate::state::ConnectionStatus;

    fn cast(card: &str, caster: &str, at: u64) -> Action {
        Action::CardCast {
            card_id: Some(card.into()),
            caster_team_id: Some(caster.into()),
            target_team_id: None,
            is_cosmetic: None,
            timestamp: at,
        }
    }

    fn with_teams(ids: &[&str]) -> SessionState {
        let teams = ids
            .iter()
            .map(|id| ((*id).to_owned(), RawTeam::default()))
            .collect();
        reduce(initial_state(), &Action::TeamUpdate { teams: Some(teams) })
    }

    #[test]
    fn connection_status_merges_field_wise() {
        let state = reduce(
            initial_state(),
            &Action::ConnectionStatus {
                status: Some(ConnectionStatus::Connected),
                room_id: Some("r1".into()),
                role: None,
            },
        );
        let state = reduce(state, &Action::status(ConnectionStatus::Disconnected));
        assert_eq!(state.connection.status, ConnectionStatus::Disconnected);
        assert_eq!(state.connection.room_id.as_deref(), Some("r1"));
    }

    #[test]
    fn untouched_subtrees_share_pointers() {
        let before = with_teams(&["A"]);
        let after = reduce(
            before.clone(),
            &Action::QuestionUpdate {
                question: Some("Why?".into()),
            },
        );
        assert!(Arc::ptr_eq(&before.teams, &after.teams));
        assert!(Arc::ptr_eq(&before.moderation, &after.moderation));
        assert!(!Arc::ptr_eq(&before.round, &after.round));
        assert_eq!(before.round.question_text, "");
    }

    #[test]
    fn empty_question_keeps_prior() {
        let state = reduce(
            initial_state(),
            &Action::QuestionUpdate {
                question: Some("first".into()),
            },
        );
        let state = reduce(
            state,
            &Action::QuestionUpdate {
                question: Some(String::new()),
            },
        );
        assert_eq!(state.round.question_text, "first");
    }

    #[test]
    fn gold_for_unknown_team_synthesizes_stub() {
        let state = reduce(
            initial_state(),
            &Action::GoldUpdate {
                teams: Some([("ghost".to_owned(), 9)].into()),
            },
        );
        let team = state.team("ghost").unwrap();
        assert_eq!(team.gold, 9);
        assert_eq!(team.name, "ghost");
        assert_eq!(team.deck_slots.len(), 4);
    }

    #[test]
    fn snapshot_gold_ignores_unknown_teams() {
        let state = with_teams(&["A"]);
        let snapshot = StateSnapshot {
            gold: Some([("A".to_owned(), 4), ("Z".to_owned(), 8)].into()),
            ..Default::default()
        };
        let state = reduce(
            state,
            &Action::StateSync {
                snapshot: Arc::new(snapshot),
                received_at_ms: 0,
            },
        );
        assert_eq!(state.team("A").unwrap().gold, 4);
        assert!(state.team("Z").is_none());
    }

    #[test]
    fn match_over_takes_final_team_scores() {
        let result = MatchResult {
            winner: Some("A".into()),
            final_scores: Some(ScoreBreakdown {
                teams: [("A".to_owned(), 12.0)].into(),
                ..Default::default()
            }),
            mvp: None,
        };
        let state = reduce(
            initial_state(),
            &Action::MatchOver {
                match_result: result,
            },
        );
        assert!(state.scoring.match_over);
        assert_eq!(state.scoring.match_scores.get("A"), Some(&12.0));
    }

    #[test]
    fn match_reset_keeps_teams_rules_and_moderation() {
        let state = with_teams(&["A"]);
        let state = reduce(
            state,
            &Action::ModerationUpdate {
                muted_players: Some(vec!["p1".into()]),
                frozen_teams: None,
                round_frozen: Some(true),
            },
        );
        let state = reduce(
            state,
            &Action::RoundStateUpdate {
                state: Some(RoundState::Active),
                round_number: Some(3),
            },
        );
        let state = reduce(state, &cast("c", "A", 10));
        let state = reduce(state, &Action::MatchReset);

        assert_eq!(*state.round, Round::default());
        assert!(state.effects.active_effects.is_empty());
        assert!(state.team("A").is_some());
        assert!(state.moderation.round_frozen);
    }

    #[test]
    fn card_cast_requires_card_and_caster() {
        let state = reduce(
            initial_state(),
            &Action::CardCast {
                card_id: None,
                caster_team_id: Some("A".into()),
                target_team_id: None,
                is_cosmetic: None,
                timestamp: 0,
            },
        );
        assert!(state.effects.active_effects.is_empty());
    }

    #[test]
    fn card_cast_target_defaults_to_caster() {
        let state = reduce(initial_state(), &cast("shield", "A", 5));
        let effect = &state.effects.active_effects[0];
        assert_eq!(effect.target_team_id, "A");
        assert!(!effect.is_cosmetic);
    }

    #[test]
    fn card_cast_does_not_touch_retained_state() {
        let first = reduce(initial_state(), &cast("a", "A", 1));
        let second = reduce(first.clone(), &cast("b", "A", 2));
        assert_eq!(first.effects.active_effects.len(), 1);
        assert_eq!(second.effects.active_effects.len(), 2);
    }

    #[test]
    fn old_effects_are_evicted_on_cast() {
        let state = reduce(initial_state(), &cast("a", "A", 1_000));
        let state = reduce(state, &cast("b", "A", 1_000 + EFFECT_HORIZON_MS + 1));
        let ids: Vec<_> = state
            .effects
            .active_effects
            .iter()
            .map(|e| e.card_id.as_str())
            .collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn effect_list_is_capped() {
        let mut state = initial_state();
        for i in 0..(MAX_ACTIVE_EFFECTS as u64 + 10) {
            state = reduce(state, &cast(&format!("c{i}"), "A", 100 + i));
        }
        assert_eq!(state.effects.active_effects.len(), MAX_ACTIVE_EFFECTS);
        assert_eq!(state.effects.active_effects[0].card_id, "c10");
    }

    #[test]
    fn snapshot_evicts_expired_effects() {
        let state = reduce(initial_state(), &cast("a", "A", 0));
        let state = reduce(
            state,
            &Action::StateSync {
                snapshot: Arc::new(StateSnapshot::default()),
                received_at_ms: EFFECT_HORIZON_MS * 2,
            },
        );
        assert!(state.effects.active_effects.is_empty());
    }

    #[test]
    fn modifiers_are_clamped_and_non_finite_dropped() {
        let state = reduce(
            initial_state(),
            &Action::CardRulesUpdate {
                disabled_cards: None,
                gold_cost_modifiers: Some(
                    [
                        ("cheap".to_owned(), 0.1),
                        ("dear".to_owned(), 9.0),
                        ("odd".to_owned(), f64::NAN),
                    ]
                    .into(),
                ),
            },
        );
        assert_eq!(state.card_rules.multiplier("cheap"), 0.5);
        assert_eq!(state.card_rules.multiplier("dear"), 2.0);
        assert!(!state.card_rules.gold_cost_modifiers.contains_key("odd"));
    }

    #[test]
    fn error_is_state_neutral() {
        let before = with_teams(&["A"]);
        let after = reduce(
            before.clone(),
            &Action::Error {
                message: Some("boom".into()),
            },
        );
        assert_eq!(before, after);
    }
}
