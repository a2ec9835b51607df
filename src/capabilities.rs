//! UI permission flags for a student.
//!
//! These are affordances, not authorization. They follow the same moderation
//! inputs as [`gate`](crate::gate), evaluated in a fixed order.

use crate::protocol::RoundState;
use crate::state::SessionState;

/// Who is asking, from the student's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerContext<'a> {
    pub player_id: &'a str,
    pub team_id: &'a str,
    pub is_writer: bool,
    pub current_answer: &'a str,
}

/// What the UI may offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_write_answer: bool,
    pub can_lock_answer: bool,
    pub can_suggest: bool,
    pub can_insert_suggestion: bool,
    pub can_cast_cards: bool,
}

impl Capabilities {
    /// Every flag false.
    pub const NONE: Capabilities = Capabilities {
        can_write_answer: false,
        can_lock_answer: false,
        can_suggest: false,
        can_insert_suggestion: false,
        can_cast_cards: false,
    };
}

/// Derive the flags for `ctx` from the current state.
///
/// A team freeze disables suggesting here even though the gate would accept a
/// suggestion from a frozen team.
pub fn derive_capabilities(state: &SessionState, ctx: &PlayerContext<'_>) -> Capabilities {
    let moderation = &state.moderation;
    let base_capable = state.round.round_state == RoundState::Active && !moderation.round_frozen;

    let is_muted = !ctx.player_id.is_empty() && moderation.is_muted(ctx.player_id);
    let team_frozen = !ctx.team_id.is_empty() && moderation.is_team_frozen(ctx.team_id);
    let unrestricted = base_capable && !is_muted && !team_frozen;

    let can_write_answer = unrestricted && ctx.is_writer;
    let can_lock_answer = can_write_answer && !ctx.current_answer.trim().is_empty();
    let can_suggest = unrestricted;
    let can_insert_suggestion = can_suggest && ctx.is_writer;
    let can_cast_cards = unrestricted;

    Capabilities {
        can_write_answer,
        can_lock_answer,
        can_suggest,
        can_insert_suggestion,
        can_cast_cards,
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
    use std::sync::Arc;

    use super::*;
    use crate::state::{Moderation, Round};

    fn state(round_state: RoundState, moderation: Moderation) -> SessionState {
        SessionState {
            round: Arc::new(Round {
                round_state,
                ..Round::default()
            }),
            moderation: Arc::new(moderation),
            ..SessionState::default()
        }
    }

    fn writer<'a>() -> PlayerContext<'a> {
        PlayerContext {
            player_id: "p1",
            team_id: "A",
            is_writer: true,
            current_answer: "Lima",
        }
    }

    #[test]
    fn writer_with_answer_can_write_and_lock() {
        let caps = derive_capabilities(&state(RoundState::Active, Moderation::default()), &writer());
        assert_eq!(
            caps,
            Capabilities {
                can_write_answer: true,
                can_lock_answer: true,
                can_suggest: true,
                can_insert_suggestion: true,
                can_cast_cards: true,
            }
        );
    }

    #[test]
    fn blank_answer_cannot_be_locked() {
        let ctx = PlayerContext {
            current_answer: "   ",
            ..writer()
        };
        let caps = derive_capabilities(&state(RoundState::Active, Moderation::default()), &ctx);
        assert!(caps.can_write_answer);
        assert!(!caps.can_lock_answer);
    }

    #[test]
    fn non_writer_can_suggest_only() {
        let ctx = PlayerContext {
            is_writer: false,
            ..writer()
        };
        let caps = derive_capabilities(&state(RoundState::Active, Moderation::default()), &ctx);
        assert!(!caps.can_write_answer);
        assert!(!caps.can_insert_suggestion);
        assert!(caps.can_suggest);
        assert!(caps.can_cast_cards);
    }

    #[test]
    fn any_restriction_clears_everything() {
        let muted = Moderation {
            muted_players: ["p1".to_owned()].into(),
            ..Moderation::default()
        };
        let frozen_team = Moderation {
            frozen_teams: ["A".to_owned()].into(),
            ..Moderation::default()
        };
        let frozen_round = Moderation {
            round_frozen: true,
            ..Moderation::default()
        };
        let cases = [
            state(RoundState::Active, muted),
            state(RoundState::Active, frozen_team),
            state(RoundState::Active, frozen_round),
            state(RoundState::Waiting, Moderation::default()),
            state(RoundState::Review, Moderation::default()),
            state(RoundState::Ended, Moderation::default()),
        ];
        for s in &cases {
            assert_eq!(derive_capabilities(s, &writer()), Capabilities::NONE);
        }
    }
}
