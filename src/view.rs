//! Presentation-ready values derived from [`SessionState`].

use std::collections::BTreeSet;

use crate::protocol::{RoundState, TeamId};
use crate::state::SessionState;

/// What the round banner shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundView {
    pub phase_label: &'static str,
    pub status_message: String,
    pub is_waiting: bool,
    pub is_active: bool,
    pub is_review: bool,
    pub is_ended: bool,
    pub show_timer: bool,
    pub timer_text: String,
    pub round_number: u32,
    pub question_text: String,
}

/// What the public display shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayView {
    pub headline: String,
    pub subhead: String,
    pub is_paused: bool,
    pub frozen_teams: BTreeSet<TeamId>,
    pub round_state: RoundState,
    pub round_number: u32,
    pub question_text: String,
}

/// Build the round banner for a student or teacher screen.
pub fn round_view(state: &SessionState) -> RoundView {
    let round = &state.round;
    let round_state = round.round_state;
    let status_message = match round_state {
        RoundState::Waiting => "Waiting for teacher to start round...".to_owned(),
        RoundState::Active if round.question_text.is_empty() => "Round in progress...".to_owned(),
        RoundState::Active => round.question_text.clone(),
        RoundState::Review => "Round ended. Waiting for scoring...".to_owned(),
        RoundState::Ended => "Round completed.".to_owned(),
    };
    let is_active = round_state == RoundState::Active;

    RoundView {
        phase_label: round_state.label(),
        status_message,
        is_waiting: round_state == RoundState::Waiting,
        is_active,
        is_review: round_state == RoundState::Review,
        is_ended: round_state == RoundState::Ended,
        show_timer: is_active && round.timer_enabled,
        timer_text: format_time(round.time_remaining),
        round_number: round.round_number,
        question_text: round.question_text.clone(),
    }
}

/// Build the public display's header for the current round.
pub fn display_view(state: &SessionState) -> DisplayView {
    let round = &state.round;
    let subhead = if round.question_text.is_empty() {
        "Waiting for question...".to_owned()
    } else {
        format!("Question: {}", round.question_text)
    };

    DisplayView {
        headline: format!("Round {} - {}", round.round_number, round.round_state.label()),
        subhead,
        is_paused: state.moderation.round_frozen,
        frozen_teams: state.moderation.frozen_teams.clone(),
        round_state: round.round_state,
        round_number: round.round_number,
        question_text: round.question_text.clone(),
    }
}

/// `MM:SS`, minutes zero-padded to at least two digits.
pub fn format_time(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
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

    #[test]
    fn format_time_pads() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(65), "01:05");
        assert_eq!(format_time(6_000), "100:00");
    }

    #[test]
    fn waiting_round_view() {
        let view = round_view(&SessionState::default());
        assert_eq!(view.phase_label, "Waiting");
        assert_eq!(view.status_message, "Waiting for teacher to start round...");
        assert!(view.is_waiting);
        assert!(!view.show_timer);
    }

    #[test]
    fn active_round_shows_question_and_timer() {
        let state = SessionState {
            round: Arc::new(Round {
                round_state: RoundState::Active,
                round_number: 2,
                question_text: "2+2?".into(),
                timer_enabled: true,
                time_remaining: 30,
            }),
            ..SessionState::default()
        };
        let view = round_view(&state);
        assert_eq!(view.status_message, "2+2?");
        assert!(view.show_timer);
        assert_eq!(view.timer_text, "00:30");
    }

    #[test]
    fn display_headline_and_pause() {
        let state = SessionState {
            round: Arc::new(Round {
                round_state: RoundState::Review,
                round_number: 3,
                ..Round::default()
            }),
            moderation: Arc::new(Moderation {
                round_frozen: true,
                ..Moderation::default()
            }),
            ..SessionState::default()
        };
        let view = display_view(&state);
        assert_eq!(view.headline, "Round 3 - Review");
        assert_eq!(view.subhead, "Waiting for question...");
        assert!(view.is_paused);
    }
}
