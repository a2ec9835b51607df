//! The action gate: may this player perform this action right now?
//!
//! The authority evaluates the same predicate before mutating anything, so the
//! client-side copy is advisory only. A rejection carries no reason. Muted or
//! frozen participants must not learn why an action silently failed.

use serde::{Deserialize, Serialize};

use crate::protocol::{PlayerId, TeamId};
use crate::state::Moderation;

/// Student actions subject to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GateAction {
    Suggestion,
    InsertSuggestion,
    UpdateAnswer,
    LockAnswer,
    CastCard,
}

impl GateAction {
    /// All gated actions.
    pub const ALL: [GateAction; 5] = [
        Self::Suggestion,
        Self::InsertSuggestion,
        Self::UpdateAnswer,
        Self::LockAnswer,
        Self::CastCard,
    ];

    /// Actions that require a team id and are blocked by a team freeze.
    pub fn is_team_scoped(self) -> bool {
        matches!(self, Self::UpdateAnswer | Self::LockAnswer | Self::CastCard)
    }
}

/// Who wants to do what.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionRequest {
    pub player_id: PlayerId,
    pub team_id: Option<TeamId>,
    pub action: Option<GateAction>,
}

impl ActionRequest {
    pub fn new(player_id: impl Into<PlayerId>, team_id: Option<TeamId>, action: GateAction) -> Self {
        Self {
            player_id: player_id.into(),
            team_id,
            action: Some(action),
        }
    }
}

/// Evaluate the gate. `moderation` is `None` when there is no room/session.
///
/// Short-circuits in this order: missing session or action, round freeze,
/// missing team for a team-scoped action, muted player, frozen team.
pub fn can_perform_action(moderation: Option<&Moderation>, request: &ActionRequest) -> bool {
    let Some(moderation) = moderation else {
        return false;
    };
    let Some(action) = request.action else {
        return false;
    };

    if moderation.round_frozen {
        return false;
    }

    let team_id = request.team_id.as_deref().filter(|id| !id.is_empty());
    if action.is_team_scoped() && team_id.is_none() {
        return false;
    }

    // Muting blocks every student action, including the ones without a team.
    if moderation.muted_players.contains(&request.player_id) {
        return false;
    }

    if action.is_team_scoped() {
        if let Some(team_id) = team_id {
            if moderation.frozen_teams.contains(team_id) {
                return false;
            }
        }
    }

    true
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

    fn moderation(muted: &[&str], frozen: &[&str], round_frozen: bool) -> Moderation {
        Moderation {
            muted_players: muted.iter().map(|s| (*s).to_owned()).collect(),
            frozen_teams: frozen.iter().map(|s| (*s).to_owned()).collect(),
            round_frozen,
        }
    }

    fn req(player: &str, team: Option<&str>, action: GateAction) -> ActionRequest {
        ActionRequest::new(player, team.map(str::to_owned), action)
    }

    #[test]
    fn no_session_rejects() {
        assert!(!can_perform_action(None, &req("p1", Some("A"), GateAction::Suggestion)));
    }

    #[test]
    fn missing_action_rejects() {
        let m = Moderation::default();
        let request = ActionRequest {
            player_id: "p1".into(),
            team_id: Some("A".into()),
            action: None,
        };
        assert!(!can_perform_action(Some(&m), &request));
    }

    #[test]
    fn round_freeze_rejects_everything() {
        let m = moderation(&[], &[], true);
        for action in GateAction::ALL {
            for team in [Some("A"), None] {
                assert!(!can_perform_action(Some(&m), &req("p1", team, action)));
            }
        }
    }

    #[test]
    fn team_scoped_without_team_rejects() {
        let m = Moderation::default();
        for action in GateAction::ALL.into_iter().filter(|a| a.is_team_scoped()) {
            assert!(!can_perform_action(Some(&m), &req("p1", None, action)));
            assert!(!can_perform_action(Some(&m), &req("p1", Some(""), action)));
        }
    }

    #[test]
    fn suggestion_without_team_is_allowed() {
        let m = Moderation::default();
        assert!(can_perform_action(Some(&m), &req("p1", None, GateAction::Suggestion)));
        assert!(can_perform_action(Some(&m), &req("p1", None, GateAction::InsertSuggestion)));
    }

    #[test]
    fn muted_player_blocked_unmuted_accepted() {
        let m = moderation(&["p1"], &[], false);
        for action in GateAction::ALL {
            assert!(!can_perform_action(Some(&m), &req("p1", Some("A"), action)));
            assert!(can_perform_action(Some(&m), &req("p2", Some("A"), action)));
        }
    }

    #[test]
    fn frozen_team_blocks_writer_side_but_not_suggestions() {
        let m = moderation(&[], &["A"], false);
        assert!(!can_perform_action(Some(&m), &req("p1", Some("A"), GateAction::UpdateAnswer)));
        assert!(!can_perform_action(Some(&m), &req("p1", Some("A"), GateAction::LockAnswer)));
        assert!(!can_perform_action(Some(&m), &req("p1", Some("A"), GateAction::CastCard)));
        assert!(can_perform_action(Some(&m), &req("p1", Some("A"), GateAction::Suggestion)));
        assert!(can_perform_action(Some(&m), &req("p1", Some("B"), GateAction::CastCard)));
    }
}
