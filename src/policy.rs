//! Which discrete messages each role registers handlers for.
//!
//! This only cuts noise. The authority decides independently what each role
//! may see. `ERROR` is in every set; `state-sync` is never in a set because it
//! travels on the snapshot channel, not as a discrete event.

use std::collections::BTreeSet;

use crate::protocol::{MessageType, Role};

const CORE: &[MessageType] = &[
    MessageType::RoundStateUpdate,
    MessageType::QuestionUpdate,
    MessageType::TimerUpdate,
    MessageType::TeamUpdate,
    MessageType::GoldUpdate,
    MessageType::Error,
];

const SCORING: &[MessageType] = &[
    MessageType::RoundScore,
    MessageType::MatchOver,
    MessageType::MatchReset,
    MessageType::RoundStarted,
    MessageType::RoundEnded,
];

const CARDS: &[MessageType] = &[MessageType::CardCast, MessageType::CardRulesUpdate];

const MODERATION: &[MessageType] = &[MessageType::ModerationUpdate];

const SYSTEM: &[MessageType] = &[MessageType::RoomId];

const TEAM_ASSEMBLY: &[MessageType] = &[
    MessageType::TeamJoined,
    MessageType::TeamLeft,
    MessageType::AvailableTeams,
    MessageType::TeamSettingsUpdate,
];

const STUDENT: &[MessageType] = &[
    MessageType::Suggestion,
    MessageType::AnswerUpdate,
    MessageType::Lock,
    MessageType::WriterRotated,
    MessageType::WriterTransferred,
    MessageType::RoundData,
    MessageType::XpEarned,
];

const SCORING_DETAIL: &[MessageType] = &[
    MessageType::TeamScoreUpdate,
    MessageType::PlayerScoreUpdate,
    MessageType::RoundScoreUpdate,
];

const LOBBY: &[MessageType] = &[MessageType::MatchStart, MessageType::LobbyUpdate];

/// The set of message types `role` handles.
pub fn role_message_types(role: Role) -> BTreeSet<MessageType> {
    let mut groups: Vec<&[MessageType]> = vec![CORE, SCORING, CARDS, MODERATION];
    match role {
        Role::Teacher => groups.extend([SYSTEM, TEAM_ASSEMBLY, SCORING_DETAIL, LOBBY]),
        Role::Student => groups.extend([TEAM_ASSEMBLY, STUDENT, SCORING_DETAIL]),
        Role::Display => groups.push(SYSTEM),
    }
    groups.into_iter().flatten().copied().collect()
}

impl Role {
    /// Whether this role registers a handler for `message_type`.
    pub fn subscribes_to(self, message_type: MessageType) -> bool {
        role_message_types(self).contains(&message_type)
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

    #[test]
    fn every_role_gets_core_and_error() {
        for role in [Role::Teacher, Role::Student, Role::Display] {
            let set = role_message_types(role);
            assert!(set.contains(&MessageType::Error));
            assert!(set.contains(&MessageType::ModerationUpdate));
            assert!(set.contains(&MessageType::CardCast));
            assert!(!set.contains(&MessageType::StateSync));
        }
    }

    #[test]
    fn room_id_is_teacher_and_display_only() {
        assert!(Role::Teacher.subscribes_to(MessageType::RoomId));
        assert!(Role::Display.subscribes_to(MessageType::RoomId));
        assert!(!Role::Student.subscribes_to(MessageType::RoomId));
    }

    #[test]
    fn student_only_messages() {
        assert!(Role::Student.subscribes_to(MessageType::XpEarned));
        assert!(!Role::Teacher.subscribes_to(MessageType::XpEarned));
        assert!(!Role::Display.subscribes_to(MessageType::WriterRotated));
    }

    #[test]
    fn lobby_is_teacher_only() {
        assert!(Role::Teacher.subscribes_to(MessageType::LobbyUpdate));
        assert!(!Role::Student.subscribes_to(MessageType::MatchStart));
    }

    #[test]
    fn display_skips_team_assembly() {
        assert!(!Role::Display.subscribes_to(MessageType::TeamJoined));
        assert!(Role::Student.subscribes_to(MessageType::TeamJoined));
    }

    #[test]
    fn set_sizes() {
        assert_eq!(role_message_types(Role::Display).len(), 15);
        assert_eq!(role_message_types(Role::Student).len(), 28);
        assert_eq!(role_message_types(Role::Teacher).len(), 24);
    }
}
