//! Normalized local session state.
//!
//! [`SessionState`] is the root aggregate. Each subtree sits behind an [`Arc`]
//! so a reducer step only allocates for the subtrees it touches; everything
//! else is shared with the previous state.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::protocol::{
    CardId, MatchResult, PlayerId, RawSuggestion, RawTeam, Role, RoomId, RoundResult, RoundState,
    TeamId,
};

/// Number of deck slots every team has.
pub const DECK_SLOT_COUNT: usize = 4;

// ── Connection ──────────────────────────────────────────────────────

/// Connection status as presented to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Error,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Connection {
    pub status: ConnectionStatus,
    pub room_id: Option<RoomId>,
    pub role: Option<Role>,
}

// ── Round ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Round {
    pub round_state: RoundState,
    pub round_number: u32,
    pub question_text: String,
    pub timer_enabled: bool,
    /// Seconds left on the round timer.
    pub time_remaining: u32,
}

// ── Teams ───────────────────────────────────────────────────────────

/// A suggestion proposed to a team's writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
    pub suggester_id: PlayerId,
    /// Milliseconds since the epoch, as stamped by the authority. 0 when unknown.
    pub timestamp: u64,
}

/// Canonical team record. Produced only by [`TeamData::normalize`] or
/// [`TeamData::stub`], so every field is always populated.
///
/// Invariants: `writer_player_id` is never `Some("")`, `suggester_player_ids`
/// holds no duplicates and never the writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamData {
    pub name: String,
    pub gold: u32,
    pub writer_player_id: Option<PlayerId>,
    pub suggester_player_ids: Vec<PlayerId>,
    pub answer: String,
    pub locked: bool,
    pub deck_slots: [Option<CardId>; DECK_SLOT_COUNT],
    pub deck_locked: bool,
    pub team_card_pool: Vec<CardId>,
    pub suggestions: Vec<Suggestion>,
}

/// Clamp a wire gold value into the non-negative range.
pub fn clamp_gold(gold: i64) -> u32 {
    u32::try_from(gold.max(0)).unwrap_or(u32::MAX)
}

impl TeamData {
    /// Minimal record for a team only known through a gold update.
    pub fn stub(team_id: &str, gold: u32) -> Self {
        Self {
            name: team_id.to_owned(),
            gold,
            ..Self::default()
        }
    }

    /// Build the canonical record from whatever the authority sent.
    ///
    /// Idempotent: `normalize(&RawTeam::from(&normalize(raw)))` equals
    /// `normalize(raw)`. Legacy `writer`/`suggesters` session ids are dropped.
    pub fn normalize(raw: &RawTeam, team_id: &str) -> Self {
        let name = raw
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(team_id)
            .to_owned();

        let writer_player_id = raw
            .writer_player_id
            .as_deref()
            .filter(|w| !w.is_empty())
            .map(str::to_owned);

        let mut suggester_player_ids: Vec<PlayerId> = Vec::new();
        for id in raw.suggester_player_ids.iter().flatten() {
            if id.is_empty()
                || writer_player_id.as_deref() == Some(id.as_str())
                || suggester_player_ids.contains(id)
            {
                continue;
            }
            suggester_player_ids.push(id.clone());
        }

        let mut deck_slots: [Option<CardId>; DECK_SLOT_COUNT] = Default::default();
        if let Some(slots) = &raw.deck_slots {
            for (dst, src) in deck_slots.iter_mut().zip(slots.iter()) {
                *dst = src.clone().filter(|c| !c.is_empty());
            }
        }

        Self {
            name,
            gold: raw.gold.map_or(0, clamp_gold),
            writer_player_id,
            suggester_player_ids,
            answer: raw.answer.clone().unwrap_or_default(),
            locked: raw.locked.unwrap_or(false),
            deck_slots,
            deck_locked: raw.deck_locked.unwrap_or(false),
            team_card_pool: raw.team_card_pool.clone().unwrap_or_default(),
            suggestions: raw
                .suggestions
                .iter()
                .flatten()
                .map(Suggestion::normalize)
                .collect(),
        }
    }

    /// Whether `player_id` is this team's writer.
    pub fn is_writer(&self, player_id: &str) -> bool {
        self.writer_player_id.as_deref() == Some(player_id)
    }

    /// Whether `card_id` is in the team's pool.
    pub fn owns_card(&self, card_id: &str) -> bool {
        self.team_card_pool.iter().any(|c| c == card_id)
    }
}

impl Suggestion {
    fn normalize(raw: &RawSuggestion) -> Self {
        Self {
            text: raw.text.clone().unwrap_or_default(),
            suggester_id: raw.suggester_id.clone().unwrap_or_default(),
            timestamp: raw.timestamp.unwrap_or(0),
        }
    }
}

impl From<&TeamData> for RawTeam {
    fn from(team: &TeamData) -> Self {
        Self {
            name: Some(team.name.clone()),
            gold: Some(i64::from(team.gold)),
            writer_player_id: team.writer_player_id.clone(),
            suggester_player_ids: Some(team.suggester_player_ids.clone()),
            answer: Some(team.answer.clone()),
            locked: Some(team.locked),
            deck_slots: Some(team.deck_slots.to_vec()),
            deck_locked: Some(team.deck_locked),
            team_card_pool: Some(team.team_card_pool.clone()),
            writer: None,
            suggesters: None,
            suggestions: Some(
                team.suggestions
                    .iter()
                    .map(|s| RawSuggestion {
                        text: Some(s.text.clone()),
                        suggester_id: Some(s.suggester_id.clone()),
                        timestamp: Some(s.timestamp),
                    })
                    .collect(),
            ),
        }
    }
}

/// All teams in the room, keyed by id.
pub type Teams = BTreeMap<TeamId, TeamData>;

// ── Scoring ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scoring {
    pub round_result: Option<RoundResult>,
    pub match_result: Option<MatchResult>,
    pub match_over: bool,
    pub match_scores: BTreeMap<TeamId, f64>,
}

// ── Card rules ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardRules {
    pub disabled_cards: BTreeSet<CardId>,
    /// Per-card cost multipliers, already clamped into the allowed range.
    pub gold_cost_modifiers: BTreeMap<CardId, f64>,
}

impl CardRules {
    pub fn is_disabled(&self, card_id: &str) -> bool {
        self.disabled_cards.contains(card_id)
    }

    /// The multiplier for `card_id`, 1.0 when none is set.
    pub fn multiplier(&self, card_id: &str) -> f64 {
        self.gold_cost_modifiers.get(card_id).copied().unwrap_or(1.0)
    }
}

// ── Moderation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Moderation {
    pub muted_players: BTreeSet<PlayerId>,
    pub frozen_teams: BTreeSet<TeamId>,
    pub round_frozen: bool,
}

impl Moderation {
    pub fn is_muted(&self, player_id: &str) -> bool {
        self.muted_players.contains(player_id)
    }

    pub fn is_team_frozen(&self, team_id: &str) -> bool {
        self.frozen_teams.contains(team_id)
    }
}

// ── Effects ─────────────────────────────────────────────────────────

/// A card effect currently shown on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEffect {
    pub card_id: CardId,
    pub caster_team_id: TeamId,
    pub target_team_id: TeamId,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    pub is_cosmetic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    /// Oldest first.
    pub active_effects: VecDeque<ActiveEffect>,
}

// ── Root ────────────────────────────────────────────────────────────

/// The whole local view of one room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub connection: Arc<Connection>,
    pub round: Arc<Round>,
    pub teams: Arc<Teams>,
    pub scoring: Arc<Scoring>,
    pub card_rules: Arc<CardRules>,
    pub moderation: Arc<Moderation>,
    pub effects: Arc<Effects>,
}

impl SessionState {
    pub fn team(&self, team_id: &str) -> Option<&TeamData> {
        self.teams.get(team_id)
    }

    pub fn team_ids(&self) -> Vec<TeamId> {
        self.teams.keys().cloned().collect()
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
    fn empty_record_gets_defaults() {
        let team = TeamData::normalize(&RawTeam::default(), "red");
        assert_eq!(team.name, "red");
        assert_eq!(team.gold, 0);
        assert_eq!(team.writer_player_id, None);
        assert!(team.suggester_player_ids.is_empty());
        assert_eq!(team.deck_slots, [None, None, None, None]);
        assert!(!team.locked);
        assert!(!team.deck_locked);
        assert!(team.suggestions.is_empty());
    }

    #[test]
    fn deck_is_padded_and_truncated() {
        let short = RawTeam {
            deck_slots: Some(vec![Some("a".into())]),
            ..Default::default()
        };
        assert_eq!(
            TeamData::normalize(&short, "t").deck_slots,
            [Some("a".into()), None, None, None]
        );

        let long = RawTeam {
            deck_slots: Some((0..6).map(|i| Some(format!("c{i}"))).collect()),
            ..Default::default()
        };
        let slots = TeamData::normalize(&long, "t").deck_slots;
        assert_eq!(slots[3].as_deref(), Some("c3"));
    }

    #[test]
    fn negative_gold_clamps_to_zero() {
        let raw = RawTeam {
            gold: Some(-12),
            ..Default::default()
        };
        assert_eq!(TeamData::normalize(&raw, "t").gold, 0);
    }

    #[test]
    fn writer_is_removed_from_suggesters() {
        let raw = RawTeam {
            writer_player_id: Some("p1".into()),
            suggester_player_ids: Some(vec!["p1".into(), "p2".into(), "p2".into(), "p3".into()]),
            ..Default::default()
        };
        let team = TeamData::normalize(&raw, "t");
        assert_eq!(team.suggester_player_ids, vec!["p2".to_owned(), "p3".to_owned()]);
        assert!(team.is_writer("p1"));
    }

    #[test]
    fn empty_writer_counts_as_none() {
        let raw = RawTeam {
            writer_player_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(TeamData::normalize(&raw, "t").writer_player_id, None);
    }

    #[test]
    fn legacy_identity_fields_are_dropped() {
        let raw = RawTeam {
            writer: Some("session-1".into()),
            suggesters: Some(vec!["session-2".into()]),
            ..Default::default()
        };
        let back = RawTeam::from(&TeamData::normalize(&raw, "t"));
        assert_eq!(back.writer, None);
        assert_eq!(back.suggesters, None);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = RawTeam {
            name: Some(String::new()),
            gold: Some(-3),
            writer_player_id: Some("w".into()),
            suggester_player_ids: Some(vec!["w".into(), "s".into(), "s".into()]),
            deck_slots: Some(vec![None, Some("x".into()), None, None, Some("y".into())]),
            suggestions: Some(vec![RawSuggestion {
                text: Some("maybe 4".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let once = TeamData::normalize(&raw, "blue");
        let twice = TeamData::normalize(&RawTeam::from(&once), "blue");
        assert_eq!(once, twice);
    }
}
