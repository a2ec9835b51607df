//! Wire types for the quiz room protocol.
//!
//! Every frame is an envelope `{"type": <name>, "data": {...}}`. Inbound
//! frames decode into [`ServerMessage`]; outbound frames are built from
//! [`ClientMessage`]. All inbound payload fields are optional: an absent field
//! means "no opinion" and a missing `data` member decodes as an empty payload.
//!
//! The authority's native schema is only ever seen here, as the immutable
//! [`StateSnapshot`] value. Nothing past this boundary sees the authority's
//! collection types.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::gate::GateAction;

// ── Type aliases ────────────────────────────────────────────────────

/// Identifier of a team inside a room.
pub type TeamId = String;

/// Stable identifier of a player (survives reconnects).
pub type PlayerId = String;

/// Identifier of a card in the catalog.
pub type CardId = String;

/// Identifier of a room on the authority.
pub type RoomId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Phase of the current round. Transitions are driven by the authority only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoundState {
    #[default]
    #[serde(rename = "ROUND_WAITING")]
    Waiting,
    #[serde(rename = "ROUND_ACTIVE")]
    Active,
    #[serde(rename = "ROUND_REVIEW")]
    Review,
    #[serde(rename = "ROUND_ENDED")]
    Ended,
}

impl RoundState {
    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "ROUND_WAITING",
            Self::Active => "ROUND_ACTIVE",
            Self::Review => "ROUND_REVIEW",
            Self::Ended => "ROUND_ENDED",
        }
    }

    /// Short human label used by the view models.
    pub fn label(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Active => "Active",
            Self::Review => "Review",
            Self::Ended => "Ended",
        }
    }
}

/// Role a client holds in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Runs the match; the only role whose channel outlives page navigation.
    Teacher,
    /// Plays on a team.
    Student,
    /// Read-only public screen.
    Display,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Display => "display",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every inbound message name the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    /// Snapshot push of the authority's schema.
    StateSync,
    RoomId,
    RoundStateUpdate,
    QuestionUpdate,
    TimerUpdate,
    TeamUpdate,
    GoldUpdate,
    RoundStarted,
    RoundEnded,
    RoundScore,
    MatchOver,
    MatchReset,
    CardCast,
    CardRulesUpdate,
    ModerationUpdate,
    Error,
    TeamJoined,
    TeamLeft,
    AvailableTeams,
    TeamSettingsUpdate,
    Suggestion,
    AnswerUpdate,
    Lock,
    WriterRotated,
    WriterTransferred,
    RoundData,
    XpEarned,
    TeamScoreUpdate,
    PlayerScoreUpdate,
    RoundScoreUpdate,
    MatchStart,
    LobbyUpdate,
}

impl MessageType {
    /// All known message types, in declaration order.
    pub const ALL: [MessageType; 32] = [
        Self::StateSync,
        Self::RoomId,
        Self::RoundStateUpdate,
        Self::QuestionUpdate,
        Self::TimerUpdate,
        Self::TeamUpdate,
        Self::GoldUpdate,
        Self::RoundStarted,
        Self::RoundEnded,
        Self::RoundScore,
        Self::MatchOver,
        Self::MatchReset,
        Self::CardCast,
        Self::CardRulesUpdate,
        Self::ModerationUpdate,
        Self::Error,
        Self::TeamJoined,
        Self::TeamLeft,
        Self::AvailableTeams,
        Self::TeamSettingsUpdate,
        Self::Suggestion,
        Self::AnswerUpdate,
        Self::Lock,
        Self::WriterRotated,
        Self::WriterTransferred,
        Self::RoundData,
        Self::XpEarned,
        Self::TeamScoreUpdate,
        Self::PlayerScoreUpdate,
        Self::RoundScoreUpdate,
        Self::MatchStart,
        Self::LobbyUpdate,
    ];

    /// Wire name of the message.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateSync => "state-sync",
            Self::RoomId => "ROOM_ID",
            Self::RoundStateUpdate => "ROUND_STATE_UPDATE",
            Self::QuestionUpdate => "QUESTION_UPDATE",
            Self::TimerUpdate => "TIMER_UPDATE",
            Self::TeamUpdate => "TEAM_UPDATE",
            Self::GoldUpdate => "GOLD_UPDATE",
            Self::RoundStarted => "ROUND_STARTED",
            Self::RoundEnded => "ROUND_ENDED",
            Self::RoundScore => "ROUND_SCORE",
            Self::MatchOver => "MATCH_OVER",
            Self::MatchReset => "MATCH_RESET",
            Self::CardCast => "CARD_CAST",
            Self::CardRulesUpdate => "CARD_RULES_UPDATE",
            Self::ModerationUpdate => "MODERATION_UPDATE",
            Self::Error => "ERROR",
            Self::TeamJoined => "TEAM_JOINED",
            Self::TeamLeft => "TEAM_LEFT",
            Self::AvailableTeams => "AVAILABLE_TEAMS",
            Self::TeamSettingsUpdate => "TEAM_SETTINGS_UPDATE",
            Self::Suggestion => "SUGGESTION",
            Self::AnswerUpdate => "ANSWER_UPDATE",
            Self::Lock => "LOCK",
            Self::WriterRotated => "WRITER_ROTATED",
            Self::WriterTransferred => "WRITER_TRANSFERRED",
            Self::RoundData => "ROUND_DATA",
            Self::XpEarned => "XP_EARNED",
            Self::TeamScoreUpdate => "TEAM_SCORE_UPDATE",
            Self::PlayerScoreUpdate => "PLAYER_SCORE_UPDATE",
            Self::RoundScoreUpdate => "ROUND_SCORE_UPDATE",
            Self::MatchStart => "MATCH_START",
            Self::LobbyUpdate => "LOBBY_UPDATE",
        }
    }

    /// Look a message type up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// Messages that are acknowledged with a no-op handler but never
    /// change local state.
    pub fn is_passive(self) -> bool {
        matches!(
            self,
            Self::TeamJoined
                | Self::TeamLeft
                | Self::AvailableTeams
                | Self::TeamSettingsUpdate
                | Self::Suggestion
                | Self::AnswerUpdate
                | Self::Lock
                | Self::WriterRotated
                | Self::WriterTransferred
                | Self::RoundData
                | Self::XpEarned
                | Self::TeamScoreUpdate
                | Self::PlayerScoreUpdate
                | Self::RoundScoreUpdate
                | Self::MatchStart
                | Self::LobbyUpdate
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw records ─────────────────────────────────────────────────────

/// A team record exactly as the authority sends it.
///
/// `writer` and `suggesters` are legacy session identifiers. They are accepted
/// here so old authorities still decode, and dropped by normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTeam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_player_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggester_player_ids: Option<Vec<PlayerId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck_slots: Option<Vec<Option<CardId>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_card_pool: Option<Vec<CardId>>,
    /// Legacy: session id of the writer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
    /// Legacy: session ids of the suggesters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggesters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<RawSuggestion>>,
}

/// A suggestion as the authority sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSuggestion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggester_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Partial or complete push of the authority's schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_state: Option<RoundState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams: Option<BTreeMap<TeamId, RawTeam>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gold: Option<BTreeMap<TeamId, i64>>,
}

impl StateSnapshot {
    /// Number of teams carried by the snapshot (0 when the field is absent).
    pub fn team_count(&self) -> usize {
        self.teams.as_ref().map_or(0, BTreeMap::len)
    }

    /// Copy of the snapshot with no opinion about teams.
    #[must_use]
    pub fn without_teams(&self) -> Self {
        Self {
            teams: None,
            ..self.clone()
        }
    }

    /// Overlay `newer` on top of `self`, field by field. Fields absent from
    /// `newer` keep their current value.
    pub fn absorb(&mut self, newer: StateSnapshot) {
        if newer.round_state.is_some() {
            self.round_state = newer.round_state;
        }
        if newer.question_text.is_some() {
            self.question_text = newer.question_text;
        }
        if newer.time_remaining.is_some() {
            self.time_remaining = newer.time_remaining;
        }
        if newer.timer_enabled.is_some() {
            self.timer_enabled = newer.timer_enabled;
        }
        if newer.teams.is_some() {
            self.teams = newer.teams;
        }
        if newer.gold.is_some() {
            self.gold = newer.gold;
        }
    }
}

// ── Payload structs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomIdPayload {
    pub room_id: Option<RoomId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundStatePayload {
    pub state: Option<RoundState>,
    pub round_number: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuestionPayload {
    pub question: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerPayload {
    pub time_remaining: Option<u32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamUpdatePayload {
    pub teams: Option<BTreeMap<TeamId, RawTeam>>,
}

/// Gold per team. Older authorities send the map under `gold`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoldUpdatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams: Option<BTreeMap<TeamId, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gold: Option<BTreeMap<TeamId, i64>>,
}

impl GoldUpdatePayload {
    /// The gold map, preferring `teams` over `gold`.
    pub fn entries(&self) -> Option<&BTreeMap<TeamId, i64>> {
        self.teams.as_ref().or(self.gold.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundStartedPayload {
    pub round_number: Option<u32>,
    pub question: Option<String>,
    pub duration: Option<u32>,
}

/// Points or evaluation scores, per team and per player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreBreakdown {
    pub teams: BTreeMap<TeamId, f64>,
    pub per_player: BTreeMap<PlayerId, Value>,
}

/// Result of one scored round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundResult {
    pub round_number: Option<u32>,
    pub question: Option<String>,
    pub evaluation_scores: Option<ScoreBreakdown>,
    pub round_points: Option<ScoreBreakdown>,
    pub answers: Option<Value>,
    pub round_winner: Option<TeamId>,
    pub match_over: Option<bool>,
}

/// Final result of a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchResult {
    pub winner: Option<TeamId>,
    pub final_scores: Option<ScoreBreakdown>,
    pub mvp: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardCastPayload {
    pub card_id: Option<CardId>,
    pub caster_team_id: Option<TeamId>,
    pub target_team_id: Option<TeamId>,
    pub is_cosmetic: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardRulesPayload {
    pub disabled_cards: Option<Vec<CardId>>,
    pub gold_cost_modifiers: Option<BTreeMap<CardId, f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModerationPayload {
    pub muted_players: Option<Vec<PlayerId>>,
    pub frozen_teams: Option<Vec<TeamId>>,
    pub round_frozen: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorPayload {
    pub message: Option<String>,
}

// ── Envelope ────────────────────────────────────────────────────────

/// The framing shared by both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

fn decode_payload<T: serde::de::DeserializeOwned>(data: Value) -> serde_json::Result<T> {
    if data.is_null() {
        serde_json::from_value(Value::Object(serde_json::Map::new()))
    } else {
        serde_json::from_value(data)
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from the authority to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Snapshot channel: the authority's schema, possibly partial.
    StateSync(StateSnapshot),
    RoomId(RoomIdPayload),
    RoundStateUpdate(RoundStatePayload),
    QuestionUpdate(QuestionPayload),
    TimerUpdate(TimerPayload),
    TeamUpdate(TeamUpdatePayload),
    GoldUpdate(GoldUpdatePayload),
    RoundStarted(RoundStartedPayload),
    RoundEnded,
    RoundScore(RoundResult),
    MatchOver(MatchResult),
    MatchReset,
    CardCast(CardCastPayload),
    CardRulesUpdate(CardRulesPayload),
    ModerationUpdate(ModerationPayload),
    Error(ErrorPayload),
    /// A known message that never changes local state.
    Passive { kind: MessageType, data: Value },
    /// A message name this client does not know.
    Unknown { kind: String, data: Value },
}

impl ServerMessage {
    /// The message type, or `None` for [`ServerMessage::Unknown`].
    pub fn message_type(&self) -> Option<MessageType> {
        Some(match self {
            Self::StateSync(_) => MessageType::StateSync,
            Self::RoomId(_) => MessageType::RoomId,
            Self::RoundStateUpdate(_) => MessageType::RoundStateUpdate,
            Self::QuestionUpdate(_) => MessageType::QuestionUpdate,
            Self::TimerUpdate(_) => MessageType::TimerUpdate,
            Self::TeamUpdate(_) => MessageType::TeamUpdate,
            Self::GoldUpdate(_) => MessageType::GoldUpdate,
            Self::RoundStarted(_) => MessageType::RoundStarted,
            Self::RoundEnded => MessageType::RoundEnded,
            Self::RoundScore(_) => MessageType::RoundScore,
            Self::MatchOver(_) => MessageType::MatchOver,
            Self::MatchReset => MessageType::MatchReset,
            Self::CardCast(_) => MessageType::CardCast,
            Self::CardRulesUpdate(_) => MessageType::CardRulesUpdate,
            Self::ModerationUpdate(_) => MessageType::ModerationUpdate,
            Self::Error(_) => MessageType::Error,
            Self::Passive { kind, .. } => *kind,
            Self::Unknown { .. } => return None,
        })
    }

    /// Wire name of the message, including unknown names.
    pub fn name(&self) -> &str {
        match self {
            Self::Unknown { kind, .. } => kind,
            other => other.message_type().map_or("", MessageType::as_str),
        }
    }

    fn from_envelope(envelope: Envelope) -> serde_json::Result<Self> {
        let Envelope { kind, data } = envelope;
        let Some(message_type) = MessageType::from_name(&kind) else {
            return Ok(Self::Unknown { kind, data });
        };
        Ok(match message_type {
            MessageType::StateSync => Self::StateSync(decode_payload(data)?),
            MessageType::RoomId => Self::RoomId(decode_payload(data)?),
            MessageType::RoundStateUpdate => Self::RoundStateUpdate(decode_payload(data)?),
            MessageType::QuestionUpdate => Self::QuestionUpdate(decode_payload(data)?),
            MessageType::TimerUpdate => Self::TimerUpdate(decode_payload(data)?),
            MessageType::TeamUpdate => Self::TeamUpdate(decode_payload(data)?),
            MessageType::GoldUpdate => Self::GoldUpdate(decode_payload(data)?),
            MessageType::RoundStarted => Self::RoundStarted(decode_payload(data)?),
            MessageType::RoundEnded => Self::RoundEnded,
            MessageType::RoundScore => Self::RoundScore(decode_payload(data)?),
            MessageType::MatchOver => Self::MatchOver(decode_payload(data)?),
            MessageType::MatchReset => Self::MatchReset,
            MessageType::CardCast => Self::CardCast(decode_payload(data)?),
            MessageType::CardRulesUpdate => Self::CardRulesUpdate(decode_payload(data)?),
            MessageType::ModerationUpdate => Self::ModerationUpdate(decode_payload(data)?),
            MessageType::Error => Self::Error(decode_payload(data)?),
            passive => Self::Passive {
                kind: passive,
                data,
            },
        })
    }

    fn to_envelope(&self) -> serde_json::Result<Envelope> {
        let data = match self {
            Self::StateSync(p) => serde_json::to_value(p)?,
            Self::RoomId(p) => serde_json::to_value(p)?,
            Self::RoundStateUpdate(p) => serde_json::to_value(p)?,
            Self::QuestionUpdate(p) => serde_json::to_value(p)?,
            Self::TimerUpdate(p) => serde_json::to_value(p)?,
            Self::TeamUpdate(p) => serde_json::to_value(p)?,
            Self::GoldUpdate(p) => serde_json::to_value(p)?,
            Self::RoundStarted(p) => serde_json::to_value(p)?,
            Self::RoundScore(p) => serde_json::to_value(p)?,
            Self::MatchOver(p) => serde_json::to_value(p)?,
            Self::CardCast(p) => serde_json::to_value(p)?,
            Self::CardRulesUpdate(p) => serde_json::to_value(p)?,
            Self::ModerationUpdate(p) => serde_json::to_value(p)?,
            Self::Error(p) => serde_json::to_value(p)?,
            Self::RoundEnded | Self::MatchReset => Value::Null,
            Self::Passive { data, .. } | Self::Unknown { data, .. } => data.clone(),
        };
        let kind = match self {
            Self::Unknown { kind, .. } => kind.clone(),
            other => other
                .message_type()
                .map(|t| t.as_str().to_owned())
                .unwrap_or_default(),
        };
        Ok(Envelope { kind, data })
    }
}

impl Serialize for ServerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_envelope()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        Self::from_envelope(envelope).map_err(D::Error::custom)
    }
}

/// Message types sent from the client to the authority.
///
/// Every variant is re-validated by the authority's action gate before it
/// mutates anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Propose answer text to the team's writer.
    Suggestion { text: String },
    /// Writer pulls a suggestion into the answer.
    #[serde(rename_all = "camelCase")]
    InsertSuggestion { suggester_id: String, timestamp: u64 },
    /// Writer edits the team answer.
    UpdateAnswer { answer: String },
    /// Writer locks the team answer.
    LockAnswer { answer: String },
    /// Cast a card at a team.
    #[serde(rename_all = "camelCase")]
    CastCard {
        card_id: CardId,
        target_team_id: TeamId,
    },
}

impl ClientMessage {
    /// The gate action this message is checked against.
    pub fn gate_action(&self) -> GateAction {
        match self {
            Self::Suggestion { .. } => GateAction::Suggestion,
            Self::InsertSuggestion { .. } => GateAction::InsertSuggestion,
            Self::UpdateAnswer { .. } => GateAction::UpdateAnswer,
            Self::LockAnswer { .. } => GateAction::LockAnswer,
            Self::CastCard { .. } => GateAction::CastCard,
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

    #[test]
    fn message_type_names_round_trip() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(MessageType::from_name("NOT_A_MESSAGE"), None);
    }

    #[test]
    fn missing_data_decodes_as_empty_payload() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"TIMER_UPDATE"}"#).unwrap();
        assert_eq!(msg, ServerMessage::TimerUpdate(TimerPayload::default()));
    }

    #[test]
    fn match_reset_accepts_empty_object() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"MATCH_RESET","data":{}}"#).unwrap();
        assert_eq!(msg, ServerMessage::MatchReset);
    }

    #[test]
    fn unknown_type_is_preserved() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"SHOP_RESTOCK","data":{"n":1}}"#).unwrap();
        assert!(matches!(msg, ServerMessage::Unknown { ref kind, .. } if kind == "SHOP_RESTOCK"));
        assert_eq!(msg.message_type(), None);
    }

    #[test]
    fn passive_message_keeps_its_type() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"XP_EARNED","data":{"xp":3}}"#).unwrap();
        assert_eq!(msg.message_type(), Some(MessageType::XpEarned));
    }

    #[test]
    fn gold_update_prefers_teams_key() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"GOLD_UPDATE","data":{"gold":{"a":1},"teams":{"a":7}}}"#,
        )
        .unwrap();
        let ServerMessage::GoldUpdate(payload) = msg else {
            panic!("expected GoldUpdate");
        };
        assert_eq!(payload.entries().and_then(|m| m.get("a")).copied(), Some(7));
    }

    #[test]
    fn client_message_uses_camel_case_names() {
        let json = serde_json::to_value(ClientMessage::CastCard {
            card_id: "shake".into(),
            target_team_id: "B".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "castCard", "data": {"cardId": "shake", "targetTeamId": "B"}})
        );
    }

    #[test]
    fn snapshot_absorb_keeps_absent_fields() {
        let mut held = StateSnapshot {
            question_text: Some("2+2?".into()),
            time_remaining: Some(30),
            ..Default::default()
        };
        held.absorb(StateSnapshot {
            time_remaining: Some(29),
            ..Default::default()
        });
        assert_eq!(held.question_text.as_deref(), Some("2+2?"));
        assert_eq!(held.time_remaining, Some(29));
    }
}
