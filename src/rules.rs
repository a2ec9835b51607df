//! Card cost and cast eligibility.
//!
//! The authority computes displayed affordability with the same arithmetic,
//! so [`apply_gold_cost_modifier`] must round exactly the way it does:
//! ceiling of `base * multiplier`, never below 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;
use crate::protocol::{CardId, RoundState, TeamId};
use crate::state::SessionState;

/// Lowest multiplier the authority accepts.
pub const MIN_COST_MULTIPLIER: f64 = 0.5;

/// Highest multiplier the authority accepts.
pub const MAX_COST_MULTIPLIER: f64 = 2.0;

// ── Card model ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    #[default]
    Standard,
    /// Free to cast, exempt from the gold check.
    Cosmetic,
}

/// Who a card may be dropped on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CardTarget {
    SelfTeam,
    Opponent,
    /// A target kind this client does not understand. Has no valid drop targets.
    Other(String),
}

impl From<String> for CardTarget {
    fn from(value: String) -> Self {
        match value.as_str() {
            "self" => Self::SelfTeam,
            "opponent" => Self::Opponent,
            _ => Self::Other(value),
        }
    }
}

impl From<CardTarget> for String {
    fn from(value: CardTarget) -> Self {
        match value {
            CardTarget::SelfTeam => "self".to_owned(),
            CardTarget::Opponent => "opponent".to_owned(),
            CardTarget::Other(other) => other,
        }
    }
}

/// A catalog card. Older catalogs use `type` and `cost` for the kind and
/// the base cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    #[serde(default, alias = "type")]
    pub kind: CardKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<CardTarget>,
    #[serde(default, alias = "cost")]
    pub base_gold_cost: i64,
}

impl Card {
    pub fn is_cosmetic(&self) -> bool {
        self.kind == CardKind::Cosmetic
    }
}

// ── Cost ────────────────────────────────────────────────────────────

/// Bring a wire multiplier into the accepted range. Non-finite values are
/// rejected.
pub fn clamp_multiplier(multiplier: f64) -> Option<f64> {
    multiplier
        .is_finite()
        .then(|| multiplier.clamp(MIN_COST_MULTIPLIER, MAX_COST_MULTIPLIER))
}

/// Cost after the per-card multiplier: `max(1, ceil(base * multiplier))`, or
/// 1 when `base_cost <= 0`. A non-finite multiplier counts as 1.0.
pub fn apply_gold_cost_modifier(base_cost: i64, multiplier: f64) -> u32 {
    if base_cost <= 0 {
        return 1;
    }
    let multiplier = if multiplier.is_finite() { multiplier } else { 1.0 };
    // Float to int casts saturate.
    (base_cost as f64 * multiplier).ceil().max(1.0) as u32
}

/// What the card costs right now. Cosmetic cards are always free.
pub fn effective_gold_cost(card: &Card, modifiers: &BTreeMap<CardId, f64>) -> u32 {
    if card.is_cosmetic() {
        return 0;
    }
    let multiplier = modifiers.get(&card.id).copied().unwrap_or(1.0);
    apply_gold_cost_modifier(card.base_gold_cost, multiplier)
}

// ── Targets ─────────────────────────────────────────────────────────

/// Teams the card can be dropped on, in `all_team_ids` order.
pub fn valid_drop_targets(card: &Card, my_team_id: &str, all_team_ids: &[TeamId]) -> Vec<TeamId> {
    if my_team_id.is_empty() {
        return Vec::new();
    }
    match &card.target {
        Some(CardTarget::SelfTeam) => vec![my_team_id.to_owned()],
        Some(CardTarget::Opponent) => all_team_ids
            .iter()
            .filter(|id| !id.is_empty() && id.as_str() != my_team_id)
            .cloned()
            .collect(),
        Some(CardTarget::Other(_)) | None => Vec::new(),
    }
}

// ── Eligibility ─────────────────────────────────────────────────────

/// Everything [`can_start_drag`] looks at besides the card itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DragContext {
    pub can_cast_cards: bool,
    pub is_owned: bool,
    pub is_disabled: bool,
    pub effective_gold_cost: u32,
    pub team_gold: u32,
    pub round_state: RoundState,
    pub match_over: bool,
}

/// Pre-check for starting a cast. The authority still decides.
pub fn can_start_drag(card: &Card, ctx: &DragContext) -> bool {
    if !ctx.can_cast_cards || ctx.match_over {
        return false;
    }
    if ctx.round_state != RoundState::Active {
        return false;
    }
    if !ctx.is_owned || ctx.is_disabled {
        return false;
    }
    card.is_cosmetic() || ctx.team_gold >= ctx.effective_gold_cost
}

/// [`can_start_drag`] with disabled flag, cost and gold read from `state`.
/// An unknown team has no gold.
pub fn can_cast_card(
    state: &SessionState,
    card: &Card,
    capabilities: &Capabilities,
    team_id: &str,
    is_owned: bool,
) -> bool {
    let ctx = DragContext {
        can_cast_cards: capabilities.can_cast_cards,
        is_owned,
        is_disabled: state.card_rules.is_disabled(&card.id),
        effective_gold_cost: effective_gold_cost(card, &state.card_rules.gold_cost_modifiers),
        team_gold: state.team(team_id).map_or(0, |t| t.gold),
        round_state: state.round.round_state,
        match_over: state.scoring.match_over,
    };
    can_start_drag(card, &ctx)
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

    fn standard(id: &str, cost: i64) -> Card {
        Card {
            id: id.into(),
            kind: CardKind::Standard,
            target: Some(CardTarget::Opponent),
            base_gold_cost: cost,
        }
    }

    fn active_ctx() -> DragContext {
        DragContext {
            can_cast_cards: true,
            is_owned: true,
            is_disabled: false,
            effective_gold_cost: 3,
            team_gold: 5,
            round_state: RoundState::Active,
            match_over: false,
        }
    }

    #[test]
    fn cost_table() {
        assert_eq!(apply_gold_cost_modifier(3, 1.5), 5);
        assert_eq!(apply_gold_cost_modifier(2, 0.75), 2);
        assert_eq!(apply_gold_cost_modifier(5, 2.0), 10);
        assert_eq!(apply_gold_cost_modifier(1, 0.5), 1);
        assert_eq!(apply_gold_cost_modifier(0, 7.0), 1);
        assert_eq!(apply_gold_cost_modifier(-1, 0.5), 1);
    }

    #[test]
    fn cost_never_below_one() {
        for base in 0..50 {
            for step in 1..=100_u32 {
                let m = f64::from(step) / 10.0;
                assert!(apply_gold_cost_modifier(base, m) >= 1, "base={base} m={m}");
            }
        }
    }

    #[test]
    fn non_finite_multiplier_is_neutral() {
        assert_eq!(apply_gold_cost_modifier(4, f64::NAN), 4);
        assert_eq!(apply_gold_cost_modifier(4, f64::INFINITY), 4);
    }

    #[test]
    fn cosmetic_cards_are_free() {
        let card = Card {
            kind: CardKind::Cosmetic,
            ..standard("confetti", 5)
        };
        assert_eq!(effective_gold_cost(&card, &BTreeMap::new()), 0);
    }

    #[test]
    fn legacy_catalog_fields_decode() {
        let card: Card =
            serde_json::from_str(r#"{"id":"SHAKE","type":"standard","cost":3,"target":"opponent"}"#)
                .unwrap();
        assert_eq!(card.base_gold_cost, 3);
        assert_eq!(card.target, Some(CardTarget::Opponent));
        let odd: Card = serde_json::from_str(r#"{"id":"X","target":"everyone"}"#).unwrap();
        assert_eq!(odd.target, Some(CardTarget::Other("everyone".into())));
    }

    #[test]
    fn opponent_targets_skip_self_and_blank_ids() {
        let ids: Vec<TeamId> = vec!["A".into(), "".into(), "B".into(), "C".into()];
        assert_eq!(valid_drop_targets(&standard("s", 1), "B", &ids), vec!["A", "C"]);
    }

    #[test]
    fn unknown_target_kind_has_no_targets() {
        let card = Card {
            target: None,
            ..standard("s", 1)
        };
        assert!(valid_drop_targets(&card, "A", &["B".to_owned()]).is_empty());
    }

    #[test]
    fn drag_blocked_by_each_condition() {
        let card = standard("SHAKE", 3);
        assert!(can_start_drag(&card, &active_ctx()));

        let blockers = [
            DragContext { can_cast_cards: false, ..active_ctx() },
            DragContext { match_over: true, ..active_ctx() },
            DragContext { is_owned: false, ..active_ctx() },
            DragContext { is_disabled: true, ..active_ctx() },
            DragContext { team_gold: 2, ..active_ctx() },
            DragContext { round_state: RoundState::Waiting, ..active_ctx() },
            DragContext { round_state: RoundState::Review, ..active_ctx() },
            DragContext { round_state: RoundState::Ended, ..active_ctx() },
        ];
        for ctx in blockers {
            assert!(!can_start_drag(&card, &ctx), "{ctx:?}");
        }
    }

    #[test]
    fn cosmetic_drag_ignores_gold() {
        let card = Card {
            kind: CardKind::Cosmetic,
            ..standard("confetti", 0)
        };
        let ctx = DragContext {
            effective_gold_cost: 0,
            team_gold: 0,
            ..active_ctx()
        };
        assert!(can_start_drag(&card, &ctx));
    }
}
