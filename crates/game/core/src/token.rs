//! Game tokens: identity, role, and satellite state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::grid::SectorId;

/// Delimiter between the fields of a token identifier string.
pub const TOKEN_DELIMITER: char = ':';

/// The two players of a session.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PlayerId {
    Alpha,
    Beta,
}

impl PlayerId {
    pub const ALL: [PlayerId; 2] = [PlayerId::Alpha, PlayerId::Beta];

    pub fn opponent(self) -> Self {
        match self {
            PlayerId::Alpha => PlayerId::Beta,
            PlayerId::Beta => PlayerId::Alpha,
        }
    }
}

/// Role a token plays on the board.
///
/// The single Seeker per player scores goal points; Bludgers shoot, collide,
/// and guard.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TokenRole {
    Seeker,
    Bludger,
}

/// Immutable identity of a token for the life of one game.
///
/// Renders as `"<player>:<role>:<index>"`, e.g. `alpha:seeker:0`. The
/// ordering (player, role, index) keeps each player's Seeker ahead of its
/// Bludgers in catalog iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId {
    pub player: PlayerId,
    pub role: TokenRole,
    pub index: u32,
}

impl TokenId {
    pub fn new(player: PlayerId, role: TokenRole, index: u32) -> Self {
        Self {
            player,
            role,
            index,
        }
    }

    /// Identifier of a player's Seeker (always index 0).
    pub fn seeker(player: PlayerId) -> Self {
        Self::new(player, TokenRole::Seeker, 0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.player,
            self.role,
            self.index,
            sep = TOKEN_DELIMITER
        )
    }
}

/// Error parsing a token identifier string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("malformed token id {0:?}: expected \"<player>:<role>:<index>\"")]
pub struct ParseTokenIdError(pub String);

impl FromStr for TokenId {
    type Err = ParseTokenIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(TOKEN_DELIMITER);
        let (Some(player), Some(role), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseTokenIdError(s.to_string()));
        };
        let player = player
            .parse::<PlayerId>()
            .map_err(|_| ParseTokenIdError(s.to_string()))?;
        let role = role
            .parse::<TokenRole>()
            .map_err(|_| ParseTokenIdError(s.to_string()))?;
        let index = index
            .parse::<u32>()
            .map_err(|_| ParseTokenIdError(s.to_string()))?;
        Ok(TokenId::new(player, role, index))
    }
}

/// Consumable resources carried by one token.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Satellite {
    pub fuel: f64,
    pub ammo: u32,
}

/// Mutable per-token state: satellite resources, role, and board position.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenState {
    pub satellite: Satellite,
    pub role: TokenRole,
    pub position: SectorId,
}

impl TokenState {
    pub fn new(fuel: f64, ammo: u32, role: TokenRole, position: SectorId) -> Self {
        Self {
            satellite: Satellite { fuel, ammo },
            role,
            position,
        }
    }

    /// A token at or below minimum fuel may not move or engage, is not a
    /// valid engagement target, and contributes no score.
    pub fn is_active(&self, min_fuel: f64) -> bool {
        self.satellite.fuel > min_fuel
    }
}

/// All tokens of one game, keyed by identity.
///
/// The `BTreeMap` ordering yields alpha's Seeker, alpha's Bludgers, beta's
/// Seeker, beta's Bludgers, which is also the wire order of snapshots.
pub type TokenCatalog = BTreeMap<TokenId, TokenState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_round_trips_through_string_form() {
        let id = TokenId::new(PlayerId::Alpha, TokenRole::Bludger, 7);
        assert_eq!(id.to_string(), "alpha:bludger:7");
        assert_eq!("alpha:bludger:7".parse::<TokenId>().unwrap(), id);
        assert_eq!(
            "beta:seeker:0".parse::<TokenId>().unwrap(),
            TokenId::seeker(PlayerId::Beta)
        );
    }

    #[test]
    fn malformed_token_ids_are_rejected() {
        for bad in ["", "alpha", "alpha:seeker", "gamma:seeker:0", "alpha:pawn:0", "alpha:seeker:x", "alpha:seeker:0:9"] {
            assert!(bad.parse::<TokenId>().is_err(), "{bad}");
        }
    }

    #[test]
    fn catalog_orders_seeker_before_bludgers() {
        let mut catalog = TokenCatalog::new();
        for index in [3, 1, 2] {
            catalog.insert(
                TokenId::new(PlayerId::Alpha, TokenRole::Bludger, index),
                TokenState::new(100.0, 1, TokenRole::Bludger, 1),
            );
        }
        catalog.insert(
            TokenId::seeker(PlayerId::Alpha),
            TokenState::new(100.0, 0, TokenRole::Seeker, 1),
        );
        let order: Vec<String> = catalog.keys().map(TokenId::to_string).collect();
        assert_eq!(
            order,
            ["alpha:seeker:0", "alpha:bludger:1", "alpha:bludger:2", "alpha:bludger:3"]
        );
    }

    #[test]
    fn activity_threshold_is_strict() {
        let token = TokenState::new(0.0, 0, TokenRole::Bludger, 0);
        assert!(!token.is_active(0.0));
        let token = TokenState::new(0.5, 0, TokenRole::Bludger, 0);
        assert!(token.is_active(0.0));
        assert!(!token.is_active(0.5));
    }
}
