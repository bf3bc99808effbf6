//! Per-session game configuration.
//!
//! All tunables are collected into one immutable [`GameConfig`] value passed
//! to the engine constructor. Parameter tables are per-player so asymmetric
//! games (different board patterns, costs, or scoring) need no special
//! casing anywhere else in the engine.

use crate::actions::{EngagementKind, MovementKind, SectorRelation};
use crate::token::{PlayerId, TokenRole};

/// A value held separately for each player.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerPlayer<T> {
    pub alpha: T,
    pub beta: T,
}

impl<T> PerPlayer<T> {
    pub fn new(alpha: T, beta: T) -> Self {
        Self { alpha, beta }
    }
}

impl<T: Clone> PerPlayer<T> {
    /// Same value for both players.
    pub fn splat(value: T) -> Self {
        Self {
            alpha: value.clone(),
            beta: value,
        }
    }
}

impl<T> std::ops::Index<PlayerId> for PerPlayer<T> {
    type Output = T;

    fn index(&self, player: PlayerId) -> &T {
        match player {
            PlayerId::Alpha => &self.alpha,
            PlayerId::Beta => &self.beta,
        }
    }
}

impl<T> std::ops::IndexMut<PlayerId> for PerPlayer<T> {
    fn index_mut(&mut self, player: PlayerId) -> &mut T {
        match player {
            PlayerId::Alpha => &mut self.alpha,
            PlayerId::Beta => &mut self.beta,
        }
    }
}

/// A value held separately for each token role.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerRole<T> {
    pub seeker: T,
    pub bludger: T,
}

impl<T> PerRole<T> {
    pub fn new(seeker: T, bludger: T) -> Self {
        Self { seeker, bludger }
    }
}

impl<T> std::ops::Index<TokenRole> for PerRole<T> {
    type Output = T;

    fn index(&self, role: TokenRole) -> &T {
        match role {
            TokenRole::Seeker => &self.seeker,
            TokenRole::Bludger => &self.bludger,
        }
    }
}

/// Fuel cost of each engagement kind at one sector relation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngagementCosts {
    pub shoot: f64,
    pub collide: f64,
    pub guard: f64,
}

/// Fuel cost of every maneuver a token can perform.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FuelUsage {
    pub noop: f64,
    /// Station-keeping cost applied to every token during drift.
    pub drift: f64,
    pub prograde: f64,
    pub retrograde: f64,
    pub radial_in: f64,
    pub radial_out: f64,
    pub in_sector: EngagementCosts,
    pub adjacent_sector: EngagementCosts,
}

impl FuelUsage {
    pub fn movement(&self, kind: MovementKind) -> f64 {
        match kind {
            MovementKind::NoOp => self.noop,
            MovementKind::Prograde => self.prograde,
            MovementKind::Retrograde => self.retrograde,
            MovementKind::RadialIn => self.radial_in,
            MovementKind::RadialOut => self.radial_out,
        }
    }

    /// Cost of an engagement against a target in the given sector relation.
    /// NoOp engagements cost the same as a NoOp maneuver.
    pub fn engagement(&self, relation: SectorRelation, kind: EngagementKind) -> f64 {
        let costs = match relation {
            SectorRelation::InSector => &self.in_sector,
            SectorRelation::AdjacentSector => &self.adjacent_sector,
        };
        match kind {
            EngagementKind::NoOp => self.noop,
            EngagementKind::Shoot => costs.shoot,
            EngagementKind::Collide => costs.collide,
            EngagementKind::Guard => costs.guard,
        }
    }
}

/// Success probability of each engagement kind at one sector relation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KindProbs {
    pub shoot: f64,
    pub collide: f64,
    pub guard: f64,
}

/// Engagement success probability tables for one player.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngagementProbs {
    pub in_sector: KindProbs,
    pub adjacent_sector: KindProbs,
}

impl EngagementProbs {
    /// Probability of success at the given sector relation. NoOp is always 1.
    pub fn probability(&self, relation: SectorRelation, kind: EngagementKind) -> f64 {
        let probs = match relation {
            SectorRelation::InSector => &self.in_sector,
            SectorRelation::AdjacentSector => &self.adjacent_sector,
        };
        match kind {
            EngagementKind::NoOp => 1.0,
            EngagementKind::Shoot => probs.shoot,
            EngagementKind::Collide => probs.collide,
            EngagementKind::Guard => probs.guard,
        }
    }
}

/// Invalid game configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("ring bounds must satisfy 0 < min_ring <= geo_ring <= max_ring (got min {min_ring}, geo {geo_ring}, max {max_ring})")]
    InvalidRings {
        min_ring: u32,
        geo_ring: u32,
        max_ring: u32,
    },
}

/// Immutable game parameters for one session.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameConfig {
    /// Outermost playable orbit ring.
    pub max_ring: u32,
    /// Innermost playable orbit ring.
    pub min_ring: u32,
    /// Ring treated as stationary relative to the planet; hills live here.
    pub geo_ring: u32,
    /// Bludger placement per player: `(azimuth offset from hill, count)`.
    pub init_pattern: PerPlayer<Vec<(i32, u32)>>,
    pub init_fuel: PerPlayer<PerRole<f64>>,
    pub init_ammo: PerPlayer<PerRole<u32>>,
    /// Fuel level at or below which a token is inoperable.
    pub min_fuel: f64,
    pub fuel_usage: PerPlayer<FuelUsage>,
    pub engage_probs: PerPlayer<EngagementProbs>,
    /// Final score assigned to a player who selects an illegal action.
    pub illegal_action_score: f64,
    /// Points per drift for a Seeker sitting in its own hill sector.
    pub in_goal_points: PerPlayer<f64>,
    /// Points per drift for a Seeker adjacent to its own hill sector.
    pub adj_goal_points: PerPlayer<f64>,
    /// Remaining-fuel to points conversion per role.
    pub fuel_points_factor: PerPlayer<PerRole<f64>>,
    /// Score at which a player wins immediately.
    pub win_score: PerPlayer<f64>,
    /// Game is terminated once this many turns have elapsed.
    pub max_turns: u32,
}

impl GameConfig {
    pub const DEFAULT_MAX_RING: u32 = 5;
    pub const DEFAULT_MIN_RING: u32 = 1;
    pub const DEFAULT_GEO_RING: u32 = 4;
    pub const DEFAULT_INIT_PATTERN: [(i32, u32); 5] = [(-2, 1), (-1, 3), (0, 2), (1, 3), (2, 1)];
    pub const DEFAULT_INIT_FUEL: f64 = 100.0;
    pub const DEFAULT_MIN_FUEL: f64 = 0.0;
    pub const DEFAULT_ILLEGAL_ACTION_SCORE: f64 = -1000.0;
    pub const DEFAULT_IN_GOAL_POINTS: f64 = 3.0;
    pub const DEFAULT_ADJ_GOAL_POINTS: f64 = 1.0;
    pub const DEFAULT_FUEL_POINTS_FACTOR: f64 = 1.0;
    pub const DEFAULT_FUEL_POINTS_FACTOR_BLUDGER: f64 = 0.1;
    pub const DEFAULT_WIN_SCORE: f64 = 100.0;
    pub const DEFAULT_MAX_TURNS: u32 = 100;

    /// Checks the ring bounds that every board operation relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ring == 0 || self.min_ring > self.geo_ring || self.geo_ring > self.max_ring {
            return Err(ConfigError::InvalidRings {
                min_ring: self.min_ring,
                geo_ring: self.geo_ring,
                max_ring: self.max_ring,
            });
        }
        Ok(())
    }

    /// Number of tokens a player fields before ghost padding (Seeker plus
    /// patterned Bludgers).
    pub fn tokens_per_player(&self, player: PlayerId) -> u32 {
        1 + self.init_pattern[player]
            .iter()
            .map(|(_, count)| count)
            .sum::<u32>()
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        let fuel_usage = FuelUsage {
            noop: 0.0,
            drift: 1.0,
            prograde: 5.0,
            retrograde: 10.0,
            radial_in: 1.0,
            radial_out: 1.0,
            in_sector: EngagementCosts {
                shoot: 5.0,
                collide: 20.0,
                guard: 20.0,
            },
            adjacent_sector: EngagementCosts {
                shoot: 5.0,
                collide: 30.0,
                guard: 30.0,
            },
        };
        let engage_probs = EngagementProbs {
            in_sector: KindProbs {
                shoot: 0.7,
                collide: 0.8,
                guard: 0.9,
            },
            adjacent_sector: KindProbs {
                shoot: 0.5,
                collide: 0.7,
                guard: 0.8,
            },
        };
        Self {
            max_ring: Self::DEFAULT_MAX_RING,
            min_ring: Self::DEFAULT_MIN_RING,
            geo_ring: Self::DEFAULT_GEO_RING,
            init_pattern: PerPlayer::splat(Self::DEFAULT_INIT_PATTERN.to_vec()),
            init_fuel: PerPlayer::splat(PerRole::new(
                Self::DEFAULT_INIT_FUEL,
                Self::DEFAULT_INIT_FUEL,
            )),
            init_ammo: PerPlayer::splat(PerRole::new(0, 1)),
            min_fuel: Self::DEFAULT_MIN_FUEL,
            fuel_usage: PerPlayer::splat(fuel_usage),
            engage_probs: PerPlayer::splat(engage_probs),
            illegal_action_score: Self::DEFAULT_ILLEGAL_ACTION_SCORE,
            in_goal_points: PerPlayer::splat(Self::DEFAULT_IN_GOAL_POINTS),
            adj_goal_points: PerPlayer::splat(Self::DEFAULT_ADJ_GOAL_POINTS),
            fuel_points_factor: PerPlayer::splat(PerRole::new(
                Self::DEFAULT_FUEL_POINTS_FACTOR,
                Self::DEFAULT_FUEL_POINTS_FACTOR_BLUDGER,
            )),
            win_score: PerPlayer::splat(Self::DEFAULT_WIN_SCORE),
            max_turns: Self::DEFAULT_MAX_TURNS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tokens_per_player(PlayerId::Alpha), 11);
        assert_eq!(config.tokens_per_player(PlayerId::Beta), 11);
    }

    #[test]
    fn ring_bounds_are_enforced() {
        let mut config = GameConfig::default();
        config.min_ring = 0;
        assert!(config.validate().is_err());

        let mut config = GameConfig::default();
        config.geo_ring = config.max_ring + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn noop_probability_is_one_for_both_relations() {
        let config = GameConfig::default();
        for relation in [SectorRelation::InSector, SectorRelation::AdjacentSector] {
            assert_eq!(
                config.engage_probs.alpha.probability(relation, EngagementKind::NoOp),
                1.0
            );
        }
    }
}
