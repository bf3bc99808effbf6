//! Action declarations and the per-phase legal-action generator.

use std::collections::BTreeMap;

use crate::adjacency::TokenAdjacency;
use crate::engine::TurnPhase;
use crate::grid::{GridError, OrbitGrid};
use crate::token::{TokenCatalog, TokenId, TokenRole};

/// Maneuvers available during the movement phase.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MovementKind {
    #[strum(serialize = "noop")]
    #[cfg_attr(feature = "serde", serde(rename = "noop"))]
    NoOp,
    Prograde,
    Retrograde,
    RadialIn,
    RadialOut,
}

/// Engagements available during the engagement phase.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EngagementKind {
    #[strum(serialize = "noop")]
    #[cfg_attr(feature = "serde", serde(rename = "noop"))]
    NoOp,
    Shoot,
    Collide,
    Guard,
}

/// Whether an engagement target shares the actor's sector or sits in an
/// adjacent one. Costs and probabilities differ between the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SectorRelation {
    InSector,
    AdjacentSector,
}

/// A declared engagement: kind, target, and the success probability attached
/// at declaration time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngagementCmd {
    pub kind: EngagementKind,
    pub target: TokenId,
    pub prob: f64,
}

impl EngagementCmd {
    /// The self-targeted do-nothing declaration for a token.
    pub fn noop(actor: TokenId) -> Self {
        Self {
            kind: EngagementKind::NoOp,
            target: actor,
            prob: 1.0,
        }
    }
}

/// One token's declared action for the current phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TokenAction {
    Move(MovementKind),
    Engage(EngagementCmd),
}

/// Complete action declaration for a phase step, one entry per declared
/// token.
pub type ActionMap = BTreeMap<TokenId, TokenAction>;

/// A phase-legal action template. Engagement templates carry no probability;
/// probabilities are looked up at declaration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegalAction {
    Move(MovementKind),
    Engage {
        kind: EngagementKind,
        target: TokenId,
    },
}

/// Legal action templates for every token in the catalog.
pub type LegalActionSet = BTreeMap<TokenId, Vec<LegalAction>>;

/// Checks one declared action against the legal set, ignoring probability.
pub fn is_legal_action(token: TokenId, action: &TokenAction, legal: &LegalActionSet) -> bool {
    let Some(options) = legal.get(&token) else {
        return false;
    };
    let template = match action {
        TokenAction::Move(kind) => LegalAction::Move(*kind),
        TokenAction::Engage(cmd) => LegalAction::Engage {
            kind: cmd.kind,
            target: cmd.target,
        },
    };
    options.contains(&template)
}

/// Computes the legal action set for the current phase.
///
/// Movement: active tokens may hold station or move prograde, retrograde,
/// radially in (above the innermost playable ring), or radially out (below
/// the outermost). Engagement: active tokens may guard their own adjacent
/// Seeker when it is threatened, or attack adjacent active opponents;
/// Seekers themselves never shoot or collide. Drift: no actions at all.
pub fn legal_actions(
    phase: TurnPhase,
    catalog: &TokenCatalog,
    grid: &OrbitGrid,
    adjacency: &TokenAdjacency,
    min_ring: u32,
    max_ring: u32,
    min_fuel: f64,
) -> Result<LegalActionSet, GridError> {
    let mut legal = LegalActionSet::new();

    for (&token, state) in catalog {
        let mut options = Vec::new();

        match phase {
            TurnPhase::Movement => {
                if !state.is_active(min_fuel) {
                    options.push(LegalAction::Move(MovementKind::NoOp));
                } else {
                    options.extend([
                        LegalAction::Move(MovementKind::NoOp),
                        LegalAction::Move(MovementKind::Prograde),
                        LegalAction::Move(MovementKind::Retrograde),
                    ]);
                    let ring = grid.ring_of(state.position)?;
                    if ring > min_ring {
                        options.push(LegalAction::Move(MovementKind::RadialIn));
                    }
                    if ring < max_ring {
                        options.push(LegalAction::Move(MovementKind::RadialOut));
                    }
                }
            }
            TurnPhase::Engagement => {
                options.push(LegalAction::Engage {
                    kind: EngagementKind::NoOp,
                    target: token,
                });
                if state.is_active(min_fuel) {
                    for &target in adjacency.neighbors(token) {
                        let Some(target_state) = catalog.get(&target) else {
                            continue;
                        };
                        if target.player == token.player {
                            // guard our own Seeker, but only when an active
                            // opposing token is adjacent to it
                            if target.role == TokenRole::Seeker
                                && adjacency.neighbors(target).any(|&threat| {
                                    threat.player != token.player
                                        && catalog
                                            .get(&threat)
                                            .is_some_and(|t| t.is_active(min_fuel))
                                })
                            {
                                options.push(LegalAction::Engage {
                                    kind: EngagementKind::Guard,
                                    target,
                                });
                            }
                        } else if target_state.is_active(min_fuel)
                            && token.role != TokenRole::Seeker
                        {
                            options.push(LegalAction::Engage {
                                kind: EngagementKind::Collide,
                                target,
                            });
                            if state.satellite.ammo >= 1 {
                                options.push(LegalAction::Engage {
                                    kind: EngagementKind::Shoot,
                                    target,
                                });
                            }
                        }
                    }
                }
            }
            TurnPhase::Drift => {}
        }

        legal.insert(token, options);
    }

    Ok(legal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{PlayerId, TokenState};

    fn token(player: PlayerId, role: TokenRole, index: u32) -> TokenId {
        TokenId::new(player, role, index)
    }

    fn catalog_at(entries: &[(TokenId, f64, u32, u32)]) -> TokenCatalog {
        entries
            .iter()
            .map(|&(id, fuel, ammo, position)| {
                (id, TokenState::new(fuel, ammo, id.role, position))
            })
            .collect()
    }

    #[test]
    fn movement_options_respect_ring_bounds() {
        let grid = OrbitGrid::new(3);
        // one token on the innermost playable ring, one on the outermost
        let inner = token(PlayerId::Alpha, TokenRole::Seeker, 0);
        let outer = token(PlayerId::Beta, TokenRole::Seeker, 0);
        let catalog = catalog_at(&[(inner, 100.0, 0, 1), (outer, 100.0, 0, 7)]);
        let adjacency = TokenAdjacency::build(&grid, &catalog).unwrap();
        let legal = legal_actions(
            TurnPhase::Movement,
            &catalog,
            &grid,
            &adjacency,
            1,
            3,
            0.0,
        )
        .unwrap();

        assert_eq!(
            legal[&inner],
            vec![
                LegalAction::Move(MovementKind::NoOp),
                LegalAction::Move(MovementKind::Prograde),
                LegalAction::Move(MovementKind::Retrograde),
                LegalAction::Move(MovementKind::RadialOut),
            ]
        );
        assert_eq!(
            legal[&outer],
            vec![
                LegalAction::Move(MovementKind::NoOp),
                LegalAction::Move(MovementKind::Prograde),
                LegalAction::Move(MovementKind::Retrograde),
                LegalAction::Move(MovementKind::RadialIn),
            ]
        );
    }

    #[test]
    fn inactive_token_may_only_hold_station() {
        let grid = OrbitGrid::new(3);
        let dead = token(PlayerId::Alpha, TokenRole::Bludger, 1);
        let catalog = catalog_at(&[(dead, 0.0, 1, 5)]);
        let adjacency = TokenAdjacency::build(&grid, &catalog).unwrap();

        let legal = legal_actions(
            TurnPhase::Movement,
            &catalog,
            &grid,
            &adjacency,
            1,
            3,
            0.0,
        )
        .unwrap();
        assert_eq!(legal[&dead], vec![LegalAction::Move(MovementKind::NoOp)]);

        let legal = legal_actions(
            TurnPhase::Engagement,
            &catalog,
            &grid,
            &adjacency,
            1,
            3,
            0.0,
        )
        .unwrap();
        assert_eq!(
            legal[&dead],
            vec![LegalAction::Engage {
                kind: EngagementKind::NoOp,
                target: dead
            }]
        );
    }

    #[test]
    fn engagement_options_follow_adjacency_and_resources() {
        let grid = OrbitGrid::new(2);
        let a_seeker = token(PlayerId::Alpha, TokenRole::Seeker, 0);
        let a_bludger = token(PlayerId::Alpha, TokenRole::Bludger, 1);
        let a_empty = token(PlayerId::Alpha, TokenRole::Bludger, 2);
        let b_bludger = token(PlayerId::Beta, TokenRole::Bludger, 1);
        let b_dead = token(PlayerId::Beta, TokenRole::Bludger, 2);
        let catalog = catalog_at(&[
            (a_seeker, 100.0, 0, 3),
            (a_bludger, 100.0, 1, 3),
            (a_empty, 100.0, 0, 3),
            (b_bludger, 100.0, 1, 4),
            (b_dead, 0.0, 1, 3),
        ]);
        let adjacency = TokenAdjacency::build(&grid, &catalog).unwrap();
        let legal = legal_actions(
            TurnPhase::Engagement,
            &catalog,
            &grid,
            &adjacency,
            1,
            2,
            0.0,
        )
        .unwrap();

        // armed bludger: guard own threatened seeker, attack the live enemy,
        // never the dead one
        assert_eq!(
            legal[&a_bludger],
            vec![
                LegalAction::Engage {
                    kind: EngagementKind::NoOp,
                    target: a_bludger
                },
                LegalAction::Engage {
                    kind: EngagementKind::Guard,
                    target: a_seeker
                },
                LegalAction::Engage {
                    kind: EngagementKind::Collide,
                    target: b_bludger
                },
                LegalAction::Engage {
                    kind: EngagementKind::Shoot,
                    target: b_bludger
                },
            ]
        );

        // out of ammo: collide but no shoot
        assert!(legal[&a_empty].contains(&LegalAction::Engage {
            kind: EngagementKind::Collide,
            target: b_bludger
        }));
        assert!(!legal[&a_empty]
            .iter()
            .any(|a| matches!(a, LegalAction::Engage { kind: EngagementKind::Shoot, .. })));

        // seekers never initiate shoot or collide
        assert_eq!(
            legal[&a_seeker],
            vec![LegalAction::Engage {
                kind: EngagementKind::NoOp,
                target: a_seeker
            }]
        );
    }

    #[test]
    fn guard_requires_an_active_threat() {
        let grid = OrbitGrid::new(2);
        let a_seeker = token(PlayerId::Alpha, TokenRole::Seeker, 0);
        let a_bludger = token(PlayerId::Alpha, TokenRole::Bludger, 1);
        let b_dead = token(PlayerId::Beta, TokenRole::Bludger, 1);
        let catalog = catalog_at(&[
            (a_seeker, 100.0, 0, 3),
            (a_bludger, 100.0, 1, 3),
            (b_dead, 0.0, 1, 3),
        ]);
        let adjacency = TokenAdjacency::build(&grid, &catalog).unwrap();
        let legal = legal_actions(
            TurnPhase::Engagement,
            &catalog,
            &grid,
            &adjacency,
            1,
            2,
            0.0,
        )
        .unwrap();

        assert!(!legal[&a_bludger]
            .iter()
            .any(|a| matches!(a, LegalAction::Engage { kind: EngagementKind::Guard, .. })));
    }

    #[test]
    fn drift_has_no_actions() {
        let grid = OrbitGrid::new(2);
        let a_seeker = token(PlayerId::Alpha, TokenRole::Seeker, 0);
        let catalog = catalog_at(&[(a_seeker, 100.0, 0, 3)]);
        let adjacency = TokenAdjacency::build(&grid, &catalog).unwrap();
        let legal =
            legal_actions(TurnPhase::Drift, &catalog, &grid, &adjacency, 1, 2, 0.0).unwrap();
        assert!(legal[&a_seeker].is_empty());
    }

    #[test]
    fn action_strings_match_the_wire_names() {
        assert_eq!(MovementKind::NoOp.to_string(), "noop");
        assert_eq!(MovementKind::RadialIn.to_string(), "radial_in");
        assert_eq!("radial_out".parse::<MovementKind>().unwrap(), MovementKind::RadialOut);
        assert_eq!(EngagementKind::Guard.to_string(), "guard");
        assert_eq!("shoot".parse::<EngagementKind>().unwrap(), EngagementKind::Shoot);
    }
}
