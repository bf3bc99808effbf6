//! Token-level adjacency graph.
//!
//! A directed graph with one node per token and an edge `u -> v` iff `v`'s
//! position is `u`'s sector or one of its adjacent sectors. Rebuilt on every
//! phase transition; it is a pure function of the token position vector.

use std::collections::{BTreeMap, BTreeSet};

use crate::grid::{GridError, OrbitGrid};
use crate::token::{TokenCatalog, TokenId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenAdjacency {
    edges: BTreeMap<TokenId, BTreeSet<TokenId>>,
}

impl TokenAdjacency {
    /// Builds the adjacency graph from current token positions.
    pub fn build(grid: &OrbitGrid, catalog: &TokenCatalog) -> Result<Self, GridError> {
        let mut edges: BTreeMap<TokenId, BTreeSet<TokenId>> = BTreeMap::new();

        for (&token, state) in catalog {
            let mut reach = grid.adjacent_sectors(state.position)?;
            reach.insert(state.position);

            let neighbors = catalog
                .iter()
                .filter(|&(&other, other_state)| {
                    other != token && reach.contains(&other_state.position)
                })
                .map(|(&other, _)| other)
                .collect();
            edges.insert(token, neighbors);
        }

        Ok(Self { edges })
    }

    pub fn has_edge(&self, from: TokenId, to: TokenId) -> bool {
        self.edges.get(&from).is_some_and(|set| set.contains(&to))
    }

    pub fn neighbors(&self, token: TokenId) -> impl Iterator<Item = &TokenId> {
        self.edges.get(&token).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{PlayerId, TokenRole, TokenState};

    fn token(player: PlayerId, index: u32) -> TokenId {
        let role = if index == 0 {
            TokenRole::Seeker
        } else {
            TokenRole::Bludger
        };
        TokenId::new(player, role, index)
    }

    #[test]
    fn edges_follow_sector_adjacency() {
        let grid = OrbitGrid::new(2);
        let a0 = token(PlayerId::Alpha, 0);
        let a1 = token(PlayerId::Alpha, 1);
        let b0 = token(PlayerId::Beta, 0);
        let b1 = token(PlayerId::Beta, 1);
        // sectors: 3 and 4 adjacent, 3 and 5 not; co-located tokens adjacent
        let catalog: TokenCatalog = [
            (a0, TokenState::new(100.0, 0, TokenRole::Seeker, 3)),
            (a1, TokenState::new(100.0, 1, TokenRole::Bludger, 3)),
            (b0, TokenState::new(100.0, 0, TokenRole::Seeker, 5)),
            (b1, TokenState::new(100.0, 1, TokenRole::Bludger, 4)),
        ]
        .into();
        let adjacency = TokenAdjacency::build(&grid, &catalog).unwrap();

        assert!(adjacency.has_edge(a0, a1));
        assert!(adjacency.has_edge(a1, a0));
        assert!(adjacency.has_edge(a0, b1));
        assert!(!adjacency.has_edge(a0, b0));
        assert!(!adjacency.has_edge(a0, a0));
        assert_eq!(
            adjacency.neighbors(a0).copied().collect::<Vec<_>>(),
            vec![a1, b1]
        );
    }

    #[test]
    fn rebuild_is_a_pure_function_of_positions() {
        let grid = OrbitGrid::new(3);
        let a0 = token(PlayerId::Alpha, 0);
        let b0 = token(PlayerId::Beta, 0);
        let mut catalog: TokenCatalog = [
            (a0, TokenState::new(100.0, 0, TokenRole::Seeker, 7)),
            (b0, TokenState::new(100.0, 0, TokenRole::Seeker, 11)),
        ]
        .into();

        let before = TokenAdjacency::build(&grid, &catalog).unwrap();
        assert_eq!(before, TokenAdjacency::build(&grid, &catalog).unwrap());

        // fuel changes do not affect adjacency, position changes do
        catalog.get_mut(&a0).unwrap().satellite.fuel = 0.0;
        assert_eq!(before, TokenAdjacency::build(&grid, &catalog).unwrap());

        catalog.get_mut(&b0).unwrap().position = 8;
        let moved = TokenAdjacency::build(&grid, &catalog).unwrap();
        assert_ne!(before, moved);
        assert!(moved.has_edge(a0, b0));
    }
}
