//! M-versus-N engagement resolution as a short-lived directed graph.
//!
//! The graph is built from one round's declarations, resolved in three
//! ordered phases (guards, shoots, collides), and discarded. Nodes live in an
//! arena vector; edges reference nodes by index and are removed by tombstone
//! bit, so reroutes and simultaneous removals need no ownership gymnastics.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::actions::{EngagementCmd, EngagementKind};
use crate::token::TokenId;

/// One evaluated engagement, in resolution order.
///
/// `attacker` is absent for a trivial guard (no incident attacks);
/// `guardian` is absent for shoot and collide outcomes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngagementOutcome {
    pub kind: EngagementKind,
    pub attacker: Option<TokenId>,
    pub target: TokenId,
    pub guardian: Option<TokenId>,
    pub prob: f64,
    pub success: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngagementGraphError {
    #[error("{kind} declared by {actor} must target an opponent, got {target}")]
    TargetNotOpponent {
        actor: TokenId,
        kind: EngagementKind,
        target: TokenId,
    },

    #[error("guard declared by {actor} must target an ally other than itself, got {target}")]
    InvalidGuardTarget { actor: TokenId, target: TokenId },

    #[error("noop declared by {actor} must target itself, got {target}")]
    NoOpTargetNotSelf { actor: TokenId, target: TokenId },

    #[error("engagement resolution left {remaining} edges unresolved")]
    UnresolvedEdges { remaining: usize },
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    src: usize,
    dst: usize,
    kind: EngagementKind,
    prob: f64,
    removed: bool,
}

/// Directed graph of one round's engagement declarations.
pub struct EngagementGraph {
    nodes: Vec<TokenId>,
    index: BTreeMap<TokenId, usize>,
    alive: Vec<bool>,
    edges: Vec<Edge>,
}

impl EngagementGraph {
    /// Builds the graph: one node per participating token, one edge per
    /// non-NoOp declaration.
    pub fn new(
        declarations: &BTreeMap<TokenId, EngagementCmd>,
    ) -> Result<Self, EngagementGraphError> {
        let mut graph = Self {
            nodes: Vec::new(),
            index: BTreeMap::new(),
            alive: Vec::new(),
            edges: Vec::new(),
        };

        for &actor in declarations.keys() {
            graph.intern(actor);
        }

        for (&actor, cmd) in declarations {
            match cmd.kind {
                EngagementKind::NoOp => {
                    if cmd.target != actor {
                        return Err(EngagementGraphError::NoOpTargetNotSelf {
                            actor,
                            target: cmd.target,
                        });
                    }
                }
                EngagementKind::Shoot | EngagementKind::Collide => {
                    if cmd.target.player == actor.player {
                        return Err(EngagementGraphError::TargetNotOpponent {
                            actor,
                            kind: cmd.kind,
                            target: cmd.target,
                        });
                    }
                    graph.add_edge(actor, cmd.target, cmd.kind, cmd.prob);
                }
                EngagementKind::Guard => {
                    if cmd.target.player != actor.player || cmd.target == actor {
                        return Err(EngagementGraphError::InvalidGuardTarget {
                            actor,
                            target: cmd.target,
                        });
                    }
                    graph.add_edge(actor, cmd.target, cmd.kind, cmd.prob);
                }
            }
        }

        Ok(graph)
    }

    fn intern(&mut self, token: TokenId) -> usize {
        if let Some(&idx) = self.index.get(&token) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(token);
        self.alive.push(true);
        self.index.insert(token, idx);
        idx
    }

    fn add_edge(&mut self, src: TokenId, dst: TokenId, kind: EngagementKind, prob: f64) {
        let src = self.intern(src);
        let dst = self.intern(dst);
        self.edges.push(Edge {
            src,
            dst,
            kind,
            prob,
            removed: false,
        });
    }

    /// Tombstones a node and every edge incident to it.
    fn remove_node(&mut self, idx: usize) {
        self.alive[idx] = false;
        for edge in &mut self.edges {
            if !edge.removed && (edge.src == idx || edge.dst == idx) {
                edge.removed = true;
            }
        }
    }

    /// Removes tokens that may neither engage nor be targeted (ghosts and
    /// previously destroyed tokens), together with all their edges.
    pub fn prune_tokens<'a>(&mut self, tokens: impl IntoIterator<Item = &'a TokenId>) {
        for token in tokens {
            if let Some(&idx) = self.index.get(token) {
                self.remove_node(idx);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| !e.removed).count()
    }

    fn live_edges_of_kind(&self, kind: EngagementKind) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.removed && e.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Resolves the whole graph, consuming every edge.
    ///
    /// Returns the authoritative ordered record of what happened.
    pub fn resolve<R: Rng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<EngagementOutcome>, EngagementGraphError> {
        let mut outcomes = self.resolve_guards(rng);
        outcomes.extend(self.resolve_shoots(rng));
        outcomes.extend(self.resolve_collides(rng));

        let remaining = self.edge_count();
        if remaining != 0 {
            return Err(EngagementGraphError::UnresolvedEdges { remaining });
        }
        Ok(outcomes)
    }

    /// Evaluates guard edges, rerouting intercepted attacks to the guardian.
    ///
    /// The k-th incident attack (random order) is intercepted with
    /// probability `p * 0.5^k`. An intercepted attack keeps its kind and
    /// probability but now targets the guardian.
    fn resolve_guards<R: Rng>(&mut self, rng: &mut R) -> Vec<EngagementOutcome> {
        let mut outcomes = Vec::new();

        let mut guard_edges = self.live_edges_of_kind(EngagementKind::Guard);
        guard_edges.shuffle(rng);

        for guard_idx in guard_edges {
            if self.edges[guard_idx].removed {
                continue;
            }
            let guardian = self.edges[guard_idx].src;
            let guarded = self.edges[guard_idx].dst;
            let guard_prob = self.edges[guard_idx].prob;

            // the guard edge is consumed by evaluation regardless of success
            self.edges[guard_idx].removed = true;

            let mut attacks: Vec<usize> = self
                .edges
                .iter()
                .enumerate()
                .filter(|(_, e)| {
                    !e.removed
                        && e.dst == guarded
                        && matches!(e.kind, EngagementKind::Shoot | EngagementKind::Collide)
                })
                .map(|(i, _)| i)
                .collect();

            if attacks.is_empty() {
                outcomes.push(EngagementOutcome {
                    kind: EngagementKind::Guard,
                    attacker: None,
                    target: self.nodes[guarded],
                    guardian: Some(self.nodes[guardian]),
                    prob: guard_prob,
                    success: false,
                });
                continue;
            }

            attacks.shuffle(rng);
            for (evaluated, attack_idx) in attacks.into_iter().enumerate() {
                let decayed = guard_prob * 0.5_f64.powi(evaluated as i32);
                let success = rng.random::<f64>() < decayed;
                let attacker = self.edges[attack_idx].src;
                if success {
                    let kind = self.edges[attack_idx].kind;
                    let prob = self.edges[attack_idx].prob;
                    self.edges[attack_idx].removed = true;
                    self.edges.push(Edge {
                        src: attacker,
                        dst: guardian,
                        kind,
                        prob,
                        removed: false,
                    });
                }
                outcomes.push(EngagementOutcome {
                    kind: EngagementKind::Guard,
                    attacker: Some(self.nodes[attacker]),
                    target: self.nodes[guarded],
                    guardian: Some(self.nodes[guardian]),
                    prob: decayed,
                    success,
                });
            }
        }

        outcomes
    }

    /// Evaluates all shoot edges, then removes every hit target at once so
    /// mutual shoot-kills resolve consistently.
    fn resolve_shoots<R: Rng>(&mut self, rng: &mut R) -> Vec<EngagementOutcome> {
        let mut outcomes = Vec::new();

        let mut shoot_edges = self.live_edges_of_kind(EngagementKind::Shoot);
        shoot_edges.shuffle(rng);

        let mut hit: BTreeSet<usize> = BTreeSet::new();
        for shoot_idx in shoot_edges {
            let edge = self.edges[shoot_idx];
            self.edges[shoot_idx].removed = true;

            let success = rng.random::<f64>() < edge.prob;
            if success {
                hit.insert(edge.dst);
            }
            outcomes.push(EngagementOutcome {
                kind: EngagementKind::Shoot,
                attacker: Some(self.nodes[edge.src]),
                target: self.nodes[edge.dst],
                guardian: None,
                prob: edge.prob,
                success,
            });
        }

        for node in hit {
            self.remove_node(node);
        }

        outcomes
    }

    /// Evaluates collide edges one at a time in random order; a successful
    /// collision destroys both endpoints and their remaining edges.
    fn resolve_collides<R: Rng>(&mut self, rng: &mut R) -> Vec<EngagementOutcome> {
        let mut outcomes = Vec::new();

        loop {
            let live = self.live_edges_of_kind(EngagementKind::Collide);
            if live.is_empty() {
                break;
            }
            let collide_idx = live[rng.random_range(0..live.len())];
            let edge = self.edges[collide_idx];
            self.edges[collide_idx].removed = true;

            let success = rng.random::<f64>() < edge.prob;
            if success {
                self.remove_node(edge.src);
                self.remove_node(edge.dst);
            }
            outcomes.push(EngagementOutcome {
                kind: EngagementKind::Collide,
                attacker: Some(self.nodes[edge.src]),
                target: self.nodes[edge.dst],
                guardian: None,
                prob: edge.prob,
                success,
            });
        }

        outcomes
    }
}
