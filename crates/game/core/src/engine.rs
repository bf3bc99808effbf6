//! Phase state machine and resource accounting for one game.
//!
//! [`KothGame`] is the authoritative owner of all token and score state.
//! Each turn cycles MOVEMENT -> ENGAGEMENT -> DRIFT; every phase step
//! validates its input against the legal-action tables, applies fuel
//! constraints, mutates state, and recomputes the adjacency graph and legal
//! actions for the next phase. Randomness comes exclusively from the
//! injected, seedable RNG, so a fixed seed yields a fully deterministic
//! trajectory.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actions::{
    ActionMap, EngagementCmd, EngagementKind, LegalAction, LegalActionSet, MovementKind,
    SectorRelation, TokenAction, is_legal_action, legal_actions,
};
use crate::adjacency::TokenAdjacency;
use crate::config::{ConfigError, GameConfig, PerPlayer};
use crate::engagement::{EngagementGraph, EngagementGraphError, EngagementOutcome};
use crate::grid::{GridError, OrbitGrid, SectorId};
use crate::token::{PlayerId, TokenCatalog, TokenId, TokenRole, TokenState};

/// The three phases of one game turn.
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
pub enum TurnPhase {
    Movement,
    Engagement,
    Drift,
}

/// Scalar game state alongside the token catalog.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GameState {
    pub turn_count: u32,
    pub turn_phase: TurnPhase,
    pub game_done: bool,
    /// Each player's hill sector; both advance prograde every drift.
    pub goals: PerPlayer<SectorId>,
    pub score: PerPlayer<f64>,
    /// The fuel-derived portion of the score from the most recent update,
    /// kept separately so goal points accumulate while fuel points track
    /// current reserves.
    pub fuel_score: PerPlayer<f64>,
}

/// Result of one phase step.
///
/// Rewards are zero except on the terminating step, where they are
/// `(score_alpha - score_beta, score_beta - score_alpha)`. The outcome
/// sequence is non-empty only for engagement steps.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    pub rewards: PerPlayer<f64>,
    pub engagements: Vec<EngagementOutcome>,
}

impl StepOutcome {
    fn quiet() -> Self {
        Self {
            rewards: PerPlayer::splat(0.0),
            engagements: Vec::new(),
        }
    }
}

/// Input to one phase step; the variant must match the current phase.
#[derive(Clone, Copy, Debug)]
pub enum PhaseInput<'a> {
    Movement(&'a ActionMap),
    Engagement(&'a ActionMap),
    Drift,
}

impl PhaseInput<'_> {
    pub fn phase(&self) -> TurnPhase {
        match self {
            PhaseInput::Movement(_) => TurnPhase::Movement,
            PhaseInput::Engagement(_) => TurnPhase::Engagement,
            PhaseInput::Drift => TurnPhase::Drift,
        }
    }
}

/// Errors surfaced while stepping the engine.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Engagement(#[from] EngagementGraphError),

    #[error("game is already complete")]
    GameComplete,

    #[error("current phase is {expected}, got {actual} input")]
    PhaseInputMismatch {
        expected: TurnPhase,
        actual: TurnPhase,
    },

    #[error("unknown token {0}")]
    UnknownToken(TokenId),

    #[error("invalid engagement: {actor} cannot reach {target}")]
    TargetUnreachable { actor: TokenId, target: TokenId },

    #[error("{token} cannot move {kind} from its current ring")]
    BlockedMovement {
        token: TokenId,
        kind: MovementKind,
    },
}

/// The state and rules of one King-of-the-Hill game.
pub struct KothGame {
    config: GameConfig,
    grid: OrbitGrid,
    state: GameState,
    catalog: TokenCatalog,
    adjacency: TokenAdjacency,
    legal: LegalActionSet,
    rng: StdRng,
}

impl KothGame {
    /// Creates a game from an immutable configuration and an RNG seed.
    ///
    /// The RNG is scoped to this instance for the whole session; [`reset`]
    /// does not reseed it.
    ///
    /// [`reset`]: KothGame::reset
    pub fn new(config: GameConfig, seed: u64) -> Result<Self, EngineError> {
        config.validate()?;
        let grid = OrbitGrid::new(config.max_ring);
        let mut game = Self {
            grid,
            state: GameState {
                turn_count: 0,
                turn_phase: TurnPhase::Movement,
                game_done: false,
                goals: PerPlayer::splat(0),
                score: PerPlayer::splat(0.0),
                fuel_score: PerPlayer::splat(0.0),
            },
            config,
            catalog: TokenCatalog::new(),
            adjacency: TokenAdjacency::default(),
            legal: LegalActionSet::new(),
            rng: StdRng::seed_from_u64(seed),
        };
        game.reset()?;
        Ok(game)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn grid(&self) -> &OrbitGrid {
        &self.grid
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn catalog(&self) -> &TokenCatalog {
        &self.catalog
    }

    pub fn adjacency(&self) -> &TokenAdjacency {
        &self.adjacency
    }

    pub fn legal_actions(&self) -> &LegalActionSet {
        &self.legal
    }

    /// Rebuilds the initial board and zeroes the scalar state.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        let geo_len = self.grid.ring_len(self.config.geo_ring)?;
        let goals = PerPlayer::new(
            self.grid.sector_at(self.config.geo_ring, 0)?,
            self.grid.sector_at(self.config.geo_ring, geo_len / 2)?,
        );

        let mut catalog = TokenCatalog::new();
        let mut fielded = PerPlayer::splat(0u32);
        for player in PlayerId::ALL {
            let hill = goals[player];
            catalog.insert(
                TokenId::seeker(player),
                TokenState::new(
                    self.config.init_fuel[player].seeker,
                    self.config.init_ammo[player].seeker,
                    TokenRole::Seeker,
                    hill,
                ),
            );
            fielded[player] = 1;
            for &(offset, count) in &self.config.init_pattern[player] {
                let position = self.grid.relative_azimuth(hill, offset)?;
                for _ in 0..count {
                    catalog.insert(
                        TokenId::new(player, TokenRole::Bludger, fielded[player]),
                        TokenState::new(
                            self.config.init_fuel[player].bludger,
                            self.config.init_ammo[player].bludger,
                            TokenRole::Bludger,
                            position,
                        ),
                    );
                    fielded[player] += 1;
                }
            }
        }

        // pad the smaller side with permanently inactive ghost tokens so both
        // players hold equal-length token vectors
        let target = fielded.alpha.max(fielded.beta);
        for player in PlayerId::ALL {
            while fielded[player] < target {
                catalog.insert(
                    TokenId::new(player, TokenRole::Bludger, fielded[player]),
                    TokenState::new(0.0, 0, TokenRole::Bludger, 0),
                );
                fielded[player] += 1;
            }
        }

        self.catalog = catalog;
        self.state = GameState {
            turn_count: 0,
            turn_phase: TurnPhase::Movement,
            game_done: false,
            goals,
            score: PerPlayer::splat(0.0),
            fuel_score: PerPlayer::splat(0.0),
        };
        self.refresh_derived()?;

        for player in PlayerId::ALL {
            let fuel_points = self.fuel_points(player);
            self.state.score[player] = fuel_points;
            self.state.fuel_score[player] = fuel_points;
        }
        Ok(())
    }

    /// Applies one phase step. The input variant must match the current
    /// phase; a completed game accepts no further transitions.
    pub fn step(&mut self, input: PhaseInput<'_>) -> Result<StepOutcome, EngineError> {
        if self.state.game_done {
            return Err(EngineError::GameComplete);
        }
        match (self.state.turn_phase, input) {
            (TurnPhase::Movement, PhaseInput::Movement(actions)) => self.step_movement(actions),
            (TurnPhase::Engagement, PhaseInput::Engagement(actions)) => {
                self.step_engagement(actions)
            }
            (TurnPhase::Drift, PhaseInput::Drift) => self.step_drift(),
            (expected, input) => Err(EngineError::PhaseInputMismatch {
                expected,
                actual: input.phase(),
            }),
        }
    }

    /// Success probability for a declared engagement, as clients see it:
    /// NoOp is always 1; unreachable targets are 0; otherwise the acting
    /// player's in-sector or adjacent-sector table applies.
    pub fn engagement_probability(
        &self,
        actor: TokenId,
        target: TokenId,
        kind: EngagementKind,
    ) -> f64 {
        if kind == EngagementKind::NoOp {
            return 1.0;
        }
        if !self.adjacency.has_edge(actor, target) {
            return 0.0;
        }
        let (Some(actor_state), Some(target_state)) =
            (self.catalog.get(&actor), self.catalog.get(&target))
        else {
            return 0.0;
        };
        let relation = if actor_state.position == target_state.position {
            SectorRelation::InSector
        } else {
            SectorRelation::AdjacentSector
        };
        self.config.engage_probs[actor.player].probability(relation, kind)
    }

    /// A random-yet-legal action for every token, with probabilities
    /// attached to engagements. `None` during drift.
    pub fn random_actions(&mut self) -> Option<ActionMap> {
        if self.state.turn_phase == TurnPhase::Drift {
            return None;
        }
        let legal = self.legal.clone();
        let mut actions = ActionMap::new();
        for (&token, options) in &legal {
            let pick = options[self.rng.random_range(0..options.len())];
            actions.insert(token, self.instantiate(token, pick));
        }
        Some(actions)
    }

    /// The all-NoOp action map for the current phase. `None` during drift.
    pub fn noop_actions(&self) -> Option<ActionMap> {
        match self.state.turn_phase {
            TurnPhase::Movement => Some(
                self.catalog
                    .keys()
                    .map(|&token| (token, TokenAction::Move(MovementKind::NoOp)))
                    .collect(),
            ),
            TurnPhase::Engagement => Some(
                self.catalog
                    .keys()
                    .map(|&token| (token, TokenAction::Engage(EngagementCmd::noop(token))))
                    .collect(),
            ),
            TurnPhase::Drift => None,
        }
    }

    fn instantiate(&self, actor: TokenId, template: LegalAction) -> TokenAction {
        match template {
            LegalAction::Move(kind) => TokenAction::Move(kind),
            LegalAction::Engage { kind, target } => TokenAction::Engage(EngagementCmd {
                kind,
                target,
                prob: self.engagement_probability(actor, target, kind),
            }),
        }
    }

    fn step_movement(&mut self, actions: &ActionMap) -> Result<StepOutcome, EngineError> {
        if !self.enforce_legal(actions) {
            return Ok(self.terminate());
        }
        let constrained = self.apply_fuel_constraints(actions)?;
        self.move_tokens(&constrained)?;
        self.advance_phase(TurnPhase::Engagement)?;
        Ok(StepOutcome::quiet())
    }

    fn step_engagement(&mut self, actions: &ActionMap) -> Result<StepOutcome, EngineError> {
        if !self.enforce_legal(actions) {
            return Ok(self.terminate());
        }
        let constrained = self.apply_fuel_constraints(actions)?;

        let mut declarations = BTreeMap::new();
        for (&token, action) in &constrained {
            if let TokenAction::Engage(cmd) = action {
                declarations.insert(token, *cmd);
            }
        }

        let mut graph = EngagementGraph::new(&declarations)?;
        let inactive: Vec<TokenId> = self
            .catalog
            .iter()
            .filter(|(_, state)| !state.is_active(self.config.min_fuel))
            .map(|(&token, _)| token)
            .collect();
        graph.prune_tokens(inactive.iter());

        let outcomes = graph.resolve(&mut self.rng)?;
        self.enact(&outcomes)?;
        self.advance_phase(TurnPhase::Drift)?;
        Ok(StepOutcome {
            rewards: PerPlayer::splat(0.0),
            engagements: outcomes,
        })
    }

    fn step_drift(&mut self) -> Result<StepOutcome, EngineError> {
        // fuel points replace last drift's fuel component; goal points are
        // cumulative
        let fuel_points = PerPlayer::new(
            self.fuel_points(PlayerId::Alpha),
            self.fuel_points(PlayerId::Beta),
        );
        let goal_points = self.goal_points()?;
        for player in PlayerId::ALL {
            let cumulative_goal =
                self.state.score[player] - self.state.fuel_score[player] + goal_points[player];
            self.state.score[player] = cumulative_goal + fuel_points[player];
            self.state.fuel_score[player] = fuel_points[player];
        }

        // station-keeping cost and one sector of prograde drift for
        // everything on the board, hills included
        for (token, state) in self.catalog.iter_mut() {
            let usage = &self.config.fuel_usage[token.player];
            state.satellite.fuel =
                (state.satellite.fuel - usage.drift).max(self.config.min_fuel);
            state.position = self.grid.prograde(state.position)?;
        }
        for player in PlayerId::ALL {
            self.state.goals[player] = self.grid.prograde(self.state.goals[player])?;
        }
        self.state.turn_count += 1;

        if self.is_terminal() {
            // tokens have drifted, so the derived graphs must still track
            // the final position vector
            self.refresh_derived()?;
            return Ok(self.terminate());
        }
        self.advance_phase(TurnPhase::Movement)?;
        Ok(StepOutcome::quiet())
    }

    /// Validates every declared action; offenders get the punitive score.
    /// Returns false if the game must terminate.
    fn enforce_legal(&mut self, actions: &ActionMap) -> bool {
        let mut illegal = PerPlayer::splat(false);
        for (&token, action) in actions {
            if !is_legal_action(token, action, &self.legal) {
                illegal[token.player] = true;
            }
        }
        if !illegal.alpha && !illegal.beta {
            return true;
        }
        for player in PlayerId::ALL {
            if illegal[player] {
                self.state.score[player] = self.config.illegal_action_score;
            }
        }
        false
    }

    /// Deducts fuel per action; actions a token cannot afford are coerced to
    /// NoOp without deducting anything.
    fn apply_fuel_constraints(&mut self, actions: &ActionMap) -> Result<ActionMap, EngineError> {
        let mut constrained = ActionMap::new();
        for (&token, action) in actions {
            let usage = self.config.fuel_usage[token.player];
            let (cost, fallback) = match action {
                TokenAction::Move(kind) => {
                    (usage.movement(*kind), TokenAction::Move(MovementKind::NoOp))
                }
                TokenAction::Engage(cmd) if cmd.kind == EngagementKind::NoOp => {
                    (usage.noop, TokenAction::Engage(EngagementCmd::noop(token)))
                }
                TokenAction::Engage(cmd) => {
                    let relation = self.sector_relation(token, cmd.target)?;
                    (
                        usage.engagement(relation, cmd.kind),
                        TokenAction::Engage(EngagementCmd::noop(token)),
                    )
                }
            };

            let state = self
                .catalog
                .get_mut(&token)
                .ok_or(EngineError::UnknownToken(token))?;
            let remaining = state.satellite.fuel - cost;
            if remaining < self.config.min_fuel {
                constrained.insert(token, fallback);
            } else {
                state.satellite.fuel = remaining;
                constrained.insert(token, *action);
            }
        }
        Ok(constrained)
    }

    fn sector_relation(
        &self,
        actor: TokenId,
        target: TokenId,
    ) -> Result<SectorRelation, EngineError> {
        let actor_state = self
            .catalog
            .get(&actor)
            .ok_or(EngineError::UnknownToken(actor))?;
        let target_state = self
            .catalog
            .get(&target)
            .ok_or(EngineError::UnknownToken(target))?;
        if actor_state.position == target_state.position {
            Ok(SectorRelation::InSector)
        } else if self.adjacency.has_edge(actor, target) {
            Ok(SectorRelation::AdjacentSector)
        } else {
            Err(EngineError::TargetUnreachable { actor, target })
        }
    }

    fn move_tokens(&mut self, moves: &ActionMap) -> Result<(), EngineError> {
        for (&token, action) in moves {
            let TokenAction::Move(kind) = action else {
                continue;
            };
            let position = self
                .catalog
                .get(&token)
                .ok_or(EngineError::UnknownToken(token))?
                .position;
            let destination = match kind {
                MovementKind::NoOp => position,
                MovementKind::Prograde => self.grid.prograde(position)?,
                MovementKind::Retrograde => self.grid.retrograde(position)?,
                MovementKind::RadialIn => self.grid.radial_in(position)?.ok_or(
                    EngineError::BlockedMovement {
                        token,
                        kind: *kind,
                    },
                )?,
                MovementKind::RadialOut => self.grid.radial_out(position)?.ok_or(
                    EngineError::BlockedMovement {
                        token,
                        kind: *kind,
                    },
                )?,
            };
            if let Some(state) = self.catalog.get_mut(&token) {
                state.position = destination;
            }
        }
        Ok(())
    }

    /// Applies the resolved outcome sequence to token state, in order.
    fn enact(&mut self, outcomes: &[EngagementOutcome]) -> Result<(), EngineError> {
        for outcome in outcomes {
            match outcome.kind {
                EngagementKind::Shoot => {
                    let attacker = outcome
                        .attacker
                        .ok_or(EngineError::UnknownToken(outcome.target))?;
                    // the shot is expended whether or not it lands
                    let state = self.token_mut(attacker)?;
                    state.satellite.ammo = state.satellite.ammo.saturating_sub(1);
                    if outcome.success {
                        self.token_mut(outcome.target)?.satellite.fuel = self.config.min_fuel;
                    }
                }
                EngagementKind::Collide => {
                    let attacker = outcome
                        .attacker
                        .ok_or(EngineError::UnknownToken(outcome.target))?;
                    // the attacker commits into the target's sector either way
                    let destination = self.token_mut(outcome.target)?.position;
                    self.token_mut(attacker)?.position = destination;
                    if outcome.success {
                        self.token_mut(attacker)?.satellite.fuel = self.config.min_fuel;
                        self.token_mut(outcome.target)?.satellite.fuel = self.config.min_fuel;
                    }
                }
                EngagementKind::Guard => {
                    if outcome.success {
                        let guardian = outcome
                            .guardian
                            .ok_or(EngineError::UnknownToken(outcome.target))?;
                        let destination = self.token_mut(outcome.target)?.position;
                        self.token_mut(guardian)?.position = destination;
                    }
                }
                EngagementKind::NoOp => {}
            }
        }
        Ok(())
    }

    fn token_mut(&mut self, token: TokenId) -> Result<&mut TokenState, EngineError> {
        self.catalog
            .get_mut(&token)
            .ok_or(EngineError::UnknownToken(token))
    }

    /// Floor of the fuel-to-points conversion over a player's active tokens.
    fn fuel_points(&self, player: PlayerId) -> f64 {
        let factor = &self.config.fuel_points_factor[player];
        self.catalog
            .iter()
            .filter(|(token, state)| {
                token.player == player && state.is_active(self.config.min_fuel)
            })
            .map(|(_, state)| state.satellite.fuel * factor[state.role])
            .sum::<f64>()
            .floor()
    }

    /// Goal points earned this drift by each player's Seekers.
    fn goal_points(&self) -> Result<PerPlayer<f64>, EngineError> {
        let mut points = PerPlayer::splat(0.0);
        for player in PlayerId::ALL {
            let goal = self.state.goals[player];
            let goal_adjacent = self.grid.adjacent_sectors(goal)?;
            for (token, state) in &self.catalog {
                if token.player != player || token.role != TokenRole::Seeker {
                    continue;
                }
                if state.position == goal {
                    points[player] += self.config.in_goal_points[player];
                } else if goal_adjacent.contains(&state.position) {
                    points[player] += self.config.adj_goal_points[player];
                }
            }
        }
        Ok(points)
    }

    fn is_terminal(&self) -> bool {
        for player in PlayerId::ALL {
            let seeker_inactive = self
                .catalog
                .get(&TokenId::seeker(player))
                .is_none_or(|s| !s.is_active(self.config.min_fuel));
            if seeker_inactive || self.state.score[player] >= self.config.win_score[player] {
                return true;
            }
        }
        self.state.turn_count >= self.config.max_turns
    }

    /// Marks the game done and produces the zero-sum terminal rewards.
    fn terminate(&mut self) -> StepOutcome {
        self.state.game_done = true;
        let diff = self.state.score.alpha - self.state.score.beta;
        StepOutcome {
            rewards: PerPlayer::new(diff, -diff),
            engagements: Vec::new(),
        }
    }

    fn advance_phase(&mut self, phase: TurnPhase) -> Result<(), EngineError> {
        self.state.turn_phase = phase;
        self.refresh_derived()
    }

    fn refresh_derived(&mut self) -> Result<(), EngineError> {
        self.adjacency = TokenAdjacency::build(&self.grid, &self.catalog)?;
        self.legal = legal_actions(
            self.state.turn_phase,
            &self.catalog,
            &self.grid,
            &self.adjacency,
            self.config.min_ring,
            self.config.max_ring,
            self.config.min_fuel,
        )?;
        Ok(())
    }
}
