//! Full-game scenarios exercising the engine across phases.

use koth_core::{
    EngagementCmd, EngagementKind, GameConfig, KindProbs, KothGame, MovementKind, PerPlayer,
    PhaseInput, PlayerId, TokenAction, TokenAdjacency, TokenId, TokenRole, TurnPhase,
};

fn certain_probs(config: &mut GameConfig) {
    let sure = KindProbs {
        shoot: 1.0,
        collide: 1.0,
        guard: 1.0,
    };
    for player in PlayerId::ALL {
        config.engage_probs[player].in_sector = sure;
        config.engage_probs[player].adjacent_sector = sure;
    }
}

/// One-ring board with a Seeker and one Bludger per player, hills 180 apart.
fn tiny_config() -> GameConfig {
    let mut config = GameConfig::default();
    config.max_ring = 1;
    config.min_ring = 1;
    config.geo_ring = 1;
    config.init_pattern = PerPlayer::splat(vec![(0, 1)]);
    config.win_score = PerPlayer::splat(100_000.0);
    config
}

fn seeker(player: PlayerId) -> TokenId {
    TokenId::seeker(player)
}

fn bludger(player: PlayerId, index: u32) -> TokenId {
    TokenId::new(player, TokenRole::Bludger, index)
}

#[test]
fn initial_board_matches_default_pattern() {
    // S2: max_ring 5, min_ring 1, geo_ring 4, mirrored pattern, hills 180
    // degrees apart in geo
    let game = KothGame::new(GameConfig::default(), 0).unwrap();
    let state = game.state();

    assert_eq!(state.turn_phase, TurnPhase::Movement);
    assert_eq!(state.turn_count, 0);
    assert_eq!(state.goals.alpha, 15);
    assert_eq!(state.goals.beta, 23);
    assert_eq!(game.catalog().len(), 22);

    // one Seeker per player, placed on its hill
    assert_eq!(game.catalog()[&seeker(PlayerId::Alpha)].position, 15);
    assert_eq!(game.catalog()[&seeker(PlayerId::Beta)].position, 23);

    // ten Bludgers per player at pattern offsets from the hill
    let alpha_positions: Vec<u32> = (1..=10)
        .map(|i| game.catalog()[&bludger(PlayerId::Alpha, i)].position)
        .collect();
    assert_eq!(alpha_positions, [29, 30, 30, 30, 15, 15, 16, 16, 16, 17]);
    let beta_positions: Vec<u32> = (1..=10)
        .map(|i| game.catalog()[&bludger(PlayerId::Beta, i)].position)
        .collect();
    assert_eq!(beta_positions, [21, 22, 22, 22, 23, 23, 24, 24, 24, 25]);

    // initial score is seeded from fuel points
    let expected = (100.0 + 10.0 * 100.0 * 0.1_f64).floor();
    assert_eq!(state.score.alpha, expected);
    assert_eq!(state.fuel_score.beta, expected);
}

#[test]
fn movement_step_applies_maneuvers_and_advances_phase() {
    let mut game = KothGame::new(GameConfig::default(), 0).unwrap();
    let alpha_seeker = seeker(PlayerId::Alpha);

    let mut actions = game.noop_actions().unwrap();
    actions.insert(alpha_seeker, TokenAction::Move(MovementKind::RadialOut));
    let outcome = game.step(PhaseInput::Movement(&actions)).unwrap();

    assert_eq!(outcome.rewards, PerPlayer::splat(0.0));
    assert_eq!(game.state().turn_phase, TurnPhase::Engagement);
    // hill 15 sits at geo azimuth 0; its outer child is sector 31
    assert_eq!(game.catalog()[&alpha_seeker].position, 31);
    assert_eq!(game.catalog()[&alpha_seeker].satellite.fuel, 99.0);

    // the adjacency graph tracks the new position vector exactly
    let rebuilt = TokenAdjacency::build(game.grid(), game.catalog()).unwrap();
    assert_eq!(&rebuilt, game.adjacency());
}

#[test]
fn guard_reroutes_certain_shot_onto_guardian() {
    // S3: a certain shot at the guarded Seeker is intercepted by a certain
    // guard and lands on the guardian instead
    let mut config = tiny_config();
    certain_probs(&mut config);
    let mut game = KothGame::new(config, 0).unwrap();

    let actions = game.noop_actions().unwrap();
    game.step(PhaseInput::Movement(&actions)).unwrap();

    let mut actions = game.noop_actions().unwrap();
    actions.insert(
        bludger(PlayerId::Alpha, 1),
        TokenAction::Engage(EngagementCmd {
            kind: EngagementKind::Shoot,
            target: seeker(PlayerId::Beta),
            prob: game.engagement_probability(
                bludger(PlayerId::Alpha, 1),
                seeker(PlayerId::Beta),
                EngagementKind::Shoot,
            ),
        }),
    );
    actions.insert(
        bludger(PlayerId::Beta, 1),
        TokenAction::Engage(EngagementCmd {
            kind: EngagementKind::Guard,
            target: seeker(PlayerId::Beta),
            prob: game.engagement_probability(
                bludger(PlayerId::Beta, 1),
                seeker(PlayerId::Beta),
                EngagementKind::Guard,
            ),
        }),
    );

    let outcome = game.step(PhaseInput::Engagement(&actions)).unwrap();
    let sequence = &outcome.engagements;

    assert_eq!(sequence.len(), 2);
    assert_eq!(sequence[0].kind, EngagementKind::Guard);
    assert_eq!(sequence[0].attacker, Some(bludger(PlayerId::Alpha, 1)));
    assert_eq!(sequence[0].target, seeker(PlayerId::Beta));
    assert_eq!(sequence[0].guardian, Some(bludger(PlayerId::Beta, 1)));
    assert_eq!(sequence[0].prob, 1.0);
    assert!(sequence[0].success);

    assert_eq!(sequence[1].kind, EngagementKind::Shoot);
    assert_eq!(sequence[1].target, bludger(PlayerId::Beta, 1));
    assert!(sequence[1].success);

    // the shot is expended, the guardian dies in the Seeker's place
    assert_eq!(game.catalog()[&bludger(PlayerId::Alpha, 1)].satellite.ammo, 0);
    assert_eq!(game.catalog()[&bludger(PlayerId::Beta, 1)].satellite.fuel, 0.0);
    assert_eq!(game.catalog()[&seeker(PlayerId::Beta)].satellite.fuel, 100.0);
    assert_eq!(game.state().turn_phase, TurnPhase::Drift);
}

#[test]
fn drift_scores_goals_and_advances_hills() {
    // S4: both Seekers sit on their hills through a full idle turn
    let mut game = KothGame::new(GameConfig::default(), 0).unwrap();

    let actions = game.noop_actions().unwrap();
    game.step(PhaseInput::Movement(&actions)).unwrap();
    let actions = game.noop_actions().unwrap();
    game.step(PhaseInput::Engagement(&actions)).unwrap();
    let outcome = game.step(PhaseInput::Drift).unwrap();

    let state = game.state();
    let fuel_points = (100.0 + 10.0 * 100.0 * 0.1_f64).floor();
    let expected = GameConfig::DEFAULT_IN_GOAL_POINTS + fuel_points;
    assert_eq!(state.score.alpha, expected);
    assert_eq!(state.score.beta, expected);
    assert_eq!(state.fuel_score.alpha, fuel_points);

    // hills and tokens drift one sector prograde together
    assert_eq!(state.goals.alpha, 16);
    assert_eq!(state.goals.beta, 24);
    assert_eq!(game.catalog()[&seeker(PlayerId::Alpha)].position, 16);
    assert_eq!(state.turn_count, 1);

    // the default win threshold is crossed immediately, so the turn is
    // terminal with symmetric scores and zero reward
    assert!(state.game_done);
    assert_eq!(outcome.rewards, PerPlayer::splat(0.0));

    // station-keeping fuel was deducted after scoring
    assert_eq!(game.catalog()[&seeker(PlayerId::Alpha)].satellite.fuel, 99.0);
}

#[test]
fn illegal_action_terminates_with_punitive_score() {
    // S5: radial_in from the innermost playable ring is not a legal action
    let mut config = tiny_config();
    config.max_ring = 2;
    let mut game = KothGame::new(config, 0).unwrap();
    let beta_score = game.state().score.beta;

    let mut actions = game.noop_actions().unwrap();
    actions.insert(
        seeker(PlayerId::Alpha),
        TokenAction::Move(MovementKind::RadialIn),
    );
    let outcome = game.step(PhaseInput::Movement(&actions)).unwrap();

    let state = game.state();
    assert!(state.game_done);
    assert_eq!(state.score.alpha, GameConfig::DEFAULT_ILLEGAL_ACTION_SCORE);
    assert_eq!(state.score.beta, beta_score);
    let diff = state.score.alpha - state.score.beta;
    assert_eq!(outcome.rewards, PerPlayer::new(diff, -diff));
}

#[test]
fn both_players_can_be_penalized_at_once() {
    let mut config = tiny_config();
    config.max_ring = 2;
    let mut game = KothGame::new(config, 0).unwrap();

    let mut actions = game.noop_actions().unwrap();
    actions.insert(
        seeker(PlayerId::Alpha),
        TokenAction::Move(MovementKind::RadialIn),
    );
    actions.insert(
        seeker(PlayerId::Beta),
        TokenAction::Move(MovementKind::RadialIn),
    );
    let outcome = game.step(PhaseInput::Movement(&actions)).unwrap();

    assert!(game.state().game_done);
    assert_eq!(
        game.state().score.alpha,
        GameConfig::DEFAULT_ILLEGAL_ACTION_SCORE
    );
    assert_eq!(
        game.state().score.beta,
        GameConfig::DEFAULT_ILLEGAL_ACTION_SCORE
    );
    assert_eq!(outcome.rewards, PerPlayer::splat(0.0));
}

#[test]
fn ghost_padding_equalizes_asymmetric_fleets() {
    let mut config = GameConfig::default();
    config.init_pattern = PerPlayer::new(vec![(0, 2)], vec![]);
    let game = KothGame::new(config, 0).unwrap();

    // beta fields only a Seeker, so two ghosts pad its vector
    assert_eq!(game.catalog().len(), 6);
    for index in 1..=2 {
        let ghost = &game.catalog()[&bludger(PlayerId::Beta, index)];
        assert_eq!(ghost.satellite.fuel, 0.0);
        assert_eq!(ghost.satellite.ammo, 0);
        assert_eq!(ghost.position, 0);
        assert!(!ghost.is_active(0.0));
    }

    // ghosts contribute nothing to the initial fuel score
    assert_eq!(game.state().score.beta, 100.0);
    assert_eq!(game.state().score.alpha, (100.0 + 2.0 * 10.0_f64).floor());

    // ghosts may only no-op
    let legal = &game.legal_actions()[&bludger(PlayerId::Beta, 1)];
    assert_eq!(legal.len(), 1);
}

#[test]
fn fixed_seed_reproduces_identical_trajectories() {
    // two engines with the same seed choosing their own random-yet-legal
    // actions must stay in lockstep, including engagement resolution
    let mut config = tiny_config();
    config.max_ring = 2;
    let run = |seed: u64| {
        let mut game = KothGame::new(config.clone(), seed).unwrap();
        let mut trace = Vec::new();
        for _ in 0..60 {
            if game.state().game_done {
                break;
            }
            let outcome = match game.state().turn_phase {
                TurnPhase::Drift => game.step(PhaseInput::Drift).unwrap(),
                TurnPhase::Movement => {
                    let actions = game.random_actions().unwrap();
                    game.step(PhaseInput::Movement(&actions)).unwrap()
                }
                TurnPhase::Engagement => {
                    let actions = game.random_actions().unwrap();
                    game.step(PhaseInput::Engagement(&actions)).unwrap()
                }
            };
            trace.push((*game.state(), game.catalog().clone(), outcome));
        }
        trace
    };

    let first = run(1234);
    let second = run(1234);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn fuel_and_ammo_invariants_hold_through_random_play() {
    let mut config = tiny_config();
    config.max_ring = 3;
    let mut game = KothGame::new(config, 99).unwrap();

    for _ in 0..90 {
        if game.state().game_done {
            break;
        }
        match game.state().turn_phase {
            TurnPhase::Drift => {
                game.step(PhaseInput::Drift).unwrap();
            }
            phase => {
                let actions = game.random_actions().unwrap();
                let input = match phase {
                    TurnPhase::Movement => PhaseInput::Movement(&actions),
                    _ => PhaseInput::Engagement(&actions),
                };
                game.step(input).unwrap();
            }
        }
        for state in game.catalog().values() {
            assert!(state.satellite.fuel >= game.config().min_fuel);
        }
    }
}

#[test]
fn reset_rebuilds_the_initial_board() {
    let mut game = KothGame::new(GameConfig::default(), 5).unwrap();
    let initial_catalog = game.catalog().clone();
    let initial_score = game.state().score;

    let actions = game.noop_actions().unwrap();
    game.step(PhaseInput::Movement(&actions)).unwrap();
    let actions = game.random_actions().unwrap();
    game.step(PhaseInput::Engagement(&actions)).unwrap();
    game.step(PhaseInput::Drift).unwrap();

    game.reset().unwrap();
    assert_eq!(game.catalog(), &initial_catalog);
    assert_eq!(game.state().turn_count, 0);
    assert_eq!(game.state().turn_phase, TurnPhase::Movement);
    assert!(!game.state().game_done);
    assert_eq!(game.state().score, initial_score);
}
