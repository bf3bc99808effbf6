//! Deterministic rules engine for the King-of-the-Hill orbital strategy game.
//!
//! `koth-core` defines the canonical rules (the orbit grid, tokens, legal
//! actions, the engagement resolver, and the phased game engine) and exposes
//! pure APIs that can be reused by the session server and offline tools.
//! All state mutation flows through [`engine::KothGame`], and supporting
//! crates depend on the types re-exported here.
pub mod actions;
pub mod adjacency;
pub mod config;
pub mod engagement;
pub mod engine;
pub mod grid;
pub mod token;

pub use actions::{
    ActionMap, EngagementCmd, EngagementKind, LegalAction, LegalActionSet, MovementKind,
    SectorRelation, TokenAction, is_legal_action, legal_actions,
};
pub use adjacency::TokenAdjacency;
pub use config::{
    ConfigError, EngagementCosts, EngagementProbs, FuelUsage, GameConfig, KindProbs, PerPlayer,
    PerRole,
};
pub use engagement::{EngagementGraph, EngagementGraphError, EngagementOutcome};
pub use engine::{EngineError, GameState, KothGame, PhaseInput, StepOutcome, TurnPhase};
pub use grid::{GridError, OrbitGrid, SectorId};
pub use token::{
    ParseTokenIdError, PlayerId, Satellite, TokenCatalog, TokenId, TokenRole, TokenState,
};
