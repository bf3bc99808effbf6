//! JSON message schema and codec for the two-player API.
//!
//! Every message is one JSON object per line with the envelope fields
//! `{apiVersion, context, gameID, data, error}`; registration and phase
//! requests additionally carry `playerAlias`/`playerUUID` at the top level.
//! Requests that fail validation are answered with the same envelope shape
//! carrying an `error` object and no `data`.

use serde::{Deserialize, Serialize};

use koth_core::{
    EngagementKind, EngagementOutcome, KothGame, LegalAction, MovementKind, PlayerId, SectorId,
    TokenId, TokenRole, TurnPhase,
};

/// Version tag of the message formats produced by this server build.
/// Requests carrying any other tag are rejected without further processing.
pub const API_VERSION_2P: &str = "v1.0.0.2p";

/// Top-level message envelope shared by requests, replies, and publishes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Absent on bare connectivity probes; required (and checked) on
    /// everything else.
    #[serde(default)]
    pub api_version: String,
    /// Kept as a raw string so unknown contexts surface as protocol errors
    /// rather than decode failures.
    pub context: String,
    #[serde(rename = "gameID", default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_alias: Option<String>,
    #[serde(rename = "playerUUID", default, skip_serializing_if = "Option::is_none")]
    pub player_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Error payload attached to rejected requests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Enumerated request contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum Context {
    Echo,
    PlayerRegistration,
    GameReset,
    MovementPhase,
    EngagementPhase,
    DriftPhase,
}

impl Context {
    /// Game phase a phase-advancement context corresponds to, if any.
    pub fn phase(self) -> Option<TurnPhase> {
        match self {
            Context::MovementPhase => Some(TurnPhase::Movement),
            Context::EngagementPhase => Some(TurnPhase::Engagement),
            Context::DriftPhase => Some(TurnPhase::Drift),
            Context::Echo | Context::PlayerRegistration | Context::GameReset => None,
        }
    }

    /// The `data.kind` value required of requests in this context, if the
    /// context carries data at all.
    pub fn request_kind(self) -> Option<&'static str> {
        match self {
            Context::MovementPhase => Some("movementPhaseRequest"),
            Context::EngagementPhase => Some("engagementPhaseRequest"),
            _ => None,
        }
    }
}

/// One action selection inside a phase request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSelection {
    #[serde(rename = "pieceID")]
    pub piece_id: String,
    pub action_type: String,
    #[serde(rename = "targetID", default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// Typed request payloads, discriminated by `data.kind`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RequestData {
    #[serde(rename = "movementPhaseRequest", rename_all = "camelCase")]
    MovementPhase {
        movement_selections: Vec<ActionSelection>,
    },
    #[serde(rename = "engagementPhaseRequest", rename_all = "camelCase")]
    EngagementPhase {
        engagement_selections: Vec<ActionSelection>,
    },
}

/// One registry entry in published snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    #[serde(rename = "playerID")]
    pub player_id: PlayerId,
    pub player_alias: String,
}

/// A legal action template as clients see it: movement entries carry only
/// the action type, engagement entries also name the target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegalActionRecord {
    Engagement {
        #[serde(rename = "actionType")]
        action_type: EngagementKind,
        #[serde(rename = "targetID")]
        target_id: String,
    },
    Movement {
        #[serde(rename = "actionType")]
        action_type: MovementKind,
    },
}

/// Per-token state inside a snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStateRecord {
    #[serde(rename = "pieceID")]
    pub piece_id: String,
    pub fuel: f64,
    pub role: TokenRole,
    pub position: SectorId,
    pub ammo: u32,
    pub legal_actions: Vec<LegalActionRecord>,
}

/// Complete game-state snapshot embedded in responses and publishes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateRecord {
    pub turn_number: u32,
    pub turn_phase: TurnPhase,
    pub game_done: bool,
    pub goal_sector_alpha: SectorId,
    pub goal_sector_beta: SectorId,
    pub score_alpha: f64,
    pub score_beta: f64,
    pub token_states: Vec<TokenStateRecord>,
}

/// One entry of the engagement resolution sequence. Empty strings denote an
/// absent role (no guardian in shoot/collide outcomes, no attacker in
/// trivial guards).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub action_type: EngagementKind,
    #[serde(rename = "attackerID")]
    pub attacker_id: String,
    #[serde(rename = "targetID")]
    pub target_id: String,
    #[serde(rename = "guardianID")]
    pub guardian_id: String,
    pub probability: f64,
    pub success: bool,
}

/// Typed response payloads, discriminated by `data.kind`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResponseData {
    #[serde(rename = "playerRegistrationResponse", rename_all = "camelCase")]
    PlayerRegistration {
        player_alias: String,
        #[serde(rename = "playerID")]
        player_id: PlayerId,
        #[serde(rename = "playerUUID")]
        player_uuid: String,
    },
    #[serde(rename = "gameResetResponse", rename_all = "camelCase")]
    GameReset {
        game_state: GameStateRecord,
        player_registry: Vec<RegistryRecord>,
    },
    #[serde(rename = "movementPhaseResponse", rename_all = "camelCase")]
    MovementPhase {
        game_state: GameStateRecord,
        player_registry: Vec<RegistryRecord>,
    },
    #[serde(rename = "engagementPhaseResponse", rename_all = "camelCase")]
    EngagementPhase {
        game_state: GameStateRecord,
        resolution_sequence: Vec<OutcomeRecord>,
        player_registry: Vec<RegistryRecord>,
    },
    #[serde(rename = "driftPhaseResponse", rename_all = "camelCase")]
    DriftPhase {
        game_state: GameStateRecord,
        player_registry: Vec<RegistryRecord>,
    },
    #[serde(rename = "waitingResponse")]
    Waiting,
    #[serde(rename = "advancingResponse")]
    Advancing,
}

/// Protocol-level request failures surfaced to the offending client.
///
/// The message shape is stable; the numeric codes are informational only.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("invalid API version: expected {expected}, received {received}")]
    VersionMismatch { expected: String, received: String },

    #[error("unrecognized message context {0:?}")]
    UnknownContext(String),

    #[error("no player slots available in game")]
    NoSlotAvailable,

    #[error("player with alias {0:?} is already registered")]
    AliasCollision(String),

    #[error("no data object expected in context {0}")]
    UnexpectedDataField(Context),

    #[error("no player registered with alias {alias:?} and UUID {uuid:?}")]
    UnregisteredIdentity { alias: String, uuid: String },

    #[error("in context {context}, expected game phase {expected}, got {actual}")]
    ContextPhaseMismatch {
        context: Context,
        expected: TurnPhase,
        actual: TurnPhase,
    },

    #[error("token {token} is not owned by player {player}")]
    PlayerTokenMismatch { token: String, player: PlayerId },

    #[error("in context {context}, expected data of kind {expected}")]
    DataKindMismatch {
        context: Context,
        expected: &'static str,
    },

    #[error("mismatched player request contexts: alpha sent {alpha}, beta sent {beta}")]
    MismatchedPlayerContexts { alpha: Context, beta: Context },

    #[error("game is already complete; request a game reset")]
    GameComplete,

    #[error("malformed request: {0}")]
    Malformed(String),
}

impl RequestError {
    pub fn code(&self) -> u16 {
        match self {
            RequestError::VersionMismatch { .. } => 1,
            RequestError::UnknownContext(_) => 2,
            RequestError::NoSlotAvailable => 3,
            RequestError::AliasCollision(_) => 4,
            RequestError::UnexpectedDataField(_) => 5,
            RequestError::UnregisteredIdentity { .. } => 6,
            RequestError::ContextPhaseMismatch { .. } => 7,
            RequestError::PlayerTokenMismatch { .. } => 8,
            RequestError::DataKindMismatch { .. } => 9,
            RequestError::MismatchedPlayerContexts { .. } => 10,
            RequestError::GameComplete => 11,
            RequestError::Malformed(_) => 12,
        }
    }
}

impl Envelope {
    /// A reply carrying a typed data payload.
    pub fn reply(context: impl Into<String>, game_id: &str, data: &ResponseData) -> Self {
        Self {
            api_version: API_VERSION_2P.to_string(),
            context: context.into(),
            game_id: Some(game_id.to_string()),
            data: serde_json::to_value(data).ok(),
            ..Self::default()
        }
    }

    /// A reply carrying an error payload and no data.
    pub fn error_reply(context: impl Into<String>, game_id: &str, error: &RequestError) -> Self {
        Self {
            api_version: API_VERSION_2P.to_string(),
            context: context.into(),
            game_id: Some(game_id.to_string()),
            error: Some(ErrorBody {
                code: error.code(),
                message: format!("Invalid Request: {error}"),
            }),
            ..Self::default()
        }
    }
}

/// Encodes one envelope as a single wire line (no trailing newline).
pub fn to_line(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|err| {
        // serialization of our own response types cannot fail; keep the
        // connection alive with a minimal error envelope if it ever does
        format!(
            "{{\"apiVersion\":\"{API_VERSION_2P}\",\"context\":\"unknown\",\
             \"error\":{{\"code\":0,\"message\":\"encoding failure: {err}\"}}}}"
        )
    })
}

/// Builds the wire snapshot of the current game state, including the
/// phase-appropriate legal actions of every token.
pub fn game_state_record(game: &KothGame) -> GameStateRecord {
    let state = game.state();
    let token_states = game
        .catalog()
        .iter()
        .map(|(token, token_state)| TokenStateRecord {
            piece_id: token.to_string(),
            fuel: token_state.satellite.fuel,
            role: token_state.role,
            position: token_state.position,
            ammo: token_state.satellite.ammo,
            legal_actions: game
                .legal_actions()
                .get(token)
                .map(|options| options.iter().map(legal_action_record).collect())
                .unwrap_or_default(),
        })
        .collect();

    GameStateRecord {
        turn_number: state.turn_count,
        turn_phase: state.turn_phase,
        game_done: state.game_done,
        goal_sector_alpha: state.goals.alpha,
        goal_sector_beta: state.goals.beta,
        score_alpha: state.score.alpha,
        score_beta: state.score.beta,
        token_states,
    }
}

fn legal_action_record(action: &LegalAction) -> LegalActionRecord {
    match action {
        LegalAction::Move(kind) => LegalActionRecord::Movement { action_type: *kind },
        LegalAction::Engage { kind, target } => LegalActionRecord::Engagement {
            action_type: *kind,
            target_id: target.to_string(),
        },
    }
}

/// Encodes the engagement resolution sequence for the wire.
pub fn outcome_records(outcomes: &[EngagementOutcome]) -> Vec<OutcomeRecord> {
    outcomes
        .iter()
        .map(|outcome| OutcomeRecord {
            action_type: outcome.kind,
            attacker_id: token_or_empty(outcome.attacker),
            target_id: outcome.target.to_string(),
            guardian_id: token_or_empty(outcome.guardian),
            probability: outcome.prob,
            success: outcome.success,
        })
        .collect()
}

fn token_or_empty(token: Option<TokenId>) -> String {
    token.map(|t| t.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use koth_core::GameConfig;

    #[test]
    fn envelope_uses_camel_case_field_names() {
        let envelope = Envelope {
            api_version: API_VERSION_2P.to_string(),
            context: "playerRegistration".to_string(),
            player_alias: Some("kirk".to_string()),
            player_uuid: Some("u-1".to_string()),
            game_id: Some("g-1".to_string()),
            ..Envelope::default()
        };
        let line = to_line(&envelope);
        assert!(line.contains("\"apiVersion\""));
        assert!(line.contains("\"playerAlias\""));
        assert!(line.contains("\"playerUUID\""));
        assert!(line.contains("\"gameID\""));

        let back: Envelope = serde_json::from_str(&line).unwrap();
        assert_eq!(back.context, "playerRegistration");
        assert_eq!(back.player_alias.as_deref(), Some("kirk"));
    }

    #[test]
    fn request_data_kind_is_discriminating() {
        let raw = r#"{"kind":"movementPhaseRequest","movementSelections":[
            {"pieceID":"alpha:seeker:0","actionType":"prograde"}]}"#;
        let data: RequestData = serde_json::from_str(raw).unwrap();
        let RequestData::MovementPhase {
            movement_selections,
        } = data
        else {
            panic!("wrong variant");
        };
        assert_eq!(movement_selections.len(), 1);
        assert_eq!(movement_selections[0].piece_id, "alpha:seeker:0");
        assert_eq!(movement_selections[0].target_id, None);

        assert!(serde_json::from_str::<RequestData>(r#"{"kind":"bogus"}"#).is_err());
    }

    #[test]
    fn snapshot_embeds_phase_appropriate_legal_actions() {
        let game = KothGame::new(GameConfig::default(), 0).unwrap();
        let record = game_state_record(&game);

        assert_eq!(record.turn_phase, TurnPhase::Movement);
        assert_eq!(record.token_states.len(), 22);
        assert_eq!(record.token_states[0].piece_id, "alpha:seeker:0");
        assert!(matches!(
            record.token_states[0].legal_actions[0],
            LegalActionRecord::Movement {
                action_type: MovementKind::NoOp
            }
        ));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["tokenStates"][0]["pieceID"], "alpha:seeker:0");
        assert_eq!(value["tokenStates"][0]["role"], "seeker");
        assert_eq!(
            value["tokenStates"][0]["legalActions"][0]["actionType"],
            "noop"
        );
        assert_eq!(value["turnPhase"], "movement");
        assert_eq!(value["goalSectorAlpha"], 15);
    }

    #[test]
    fn outcome_records_use_empty_strings_for_absent_roles() {
        let outcome = EngagementOutcome {
            kind: EngagementKind::Shoot,
            attacker: Some("alpha:bludger:1".parse().unwrap()),
            target: "beta:seeker:0".parse().unwrap(),
            guardian: None,
            prob: 0.7,
            success: true,
        };
        let records = outcome_records(&[outcome]);
        let value = serde_json::to_value(&records).unwrap();
        assert_eq!(value[0]["attackerID"], "alpha:bludger:1");
        assert_eq!(value[0]["guardianID"], "");
        assert_eq!(value[0]["actionType"], "shoot");
        assert_eq!(value[0]["probability"], 0.7);
    }

    #[test]
    fn context_strings_round_trip() {
        for (context, name) in [
            (Context::Echo, "echo"),
            (Context::PlayerRegistration, "playerRegistration"),
            (Context::GameReset, "gameReset"),
            (Context::MovementPhase, "movementPhase"),
            (Context::EngagementPhase, "engagementPhase"),
            (Context::DriftPhase, "driftPhase"),
        ] {
            assert_eq!(context.to_string(), name);
            assert_eq!(name.parse::<Context>().unwrap(), context);
        }
        assert!("movement".parse::<Context>().is_err());
    }
}
