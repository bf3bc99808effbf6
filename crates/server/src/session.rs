//! Two-client barrier session server.
//!
//! One task owns the engine, the player registry, and the per-phase input
//! queue; connections talk to it over channels, so no lock ever guards game
//! state. Each phase advances only when both registered players have queued
//! a matching declaration: the first arriver is told to wait, the second
//! arriver's request drives the engine, and the resulting snapshot goes out
//! on the publish endpoint to every subscriber.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use koth_core::{
    ActionMap, EngagementCmd, EngagementKind, EngineError, KothGame, MovementKind, PerPlayer,
    PhaseInput, PlayerId, TokenAction, TokenId,
};

use crate::config::ServerConfig;
use crate::protocol::{
    ActionSelection, Context, Envelope, API_VERSION_2P, RequestData, RequestError, ResponseData,
    game_state_record, outcome_records, to_line,
};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Running server endpoints and task handles.
pub struct ServerHandle {
    pub request_addr: SocketAddr,
    pub publish_addr: SocketAddr,
    session: JoinHandle<()>,
    request_accept: JoinHandle<()>,
    publish_accept: JoinHandle<()>,
}

impl ServerHandle {
    /// Waits for the session task to finish (it runs until shutdown).
    pub async fn join(mut self) {
        let _ = (&mut self.session).await;
    }

    /// Abrupt shutdown: terminate every task. In-flight requests are
    /// dropped, matching the session model's terminate-and-join semantics.
    pub fn shutdown(&self) {
        self.session.abort();
        self.request_accept.abort();
        self.publish_accept.abort();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Binds both endpoints and spawns the session.
pub async fn serve(config: ServerConfig) -> Result<ServerHandle, ServerError> {
    let request_listener = TcpListener::bind((config.bind_addr, config.request_port)).await?;
    let publish_listener = TcpListener::bind((config.bind_addr, config.publish_port)).await?;
    let request_addr = request_listener.local_addr()?;
    let publish_addr = publish_listener.local_addr()?;

    let game = KothGame::new(config.game.clone(), config.seed)?;
    let (publish_tx, _) = broadcast::channel(64);
    let (request_tx, request_rx) = mpsc::channel(64);

    let session = Session::new(game, publish_tx.clone());
    info!(%request_addr, %publish_addr, game_id = %session.game_id, "session server up");

    Ok(ServerHandle {
        request_addr,
        publish_addr,
        session: tokio::spawn(session.run(request_rx)),
        request_accept: tokio::spawn(accept_requests(request_listener, request_tx)),
        publish_accept: tokio::spawn(accept_subscribers(publish_listener, publish_tx)),
    })
}

/// One decoded request line awaiting its reply.
struct IncomingRequest {
    raw: String,
    reply: oneshot::Sender<String>,
}

async fn accept_requests(listener: TcpListener, tx: mpsc::Sender<IncomingRequest>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "request client connected");
                tokio::spawn(serve_connection(stream, peer, tx.clone()));
            }
            Err(err) => {
                warn!(%err, "request accept failed");
            }
        }
    }
}

/// Strict request/reply per connection: the next request line is not read
/// until the previous reply has been written.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, tx: mpsc::Sender<IncomingRequest>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!(%peer, %err, "request read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx
            .send(IncomingRequest {
                raw: line,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            break;
        }
        let Ok(reply) = reply_rx.await else {
            break;
        };
        if write_line(&mut write_half, &reply).await.is_err() {
            break;
        }
    }
    debug!(%peer, "request client disconnected");
}

async fn write_line(write_half: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await
}

async fn accept_subscribers(listener: TcpListener, tx: broadcast::Sender<String>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "subscriber connected");
                tokio::spawn(forward_publishes(stream, tx.subscribe()));
            }
            Err(err) => {
                warn!(%err, "publish accept failed");
            }
        }
    }
}

async fn forward_publishes(stream: TcpStream, mut rx: broadcast::Receiver<String>) {
    let (_, mut write_half) = stream.into_split();
    loop {
        match rx.recv().await {
            Ok(line) => {
                if write_half.write_all(line.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "subscriber lagged behind publishes");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// A registered player slot.
#[derive(Clone, Debug)]
struct Registered {
    alias: String,
    uuid: String,
}

/// A validated, typed phase declaration held in the barrier queue.
#[derive(Clone, Debug)]
enum QueuedDeclaration {
    GameReset,
    Movement(Vec<(TokenId, MovementKind)>),
    Engagement(Vec<(TokenId, EngagementKind, TokenId)>),
    Drift,
}

impl QueuedDeclaration {
    fn context(&self) -> Context {
        match self {
            QueuedDeclaration::GameReset => Context::GameReset,
            QueuedDeclaration::Movement(_) => Context::MovementPhase,
            QueuedDeclaration::Engagement(_) => Context::EngagementPhase,
            QueuedDeclaration::Drift => Context::DriftPhase,
        }
    }
}

/// Single-task owner of the engine, registry, and barrier queue.
struct Session {
    game: KothGame,
    game_id: String,
    registry: PerPlayer<Option<Registered>>,
    queue: PerPlayer<Option<QueuedDeclaration>>,
    publish_tx: broadcast::Sender<String>,
}

impl Session {
    fn new(game: KothGame, publish_tx: broadcast::Sender<String>) -> Self {
        Self {
            game,
            game_id: uuid::Uuid::new_v4().to_string(),
            registry: PerPlayer::splat(None),
            queue: PerPlayer::splat(None),
            publish_tx,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<IncomingRequest>) {
        while let Some(request) = rx.recv().await {
            let reply = self.handle_request(&request.raw);
            let _ = request.reply.send(reply);
        }
    }

    fn handle_request(&mut self, raw: &str) -> String {
        let envelope = match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(%err, "undecodable request");
                return to_line(&Envelope::error_reply(
                    "unknown",
                    &self.game_id,
                    &RequestError::Malformed(err.to_string()),
                ));
            }
        };

        // a connectivity probe is echoed verbatim, before any validation
        if envelope.context == "echo" {
            return raw.to_string();
        }

        if envelope.api_version != API_VERSION_2P {
            return self.reject(
                &envelope,
                RequestError::VersionMismatch {
                    expected: API_VERSION_2P.to_string(),
                    received: envelope.api_version.clone(),
                },
            );
        }

        let Ok(context) = envelope.context.parse::<Context>() else {
            let unknown = RequestError::UnknownContext(envelope.context.clone());
            return self.reject(&envelope, unknown);
        };
        debug!(%context, "request received");

        let reply = match context {
            Context::Echo => return raw.to_string(),
            Context::PlayerRegistration => self.register_player(&envelope),
            Context::GameReset
            | Context::MovementPhase
            | Context::EngagementPhase
            | Context::DriftPhase => self.phase_request(&envelope, context),
        };
        match reply {
            Ok(reply) => reply,
            Err(err) => self.reject(&envelope, err),
        }
    }

    fn reject(&self, envelope: &Envelope, error: RequestError) -> String {
        debug!(%error, context = %envelope.context, "request rejected");
        to_line(&Envelope::error_reply(
            envelope.context.clone(),
            &self.game_id,
            &error,
        ))
    }

    /// Registration is single-phase: mint a UUID, assign the first empty
    /// slot (Alpha before Beta), and once the second player arrives, reset
    /// the engine and publish the opening snapshot.
    fn register_player(&mut self, envelope: &Envelope) -> Result<String, RequestError> {
        if envelope.data.is_some() {
            return Err(RequestError::UnexpectedDataField(Context::PlayerRegistration));
        }
        let alias = envelope
            .player_alias
            .clone()
            .ok_or_else(|| RequestError::Malformed("playerAlias is required".to_string()))?;
        for player in PlayerId::ALL {
            if let Some(registered) = &self.registry[player]
                && registered.alias == alias
            {
                return Err(RequestError::AliasCollision(alias));
            }
        }

        let (slot, second) = if self.registry.alpha.is_none() {
            (PlayerId::Alpha, false)
        } else if self.registry.beta.is_none() {
            (PlayerId::Beta, true)
        } else {
            return Err(RequestError::NoSlotAvailable);
        };

        let registered = Registered {
            alias: alias.clone(),
            uuid: uuid::Uuid::new_v4().to_string(),
        };
        let reply = Envelope::reply(
            envelope.context.clone(),
            &self.game_id,
            &ResponseData::PlayerRegistration {
                player_alias: alias.clone(),
                player_id: slot,
                player_uuid: registered.uuid.clone(),
            },
        );
        self.registry[slot] = Some(registered);
        info!(%slot, alias, "player registered");

        if second {
            // both slots filled: the game starts fresh and everyone learns
            // the initial state from the publish endpoint
            if let Err(err) = self.game.reset() {
                error!(%err, "engine reset failed");
                return Err(RequestError::Malformed(err.to_string()));
            }
            self.queue = PerPlayer::splat(None);
            self.publish(&envelope.context, self.reset_response());
        }

        Ok(to_line(&reply))
    }

    fn phase_request(
        &mut self,
        envelope: &Envelope,
        context: Context,
    ) -> Result<String, RequestError> {
        let player = self.authenticate(envelope)?;
        let declaration = self.validate_declaration(envelope, context, player)?;

        self.queue[player] = Some(declaration);
        let other = player.opponent();
        if self.queue[other].is_none() {
            return Ok(to_line(&Envelope::reply(
                envelope.context.clone(),
                &self.game_id,
                &ResponseData::Waiting,
            )));
        }
        self.advance_barrier(envelope, player)
    }

    fn authenticate(&self, envelope: &Envelope) -> Result<PlayerId, RequestError> {
        let (Some(alias), Some(uuid)) = (&envelope.player_alias, &envelope.player_uuid) else {
            return Err(RequestError::Malformed(
                "playerAlias and playerUUID are required".to_string(),
            ));
        };
        for player in PlayerId::ALL {
            if let Some(registered) = &self.registry[player]
                && &registered.alias == alias
                && &registered.uuid == uuid
            {
                return Ok(player);
            }
        }
        Err(RequestError::UnregisteredIdentity {
            alias: alias.clone(),
            uuid: uuid.clone(),
        })
    }

    /// Validates context against the current phase, data kind against
    /// context, and token ownership, producing the typed declaration.
    fn validate_declaration(
        &self,
        envelope: &Envelope,
        context: Context,
        player: PlayerId,
    ) -> Result<QueuedDeclaration, RequestError> {
        if context != Context::GameReset && self.game.state().game_done {
            return Err(RequestError::GameComplete);
        }
        if let Some(expected) = context.phase() {
            let actual = self.game.state().turn_phase;
            if actual != expected {
                return Err(RequestError::ContextPhaseMismatch {
                    context,
                    expected,
                    actual,
                });
            }
        }

        match context {
            Context::GameReset | Context::DriftPhase => {
                if envelope.data.is_some() {
                    return Err(RequestError::UnexpectedDataField(context));
                }
                Ok(if context == Context::GameReset {
                    QueuedDeclaration::GameReset
                } else {
                    QueuedDeclaration::Drift
                })
            }
            Context::MovementPhase => {
                let selections = self.decode_selections(envelope, context)?;
                let mut moves = Vec::with_capacity(selections.len());
                for selection in &selections {
                    let token = self.owned_token(&selection.piece_id, player)?;
                    let kind = selection.action_type.parse::<MovementKind>().map_err(|_| {
                        RequestError::Malformed(format!(
                            "unknown movement type {:?}",
                            selection.action_type
                        ))
                    })?;
                    moves.push((token, kind));
                }
                Ok(QueuedDeclaration::Movement(moves))
            }
            Context::EngagementPhase => {
                let selections = self.decode_selections(envelope, context)?;
                let mut engagements = Vec::with_capacity(selections.len());
                for selection in &selections {
                    let token = self.owned_token(&selection.piece_id, player)?;
                    let kind = selection.action_type.parse::<EngagementKind>().map_err(|_| {
                        RequestError::Malformed(format!(
                            "unknown engagement type {:?}",
                            selection.action_type
                        ))
                    })?;
                    let target = match (&selection.target_id, kind) {
                        (Some(target), _) => self.known_token(target)?,
                        (None, EngagementKind::NoOp) => token,
                        (None, _) => {
                            return Err(RequestError::Malformed(format!(
                                "{kind} selection for {token} is missing targetID"
                            )));
                        }
                    };
                    engagements.push((token, kind, target));
                }
                Ok(QueuedDeclaration::Engagement(engagements))
            }
            Context::Echo | Context::PlayerRegistration => {
                Err(RequestError::UnknownContext(envelope.context.clone()))
            }
        }
    }

    fn decode_selections(
        &self,
        envelope: &Envelope,
        context: Context,
    ) -> Result<Vec<ActionSelection>, RequestError> {
        let expected = context.request_kind().unwrap_or_default();
        let mismatch = || RequestError::DataKindMismatch { context, expected };
        let data = envelope.data.clone().ok_or_else(mismatch)?;
        let decoded = serde_json::from_value::<RequestData>(data).map_err(|_| mismatch())?;
        match (context, decoded) {
            (
                Context::MovementPhase,
                RequestData::MovementPhase {
                    movement_selections,
                },
            ) => Ok(movement_selections),
            (
                Context::EngagementPhase,
                RequestData::EngagementPhase {
                    engagement_selections,
                },
            ) => Ok(engagement_selections),
            _ => Err(mismatch()),
        }
    }

    /// A declared piece must parse, exist, and belong to the declaring
    /// player.
    fn owned_token(&self, piece_id: &str, player: PlayerId) -> Result<TokenId, RequestError> {
        let token = self.known_token(piece_id)?;
        if token.player != player {
            return Err(RequestError::PlayerTokenMismatch {
                token: piece_id.to_string(),
                player,
            });
        }
        Ok(token)
    }

    fn known_token(&self, piece_id: &str) -> Result<TokenId, RequestError> {
        let token = piece_id
            .parse::<TokenId>()
            .map_err(|err| RequestError::Malformed(err.to_string()))?;
        if !self.game.catalog().contains_key(&token) {
            return Err(RequestError::Malformed(format!(
                "token {piece_id} does not exist in this game"
            )));
        }
        Ok(token)
    }

    /// Both queue slots are filled: verify the contexts agree, advance the
    /// engine, reply to the second arriver, publish, and clear the queue.
    fn advance_barrier(
        &mut self,
        envelope: &Envelope,
        second_arriver: PlayerId,
    ) -> Result<String, RequestError> {
        let (Some(alpha_decl), Some(beta_decl)) = (&self.queue.alpha, &self.queue.beta) else {
            return Err(RequestError::Malformed(
                "barrier advanced with an empty queue slot".to_string(),
            ));
        };
        let context = alpha_decl.context();
        if context != beta_decl.context() {
            // the offending (second) declaration stays queued; a corrected
            // request from either player overwrites its own slot
            return Err(RequestError::MismatchedPlayerContexts {
                alpha: alpha_decl.context(),
                beta: beta_decl.context(),
            });
        }
        let alpha_decl = alpha_decl.clone();
        let beta_decl = beta_decl.clone();

        let response = match context {
            Context::GameReset => {
                self.game
                    .reset()
                    .map_err(|err| RequestError::Malformed(err.to_string()))?;
                self.reset_response()
            }
            Context::MovementPhase => {
                let actions = self.movement_action_map(&alpha_decl, &beta_decl);
                self.step_engine(PhaseInput::Movement(&actions))?;
                ResponseData::MovementPhase {
                    game_state: game_state_record(&self.game),
                    player_registry: self.registry_records(),
                }
            }
            Context::EngagementPhase => {
                let actions = self.engagement_action_map(&alpha_decl, &beta_decl);
                let outcome = self.step_engine(PhaseInput::Engagement(&actions))?;
                ResponseData::EngagementPhase {
                    game_state: game_state_record(&self.game),
                    resolution_sequence: outcome_records(&outcome.engagements),
                    player_registry: self.registry_records(),
                }
            }
            Context::DriftPhase => {
                self.step_engine(PhaseInput::Drift)?;
                ResponseData::DriftPhase {
                    game_state: game_state_record(&self.game),
                    player_registry: self.registry_records(),
                }
            }
            Context::Echo | Context::PlayerRegistration => {
                return Err(RequestError::UnknownContext(envelope.context.clone()));
            }
        };

        info!(
            %context,
            turn = self.game.state().turn_count,
            phase = %self.game.state().turn_phase,
            done = self.game.state().game_done,
            %second_arriver,
            "phase advanced"
        );
        self.publish(&envelope.context, response);
        self.queue = PerPlayer::splat(None);

        Ok(to_line(&Envelope::reply(
            envelope.context.clone(),
            &self.game_id,
            &ResponseData::Advancing,
        )))
    }

    fn step_engine(
        &mut self,
        input: PhaseInput<'_>,
    ) -> Result<koth_core::StepOutcome, RequestError> {
        self.game.step(input).map_err(|err| {
            // validated requests cannot produce engine errors; if one gets
            // through, drop the stale queue so the session is not wedged
            error!(%err, "engine step failed");
            self.queue = PerPlayer::splat(None);
            RequestError::Malformed(err.to_string())
        })
    }

    fn movement_action_map(
        &self,
        alpha: &QueuedDeclaration,
        beta: &QueuedDeclaration,
    ) -> ActionMap {
        let mut actions = ActionMap::new();
        for declaration in [alpha, beta] {
            if let QueuedDeclaration::Movement(moves) = declaration {
                for &(token, kind) in moves {
                    actions.insert(token, TokenAction::Move(kind));
                }
            }
        }
        actions
    }

    /// Engagement probabilities are attached here, at declaration time,
    /// from the acting player's tables.
    fn engagement_action_map(
        &self,
        alpha: &QueuedDeclaration,
        beta: &QueuedDeclaration,
    ) -> ActionMap {
        let mut actions = ActionMap::new();
        for declaration in [alpha, beta] {
            if let QueuedDeclaration::Engagement(engagements) = declaration {
                for &(token, kind, target) in engagements {
                    actions.insert(
                        token,
                        TokenAction::Engage(EngagementCmd {
                            kind,
                            target,
                            prob: self.game.engagement_probability(token, target, kind),
                        }),
                    );
                }
            }
        }
        actions
    }

    fn reset_response(&self) -> ResponseData {
        ResponseData::GameReset {
            game_state: game_state_record(&self.game),
            player_registry: self.registry_records(),
        }
    }

    fn registry_records(&self) -> Vec<crate::protocol::RegistryRecord> {
        PlayerId::ALL
            .iter()
            .filter_map(|&player| {
                self.registry[player]
                    .as_ref()
                    .map(|registered| crate::protocol::RegistryRecord {
                        player_id: player,
                        player_alias: registered.alias.clone(),
                    })
            })
            .collect()
    }

    fn publish(&self, context: &str, data: ResponseData) {
        let line = to_line(&Envelope::reply(context, &self.game_id, &data));
        // send fails only when no subscriber is connected, which is fine
        if self.publish_tx.send(line).is_err() {
            debug!("no subscribers for publish");
        }
    }
}
