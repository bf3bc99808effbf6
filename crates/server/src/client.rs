//! Request/reply client and snapshot subscriber.
//!
//! Mirrors the server's wire contract for scripted players and integration
//! tests: one request at a time on the request socket, with an optional
//! separate subscription connection for published snapshots. Callers are
//! responsible for ordering between the two, as the publish stream is shared
//! by every subscriber.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use koth_core::PlayerId;

use crate::protocol::{
    ActionSelection, API_VERSION_2P, Envelope, RequestData, ResponseData, to_line,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("registration rejected: {0}")]
    RegistrationRejected(String),
}

/// One player's request/reply connection.
pub struct GameClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    pub alias: String,
    pub player_id: Option<PlayerId>,
    pub player_uuid: Option<String>,
}

impl GameClient {
    pub async fn connect(addr: SocketAddr, alias: impl Into<String>) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer,
            alias: alias.into(),
            player_id: None,
            player_uuid: None,
        })
    }

    /// Sends one raw line and waits for the reply line.
    pub async fn request_raw(&mut self, line: &str) -> Result<String, ClientError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.lines
            .next_line()
            .await?
            .ok_or(ClientError::ConnectionClosed)
    }

    pub async fn request(&mut self, envelope: &Envelope) -> Result<Envelope, ClientError> {
        let reply = self.request_raw(&to_line(envelope)).await?;
        Ok(serde_json::from_str(&reply)?)
    }

    /// Registers this client's alias, recording the assigned slot and the
    /// server-minted UUID used on all subsequent requests.
    pub async fn register(&mut self) -> Result<Envelope, ClientError> {
        let request = Envelope {
            api_version: API_VERSION_2P.to_string(),
            context: "playerRegistration".to_string(),
            player_alias: Some(self.alias.clone()),
            ..Envelope::default()
        };
        let reply = self.request(&request).await?;
        if let Some(error) = &reply.error {
            return Err(ClientError::RegistrationRejected(error.message.clone()));
        }
        if let Some(data) = reply.data.clone() {
            if let Ok(ResponseData::PlayerRegistration {
                player_id,
                player_uuid,
                ..
            }) = serde_json::from_value(data)
            {
                self.player_id = Some(player_id);
                self.player_uuid = Some(player_uuid);
            }
        }
        Ok(reply)
    }

    pub async fn send_game_reset(&mut self) -> Result<Envelope, ClientError> {
        let request = self.identified("gameReset", None);
        self.request(&request).await
    }

    pub async fn send_movement(
        &mut self,
        selections: Vec<ActionSelection>,
    ) -> Result<Envelope, ClientError> {
        let data = serde_json::to_value(RequestData::MovementPhase {
            movement_selections: selections,
        })?;
        let request = self.identified("movementPhase", Some(data));
        self.request(&request).await
    }

    pub async fn send_engagement(
        &mut self,
        selections: Vec<ActionSelection>,
    ) -> Result<Envelope, ClientError> {
        let data = serde_json::to_value(RequestData::EngagementPhase {
            engagement_selections: selections,
        })?;
        let request = self.identified("engagementPhase", Some(data));
        self.request(&request).await
    }

    pub async fn send_drift(&mut self) -> Result<Envelope, ClientError> {
        let request = self.identified("driftPhase", None);
        self.request(&request).await
    }

    fn identified(&self, context: &str, data: Option<serde_json::Value>) -> Envelope {
        Envelope {
            api_version: API_VERSION_2P.to_string(),
            context: context.to_string(),
            player_alias: Some(self.alias.clone()),
            player_uuid: self.player_uuid.clone(),
            data,
            ..Envelope::default()
        }
    }
}

/// A connection to the publish endpoint, yielding snapshots in publish
/// order.
pub struct Subscriber {
    lines: Lines<BufReader<TcpStream>>,
}

impl Subscriber {
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            lines: BufReader::new(stream).lines(),
        })
    }

    pub async fn next_message(&mut self) -> Result<Envelope, ClientError> {
        let line = self
            .lines
            .next_line()
            .await?
            .ok_or(ClientError::ConnectionClosed)?;
        Ok(serde_json::from_str(&line)?)
    }
}
