//! Two-player networked session server for the King-of-the-Hill game.
//!
//! The server exposes two TCP endpoints per session: a request endpoint
//! speaking request/reply with per-connection identity routing, and a
//! publish endpoint broadcasting state snapshots after every successful
//! phase advancement. Protocol handling lives in [`protocol`]; the barrier
//! logic that synchronizes the two clients on one [`koth_core::KothGame`]
//! lives in [`session`]. [`client`] is the matching request/subscribe client
//! used by integration tests and scripted players.
pub mod client;
pub mod config;
pub mod protocol;
pub mod session;

pub use client::{GameClient, Subscriber};
pub use config::ServerConfig;
pub use session::{ServerError, ServerHandle, serve};
