//! Request/response vocabulary shared by the server and its clients.

use crate::error::GameError;
use crate::session::{AttackReport, Snapshot};

pub use crate::config::PROTOCOL_VERSION;

/// Operations a client can invoke on the session engine.
///
/// Implemented by [`crate::SessionEngine`] for in-process use and by
/// [`crate::Stub`] over a transport, so the sync client does not care which
/// one it talks to.
#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    async fn join(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError>;
    async fn place_fleet(
        &self,
        session_id: &str,
        player: &str,
        cells: &[usize],
    ) -> Result<Snapshot, GameError>;
    async fn attack(
        &self,
        session_id: &str,
        player: &str,
        row: usize,
        col: usize,
    ) -> Result<AttackReport, GameError>;
    async fn get_state(&self, session_id: &str) -> Result<Snapshot, GameError>;
    async fn abandon(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError>;
}

/// A single client request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Request {
    Join { session_id: String, player: String },
    PlaceFleet { session_id: String, player: String, cells: Vec<usize> },
    Attack { session_id: String, player: String, row: usize, col: usize },
    GetState { session_id: String },
    Abandon { session_id: String, player: String },
}

/// Server answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Response {
    Snapshot(Snapshot),
    Attack(AttackReport),
    Error(GameError),
}

/// Frames exchanged over a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Message {
    /// Opens a connection.
    Hello { version: u32 },
    /// Accepts a connection.
    HelloAck { version: u32 },
    Request { seq: u64, body: Request },
    /// Answer carrying the `seq` of the request it belongs to.
    Response { seq: u64, body: Response },
}
