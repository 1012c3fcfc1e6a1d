//! Server side of the request/response protocol.

use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, info, warn};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::engine::SessionEngine;
use crate::protocol::{Message, Request, Response, SessionApi, PROTOCOL_VERSION};
use crate::transport::{tcp::TcpTransport, Transport};

/// Serves one client connection against a shared [`SessionApi`].
pub struct Skeleton<T: Transport> {
    api: Arc<dyn SessionApi>,
    transport: T,
}

impl<T: Transport> Skeleton<T> {
    pub fn new(api: Arc<dyn SessionApi>, transport: T) -> Self {
        Self { api, transport }
    }

    async fn handshake(&mut self) -> anyhow::Result<()> {
        match self.transport.recv().await? {
            Message::Hello { version } if version == PROTOCOL_VERSION => {
                self.transport
                    .send(Message::HelloAck {
                        version: PROTOCOL_VERSION,
                    })
                    .await
            }
            Message::Hello { version } => {
                warn!(
                    "[Skeleton] Handshake protocol version mismatch: expected {}, peer sent {}",
                    PROTOCOL_VERSION, version
                );
                Err(anyhow!(
                    "Protocol version mismatch in Hello: expected {}, got {}",
                    PROTOCOL_VERSION,
                    version
                ))
            }
            other => {
                warn!("[Skeleton] Expected Hello, got {:?}", other);
                Err(anyhow!("Expected Hello, got unexpected message (closing session)"))
            }
        }
    }

    /// Answer requests until the peer goes away. Returns an error only for
    /// protocol violations; a closed connection ends the loop cleanly.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.handshake().await?;
        loop {
            let msg = match self.transport.recv().await {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("[Skeleton] connection ended: {}", e);
                    return Ok(());
                }
            };
            match msg {
                Message::Request { seq, body } => {
                    let body = self.dispatch(body).await;
                    self.transport.send(Message::Response { seq, body }).await?;
                }
                // A reconnecting client re-opens with Hello on the same stream.
                Message::Hello { version } if version == PROTOCOL_VERSION => {
                    self.transport
                        .send(Message::HelloAck {
                            version: PROTOCOL_VERSION,
                        })
                        .await?;
                }
                other => {
                    warn!("[Skeleton] Unexpected message: {:?}", other);
                    return Err(anyhow!("Expected Request, got unexpected message (closing session)"));
                }
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Response {
        debug!("[Skeleton] {:?}", request);
        let api = &self.api;
        let result = match request {
            Request::Join { session_id, player } => {
                api.join(&session_id, &player).await.map(Response::Snapshot)
            }
            Request::PlaceFleet {
                session_id,
                player,
                cells,
            } => api
                .place_fleet(&session_id, &player, &cells)
                .await
                .map(Response::Snapshot),
            Request::Attack {
                session_id,
                player,
                row,
                col,
            } => api
                .attack(&session_id, &player, row, col)
                .await
                .map(Response::Attack),
            Request::GetState { session_id } => {
                api.get_state(&session_id).await.map(Response::Snapshot)
            }
            Request::Abandon { session_id, player } => {
                api.abandon(&session_id, &player).await.map(Response::Snapshot)
            }
        };
        result.unwrap_or_else(Response::Error)
    }
}

/// Accept connections forever, one skeleton task per client, plus a sweeper
/// that expires settled sessions.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<SessionEngine>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let sweeper = {
        let engine = Arc::clone(&engine);
        let config = config.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.sweep_interval);
            loop {
                ticker.tick().await;
                let removed = engine.sweep_settled(config.finished_grace).await;
                if removed > 0 {
                    info!("[serve] expired {} session(s)", removed);
                }
            }
        })
    };

    let result = loop {
        let (stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => break Err(anyhow!("Accept failed: {}", e)),
        };
        info!("[serve] client connected from {}", addr);
        let api: Arc<dyn SessionApi> = engine.clone();
        let transport = TcpTransport::with_timeout(stream, config.io_timeout);
        tokio::spawn(async move {
            let mut skeleton = Skeleton::new(api, transport);
            match skeleton.run().await {
                Ok(()) => info!("[serve] client {} disconnected", addr),
                Err(e) => warn!("[serve] client {} dropped: {}", addr, e),
            }
        });
    };
    sweeper.abort();
    result
}
