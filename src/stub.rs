//! Client side of the request/response protocol.

use anyhow::anyhow;
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use crate::config::{DEFAULT_REQUEST_TIMEOUT, PROTOCOL_VERSION};
use crate::error::GameError;
use crate::protocol::{Message, Request, Response, SessionApi};
use crate::session::{AttackReport, Snapshot};
use crate::transport::Transport;

struct Link<T: Transport> {
    transport: T,
    next_seq: u64,
    handshaken: bool,
}

impl<T: Transport> Link<T> {
    async fn handshake(&mut self) -> anyhow::Result<()> {
        self.transport
            .send(Message::Hello {
                version: PROTOCOL_VERSION,
            })
            .await?;
        loop {
            match self.transport.recv().await? {
                Message::HelloAck { version } if version == PROTOCOL_VERSION => {
                    self.handshaken = true;
                    return Ok(());
                }
                Message::HelloAck { version } => {
                    return Err(anyhow!(
                        "Protocol version mismatch in HelloAck: expected {}, got {}",
                        PROTOCOL_VERSION,
                        version
                    ))
                }
                // Left over from a request we stopped waiting for.
                Message::Response { seq, .. } => debug!("[Stub] discarding late response #{}", seq),
                other => return Err(anyhow!("Expected HelloAck, got {:?}", other)),
            }
        }
    }

    async fn round_trip(&mut self, seq: u64, body: Request) -> anyhow::Result<Response> {
        if !self.handshaken {
            self.handshake().await?;
        }
        self.transport.send(Message::Request { seq, body }).await?;
        loop {
            match self.transport.recv().await? {
                Message::Response { seq: got, body } if got == seq => return Ok(body),
                Message::Response { seq: got, .. } if got < seq => {
                    debug!("[Stub] discarding late response #{} while awaiting #{}", got, seq);
                }
                Message::Response { seq: got, .. } => {
                    return Err(anyhow!("Sequence mismatch: expected {}, got {}", seq, got))
                }
                Message::HelloAck { .. } => {}
                other => return Err(anyhow!("Expected Response, got {:?}", other)),
            }
        }
    }
}

/// [`SessionApi`] over a [`Transport`].
///
/// Calls are serialised on the one link and each is bounded by the request
/// timeout. Anything that keeps a call from getting an answer surfaces as
/// [`GameError::NetworkUnavailable`]; the next call handshakes again.
pub struct Stub<T: Transport> {
    link: Mutex<Link<T>>,
    request_timeout: Duration,
}

impl<T: Transport> Stub<T> {
    pub fn new(transport: T) -> Self {
        Self::with_timeout(transport, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(transport: T, request_timeout: Duration) -> Self {
        Self {
            link: Mutex::new(Link {
                transport,
                next_seq: 0,
                handshaken: false,
            }),
            request_timeout,
        }
    }

    async fn call(&self, body: Request) -> Result<Response, GameError> {
        let mut link = self.link.lock().await;
        let seq = link.next_seq;
        link.next_seq += 1;
        let outcome = timeout(self.request_timeout, link.round_trip(seq, body)).await;
        let err = match outcome {
            Ok(Ok(Response::Error(e))) => return Err(e),
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => e.to_string(),
            Err(_) => {
                link.transport.reset();
                format!("no reply to request #{} within {:?}", seq, self.request_timeout)
            }
        };
        link.handshaken = false;
        warn!("[Stub] request #{} failed: {}", seq, err);
        Err(GameError::NetworkUnavailable(err))
    }

    async fn call_snapshot(&self, body: Request) -> Result<Snapshot, GameError> {
        match self.call(body).await? {
            Response::Snapshot(snapshot) => Ok(snapshot),
            other => Err(GameError::Protocol(format!("expected snapshot, got {:?}", other))),
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport> SessionApi for Stub<T> {
    async fn join(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError> {
        self.call_snapshot(Request::Join {
            session_id: session_id.to_string(),
            player: player.to_string(),
        })
        .await
    }

    async fn place_fleet(
        &self,
        session_id: &str,
        player: &str,
        cells: &[usize],
    ) -> Result<Snapshot, GameError> {
        self.call_snapshot(Request::PlaceFleet {
            session_id: session_id.to_string(),
            player: player.to_string(),
            cells: cells.to_vec(),
        })
        .await
    }

    async fn attack(
        &self,
        session_id: &str,
        player: &str,
        row: usize,
        col: usize,
    ) -> Result<AttackReport, GameError> {
        let body = Request::Attack {
            session_id: session_id.to_string(),
            player: player.to_string(),
            row,
            col,
        };
        match self.call(body).await? {
            Response::Attack(report) => Ok(report),
            other => Err(GameError::Protocol(format!("expected attack report, got {:?}", other))),
        }
    }

    async fn get_state(&self, session_id: &str) -> Result<Snapshot, GameError> {
        self.call_snapshot(Request::GetState {
            session_id: session_id.to_string(),
        })
        .await
    }

    async fn abandon(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError> {
        self.call_snapshot(Request::Abandon {
            session_id: session_id.to_string(),
            player: player.to_string(),
        })
        .await
    }
}
