//! Registry of live sessions.
//!
//! One mutex per session serialises every request against that session while
//! requests for other sessions proceed in parallel. The map lock is only held
//! long enough to find or insert an entry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};

use crate::error::GameError;
use crate::protocol::SessionApi;
use crate::session::{AttackReport, Phase, Session, SessionId, Snapshot};

struct Entry {
    session: Session,
    /// Set when the session finished or was emptied by an abandon.
    settled_since: Option<Instant>,
}

impl Entry {
    fn new(id: &str) -> Self {
        Self {
            session: Session::new(id),
            settled_since: None,
        }
    }

    fn mark_settled(&mut self) {
        let settled = match self.session.phase() {
            Phase::Finished => true,
            Phase::Lobby => self.session.players().is_empty(),
            _ => false,
        };
        if settled {
            self.settled_since.get_or_insert_with(Instant::now);
        } else {
            self.settled_since = None;
        }
    }
}

/// Server-side owner of every session.
#[derive(Default)]
pub struct SessionEngine {
    sessions: RwLock<BTreeMap<SessionId, Arc<Mutex<Entry>>>>,
}

impl SessionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lookup(&self, id: &str) -> Result<Arc<Mutex<Entry>>, GameError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(GameError::SessionNotFound)
    }

    /// Fetch the entry for `id`, creating it on first use. Creation re-checks
    /// under the write lock so racing first joins share one session.
    async fn lookup_or_create(&self, id: &str) -> Arc<Mutex<Entry>> {
        if let Ok(entry) = self.lookup(id).await {
            return entry;
        }
        let mut map = self.sessions.write().await;
        map.entry(id.to_string())
            .or_insert_with(|| {
                info!("[{}] session created", id);
                Arc::new(Mutex::new(Entry::new(id)))
            })
            .clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions that have been settled for at least `grace`.
    pub async fn sweep_settled(&self, grace: Duration) -> usize {
        self.sweep_settled_at(Instant::now(), grace).await
    }

    /// [`Self::sweep_settled`] against an explicit clock reading.
    pub async fn sweep_settled_at(&self, now: Instant, grace: Duration) -> usize {
        let mut map = self.sessions.write().await;
        let before = map.len();
        map.retain(|id, entry| {
            // Any clone besides the map's own means a request is in flight.
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            let Ok(entry) = entry.try_lock() else {
                return true;
            };
            let expired = entry
                .settled_since
                .is_some_and(|since| now.saturating_duration_since(since) >= grace);
            if expired {
                info!("[{}] session expired", id);
            }
            !expired
        });
        before - map.len()
    }
}

fn log_rejection(id: &str, player: &str, op: &str, err: &GameError) {
    warn!("[{}] {} rejected for {}: {}", id, op, player, err);
}

#[async_trait::async_trait]
impl SessionApi for SessionEngine {
    async fn join(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError> {
        let entry = self.lookup_or_create(session_id).await;
        let mut entry = entry.lock().await;
        let result = entry.session.join(player);
        entry.mark_settled();
        result.inspect_err(|e| log_rejection(session_id, player, "join", e))
    }

    async fn place_fleet(
        &self,
        session_id: &str,
        player: &str,
        cells: &[usize],
    ) -> Result<Snapshot, GameError> {
        let entry = self.lookup(session_id).await?;
        let mut entry = entry.lock().await;
        entry
            .session
            .place_fleet(player, cells)
            .inspect_err(|e| log_rejection(session_id, player, "placement", e))
    }

    async fn attack(
        &self,
        session_id: &str,
        player: &str,
        row: usize,
        col: usize,
    ) -> Result<AttackReport, GameError> {
        let entry = self.lookup(session_id).await?;
        let mut entry = entry.lock().await;
        let report = entry
            .session
            .attack(player, row, col)
            .inspect_err(|e| log_rejection(session_id, player, "attack", e))?;
        entry.mark_settled();
        Ok(report)
    }

    async fn get_state(&self, session_id: &str) -> Result<Snapshot, GameError> {
        let entry = self.lookup(session_id).await?;
        let entry = entry.lock().await;
        debug!("[{}] state requested (rev {})", session_id, entry.session.revision());
        Ok(entry.session.snapshot())
    }

    async fn abandon(&self, session_id: &str, player: &str) -> Result<Snapshot, GameError> {
        let entry = self.lookup(session_id).await?;
        let mut entry = entry.lock().await;
        let snapshot = entry
            .session
            .abandon(player)
            .inspect_err(|e| log_rejection(session_id, player, "abandon", e))?;
        entry.mark_settled();
        Ok(snapshot)
    }
}
