//! Client-side mirror of a session.
//!
//! The [`SyncClient`] keeps a local view derived from the newest server
//! snapshot plus the optimistic overlays it owns (an in-flight shot, shots
//! resolved in simulation mode). Every server answer is applied under one
//! lock, and only if no abandon happened while the request was in flight.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::{ClientConfig, OfflineFallback, FLEET_SIZE, GRID_CELLS};
use crate::error::{GameError, PlacementError};
use crate::fleet::{Cell, Fleet, Grid, Outcome, ShotBoard};
use crate::protocol::SessionApi;
use crate::session::{AttackReport, Phase, Snapshot};

/// Local rendering state of one target cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellMark {
    Unknown,
    /// Shot sent, answer not yet in.
    Pending,
    Hit,
    Miss,
    /// Resolved locally while the server was unreachable.
    Simulated,
}

/// A shot sent but not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    pub cell: Cell,
}

/// What became of a submitted attack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackResult {
    /// The server resolved the shot.
    Confirmed(AttackReport),
    /// The server could not be reached. No hit or miss is inferred; the
    /// cell is marked simulated until the next snapshot clears it.
    Simulated { row: usize, col: usize },
    /// The session was abandoned while the shot was in flight.
    Discarded,
}

/// What a single poll did to the local view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied,
    /// Older than the snapshot already applied.
    Stale,
    /// Resolved after an abandon.
    Discarded,
    /// Not seated anywhere, nothing to poll.
    Idle,
    /// The server no longer knows the session.
    SessionGone,
}

/// Everything a UI needs to draw the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    pub player: String,
    pub session_id: Option<String>,
    pub joined: bool,
    pub phase: Phase,
    pub my_turn: bool,
    /// Marks on the opponent's grid, indexed by cell.
    pub target: Vec<CellMark>,
    pub own_fleet: Vec<usize>,
    /// Shots the opponent fired at us.
    pub incoming: ShotBoard,
    pub last_move: Option<Cell>,
    pub opponent: Option<String>,
    pub winner: Option<String>,
    pub message: String,
    /// Set once a shot was simulated; cleared by the next server snapshot.
    pub degraded: bool,
    pub revision: Option<u64>,
    pub pending: Option<PendingMove>,
}

impl ClientView {
    fn new(player: &str) -> Self {
        Self {
            player: player.to_string(),
            session_id: None,
            joined: false,
            phase: Phase::Lobby,
            my_turn: false,
            target: vec![CellMark::Unknown; GRID_CELLS],
            own_fleet: Vec::new(),
            incoming: ShotBoard::new(),
            last_move: None,
            opponent: None,
            winner: None,
            message: "Enter room id".to_string(),
            degraded: false,
            revision: None,
            pending: None,
        }
    }

    pub fn mark(&self, cell: Cell) -> CellMark {
        self.target[cell.index()]
    }

    /// `Some(true)` when we won, `Some(false)` when we lost.
    pub fn victory(&self) -> Option<bool> {
        self.winner.as_ref().map(|w| *w == self.player)
    }

    /// Whether the poll loop has anything to do.
    pub fn wants_polling(&self) -> bool {
        self.joined && self.phase != Phase::Finished
    }
}

struct Local {
    view: ClientView,
    latest: Option<Snapshot>,
    simulated: Grid,
    /// First placement whose answer never arrived.
    unconfirmed_fleet: Option<Vec<usize>>,
}

impl Local {
    fn new(player: &str) -> Self {
        Self {
            view: ClientView::new(player),
            latest: None,
            simulated: Grid::new(),
            unconfirmed_fleet: None,
        }
    }

    fn me(&self) -> &str {
        &self.view.player
    }

    fn reset(&mut self, message: &str) {
        let player = self.view.player.clone();
        *self = Local::new(&player);
        self.view.message = message.to_string();
    }

    /// Bring the view in line with `snap` using the poll rules, in priority
    /// order. Returns `false` when the snapshot was older than the last one.
    fn reconcile(&mut self, snap: Snapshot) -> bool {
        if self.view.phase == Phase::Finished {
            return false;
        }
        if self
            .view
            .session_id
            .as_deref()
            .is_some_and(|id| id != snap.session_id)
        {
            debug!(
                "[SyncClient] ignoring snapshot for {} while in {:?}",
                snap.session_id, self.view.session_id
            );
            return false;
        }
        if self.latest.as_ref().is_some_and(|l| snap.revision < l.revision) {
            debug!(
                "[SyncClient] ignoring stale snapshot rev {} (have {:?})",
                snap.revision, self.view.revision
            );
            return false;
        }
        self.latest = Some(snap);
        self.simulated = Grid::new();
        self.view.degraded = false;
        self.rederive();

        let Some(snap) = self.latest.as_ref() else {
            return false;
        };
        let me = self.view.player.clone();
        if let Some(winner) = snap.winner.clone() {
            self.view.phase = Phase::Finished;
            self.view.my_turn = false;
            self.view.message = if winner == me {
                "Victory! Enemy fleet sunk".to_string()
            } else {
                "Defeat... your ships are gone".to_string()
            };
            info!("[SyncClient] game over, winner {}", winner);
            self.view.winner = Some(winner);
            return true;
        }
        if !snap.is_seated(&me) {
            info!("[SyncClient] no longer seated, session was reset");
            self.reset("Opponent abandoned the session");
            return true;
        }
        if self.view.phase == Phase::Lobby && snap.both_present() {
            self.view.phase = Phase::Setup;
            self.view.message = format!("Rival present. Deploy {} ships", FLEET_SIZE);
        }
        if self.view.phase == Phase::Waiting && snap.phase == Phase::Playing {
            self.view.phase = Phase::Playing;
            self.view.message = "Enemy detected! Battle stations!".to_string();
        }
        if self.view.phase == Phase::Playing {
            let turn = snap.turn_holder.as_deref() == Some(me.as_str());
            self.view.my_turn = turn && self.view.pending.is_none();
            self.view.message = if self.view.my_turn {
                "Your turn - fire!".to_string()
            } else {
                "Awaiting enemy fire...".to_string()
            };
        }
        true
    }

    /// Recompute the board fields from the latest snapshot and the overlays.
    fn rederive(&mut self) {
        let Some(snap) = self.latest.as_ref() else {
            return;
        };
        let me = self.me().to_string();
        let mine = snap.shots_by(&me).copied().unwrap_or_default();
        let pending = self.view.pending.map(|p| p.cell);
        let mut confirmed_pending = false;
        for idx in 0..GRID_CELLS {
            let Some(cell) = Cell::from_index(idx) else {
                continue;
            };
            let mark = match mine.outcome_at(cell) {
                Some(Outcome::Hit) => CellMark::Hit,
                Some(Outcome::Miss) => CellMark::Miss,
                None if pending == Some(cell) => CellMark::Pending,
                None if self.simulated.get_index(idx).unwrap_or(false) => CellMark::Simulated,
                None => CellMark::Unknown,
            };
            if pending == Some(cell) && mark != CellMark::Pending {
                confirmed_pending = true;
            }
            self.view.target[idx] = mark;
        }
        if confirmed_pending {
            self.view.pending = None;
        }
        self.view.incoming = snap.shots_against(&me).copied().unwrap_or_default();
        self.view.last_move = snap.last_move();
        self.view.opponent = snap.opponent_of(&me).map(str::to_string);
        self.view.revision = Some(snap.revision);
    }
}

/// Phase a freshly (re-)joined client should start from.
fn phase_after_join(snap: &Snapshot, me: &str) -> Phase {
    let ready = match snap.seat_of(me) {
        Some(0) => snap.player1_ready,
        Some(_) => snap.player2_ready,
        None => false,
    };
    match snap.phase {
        Phase::Lobby => Phase::Lobby,
        Phase::Setup | Phase::Waiting if ready => Phase::Waiting,
        Phase::Setup | Phase::Waiting => Phase::Setup,
        // Rule 1 of reconcile moves a won session straight to Finished.
        Phase::Playing | Phase::Finished => Phase::Playing,
    }
}

/// Eventually consistent mirror of one session for one player.
pub struct SyncClient {
    api: Arc<dyn SessionApi>,
    config: ClientConfig,
    state: Mutex<Local>,
    /// Bumped by every join and abandon while `state` is locked.
    epoch: watch::Sender<u64>,
}

impl SyncClient {
    pub fn new(api: Arc<dyn SessionApi>, player: &str, config: ClientConfig) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            api,
            config,
            state: Mutex::new(Local::new(player)),
            epoch,
        }
    }

    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn view(&self) -> ClientView {
        self.state.lock().await.view.clone()
    }

    /// Take a seat in `session_id`. Re-joining a session already in progress
    /// resumes from the server's state. Anything still in flight for the
    /// previous session is discarded when it lands.
    pub async fn join(&self, session_id: &str) -> Result<Snapshot, GameError> {
        let (epoch, player) = {
            let mut local = self.state.lock().await;
            self.epoch.send_modify(|e| *e += 1);
            local.view.message = "Connecting...".to_string();
            (self.current_epoch(), local.view.player.clone())
        };
        let result = self.api.join(session_id, &player).await;

        let mut local = self.state.lock().await;
        if epoch != self.current_epoch() {
            return Err(GameError::Protocol("join superseded by a later join or abandon".to_string()));
        }
        match result {
            Ok(snap) => {
                local.reset("Connected! Waiting for rival...");
                local.view.session_id = Some(session_id.to_string());
                local.view.joined = true;
                local.view.phase = phase_after_join(&snap, &player);
                if local.view.phase == Phase::Setup {
                    local.view.message = format!("Rival present. Deploy {} ships", FLEET_SIZE);
                } else if local.view.phase == Phase::Waiting {
                    local.view.message = "Fleet ready. Waiting for enemy...".to_string();
                }
                local.reconcile(snap.clone());
                info!("[SyncClient] {} joined {} ({:?})", player, session_id, local.view.phase);
                Ok(snap)
            }
            Err(e) => {
                local.view.message = match e {
                    GameError::SessionFull => "Connection rejected: room is full".to_string(),
                    _ => format!("Error: {}", e),
                };
                Err(e)
            }
        }
    }

    /// Submit our fleet. Validation runs locally before anything is sent.
    pub async fn place_fleet(&self, cells: &[usize]) -> Result<Snapshot, GameError> {
        let (epoch, session_id, player) = {
            let mut local = self.state.lock().await;
            if !local.view.joined || local.view.phase != Phase::Setup {
                return Err(GameError::NotInSetupPhase);
            }
            if let Err(e) = Fleet::new(cells) {
                local.view.message = format!("Invalid fleet: {}", e);
                return Err(e.into());
            }
            let session_id = local.view.session_id.clone().unwrap_or_default();
            (self.current_epoch(), session_id, local.view.player.clone())
        };
        let result = self.api.place_fleet(&session_id, &player, cells).await;

        let mut local = self.state.lock().await;
        if epoch != self.current_epoch() {
            return Err(GameError::Protocol("placement superseded by a later join or abandon".to_string()));
        }
        match result {
            Ok(snap) => {
                local.view.own_fleet = cells.to_vec();
                local.unconfirmed_fleet = None;
                local.view.phase = Phase::Waiting;
                local.view.message = "Fleet ready. Waiting for enemy...".to_string();
                local.reconcile(snap.clone());
                Ok(snap)
            }
            // An earlier submission did land and its answer was lost. The
            // server holds that fleet, not this one.
            Err(GameError::InvalidPlacement(PlacementError::AlreadyPlaced)) => {
                local.view.own_fleet = local.unconfirmed_fleet.take().unwrap_or_default();
                local.view.phase = Phase::Waiting;
                local.view.message = "Fleet ready. Waiting for enemy...".to_string();
                Err(GameError::InvalidPlacement(PlacementError::AlreadyPlaced))
            }
            Err(e) => {
                if e.is_recoverable() {
                    local.unconfirmed_fleet.get_or_insert_with(|| cells.to_vec());
                }
                local.view.message = format!("Error sending fleet: {}", e);
                Err(e)
            }
        }
    }

    /// Fire at (`row`, `col`) on the opponent's grid.
    pub async fn attack(&self, row: usize, col: usize) -> Result<AttackResult, GameError> {
        let (epoch, session_id, player, cell) = {
            let mut local = self.state.lock().await;
            if local.view.phase == Phase::Finished {
                return Err(GameError::GameOver);
            }
            if local.view.phase != Phase::Playing || !local.view.my_turn {
                local.view.message = "Hold your fire, Commander!".to_string();
                return Err(GameError::NotYourTurn);
            }
            let cell = Cell::from_coords(row, col)?;
            if local.view.mark(cell) != CellMark::Unknown {
                return Err(GameError::CellAlreadyAttacked);
            }
            local.view.pending = Some(PendingMove { cell });
            local.view.target[cell.index()] = CellMark::Pending;
            local.view.my_turn = false;
            local.view.message = "Sending coordinates...".to_string();
            let session_id = local.view.session_id.clone().unwrap_or_default();
            (self.current_epoch(), session_id, local.view.player.clone(), cell)
        };
        let result = self.api.attack(&session_id, &player, row, col).await;

        let mut local = self.state.lock().await;
        if epoch != self.current_epoch() {
            debug!("[SyncClient] dropping attack result for {} after abandon", cell);
            return Ok(AttackResult::Discarded);
        }
        local.view.pending = None;
        match result {
            Ok(report) => {
                local.reconcile(report.snapshot.clone());
                local.view.target[cell.index()] = match report.outcome {
                    Outcome::Hit => CellMark::Hit,
                    Outcome::Miss => CellMark::Miss,
                };
                local.view.my_turn = false;
                if local.view.phase == Phase::Playing {
                    local.view.message = match report.outcome {
                        Outcome::Hit => "Hit!".to_string(),
                        Outcome::Miss => "Miss...".to_string(),
                    };
                }
                Ok(AttackResult::Confirmed(report))
            }
            Err(e) if e.is_recoverable() => match self.config.offline_fallback {
                OfflineFallback::Simulate => {
                    warn!("[SyncClient] attack at {} not delivered, simulating: {}", cell, e);
                    if local.simulated.set_index(cell.index()).is_ok() {
                        local.view.target[cell.index()] = CellMark::Simulated;
                    }
                    local.view.degraded = true;
                    local.view.message =
                        format!("Simulation mode: shot at {} not confirmed by server", cell);
                    Ok(AttackResult::Simulated { row, col })
                }
                OfflineFallback::Disabled => {
                    local.view.target[cell.index()] = CellMark::Unknown;
                    local.view.my_turn = true;
                    local.view.message = format!("Shot not delivered: {}", e);
                    Err(e)
                }
            },
            Err(e) => {
                debug!("[SyncClient] attack at {} rejected: {}", cell, e);
                local.view.target[cell.index()] = CellMark::Unknown;
                local.rederive();
                local.view.my_turn = false;
                local.view.message = match e {
                    GameError::NotYourTurn => "Hold your fire, Commander!".to_string(),
                    GameError::GameOver => "The battle is already over".to_string(),
                    _ => format!("Shot rejected: {}", e),
                };
                Err(e)
            }
        }
    }

    /// Fetch one snapshot and fold it into the view.
    pub async fn poll_once(&self) -> Result<PollOutcome, GameError> {
        let (epoch, session_id) = {
            let local = self.state.lock().await;
            if !local.view.wants_polling() {
                return Ok(PollOutcome::Idle);
            }
            (self.current_epoch(), local.view.session_id.clone().unwrap_or_default())
        };
        let result = self.api.get_state(&session_id).await;

        let mut local = self.state.lock().await;
        if epoch != self.current_epoch() || !local.view.joined {
            return Ok(PollOutcome::Discarded);
        }
        match result {
            Ok(snap) => Ok(if local.reconcile(snap) {
                PollOutcome::Applied
            } else {
                PollOutcome::Stale
            }),
            Err(GameError::SessionNotFound) => {
                info!("[SyncClient] session {} is gone", session_id);
                local.reset("Session closed by server");
                Ok(PollOutcome::SessionGone)
            }
            Err(e) => {
                warn!("[SyncClient] poll failed: {}", e);
                Err(e)
            }
        }
    }

    /// Poll at the configured interval until the game finishes or the session
    /// is abandoned. Failed polls are logged and retried on the next tick.
    pub async fn run_polling(&self) {
        let mut abandoned = self.epoch.subscribe();
        let start = *abandoned.borrow_and_update();
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = abandoned.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            if self.current_epoch() != start {
                debug!("[SyncClient] polling stopped by abandon");
                return;
            }
            if !self.state.lock().await.view.wants_polling() {
                debug!("[SyncClient] polling finished");
                return;
            }
            // Errors were already logged, and the next tick retries.
            let _ = self.poll_once().await;
        }
    }

    /// Leave the session. The local view resets at once and anything still
    /// in flight is discarded when it lands.
    pub async fn abandon(&self) -> Result<(), GameError> {
        let (session_id, player) = {
            let mut local = self.state.lock().await;
            self.epoch.send_modify(|e| *e += 1);
            let session_id = local.view.session_id.clone().filter(|_| local.view.joined);
            let player = local.view.player.clone();
            local.reset("Game abandoned");
            (session_id, player)
        };
        let Some(session_id) = session_id else {
            return Ok(());
        };
        info!("[SyncClient] {} abandons {}", player, session_id);
        match self.api.abandon(&session_id, &player).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("[SyncClient] abandon not acknowledged: {}", e);
                Err(e)
            }
        }
    }
}
