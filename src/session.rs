//! Authoritative per-session state machine.
//!
//! A [`Session`] moves `Lobby → Setup → Waiting → Playing → Finished`. Each
//! operation validates the whole request before touching any field, so a
//! rejected request leaves the session exactly as it was. Nothing in here
//! reads a clock or a random source: the same state and the same request
//! always produce the same result.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, info};

use crate::error::{GameError, PlacementError};
use crate::fleet::{Cell, Fleet, Outcome, ShotBoard};

/// Session identifier, supplied by the clients. Case-sensitive.
pub type SessionId = String;

/// Global phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Fewer than two players seated.
    Lobby,
    /// Both seated, no fleet placed yet.
    Setup,
    /// One fleet placed, awaiting the other.
    Waiting,
    Playing,
    Finished,
}

impl Phase {
    /// Phases in which fleets are accepted.
    pub fn accepts_fleet(self) -> bool {
        matches!(self, Phase::Setup | Phase::Waiting)
    }
}

#[derive(Debug, Clone)]
struct Seat {
    name: String,
    fleet: Option<Fleet>,
    /// Shots this player fired at the other seat.
    shots: ShotBoard,
}

impl Seat {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fleet: None,
            shots: ShotBoard::new(),
        }
    }
}

/// State of a session as seen by every client.
///
/// All fields are absolute values, so applying the same snapshot twice, or an
/// older one after a newer one, never corrupts a client view. Fleets are never
/// included; shot boards are public.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub session_id: SessionId,
    pub player1_name: Option<String>,
    pub player2_name: Option<String>,
    pub turn_holder: Option<String>,
    pub phase: Phase,
    pub winner: Option<String>,
    pub last_move_row: Option<usize>,
    pub last_move_col: Option<usize>,
    pub player1_ready: bool,
    pub player2_ready: bool,
    /// Shots fired by player 1 at player 2.
    pub player1_shots: ShotBoard,
    /// Shots fired by player 2 at player 1.
    pub player2_shots: ShotBoard,
    /// Bumped by every successful mutation, never reset.
    pub revision: u64,
}

impl Snapshot {
    /// Empty lobby snapshot for `session_id`.
    pub fn lobby(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            player1_name: None,
            player2_name: None,
            turn_holder: None,
            phase: Phase::Lobby,
            winner: None,
            last_move_row: None,
            last_move_col: None,
            player1_ready: false,
            player2_ready: false,
            player1_shots: ShotBoard::new(),
            player2_shots: ShotBoard::new(),
            revision: 0,
        }
    }

    /// Seat index (0 or 1) held by `name`.
    pub fn seat_of(&self, name: &str) -> Option<usize> {
        if self.player1_name.as_deref() == Some(name) {
            Some(0)
        } else if self.player2_name.as_deref() == Some(name) {
            Some(1)
        } else {
            None
        }
    }

    pub fn is_seated(&self, name: &str) -> bool {
        self.seat_of(name).is_some()
    }

    pub fn both_present(&self) -> bool {
        self.player1_name.is_some() && self.player2_name.is_some()
    }

    /// Name of the other seated player.
    pub fn opponent_of(&self, name: &str) -> Option<&str> {
        match self.seat_of(name)? {
            0 => self.player2_name.as_deref(),
            _ => self.player1_name.as_deref(),
        }
    }

    /// Shots fired by `name`.
    pub fn shots_by(&self, name: &str) -> Option<&ShotBoard> {
        match self.seat_of(name)? {
            0 => Some(&self.player1_shots),
            _ => Some(&self.player2_shots),
        }
    }

    /// Shots fired at `name`.
    pub fn shots_against(&self, name: &str) -> Option<&ShotBoard> {
        match self.seat_of(name)? {
            0 => Some(&self.player2_shots),
            _ => Some(&self.player1_shots),
        }
    }

    pub fn last_move(&self) -> Option<Cell> {
        match (self.last_move_row, self.last_move_col) {
            (Some(r), Some(c)) => Cell::from_coords(r, c).ok(),
            _ => None,
        }
    }
}

/// Answer to a resolved attack.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct AttackReport {
    pub outcome: Outcome,
    pub row: usize,
    pub col: usize,
    /// Session state right after the shot, winner included.
    pub snapshot: Snapshot,
}

/// One game room.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    phase: Phase,
    seats: [Option<Seat>; 2],
    turn: Option<usize>,
    winner: Option<usize>,
    last_move: Option<Cell>,
    revision: u64,
}

impl Session {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            phase: Phase::Lobby,
            seats: [None, None],
            turn: None,
            winner: None,
            last_move: None,
            revision: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn seat_index(&self, name: &str) -> Option<usize> {
        self.seats
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.name == name))
    }

    fn name_at(&self, idx: usize) -> Option<String> {
        self.seats[idx].as_ref().map(|s| s.name.clone())
    }

    /// Names of the seated players in join order.
    pub fn players(&self) -> Vec<&str> {
        self.seats
            .iter()
            .flatten()
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Seat `name`. Re-joining an occupied seat is a no-op.
    pub fn join(&mut self, name: &str) -> Result<Snapshot, GameError> {
        if self.seat_index(name).is_some() {
            debug!("[{}] {} re-joined", self.id, name);
            return Ok(self.snapshot());
        }
        let free = self
            .seats
            .iter()
            .position(Option::is_none)
            .ok_or(GameError::SessionFull)?;
        self.seats[free] = Some(Seat::new(name));
        self.revision += 1;
        if self.seats.iter().all(Option::is_some) {
            self.phase = Phase::Setup;
            info!("[{}] {} joined, both players present", self.id, name);
        } else {
            info!("[{}] {} joined, waiting for a rival", self.id, name);
        }
        Ok(self.snapshot())
    }

    /// Record `name`'s fleet. Play starts once both fleets are in; the player
    /// in the first seat moves first.
    pub fn place_fleet(&mut self, name: &str, cells: &[usize]) -> Result<Snapshot, GameError> {
        let idx = self.seat_index(name).ok_or(GameError::PlayerNotInSession)?;
        if !self.phase.accepts_fleet() {
            return Err(GameError::NotInSetupPhase);
        }
        if self.seats[idx].as_ref().is_some_and(|s| s.fleet.is_some()) {
            return Err(PlacementError::AlreadyPlaced.into());
        }
        let fleet = Fleet::new(cells)?;
        if let Some(seat) = self.seats[idx].as_mut() {
            seat.fleet = Some(fleet);
        }
        self.revision += 1;

        let all_placed = self
            .seats
            .iter()
            .all(|s| s.as_ref().is_some_and(|s| s.fleet.is_some()));
        if all_placed {
            self.phase = Phase::Playing;
            self.turn = Some(0);
            info!(
                "[{}] both fleets placed, {} moves first",
                self.id,
                self.name_at(0).unwrap_or_default()
            );
        } else {
            self.phase = Phase::Waiting;
            info!("[{}] {} placed a fleet", self.id, name);
        }
        Ok(self.snapshot())
    }

    /// Resolve a shot by `name` at (`row`, `col`) against the opponent.
    ///
    /// A hit that sinks the last opponent cell sets the winner and finishes
    /// the session in the same step.
    pub fn attack(&mut self, name: &str, row: usize, col: usize) -> Result<AttackReport, GameError> {
        let idx = self.seat_index(name).ok_or(GameError::PlayerNotInSession)?;
        if self.phase == Phase::Finished {
            return Err(GameError::GameOver);
        }
        if self.phase != Phase::Playing || self.turn != Some(idx) {
            return Err(GameError::NotYourTurn);
        }
        let cell = Cell::from_coords(row, col)?;
        let opponent = 1 - idx;

        let target = self.seats[opponent]
            .as_ref()
            .and_then(|s| s.fleet)
            .ok_or(GameError::NotYourTurn)?;
        let shooter = self.seats[idx].as_mut().ok_or(GameError::PlayerNotInSession)?;
        if shooter.shots.is_attacked(cell) {
            return Err(GameError::CellAlreadyAttacked);
        }

        let outcome = if target.contains(cell) {
            Outcome::Hit
        } else {
            Outcome::Miss
        };
        shooter.shots.record(cell, outcome)?;
        let sunk = outcome == Outcome::Hit && target.is_sunk_by(&shooter.shots.hits);

        self.last_move = Some(cell);
        self.revision += 1;
        if sunk {
            self.winner = Some(idx);
            self.phase = Phase::Finished;
            info!("[{}] {} sank the last ship at {}", self.id, name, cell);
        } else {
            self.turn = Some(opponent);
            debug!("[{}] {} fired at {}: {:?}", self.id, name, cell, outcome);
        }

        Ok(AttackReport {
            outcome,
            row,
            col,
            snapshot: self.snapshot(),
        })
    }

    /// Reset to a fresh lobby. Only a seated player may do this.
    pub fn abandon(&mut self, name: &str) -> Result<Snapshot, GameError> {
        if self.seat_index(name).is_none() {
            return Err(GameError::PlayerNotInSession);
        }
        self.phase = Phase::Lobby;
        self.seats = [None, None];
        self.turn = None;
        self.winner = None;
        self.last_move = None;
        self.revision += 1;
        info!("[{}] abandoned by {}", self.id, name);
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> Snapshot {
        let ready = |i: usize| self.seats[i].as_ref().is_some_and(|s| s.fleet.is_some());
        let shots = |i: usize| self.seats[i].as_ref().map(|s| s.shots).unwrap_or_default();
        Snapshot {
            session_id: self.id.clone(),
            player1_name: self.name_at(0),
            player2_name: self.name_at(1),
            turn_holder: self.turn.and_then(|t| self.name_at(t)),
            phase: self.phase,
            winner: self.winner.and_then(|w| self.name_at(w)),
            last_move_row: self.last_move.map(Cell::row),
            last_move_col: self.last_move.map(Cell::col),
            player1_ready: ready(0),
            player2_ready: ready(1),
            player1_shots: shots(0),
            player2_shots: shots(1),
            revision: self.revision,
        }
    }
}
