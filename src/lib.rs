#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod bitboard;
mod config;
mod error;
mod fleet;
pub mod session;

#[cfg(feature = "std")]
pub mod client;
#[cfg(feature = "std")]
pub mod engine;
#[cfg(feature = "std")]
mod logging;
#[cfg(feature = "std")]
pub mod name_store;
#[cfg(feature = "std")]
mod player;
#[cfg(feature = "std")]
pub mod protocol;
#[cfg(feature = "std")]
pub mod render;
#[cfg(feature = "std")]
pub mod skeleton;
#[cfg(feature = "std")]
pub mod stub;
#[cfg(feature = "std")]
pub mod transport;

pub use bitboard::{BitBoard, BitBoardError};
pub use config::*;
pub use error::{GameError, PlacementError};
pub use fleet::{Cell, Fleet, Grid, Outcome, ShotBoard};
pub use session::{AttackReport, Phase, Session, SessionId, Snapshot};

#[cfg(feature = "std")]
pub use client::{AttackResult, CellMark, ClientView, PendingMove, PollOutcome, SyncClient};
#[cfg(feature = "std")]
pub use engine::SessionEngine;
#[cfg(feature = "std")]
pub use logging::init_logging;
#[cfg(feature = "std")]
pub use name_store::{JsonFileNameStore, MemoryNameStore, NameStore};
#[cfg(feature = "std")]
pub use player::{run_bot, Player, RandomPlayer};
#[cfg(feature = "std")]
pub use protocol::{Message, Request, Response, SessionApi};
#[cfg(feature = "std")]
pub use skeleton::{serve, Skeleton};
#[cfg(feature = "std")]
pub use stub::Stub;
#[cfg(feature = "std")]
pub use transport::{in_memory::InMemoryTransport, tcp::TcpTransport, Transport};
