use log::debug;
use rand::rngs::SmallRng;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::client::{CellMark, ClientView, SyncClient};
use crate::config::{FLEET_SIZE, GRID_CELLS, GRID_SIZE};
use crate::error::{GameError, PlacementError};
use crate::fleet::Cell;
use crate::session::Phase;

/// Decision maker behind a sync client: a human at a prompt or a bot.
pub trait Player {
    /// Pick the cells to deploy ships on.
    fn choose_fleet(&mut self, rng: &mut SmallRng) -> Vec<usize>;

    /// Choose the next cell to fire at, or `None` when nothing is left.
    fn select_target(&mut self, rng: &mut SmallRng, view: &ClientView) -> Option<Cell>;
}

/// Bot that fires next to known hits first and at random otherwise.
#[derive(Debug, Default)]
pub struct RandomPlayer;

impl RandomPlayer {
    pub fn new() -> Self {
        Self
    }
}

fn neighbours(cell: Cell) -> impl Iterator<Item = Cell> {
    let (r, c) = (cell.row() as isize, cell.col() as isize);
    [(-1, 0), (1, 0), (0, -1), (0, 1)]
        .into_iter()
        .filter_map(move |(dr, dc)| {
            let (nr, nc) = (r + dr, c + dc);
            if nr < 0 || nc < 0 || nr >= GRID_SIZE as isize || nc >= GRID_SIZE as isize {
                return None;
            }
            Cell::from_coords(nr as usize, nc as usize).ok()
        })
}

impl Player for RandomPlayer {
    fn choose_fleet(&mut self, rng: &mut SmallRng) -> Vec<usize> {
        let mut cells: Vec<usize> = (0..GRID_CELLS).collect();
        cells.shuffle(rng);
        cells.truncate(FLEET_SIZE);
        cells.sort_unstable();
        cells
    }

    fn select_target(&mut self, rng: &mut SmallRng, view: &ClientView) -> Option<Cell> {
        let open: Vec<Cell> = (0..GRID_CELLS)
            .filter_map(Cell::from_index)
            .filter(|&cell| view.mark(cell) == CellMark::Unknown)
            .collect();
        let near_hits: Vec<Cell> = open
            .iter()
            .copied()
            .filter(|&cell| neighbours(cell).any(|n| view.mark(n) == CellMark::Hit))
            .collect();
        if let Some(cell) = near_hits.choose(rng) {
            return Some(*cell);
        }
        open.choose(rng).copied()
    }
}

/// Play the rest of a game through an already joined `client`, letting
/// `player` make every decision. Returns the last view, which is FINISHED
/// unless the session went away underneath us.
pub async fn run_bot<P: Player + ?Sized>(
    client: &SyncClient,
    player: &mut P,
    rng: &mut SmallRng,
) -> Result<ClientView, GameError> {
    let pause = client.config().poll_interval;
    loop {
        let view = client.view().await;
        if view.phase == Phase::Finished || !view.joined {
            return Ok(view);
        }
        match view.phase {
            Phase::Setup => {
                let cells = player.choose_fleet(rng);
                match client.place_fleet(&cells).await {
                    Ok(_) | Err(GameError::InvalidPlacement(PlacementError::AlreadyPlaced)) => {
                        continue
                    }
                    Err(e) if e.is_recoverable() => {}
                    Err(e) => return Err(e),
                }
            }
            Phase::Playing if view.my_turn => {
                let Some(cell) = player.select_target(rng, &view) else {
                    return Ok(view);
                };
                debug!("[{}] firing at {}", view.player, cell);
                match client.attack(cell.row(), cell.col()).await {
                    Ok(_) => continue,
                    Err(e) if e.is_authoritative_rejection() || e.is_recoverable() => {}
                    Err(e) => return Err(e),
                }
            }
            _ => {}
        }
        tokio::time::sleep(pause).await;
        match client.poll_once().await {
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {}
            Err(e) => return Err(e),
        }
    }
}
