//! Text rendering of a [`ClientView`] and coordinate parsing for the prompt.

use std::fmt::Write;

use crate::client::{CellMark, ClientView};
use crate::config::GRID_SIZE;
use crate::fleet::{Cell, Outcome};
use crate::session::Phase;

/// Board label for a cell, e.g. `B3` for row 2, column 1.
pub fn coord_to_string(row: usize, col: usize) -> String {
    let col = (b'A' + col as u8) as char;
    format!("{}{}", col, row + 1)
}

/// Parse a label such as `b3` into zero-based (row, col).
pub fn parse_coord(input: &str) -> Option<(usize, usize)> {
    let input = input.trim();
    if input.len() < 2 {
        return None;
    }
    let mut chars = input.chars();
    let col_ch = chars.next()?.to_ascii_uppercase();
    if !col_ch.is_ascii_uppercase() {
        return None;
    }
    let col = (col_ch as u8 - b'A') as usize;
    let row: usize = chars.as_str().parse().ok()?;
    if row == 0 || row > GRID_SIZE || col >= GRID_SIZE {
        return None;
    }
    Some((row - 1, col))
}

/// Parse a whitespace separated list of labels into flat cell indices.
pub fn parse_fleet(input: &str) -> Option<Vec<usize>> {
    input
        .split_whitespace()
        .map(|tok| parse_coord(tok).and_then(|(r, c)| Cell::from_coords(r, c).ok()))
        .map(|cell| cell.map(Cell::index))
        .collect()
}

fn header(out: &mut String) {
    out.push_str("   ");
    for c in 0..GRID_SIZE {
        let _ = write!(out, " {}", (b'A' + c as u8) as char);
    }
    out.push('\n');
}

fn target_char(mark: CellMark) -> char {
    match mark {
        CellMark::Unknown => '.',
        CellMark::Pending => '?',
        CellMark::Hit => 'X',
        CellMark::Miss => 'o',
        CellMark::Simulated => '~',
    }
}

/// Opponent grid on top, own grid below, then the status line.
pub fn render_view(view: &ClientView) -> String {
    let mut out = String::new();
    let opponent = view.opponent.as_deref().unwrap_or("waiting for rival");
    let _ = writeln!(out, "Opponent board ({}):", opponent);
    header(&mut out);
    for r in 0..GRID_SIZE {
        let _ = write!(out, "{:2} ", r + 1);
        for c in 0..GRID_SIZE {
            let ch = Cell::from_coords(r, c)
                .map(|cell| target_char(view.mark(cell)))
                .unwrap_or(' ');
            let _ = write!(out, " {}", ch);
        }
        out.push('\n');
    }

    out.push_str("\nYour board:\n");
    header(&mut out);
    for r in 0..GRID_SIZE {
        let _ = write!(out, "{:2} ", r + 1);
        for c in 0..GRID_SIZE {
            let ch = match Cell::from_coords(r, c) {
                Ok(cell) => match view.incoming.outcome_at(cell) {
                    Some(Outcome::Hit) => 'X',
                    Some(Outcome::Miss) => 'o',
                    None if view.own_fleet.contains(&cell.index()) => 'S',
                    None => '.',
                },
                Err(_) => ' ',
            };
            let _ = write!(out, " {}", ch);
        }
        out.push('\n');
    }

    if let Some(cell) = view.last_move {
        let _ = writeln!(out, "\nLast shot: {}", coord_to_string(cell.row(), cell.col()));
    }
    let phase = match view.phase {
        Phase::Lobby => "LOBBY",
        Phase::Setup => "SETUP",
        Phase::Waiting => "WAITING",
        Phase::Playing => "PLAYING",
        Phase::Finished => "FINISHED",
    };
    let _ = write!(out, "[{}] {}", phase, view.message);
    if view.degraded {
        out.push_str(" (offline)");
    }
    out.push('\n');
    out
}
