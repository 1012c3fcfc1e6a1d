//! Game constants and runtime knobs for the server and the sync client.

use core::time::Duration;

/// Side length of the square grid.
pub const GRID_SIZE: usize = 5;
/// Number of cells on the grid.
pub const GRID_CELLS: usize = GRID_SIZE * GRID_SIZE;
/// Single-cell ships each player deploys.
pub const FLEET_SIZE: usize = 3;

const _: () = assert!(GRID_CELLS <= u128::BITS as usize, "grid does not fit the bitboard");
const _: () = assert!(FLEET_SIZE > 0 && FLEET_SIZE <= GRID_CELLS);

/// Version exchanged in the connection handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Reference poll interval of the sync client.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Upper bound on a single request/response round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a finished session is kept before the sweeper drops it.
pub const DEFAULT_FINISHED_GRACE: Duration = Duration::from_secs(300);
/// How often the server looks for expired sessions.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// What the client does when an attack cannot reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineFallback {
    /// Resolve the shot locally and flag the view as degraded.
    Simulate,
    /// Report the failure and leave the board untouched.
    Disabled,
}

/// Sync client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub offline_fallback: OfflineFallback,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            offline_fallback: OfflineFallback::Simulate,
        }
    }
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Per-connection read/write timeout.
    pub io_timeout: Duration,
    pub sweep_interval: Duration,
    pub finished_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(120),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            finished_grace: DEFAULT_FINISHED_GRACE,
        }
    }
}
