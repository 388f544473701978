use thiserror::Error;

mod driver;
mod handler;
mod socket;
mod stats;

pub use socket::*;
pub use stats::ServerStats;

use std::sync::Arc;

use shaper_wire::DEFAULT_MAX_FRAME_SIZE;

/// The largest dump page a client may ask for.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// The maximum number of concurrent clients.
    pub(crate) max_clients: Option<usize>,
    /// The maximum payload size of a single frame, in both directions.
    pub(crate) max_frame_size: usize,
    /// Upper bound for the page size requested by clients.
    pub(crate) max_page_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_clients: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl ServerOptions {
    /// Sets the number of maximum concurrent clients.
    pub fn max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = Some(max_clients);
        self
    }

    /// Sets the maximum frame payload size. Requests above it are rejected with `EMSGSIZE` and
    /// the connection is closed.
    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Sets the largest page a dump may return. Clamped to at least 1.
    pub fn max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }
}

/// The server state, shared between the driver task and the server handle.
#[derive(Debug, Default)]
pub(crate) struct ServerState {
    pub(crate) stats: Arc<ServerStats>,
}
