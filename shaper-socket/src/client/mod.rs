use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use shaper_wire::{Reply, Request, DEFAULT_MAX_FRAME_SIZE};

mod driver;
mod socket;

pub use socket::*;

const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Wire protocol error: {0:?}")]
    Wire(#[from] shaper_wire::Error),
    #[error("Request failed with code {code}: {message}")]
    Remote { code: i32, message: String },
    #[error("Unexpected reply type: {0}")]
    UnexpectedReply(u8),
    #[error("Socket closed")]
    SocketClosed,
    #[error("Request timed out")]
    Timeout,
}

impl ClientError {
    /// The errno reported by the server, if the server rejected the request.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub(crate) enum Command {
    Send { request: Request, response: oneshot::Sender<Result<Reply, ClientError>> },
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long to wait for a reply.
    pub timeout: Duration,
    /// The maximum payload size of a single frame, in both directions.
    pub max_frame_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientOptions {
    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum frame payload size.
    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}
