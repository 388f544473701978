use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use shaper_wire::message::cmd;

/// Number of request counters: one per command, slot 0 collecting unknown commands.
const COMMAND_SLOTS: usize = cmd::CAP_DUMP as usize + 1;

/// Statistics for a shaper server, shared between the sessions and the server handle.
#[derive(Debug, Default)]
pub struct ServerStats {
    bytes_tx: AtomicUsize,
    bytes_rx: AtomicUsize,
    active_clients: AtomicUsize,
    /// Requests received, indexed by command.
    requests: [AtomicUsize; COMMAND_SLOTS],
    /// Requests answered with an error reply.
    failed_requests: AtomicUsize,
    /// Requests that could not be decoded.
    malformed_requests: AtomicUsize,
    /// Requests and replies rejected for exceeding the frame size limit.
    oversized_frames: AtomicUsize,
}

impl ServerStats {
    /// Counts a received request frame of `bytes` bytes.
    #[inline]
    pub(crate) fn record_request(&self, cmd: u8, bytes: usize) {
        self.bytes_rx.fetch_add(bytes, Ordering::Relaxed);
        self.requests[slot(cmd)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_tx(&self, bytes: usize) {
        self.bytes_tx.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_malformed(&self) {
        self.malformed_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_oversized(&self) {
        self.oversized_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Registers a new client. The client counts as active until the guard is dropped.
    pub(crate) fn connect(self: &Arc<Self>) -> ClientGuard {
        self.active_clients.fetch_add(1, Ordering::Relaxed);
        ClientGuard(Arc::clone(self))
    }

    #[inline]
    pub fn bytes_tx(&self) -> usize {
        self.bytes_tx.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn bytes_rx(&self) -> usize {
        self.bytes_rx.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_clients(&self) -> usize {
        self.active_clients.load(Ordering::Relaxed)
    }

    /// Requests received with the given command id. Unknown ids share one counter.
    #[inline]
    pub fn requests(&self, cmd: u8) -> usize {
        self.requests[slot(cmd)].load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.iter().map(|count| count.load(Ordering::Relaxed)).sum()
    }

    #[inline]
    pub fn failed_requests(&self) -> usize {
        self.failed_requests.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn malformed_requests(&self) -> usize {
        self.malformed_requests.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn oversized_frames(&self) -> usize {
        self.oversized_frames.load(Ordering::Relaxed)
    }
}

#[inline]
fn slot(cmd: u8) -> usize {
    let slot = cmd as usize;
    if slot < COMMAND_SLOTS {
        slot
    } else {
        0
    }
}

/// Keeps a client counted in [`ServerStats::active_clients`] for as long as it lives.
#[derive(Debug)]
pub(crate) struct ClientGuard(Arc<ServerStats>);

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.0.active_clients.fetch_sub(1, Ordering::Relaxed);
    }
}
